use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::options::is_host_name_char;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub hostname: String,
    pub mac_address: String,
    pub discover_timeout_seconds: u32,
    pub tick_interval_millis: u64,
    pub client_port: u16,
    pub lease_file: String,
    pub interface_index: Option<u32>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            hostname: "node".to_string(),
            mac_address: "02:00:00:00:00:01".to_string(),
            discover_timeout_seconds: 10,
            tick_interval_millis: 1000,
            client_port: crate::transport::DHCP_CLIENT_PORT,
            lease_file: "lease.json".to_string(),
            interface_index: None,
        }
    }
}

impl ClientConfig {
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: ClientConfig = serde_json::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = ClientConfig::default();
            config.save(path)?;
            Ok(config)
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.mac()?;

        if !self.hostname.chars().any(is_host_name_char) {
            return Err(Error::InvalidConfig(
                "hostname must contain at least one letter, digit or '-'".to_string(),
            ));
        }

        if self.discover_timeout_seconds == 0 {
            return Err(Error::InvalidConfig(
                "discover_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.tick_interval_millis == 0 {
            return Err(Error::InvalidConfig(
                "tick_interval_millis must be greater than 0".to_string(),
            ));
        }

        if self.lease_file.is_empty() {
            return Err(Error::InvalidConfig(
                "lease_file must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn mac(&self) -> Result<[u8; 6]> {
        parse_mac(&self.mac_address)
    }
}

/// Parses `aa:bb:cc:dd:ee:ff` (or `-`-separated) into bytes.
pub fn parse_mac(mac: &str) -> Result<[u8; 6]> {
    let normalized = mac.trim().replace('-', ":");
    let mut bytes = [0u8; 6];
    let mut parts = normalized.split(':');

    for byte in bytes.iter_mut() {
        let part = parts
            .next()
            .ok_or_else(|| Error::InvalidMac(mac.to_string()))?;
        if part.len() != 2 {
            return Err(Error::InvalidMac(mac.to_string()));
        }
        *byte = u8::from_str_radix(part, 16).map_err(|_| Error::InvalidMac(mac.to_string()))?;
    }

    if parts.next().is_some() {
        return Err(Error::InvalidMac(mac.to_string()));
    }

    Ok(bytes)
}
