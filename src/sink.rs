//! Where an accepted lease's configuration goes.
//!
//! The state machine hands every committed lease to a [`ConfigSink`] and
//! revokes it again on NAK, expiry or restart. [`MemorySink`] just keeps the
//! configuration; [`LeaseFileSink`] also publishes it as JSON so other
//! processes on the node can pick it up.

use std::io::ErrorKind;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::lease::LeaseOffer;

/// Subnet mask assumed when a server does not send option 1.
const DEFAULT_SUBNET_MASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);

/// Address configuration for the network interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceConfig {
    pub address: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    pub gateway: Option<Ipv4Addr>,
    pub dns_server: Option<Ipv4Addr>,
}

impl InterfaceConfig {
    pub fn from_offer(offer: &LeaseOffer) -> Self {
        Self {
            address: offer.client_address,
            subnet_mask: offer.subnet_mask.unwrap_or(DEFAULT_SUBNET_MASK),
            gateway: offer.gateway,
            dns_server: offer.dns_server,
        }
    }

    /// Number of leading one bits in the subnet mask.
    pub fn prefix_len(&self) -> u32 {
        u32::from(self.subnet_mask).leading_ones()
    }
}

/// Receives the configuration of the current lease.
pub trait ConfigSink {
    /// Starts using `config`, replacing whatever was applied before.
    fn apply(&mut self, config: InterfaceConfig);

    /// Stops using the applied configuration. Revoking nothing is a no-op.
    fn revoke(&mut self);

    /// Returns true while a configuration is applied.
    fn is_valid(&self) -> bool;
}

/// Keeps the applied configuration in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    current: Option<InterfaceConfig>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&InterfaceConfig> {
        self.current.as_ref()
    }
}

impl ConfigSink for MemorySink {
    fn apply(&mut self, config: InterfaceConfig) {
        self.current = Some(config);
    }

    fn revoke(&mut self) {
        self.current = None;
    }

    fn is_valid(&self) -> bool {
        self.current.is_some()
    }
}

/// Contents of the lease file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRecord {
    pub config: InterfaceConfig,
    pub applied_at: DateTime<Utc>,
}

/// Publishes the applied configuration as a JSON file.
///
/// The file exists exactly while a configuration is applied. Write failures
/// are logged and do not affect [`is_valid`](ConfigSink::is_valid).
#[derive(Debug)]
pub struct LeaseFileSink {
    path: PathBuf,
    current: Option<InterfaceConfig>,
}

impl LeaseFileSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            current: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the record a running client published, if any.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Option<LeaseRecord>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)?;
        let record: LeaseRecord = serde_json::from_str(&content)?;
        Ok(Some(record))
    }

    fn write(&self, record: &LeaseRecord) -> Result<()> {
        let content = serde_json::to_string_pretty(record)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

impl ConfigSink for LeaseFileSink {
    fn apply(&mut self, config: InterfaceConfig) {
        let record = LeaseRecord {
            config,
            applied_at: Utc::now(),
        };

        if let Err(error) = self.write(&record) {
            warn!(
                "Failed to write lease file {}: {}",
                self.path.display(),
                error
            );
        }

        info!(
            "Applied {}/{} gateway {:?} dns {:?}",
            config.address,
            config.prefix_len(),
            config.gateway,
            config.dns_server
        );
        self.current = Some(config);
    }

    fn revoke(&mut self) {
        if let Some(config) = self.current.take() {
            info!("Revoked {}", config.address);
        }

        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(error) => warn!(
                "Failed to remove lease file {}: {}",
                self.path.display(),
                error
            ),
        }
    }

    fn is_valid(&self) -> bool {
        self.current.is_some()
    }
}
