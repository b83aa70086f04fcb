//! DHCP options as used by this client (RFC 2132).
//!
//! DHCP uses options to convey configuration parameters between servers and clients.
//! Each option has a code (1 byte), length (1 byte), and variable-length data.
//!
//! The client only emits a handful of options and only extracts the ones needed
//! to configure an interface: subnet mask, router, DNS server, lease time,
//! message type, server identifier and requested address. Everything else is
//! walked over and ignored.
//!
//! # References
//!
//! - RFC 2132: DHCP Options and BOOTP Vendor Extensions

use std::fmt;
use std::ops::BitOr;

/// DHCP option codes as defined in RFC 2132.
///
/// Only codes this client produces or consumes are defined; everything else
/// is skipped by the option walker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OptionCode {
    /// Padding (no operation). Used for alignment.
    Pad = 0,
    /// Subnet mask (RFC 2132 §3.3).
    SubnetMask = 1,
    /// Router/gateway addresses (RFC 2132 §3.5).
    Router = 3,
    /// DNS server addresses (RFC 2132 §3.8).
    DnsServer = 6,
    /// Client hostname (RFC 2132 §3.14).
    Hostname = 12,
    /// Domain name for DNS resolution (RFC 2132 §3.17).
    DomainName = 15,
    /// Perform router discovery (RFC 2132 §5.5).
    RouterDiscovery = 31,
    /// Static route list (RFC 2132 §5.8).
    StaticRoute = 33,
    /// Requested IP address (RFC 2132 §9.1).
    RequestedIpAddress = 50,
    /// IP address lease time in seconds (RFC 2132 §9.2).
    LeaseTime = 51,
    /// DHCP message type (RFC 2132 §9.6).
    MessageType = 53,
    /// Server identifier (RFC 2132 §9.7).
    ServerIdentifier = 54,
    /// Parameter request list (RFC 2132 §9.8).
    ParameterRequestList = 55,
    /// Renewal time T1 (RFC 2132 §9.11).
    RenewalTime = 58,
    /// Rebinding time T2 (RFC 2132 §9.12).
    RebindingTime = 59,
    /// Client identifier (RFC 2132 §9.14).
    ClientIdentifier = 61,
    /// End of options marker.
    End = 255,
}

impl TryFrom<u8> for OptionCode {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Pad),
            1 => Ok(Self::SubnetMask),
            3 => Ok(Self::Router),
            6 => Ok(Self::DnsServer),
            12 => Ok(Self::Hostname),
            15 => Ok(Self::DomainName),
            31 => Ok(Self::RouterDiscovery),
            33 => Ok(Self::StaticRoute),
            50 => Ok(Self::RequestedIpAddress),
            51 => Ok(Self::LeaseTime),
            53 => Ok(Self::MessageType),
            54 => Ok(Self::ServerIdentifier),
            55 => Ok(Self::ParameterRequestList),
            58 => Ok(Self::RenewalTime),
            59 => Ok(Self::RebindingTime),
            61 => Ok(Self::ClientIdentifier),
            255 => Ok(Self::End),
            other => Err(other),
        }
    }
}

/// DHCP message types (Option 53) as defined in RFC 2132 §9.6.
///
/// The client sends `Discover` and `Request` and reacts to `Offer`, `Ack`
/// and `Nak`; the remaining types are recognized so they can be logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Client broadcast to locate servers.
    Discover = 1,
    /// Server response to DISCOVER with IP offer.
    Offer = 2,
    /// Client request for offered parameters.
    Request = 3,
    /// Client indicates address is already in use.
    Decline = 4,
    /// Server acknowledgement with configuration.
    Ack = 5,
    /// Server negative acknowledgement.
    Nak = 6,
    /// Client releases IP address.
    Release = 7,
    /// Client requests config without IP allocation.
    Inform = 8,
}

impl TryFrom<u8> for MessageType {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Discover),
            2 => Ok(Self::Offer),
            3 => Ok(Self::Request),
            4 => Ok(Self::Decline),
            5 => Ok(Self::Ack),
            6 => Ok(Self::Nak),
            7 => Ok(Self::Release),
            8 => Ok(Self::Inform),
            other => Err(other),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discover => write!(f, "DISCOVER"),
            Self::Offer => write!(f, "OFFER"),
            Self::Request => write!(f, "REQUEST"),
            Self::Decline => write!(f, "DECLINE"),
            Self::Ack => write!(f, "ACK"),
            Self::Nak => write!(f, "NAK"),
            Self::Release => write!(f, "RELEASE"),
            Self::Inform => write!(f, "INFORM"),
        }
    }
}

/// Parameters requested during initial acquisition.
pub const PARAMETER_REQUEST_LIST: [u8; 6] = [
    OptionCode::SubnetMask as u8,
    OptionCode::Router as u8,
    OptionCode::DnsServer as u8,
    OptionCode::DomainName as u8,
    OptionCode::RenewalTime as u8,
    OptionCode::RebindingTime as u8,
];

/// Parameters requested while renewing or rebinding a bound lease.
pub const RENEWAL_PARAMETER_REQUEST_LIST: [u8; 8] = [
    OptionCode::SubnetMask as u8,
    OptionCode::Router as u8,
    OptionCode::DnsServer as u8,
    OptionCode::DomainName as u8,
    OptionCode::RenewalTime as u8,
    OptionCode::RebindingTime as u8,
    OptionCode::RouterDiscovery as u8,
    OptionCode::StaticRoute as u8,
];

/// Selects which optional TLVs an outbound message carries.
///
/// The message type is always emitted and is not part of the set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OptionSet(u8);

impl OptionSet {
    pub const EMPTY: Self = Self(0);
    /// Option 61: hardware type + MAC.
    pub const CLIENT_IDENTIFIER: Self = Self(1 << 0);
    /// Option 55 with [`PARAMETER_REQUEST_LIST`].
    pub const PARAMETER_REQUEST_LIST: Self = Self(1 << 1);
    /// Option 55 with [`RENEWAL_PARAMETER_REQUEST_LIST`]. Takes precedence over
    /// [`PARAMETER_REQUEST_LIST`](Self::PARAMETER_REQUEST_LIST).
    pub const RENEWAL_PARAMETER_LIST: Self = Self(1 << 2);
    /// Option 50.
    pub const REQUESTED_ADDRESS: Self = Self(1 << 3);
    /// Option 12.
    pub const HOST_NAME: Self = Self(1 << 4);
    /// Option 54.
    pub const SERVER_IDENTIFIER: Self = Self(1 << 5);

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for OptionSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// Longest configured name prefix carried in option 12.
pub const MAX_HOST_NAME_PREFIX: usize = 32;

/// `_` followed by two hex digits for each of the last three MAC bytes.
const HOST_NAME_SUFFIX_LEN: usize = 7;

/// Longest host name this client will ever emit.
pub const MAX_HOST_NAME_LEN: usize = MAX_HOST_NAME_PREFIX + HOST_NAME_SUFFIX_LEN;

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Returns true for characters allowed in the configured host name prefix.
pub fn is_host_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-'
}

/// The host name sent in option 12.
///
/// Built once from the configured name and the client MAC, stored inline so
/// that encoding never allocates. Characters outside `[A-Za-z0-9-]` are
/// dropped from the configured name, which is then truncated to
/// [`MAX_HOST_NAME_PREFIX`] bytes.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct HostName {
    bytes: [u8; MAX_HOST_NAME_LEN],
    len: usize,
}

impl HostName {
    pub fn new(prefix: &str, mac: &[u8; 6]) -> Self {
        let mut bytes = [0u8; MAX_HOST_NAME_LEN];
        let mut len = 0;

        for c in prefix.chars().filter(|&c| is_host_name_char(c)) {
            if len == MAX_HOST_NAME_PREFIX {
                break;
            }
            bytes[len] = c as u8;
            len += 1;
        }

        bytes[len] = b'_';
        len += 1;
        for byte in &mac[3..] {
            bytes[len] = HEX_DIGITS[(byte >> 4) as usize];
            bytes[len + 1] = HEX_DIGITS[(byte & 0x0f) as usize];
            len += 2;
        }

        Self { bytes, len }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(self.as_bytes()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for HostName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostName({:?})", self.as_str())
    }
}

impl fmt::Display for HostName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
