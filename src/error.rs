//! Error types for the DHCP lease client.
//!
//! All fallible operations in this crate return [`Result<T>`], which uses
//! the [`Error`] enum for error variants. The lease state machine absorbs
//! every one of these internally; they only surface from setup code
//! (configuration, socket creation) and from the codec entry points.

/// Errors that can occur during DHCP client operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File system or network I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (config or lease files).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Socket creation or configuration error.
    ///
    /// Typically occurs when binding to port 68 without administrator privileges,
    /// or when another DHCP client already owns the port.
    #[error("Socket error: {0}")]
    Socket(String),

    /// The transport was used while closed.
    #[error("Transport is not open")]
    TransportClosed,

    /// The datagram ended before the options terminator.
    ///
    /// Covers headers shorter than 240 bytes, an option whose length byte is
    /// missing, and an option whose value runs past the end of the buffer.
    #[error("DHCP message truncated at offset {offset} ({available} bytes available)")]
    Truncated { offset: usize, available: usize },

    /// The magic cookie does not identify a DHCP message.
    #[error("Invalid magic cookie")]
    BadMagicCookie,

    /// The message is not a BOOTREPLY.
    #[error("Expected BOOTREPLY, got op {0}")]
    NotReply(u8),

    /// The encode destination cannot hold the largest possible message.
    #[error("Encode buffer too small: {available} bytes (need {needed})")]
    BufferTooSmall { needed: usize, available: usize },

    /// Invalid client configuration.
    ///
    /// Returned by [`ClientConfig::validate`](crate::ClientConfig::validate) when the
    /// configuration contains invalid values (e.g., a zero discover timeout).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A hardware address string could not be parsed.
    #[error("Invalid MAC address: {0}")]
    InvalidMac(String),
}

impl Error {
    /// Returns true for errors raised while decoding an inbound datagram.
    ///
    /// The state machine treats all of these as background noise.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Self::Truncated { .. } | Self::BadMagicCookie | Self::NotReply(_)
        )
    }
}

/// A specialized Result type for DHCP client operations.
pub type Result<T> = std::result::Result<T, Error>;
