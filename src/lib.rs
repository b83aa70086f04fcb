//! # dhcplease-client
//!
//! A DHCP client library implementing the client side of RFC 2131 for a
//! single network interface.
//!
//! ## Features
//!
//! - DISCOVER / OFFER / REQUEST / ACK acquisition with timeout and retry
//! - Renewal with the leasing server at T1 and broadcast rebind at T2
//! - NAK and lease expiry handling
//! - Allocation-free wire codec with a fixed transmit buffer
//! - Pluggable transport, timers and configuration sink
//! - Async driver on Tokio
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use dhcplease_client::{
//!     ClientConfig, DeadlineTimers, Driver, LeaseClient, LeaseFileSink, UdpTransport,
//! };
//!
//! #[tokio::main]
//! async fn main() -> dhcplease_client::Result<()> {
//!     let config = ClientConfig::load_or_create("client.json")?;
//!     let client = LeaseClient::from_config(
//!         &config,
//!         UdpTransport::new(config.client_port, config.interface_index),
//!         DeadlineTimers::new(),
//!         LeaseFileSink::new(&config.lease_file),
//!     )?;
//!
//!     let mut driver = Driver::new(client, Duration::from_millis(config.tick_interval_millis));
//!     driver.run(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`LeaseClient`] - The protocol state machine, fed one [`Event`] at a time
//! - [`Driver`] - Tokio loop delivering timers, datagrams and ticks
//! - [`LeaseMessage`] / [`decode`] - DHCP message encoding and reply parsing
//! - [`Transport`], [`Timers`], [`ConfigSink`] - Collaborators the client owns
//! - [`ClientConfig`] - Client configuration (MAC, host name, timeouts)

pub mod client;
pub mod config;
pub mod error;
pub mod lease;
pub mod options;
pub mod packet;
pub mod runner;
pub mod sink;
pub mod timer;
pub mod transport;

#[cfg(test)]
mod testing;

pub use client::{Event, LeaseClient, Renewal};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use lease::{BoundLease, LeaseOffer, LeaseState};
pub use options::{HostName, MessageType, OptionCode, OptionSet};
pub use packet::{LeaseMessage, MAX_MESSAGE_SIZE, OptionWalker, decode};
pub use runner::Driver;
pub use sink::{ConfigSink, InterfaceConfig, LeaseFileSink, LeaseRecord, MemorySink};
pub use timer::{DeadlineTimers, TimerKind, Timers};
pub use transport::{Transport, UdpTransport};
