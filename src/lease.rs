//! Lease data: protocol state, offers, and committed leases.
//!
//! A [`LeaseOffer`] is what the codec extracts from a server reply. Once the
//! server acknowledges it, the state machine wraps it in a [`BoundLease`]
//! stamped with the bind instant. Expiry follows the monotonic clock, like
//! the timers do; the wall-clock stamp is only reported.
//!
//! Renewal (T1) and rebind (T2) points are derived from the lease duration
//! with shifts only, so constrained targets never need floating point.

use std::fmt;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::options::MessageType;

/// Protocol state of the lease client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeaseState {
    /// No lease and no exchange in progress.
    #[default]
    Initial,
    /// DISCOVER sent, waiting for OFFER.
    AwaitingOffer,
    /// REQUEST sent for an offer, waiting for ACK.
    OfferAccepted,
    /// Lease committed to the interface.
    Bound,
}

impl fmt::Display for LeaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initial => write!(f, "INITIAL"),
            Self::AwaitingOffer => write!(f, "AWAITING_OFFER"),
            Self::OfferAccepted => write!(f, "OFFER_ACCEPTED"),
            Self::Bound => write!(f, "BOUND"),
        }
    }
}

/// Fields of interest extracted from a server reply.
///
/// Absent options are `None` (or zero for the lease time). `client_address`
/// comes from `yiaddr`, falling back to option 50; `server_address` comes from
/// option 54, falling back to `siaddr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseOffer {
    pub transaction_id: u32,
    pub message_type: Option<MessageType>,
    pub client_address: Ipv4Addr,
    pub server_address: Ipv4Addr,
    pub subnet_mask: Option<Ipv4Addr>,
    pub gateway: Option<Ipv4Addr>,
    pub dns_server: Option<Ipv4Addr>,
    pub lease_seconds: u32,
}

impl Default for LeaseOffer {
    fn default() -> Self {
        Self {
            transaction_id: 0,
            message_type: None,
            client_address: Ipv4Addr::UNSPECIFIED,
            server_address: Ipv4Addr::UNSPECIFIED,
            subnet_mask: None,
            gateway: None,
            dns_server: None,
            lease_seconds: 0,
        }
    }
}

impl LeaseOffer {
    /// Fills fields an ACK left out with the values from the earlier offer.
    ///
    /// Servers are allowed to send a minimal ACK; the configuration that was
    /// offered still applies to whatever the ACK does not override.
    pub fn or_offer(self, offer: &LeaseOffer) -> LeaseOffer {
        LeaseOffer {
            client_address: if self.client_address.is_unspecified() {
                offer.client_address
            } else {
                self.client_address
            },
            server_address: if self.server_address.is_unspecified() {
                offer.server_address
            } else {
                self.server_address
            },
            subnet_mask: self.subnet_mask.or(offer.subnet_mask),
            gateway: self.gateway.or(offer.gateway),
            dns_server: self.dns_server.or(offer.dns_server),
            lease_seconds: if self.lease_seconds == 0 {
                offer.lease_seconds
            } else {
                self.lease_seconds
            },
            ..self
        }
    }
}

/// Seconds after binding at which the lease is renewed with its server (T1).
pub fn renewal_delay(lease_seconds: u32) -> u32 {
    lease_seconds >> 1
}

/// Seconds after binding at which the lease is rebound by broadcast (T2).
///
/// `1/2 + 1/4 + 1/8` of the lease, i.e. 87.5% rounded down per term.
pub fn rebind_delay(lease_seconds: u32) -> u32 {
    (lease_seconds >> 1) + (lease_seconds >> 2) + (lease_seconds >> 3)
}

/// A lease the server acknowledged and the interface is using.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundLease {
    pub offer: LeaseOffer,
    /// Monotonic bind time. Expiry is measured from here.
    pub obtained_at: Instant,
    /// Wall-clock bind time, for display.
    pub bound_at: DateTime<Utc>,
}

impl BoundLease {
    /// Stamps an acknowledged offer with the current time.
    pub fn new(offer: LeaseOffer) -> Self {
        Self {
            offer,
            obtained_at: Instant::now(),
            bound_at: Utc::now(),
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.offer.lease_seconds))
    }

    /// Returns true if the lease has run out by `now`.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.obtained_at) > self.duration()
    }

    /// Returns true if the lease has expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Returns seconds remaining until expiration, or 0 if expired.
    pub fn remaining_seconds(&self) -> u64 {
        self.duration()
            .saturating_sub(self.obtained_at.elapsed())
            .as_secs()
    }

    pub fn renewal_delay(&self) -> u32 {
        renewal_delay(self.offer.lease_seconds)
    }

    pub fn rebind_delay(&self) -> u32 {
        rebind_delay(self.offer.lease_seconds)
    }
}
