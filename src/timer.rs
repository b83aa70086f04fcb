//! One-shot timers driving the lease state machine.
//!
//! The state machine only ever talks to the [`Timers`] trait. On a bare-metal
//! target that trait is backed by the RTOS timer service; on a hosted OS the
//! [`DeadlineTimers`] wheel is polled by the [`Driver`](crate::Driver).

use std::fmt;
use std::time::{Duration, Instant};

/// The three timers the client owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Bounds the wait for an OFFER.
    DiscoverTimeout,
    /// T1: renew with the leasing server.
    RenewTimer,
    /// T2: rebind with any server.
    RebindTimer,
}

impl TimerKind {
    pub const ALL: [TimerKind; 3] = [
        TimerKind::DiscoverTimeout,
        TimerKind::RenewTimer,
        TimerKind::RebindTimer,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            Self::DiscoverTimeout => 0,
            Self::RenewTimer => 1,
            Self::RebindTimer => 2,
        }
    }
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DiscoverTimeout => write!(f, "discover-timeout"),
            Self::RenewTimer => write!(f, "renew"),
            Self::RebindTimer => write!(f, "rebind"),
        }
    }
}

/// A one-shot timer service.
///
/// A timer is armed from [`arm`](Self::arm) until it fires or is disarmed.
/// Arming an armed timer restarts it. Expiry is reported to the state
/// machine as [`Event::TimerExpired`](crate::Event::TimerExpired) by whoever
/// drives it.
pub trait Timers {
    fn arm(&mut self, kind: TimerKind, seconds: u32);
    fn disarm(&mut self, kind: TimerKind);
    fn is_armed(&self, kind: TimerKind) -> bool;
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    deadline: Instant,
    seconds: u32,
}

/// Deadline-based timers polled against a monotonic clock.
#[derive(Debug, Default)]
pub struct DeadlineTimers {
    slots: [Option<Slot>; 3],
}

impl DeadlineTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms `kind` to fire `seconds` after `now`.
    pub fn arm_at(&mut self, kind: TimerKind, seconds: u32, now: Instant) {
        self.slots[kind.index()] = Some(Slot {
            deadline: now + Duration::from_secs(u64::from(seconds)),
            seconds,
        });
    }

    /// Returns the duration `kind` was last armed with, if still armed.
    pub fn armed_seconds(&self, kind: TimerKind) -> Option<u32> {
        self.slots[kind.index()].map(|slot| slot.seconds)
    }

    pub fn deadline(&self, kind: TimerKind) -> Option<Instant> {
        self.slots[kind.index()].map(|slot| slot.deadline)
    }

    /// Returns the earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.slots.iter().flatten().map(|slot| slot.deadline).min()
    }

    /// Fires the earliest timer whose deadline is at or before `now`.
    ///
    /// A fired timer is disarmed, so each arming is reported once. Call in a
    /// loop to drain every expired timer in deadline order.
    pub fn poll_expired(&mut self, now: Instant) -> Option<TimerKind> {
        let kind = TimerKind::ALL
            .into_iter()
            .filter_map(|kind| self.deadline(kind).map(|deadline| (kind, deadline)))
            .filter(|(_, deadline)| *deadline <= now)
            .min_by_key(|(_, deadline)| *deadline)
            .map(|(kind, _)| kind)?;

        self.slots[kind.index()] = None;
        Some(kind)
    }
}

impl Timers for DeadlineTimers {
    fn arm(&mut self, kind: TimerKind, seconds: u32) {
        self.arm_at(kind, seconds, Instant::now());
    }

    fn disarm(&mut self, kind: TimerKind) {
        self.slots[kind.index()] = None;
    }

    fn is_armed(&self, kind: TimerKind) -> bool {
        self.slots[kind.index()].is_some()
    }
}
