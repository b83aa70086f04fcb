//! Drives a [`LeaseClient`] from a tokio task.
//!
//! Each step first delivers expired timers, then drains every queued datagram
//! and finally ticks the state machine, so events reach it in the order they
//! became observable.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::client::{Event, LeaseClient};
use crate::error::Result;
use crate::sink::ConfigSink;
use crate::timer::DeadlineTimers;
use crate::transport::Transport;

/// Large enough for any datagram on an Ethernet link.
const RECEIVE_BUFFER_SIZE: usize = 1500;

/// Scheduler for a [`LeaseClient`] backed by [`DeadlineTimers`].
pub struct Driver<X, S> {
    client: LeaseClient<X, DeadlineTimers, S>,
    tick_interval: Duration,
    receive_buffer: [u8; RECEIVE_BUFFER_SIZE],
}

impl<X: Transport, S: ConfigSink> Driver<X, S> {
    pub fn new(client: LeaseClient<X, DeadlineTimers, S>, tick_interval: Duration) -> Self {
        Self {
            client,
            tick_interval,
            receive_buffer: [0u8; RECEIVE_BUFFER_SIZE],
        }
    }

    pub fn client(&self) -> &LeaseClient<X, DeadlineTimers, S> {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut LeaseClient<X, DeadlineTimers, S> {
        &mut self.client
    }

    pub fn into_client(self) -> LeaseClient<X, DeadlineTimers, S> {
        self.client
    }

    /// Runs one scheduling round at `now` and returns whether a lease is bound.
    pub fn step(&mut self, now: Instant) -> bool {
        while let Some(kind) = self.client.timers_mut().poll_expired(now) {
            self.client.process(Event::TimerExpired(kind));
        }

        while let Some((size, source)) = self.client.receive(&mut self.receive_buffer) {
            self.client.process(Event::DatagramReceived {
                payload: &self.receive_buffer[..size],
                source,
            });
        }

        self.client.process(Event::Tick)
    }

    fn tick(&mut self, bound: &mut bool) {
        let now_bound = self.step(Instant::now());
        if now_bound == *bound {
            return;
        }

        match self.client.current_lease() {
            Some(lease) => info!(
                "Lease valid: {} via {}",
                lease.client_address, lease.server_address
            ),
            None => warn!("Lease lost"),
        }
        *bound = now_bound;
    }

    /// Runs the client until `shutdown` completes.
    ///
    /// The client is started on the first tick. If the transport cannot be
    /// opened, starting is retried on every following tick. On shutdown the
    /// applied configuration is revoked and the transport is closed.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut started = false;
        let mut bound = false;

        info!(
            "DHCP client running (tick every {}ms)",
            self.tick_interval.as_millis()
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    if !started {
                        match self.client.start() {
                            Ok(()) => started = true,
                            Err(error) => warn!("Failed to start DHCP client: {}", error),
                        }
                    }
                    if started {
                        self.tick(&mut bound);
                    }
                }
            }
        }

        self.client.shutdown();
        Ok(())
    }
}
