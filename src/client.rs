//! The lease state machine.
//!
//! [`LeaseClient`] never blocks and never spawns anything. Whoever drives it
//! feeds it [`Event`]s one at a time, in the order they happened, and it
//! reacts by sending at most one message, arming or disarming timers and
//! handing configuration to its [`ConfigSink`].

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::Result;
use crate::lease::{BoundLease, LeaseOffer, LeaseState};
use crate::options::{HostName, MessageType, OptionSet};
use crate::packet::{self, LeaseMessage, MAX_MESSAGE_SIZE};
use crate::sink::{ConfigSink, InterfaceConfig};
use crate::timer::{TimerKind, Timers};
use crate::transport::{DHCP_SERVER_PORT, Transport};

const DISCOVER_OPTIONS: OptionSet = OptionSet::CLIENT_IDENTIFIER
    .union(OptionSet::HOST_NAME)
    .union(OptionSet::PARAMETER_REQUEST_LIST);

const REQUEST_OPTIONS: OptionSet = DISCOVER_OPTIONS
    .union(OptionSet::REQUESTED_ADDRESS)
    .union(OptionSet::SERVER_IDENTIFIER);

const REBIND_OPTIONS: OptionSet = OptionSet::CLIENT_IDENTIFIER
    .union(OptionSet::HOST_NAME)
    .union(OptionSet::RENEWAL_PARAMETER_LIST);

const RENEW_OPTIONS: OptionSet = REBIND_OPTIONS.union(OptionSet::SERVER_IDENTIFIER);

/// Default wait for an OFFER before starting over.
pub const DEFAULT_DISCOVER_TIMEOUT: u32 = 10;

/// Input to [`LeaseClient::process`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event<'a> {
    /// Periodic scheduler tick.
    Tick,
    /// A datagram arrived on the transport.
    DatagramReceived {
        payload: &'a [u8],
        source: SocketAddrV4,
    },
    /// One of the client's timers fired.
    TimerExpired(TimerKind),
}

/// How a bound client is trying to extend its lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Renewal {
    /// Unicast to the server that granted the lease.
    Renewing,
    /// Broadcast to any server.
    Rebinding,
}

/// DHCP client state machine over a transport, a timer service and a
/// configuration sink.
///
/// # Example
///
/// ```no_run
/// use dhcplease_client::{DeadlineTimers, Event, LeaseClient, MemorySink, UdpTransport};
///
/// let mut client = LeaseClient::new(
///     [0x02, 0, 0, 0, 0, 0x01],
///     "node",
///     UdpTransport::default(),
///     DeadlineTimers::new(),
///     MemorySink::new(),
/// );
/// client.start()?;
/// client.process(Event::Tick);
/// # Ok::<(), dhcplease_client::Error>(())
/// ```
#[derive(Debug)]
pub struct LeaseClient<X, T, S> {
    state: LeaseState,
    transaction_id: u32,
    mac: [u8; 6],
    host_name: HostName,
    discover_timeout: u32,
    transport: X,
    timers: T,
    sink: S,
    armed: [bool; 3],
    offer: Option<LeaseOffer>,
    request_sent_at: Option<Instant>,
    lease: Option<BoundLease>,
    renewal: Option<Renewal>,
    buffer: [u8; MAX_MESSAGE_SIZE],
}

impl<X: Transport, T: Timers, S: ConfigSink> LeaseClient<X, T, S> {
    pub fn new(mac: [u8; 6], hostname: &str, transport: X, timers: T, sink: S) -> Self {
        Self {
            state: LeaseState::Initial,
            transaction_id: 0,
            mac,
            host_name: HostName::new(hostname, &mac),
            discover_timeout: DEFAULT_DISCOVER_TIMEOUT,
            transport,
            timers,
            sink,
            armed: [false; 3],
            offer: None,
            request_sent_at: None,
            lease: None,
            renewal: None,
            buffer: [0u8; MAX_MESSAGE_SIZE],
        }
    }

    /// Builds a client from a validated configuration file.
    pub fn from_config(config: &ClientConfig, transport: X, timers: T, sink: S) -> Result<Self> {
        let mac = config.mac()?;
        Ok(Self::new(mac, &config.hostname, transport, timers, sink)
            .with_discover_timeout(config.discover_timeout_seconds))
    }

    /// Sets how many seconds to wait for an OFFER, and for the ACK after it.
    pub fn with_discover_timeout(mut self, seconds: u32) -> Self {
        self.discover_timeout = seconds;
        self
    }

    /// Restarts the client from scratch.
    ///
    /// Whatever the current state, all timers are disarmed, the applied
    /// configuration is revoked and the transport is reopened. Discovery
    /// begins on the next [`Event::Tick`].
    ///
    /// # Errors
    ///
    /// Returns the transport error if the socket cannot be opened. The client
    /// is left in [`LeaseState::Initial`] with the transport closed.
    pub fn start(&mut self) -> Result<()> {
        self.reset();
        self.transaction_id = rand::random();
        self.transport.open()?;
        info!(
            "DHCP client {} started (xid 0x{:08x})",
            self.host_name, self.transaction_id
        );
        Ok(())
    }

    /// Stops the client without reopening the transport.
    pub fn shutdown(&mut self) {
        let had_lease = self.lease.is_some();
        self.reset();
        if had_lease {
            info!("DHCP client stopped, lease released");
        } else {
            info!("DHCP client stopped");
        }
    }

    /// Handles one event. Returns true while a lease is bound.
    pub fn process(&mut self, event: Event<'_>) -> bool {
        match event {
            Event::Tick => self.on_tick(),
            Event::DatagramReceived { payload, source } => self.on_datagram(payload, source),
            Event::TimerExpired(kind) => self.on_timer(kind),
        }
        self.state == LeaseState::Bound
    }

    /// Pulls one pending datagram from the transport.
    pub fn receive(&mut self, buffer: &mut [u8]) -> Option<(usize, SocketAddrV4)> {
        self.transport.try_receive(buffer)
    }

    pub fn state(&self) -> LeaseState {
        self.state
    }

    pub fn transaction_id(&self) -> u32 {
        self.transaction_id
    }

    pub fn host_name(&self) -> &HostName {
        &self.host_name
    }

    pub fn mac(&self) -> [u8; 6] {
        self.mac
    }

    /// Returns the acknowledged configuration, only while bound.
    pub fn current_lease(&self) -> Option<LeaseOffer> {
        match self.state {
            LeaseState::Bound => self.lease.map(|lease| lease.offer),
            _ => None,
        }
    }

    pub fn bound_lease(&self) -> Option<&BoundLease> {
        self.lease.as_ref()
    }

    /// Returns the renewal in progress, if any.
    pub fn renewal(&self) -> Option<Renewal> {
        self.renewal
    }

    pub fn transport(&self) -> &X {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut X {
        &mut self.transport
    }

    pub fn timers(&self) -> &T {
        &self.timers
    }

    pub fn timers_mut(&mut self) -> &mut T {
        &mut self.timers
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn on_tick(&mut self) {
        match self.state {
            LeaseState::Initial => self.discover(),
            LeaseState::OfferAccepted => {
                let timeout = Duration::from_secs(u64::from(self.discover_timeout));
                if self
                    .request_sent_at
                    .is_some_and(|sent_at| sent_at.elapsed() >= timeout)
                {
                    info!(
                        "No ACK within {}s (xid 0x{:08x}), restarting discovery",
                        self.discover_timeout, self.transaction_id
                    );
                    self.abandon_attempt();
                }
            }
            LeaseState::Bound => {
                if let Some(lease) = self.lease
                    && lease.is_expired()
                {
                    warn!(
                        "Lease on {} expired ({} seconds, bound at {})",
                        lease.offer.client_address,
                        lease.offer.lease_seconds,
                        lease.bound_at
                    );
                    self.reset();
                }
            }
            LeaseState::AwaitingOffer => {}
        }
    }

    fn on_datagram(&mut self, payload: &[u8], source: SocketAddrV4) {
        let reply = match packet::decode(payload) {
            Ok(reply) => reply,
            Err(error) if error.is_parse_error() => {
                debug!("Discarding datagram from {}: {}", source, error);
                return;
            }
            Err(error) => {
                warn!("Failed to decode datagram from {}: {}", source, error);
                return;
            }
        };

        if reply.transaction_id != self.transaction_id {
            debug!(
                "Discarding reply from {} for xid 0x{:08x} (ours is 0x{:08x})",
                source, reply.transaction_id, self.transaction_id
            );
            return;
        }

        let Some(message_type) = reply.message_type else {
            debug!("Discarding reply from {} without message type", source);
            return;
        };

        info!("{} from {} ({})", message_type, reply.server_address, source);

        match (self.state, message_type) {
            (LeaseState::AwaitingOffer, MessageType::Offer) => self.accept_offer(reply),
            (LeaseState::OfferAccepted, MessageType::Ack) => {
                let offer = self.offer.unwrap_or_default();
                self.bind(reply.or_offer(&offer));
            }
            (LeaseState::Bound, MessageType::Ack) if self.renewal.is_some() => {
                if let Some(lease) = self.lease {
                    self.bind(reply.or_offer(&lease.offer));
                }
            }
            (LeaseState::OfferAccepted | LeaseState::Bound, MessageType::Nak) => {
                warn!(
                    "NAK from {} in state {}, dropping configuration",
                    reply.server_address, self.state
                );
                self.reset();
            }
            (state, message_type) => {
                debug!("Ignoring {} in state {}", message_type, state);
            }
        }
    }

    fn on_timer(&mut self, kind: TimerKind) {
        if !self.armed[kind.index()] {
            debug!("Ignoring stale {} timer", kind);
            return;
        }
        self.disarm(kind);

        match (self.state, kind) {
            (LeaseState::AwaitingOffer, TimerKind::DiscoverTimeout) => {
                info!(
                    "No OFFER within {}s (xid 0x{:08x}), restarting discovery",
                    self.discover_timeout, self.transaction_id
                );
                self.abandon_attempt();
            }
            (LeaseState::Bound, TimerKind::RenewTimer) => self.renew(Renewal::Renewing),
            (LeaseState::Bound, TimerKind::RebindTimer) => self.renew(Renewal::Rebinding),
            (state, kind) => debug!("Ignoring {} timer in state {}", kind, state),
        }
    }

    fn discover(&mut self) {
        if let Err(error) = self.transport.open() {
            warn!("Cannot open transport for DISCOVER: {}", error);
            return;
        }

        self.transaction_id = rand::random();
        self.offer = None;

        let mut message = self.message();
        message.set_broadcast(true);
        self.send(&message, DISCOVER_OPTIONS, MessageType::Discover, Ipv4Addr::BROADCAST);

        self.arm(TimerKind::DiscoverTimeout, self.discover_timeout);
        self.state = LeaseState::AwaitingOffer;
    }

    fn accept_offer(&mut self, offer: LeaseOffer) {
        if !self.timers.is_armed(TimerKind::DiscoverTimeout) {
            debug!("Ignoring OFFER after the discover timeout");
            return;
        }
        if offer.client_address.is_unspecified() {
            debug!("Ignoring OFFER without an address");
            return;
        }

        self.disarm(TimerKind::DiscoverTimeout);
        info!(
            "Accepting {} from {} (lease: {} seconds)",
            offer.client_address, offer.server_address, offer.lease_seconds
        );

        let mut message = self.message();
        message.set_broadcast(true);
        message.requested_address = offer.client_address;
        message.server_identifier = offer.server_address;
        let options = if offer.server_address.is_unspecified() {
            DISCOVER_OPTIONS.union(OptionSet::REQUESTED_ADDRESS)
        } else {
            REQUEST_OPTIONS
        };
        self.send(&message, options, MessageType::Request, Ipv4Addr::BROADCAST);

        self.offer = Some(offer);
        self.request_sent_at = Some(Instant::now());
        self.state = LeaseState::OfferAccepted;
    }

    fn bind(&mut self, offer: LeaseOffer) {
        self.disarm(TimerKind::DiscoverTimeout);
        self.sink.apply(InterfaceConfig::from_offer(&offer));
        self.transport.close();

        let lease = BoundLease::new(offer);
        self.arm(TimerKind::RenewTimer, lease.renewal_delay());
        self.arm(TimerKind::RebindTimer, lease.rebind_delay());

        info!(
            "Bound to {} from {} (lease: {} seconds, renew in {}s, rebind in {}s)",
            offer.client_address,
            offer.server_address,
            offer.lease_seconds,
            lease.renewal_delay(),
            lease.rebind_delay()
        );

        self.lease = Some(lease);
        self.offer = None;
        self.request_sent_at = None;
        self.renewal = None;
        self.state = LeaseState::Bound;
    }

    fn renew(&mut self, renewal: Renewal) {
        let Some(lease) = self.lease else {
            return;
        };

        if let Err(error) = self.transport.open() {
            warn!("Cannot open transport for {:?}: {}", renewal, error);
            return;
        }

        self.transaction_id = rand::random();

        let mut message = self.message();
        message.ciaddr = lease.offer.client_address;

        let server = lease.offer.server_address;
        let (options, destination) = match renewal {
            Renewal::Renewing if !server.is_unspecified() => {
                message.server_identifier = server;
                (RENEW_OPTIONS, server)
            }
            _ => (REBIND_OPTIONS, Ipv4Addr::BROADCAST),
        };

        info!(
            "{:?} lease on {} ({} seconds left)",
            renewal,
            lease.offer.client_address,
            lease.remaining_seconds()
        );
        self.send(&message, options, MessageType::Request, destination);
        self.renewal = Some(renewal);
    }

    fn abandon_attempt(&mut self) {
        self.disarm(TimerKind::DiscoverTimeout);
        self.transport.close();
        self.offer = None;
        self.request_sent_at = None;
        self.state = LeaseState::Initial;
    }

    fn reset(&mut self) {
        for kind in TimerKind::ALL {
            self.disarm(kind);
        }
        self.sink.revoke();
        self.transport.close();
        self.offer = None;
        self.request_sent_at = None;
        self.lease = None;
        self.renewal = None;
        self.state = LeaseState::Initial;
    }

    fn message(&self) -> LeaseMessage {
        LeaseMessage::request(self.transaction_id, self.mac, self.host_name)
    }

    fn send(
        &mut self,
        message: &LeaseMessage,
        options: OptionSet,
        message_type: MessageType,
        destination: Ipv4Addr,
    ) {
        let len = match message.encode(options, message_type, &mut self.buffer) {
            Ok(len) => len,
            Err(error) => {
                warn!("Failed to encode {}: {}", message_type, error);
                return;
            }
        };

        match self
            .transport
            .send_to(&self.buffer[..len], destination, DHCP_SERVER_PORT)
        {
            Ok(_) => debug!(
                "{} to {} (xid 0x{:08x}, {} bytes)",
                message_type, destination, message.xid, len
            ),
            Err(error) => warn!("Failed to send {} to {}: {}", message_type, destination, error),
        }
    }

    fn arm(&mut self, kind: TimerKind, seconds: u32) {
        self.timers.arm(kind, seconds);
        self.armed[kind.index()] = true;
    }

    fn disarm(&mut self, kind: TimerKind) {
        if self.armed[kind.index()] || self.timers.is_armed(kind) {
            self.timers.disarm(kind);
        }
        self.armed[kind.index()] = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{OptionCode, PARAMETER_REQUEST_LIST, RENEWAL_PARAMETER_REQUEST_LIST};
    use crate::packet::{BROADCAST_FLAG, DHCP_MAGIC_COOKIE};
    use crate::sink::MemorySink;
    use crate::testing::{ASSIGNED, MAC, MockTransport, SERVER, server_reply};
    use crate::timer::DeadlineTimers;

    type TestClient = LeaseClient<MockTransport, DeadlineTimers, MemorySink>;

    fn new_client() -> TestClient {
        LeaseClient::new(
            MAC,
            "node",
            MockTransport::default(),
            DeadlineTimers::new(),
            MemorySink::new(),
        )
    }

    fn deliver(client: &mut TestClient, payload: &[u8]) -> bool {
        client.process(Event::DatagramReceived {
            payload,
            source: SocketAddrV4::new(SERVER, DHCP_SERVER_PORT),
        })
    }

    fn bound_client(lease_seconds: u32) -> TestClient {
        let mut client = new_client();
        client.start().unwrap();
        client.process(Event::Tick);

        let xid = client.transaction_id();
        deliver(&mut client, &server_reply(MessageType::Offer, xid, lease_seconds));
        assert!(deliver(&mut client, &server_reply(MessageType::Ack, xid, lease_seconds)));
        client
    }

    fn flags(data: &[u8]) -> u16 {
        u16::from_be_bytes([data[10], data[11]])
    }

    #[test]
    fn test_start_opens_transport() {
        let mut client = new_client();
        assert_eq!(client.state(), LeaseState::Initial);

        client.start().unwrap();
        assert_eq!(client.state(), LeaseState::Initial);
        assert!(client.transport().is_open());
        assert!(client.transport().sent.is_empty());
        assert!(client.current_lease().is_none());
    }

    #[test]
    fn test_start_reports_open_failure() {
        let mut client = new_client();
        client.transport.fail_open = true;

        assert!(client.start().is_err());
        assert_eq!(client.state(), LeaseState::Initial);
        assert!(!client.transport().is_open());
    }

    #[test]
    fn test_tick_sends_discover() {
        let mut client = new_client().with_discover_timeout(7);
        client.start().unwrap();

        assert!(!client.process(Event::Tick));
        assert_eq!(client.state(), LeaseState::AwaitingOffer);
        assert_eq!(client.timers().armed_seconds(TimerKind::DiscoverTimeout), Some(7));

        let sent = client.transport().last_sent();
        assert_eq!(sent.address, Ipv4Addr::BROADCAST);
        assert_eq!(sent.port, DHCP_SERVER_PORT);
        assert_eq!(sent.xid(), client.transaction_id());
        assert_eq!(sent.message_type(), Some(MessageType::Discover as u8));
        assert_eq!(flags(&sent.data), BROADCAST_FLAG);
        assert_eq!(&sent.data[236..240], &DHCP_MAGIC_COOKIE);
        assert_eq!(&sent.data[28..34], &MAC);

        let mut client_id = vec![1u8];
        client_id.extend_from_slice(&MAC);
        assert_eq!(sent.option(OptionCode::ClientIdentifier), Some(&client_id[..]));
        assert_eq!(sent.option(OptionCode::Hostname), Some(&b"node_DDEEFF"[..]));
        assert_eq!(
            sent.option(OptionCode::ParameterRequestList),
            Some(&PARAMETER_REQUEST_LIST[..])
        );
        assert!(sent.option(OptionCode::RequestedIpAddress).is_none());
        assert!(sent.option(OptionCode::ServerIdentifier).is_none());
    }

    #[test]
    fn test_tick_opens_closed_transport() {
        let mut client = new_client();
        client.process(Event::Tick);
        assert!(client.transport().is_open());
        assert_eq!(client.state(), LeaseState::AwaitingOffer);
    }

    #[test]
    fn test_tick_waits_when_transport_unavailable() {
        let mut client = new_client();
        client.transport.fail_open = true;

        client.process(Event::Tick);
        assert_eq!(client.state(), LeaseState::Initial);
        assert!(client.transport().sent.is_empty());
        assert!(!client.timers().is_armed(TimerKind::DiscoverTimeout));
    }

    #[test]
    fn test_full_acquisition() {
        let mut client = new_client();
        client.start().unwrap();
        client.process(Event::Tick);
        let xid = client.transaction_id();

        assert!(!deliver(&mut client, &server_reply(MessageType::Offer, xid, 3600)));
        assert_eq!(client.state(), LeaseState::OfferAccepted);
        assert!(!client.timers().is_armed(TimerKind::DiscoverTimeout));

        let request = client.transport().last_sent();
        assert_eq!(request.message_type(), Some(MessageType::Request as u8));
        assert_eq!(request.address, Ipv4Addr::BROADCAST);
        assert_eq!(request.xid(), xid);
        assert_eq!(
            request.option(OptionCode::RequestedIpAddress),
            Some(&ASSIGNED.octets()[..])
        );
        assert_eq!(
            request.option(OptionCode::ServerIdentifier),
            Some(&SERVER.octets()[..])
        );

        assert!(deliver(&mut client, &server_reply(MessageType::Ack, xid, 3600)));
        assert_eq!(client.state(), LeaseState::Bound);
        assert!(!client.transport().is_open());

        let lease = client.current_lease().unwrap();
        assert_eq!(lease.client_address, ASSIGNED);
        assert_eq!(lease.server_address, SERVER);
        assert_eq!(lease.gateway, Some(SERVER));
        assert_eq!(lease.subnet_mask, Some(Ipv4Addr::new(255, 255, 255, 0)));
        assert_eq!(lease.dns_server, Some(Ipv4Addr::new(10, 0, 0, 53)));
        assert_eq!(lease.lease_seconds, 3600);

        assert_eq!(client.timers().armed_seconds(TimerKind::RenewTimer), Some(1800));
        assert_eq!(client.timers().armed_seconds(TimerKind::RebindTimer), Some(3150));
        assert!(!client.timers().is_armed(TimerKind::DiscoverTimeout));

        let applied = client.sink().current().unwrap();
        assert_eq!(applied.address, ASSIGNED);
        assert_eq!(applied.prefix_len(), 24);
    }

    #[test]
    fn test_foreign_reply_ignored() {
        let mut client = new_client();
        client.start().unwrap();
        client.process(Event::Tick);
        let xid = client.transaction_id();
        let sent = client.transport().sent.len();

        deliver(
            &mut client,
            &server_reply(MessageType::Offer, xid.wrapping_add(1), 3600),
        );
        assert_eq!(client.state(), LeaseState::AwaitingOffer);
        assert!(client.timers().is_armed(TimerKind::DiscoverTimeout));
        assert_eq!(client.transport().sent.len(), sent);
    }

    #[test]
    fn test_malformed_datagrams_ignored() {
        let mut client = new_client();
        client.start().unwrap();
        client.process(Event::Tick);
        let xid = client.transaction_id();

        let mut bad_cookie = server_reply(MessageType::Offer, xid, 3600);
        bad_cookie[236] = 0;
        deliver(&mut client, &bad_cookie);

        let reply = server_reply(MessageType::Offer, xid, 3600);
        deliver(&mut client, &reply[..100]);

        let mut request = reply.clone();
        request[0] = 1;
        deliver(&mut client, &request);

        deliver(&mut client, &[]);

        assert_eq!(client.state(), LeaseState::AwaitingOffer);
        assert!(client.timers().is_armed(TimerKind::DiscoverTimeout));
        assert_eq!(client.transport().sent.len(), 1);
    }

    #[test]
    fn test_unexpected_message_type_ignored() {
        let mut client = new_client();
        client.start().unwrap();
        client.process(Event::Tick);
        let xid = client.transaction_id();

        deliver(&mut client, &server_reply(MessageType::Ack, xid, 3600));
        deliver(&mut client, &server_reply(MessageType::Nak, xid, 0));
        assert_eq!(client.state(), LeaseState::AwaitingOffer);
        assert!(client.sink().current().is_none());
    }

    #[test]
    fn test_discover_timeout_restarts() {
        let mut client = new_client();
        client.start().unwrap();
        client.process(Event::Tick);
        client.transport.deliver(server_reply(
            MessageType::Offer,
            client.transaction_id(),
            3600,
        ));

        client.timers.disarm(TimerKind::DiscoverTimeout);
        client.process(Event::TimerExpired(TimerKind::DiscoverTimeout));
        assert_eq!(client.state(), LeaseState::Initial);
        assert!(!client.transport().is_open());
        assert!(client.transport().inbox.is_empty());

        client.process(Event::Tick);
        assert_eq!(client.state(), LeaseState::AwaitingOffer);
        assert_eq!(client.transport().sent.len(), 2);
        assert_eq!(client.transport().last_sent().xid(), client.transaction_id());
    }

    #[test]
    fn test_offer_after_timeout_ignored() {
        let mut client = new_client();
        client.start().unwrap();
        client.process(Event::Tick);
        client.timers.disarm(TimerKind::DiscoverTimeout);

        let xid = client.transaction_id();
        deliver(&mut client, &server_reply(MessageType::Offer, xid, 3600));
        assert_eq!(client.state(), LeaseState::AwaitingOffer);
        assert_eq!(client.transport().sent.len(), 1);
    }

    #[test]
    fn test_stale_discover_timeout_after_offer() {
        let mut client = new_client();
        client.start().unwrap();
        client.process(Event::Tick);
        let xid = client.transaction_id();
        deliver(&mut client, &server_reply(MessageType::Offer, xid, 3600));

        client.process(Event::TimerExpired(TimerKind::DiscoverTimeout));
        assert_eq!(client.state(), LeaseState::OfferAccepted);
        assert!(client.transport().is_open());

        assert!(deliver(&mut client, &server_reply(MessageType::Ack, xid, 3600)));
    }

    #[test]
    fn test_missing_ack_restarts_on_tick() {
        let mut client = new_client().with_discover_timeout(0);
        client.start().unwrap();
        client.process(Event::Tick);
        let xid = client.transaction_id();
        deliver(&mut client, &server_reply(MessageType::Offer, xid, 3600));
        assert_eq!(client.state(), LeaseState::OfferAccepted);

        client.process(Event::Tick);
        assert_eq!(client.state(), LeaseState::Initial);
        assert!(!client.transport().is_open());
    }

    #[test]
    fn test_ack_fills_gaps_from_offer() {
        let mut client = new_client();
        client.start().unwrap();
        client.process(Event::Tick);
        let xid = client.transaction_id();
        deliver(&mut client, &server_reply(MessageType::Offer, xid, 3600));

        let mut ack = server_reply(MessageType::Ack, xid, 0);
        ack[16..20].copy_from_slice(&[0, 0, 0, 0]);
        assert!(deliver(&mut client, &ack));

        let lease = client.current_lease().unwrap();
        assert_eq!(lease.client_address, ASSIGNED);
        assert_eq!(lease.lease_seconds, 3600);
    }

    #[test]
    fn test_nak_while_bound() {
        let mut client = bound_client(3600);
        let xid = client.transaction_id();

        assert!(!deliver(&mut client, &server_reply(MessageType::Nak, xid, 0)));
        assert_eq!(client.state(), LeaseState::Initial);
        assert!(client.current_lease().is_none());
        assert!(client.bound_lease().is_none());
        assert!(!client.timers().is_armed(TimerKind::RenewTimer));
        assert!(!client.timers().is_armed(TimerKind::RebindTimer));
        assert!(client.sink().current().is_none());
    }

    #[test]
    fn test_nak_after_offer() {
        let mut client = new_client();
        client.start().unwrap();
        client.process(Event::Tick);
        let xid = client.transaction_id();
        deliver(&mut client, &server_reply(MessageType::Offer, xid, 3600));

        deliver(&mut client, &server_reply(MessageType::Nak, xid, 0));
        assert_eq!(client.state(), LeaseState::Initial);
        assert!(!client.transport().is_open());
    }

    #[test]
    fn test_foreign_nak_ignored() {
        let mut client = bound_client(3600);
        let xid = client.transaction_id().wrapping_add(1);

        assert!(deliver(&mut client, &server_reply(MessageType::Nak, xid, 0)));
        assert!(client.sink().current().is_some());
    }

    #[test]
    fn test_renewal_unicasts_to_server() {
        let mut client = bound_client(3600);
        let sent = client.transport().sent.len();
        assert_eq!(client.transport().opens, 1);

        assert!(client.process(Event::TimerExpired(TimerKind::RenewTimer)));
        assert_eq!(client.transport().opens, 2);
        assert_eq!(client.renewal(), Some(Renewal::Renewing));
        assert!(client.transport().is_open());
        assert!(!client.timers().is_armed(TimerKind::RenewTimer));
        assert!(client.timers().is_armed(TimerKind::RebindTimer));
        assert_eq!(client.transport().sent.len(), sent + 1);

        let request = client.transport().last_sent();
        assert_eq!(request.address, SERVER);
        assert_eq!(request.xid(), client.transaction_id());
        assert_eq!(request.message_type(), Some(MessageType::Request as u8));
        assert_eq!(flags(&request.data), 0);
        assert_eq!(&request.data[12..16], &ASSIGNED.octets());
        assert_eq!(
            request.option(OptionCode::ServerIdentifier),
            Some(&SERVER.octets()[..])
        );
        assert_eq!(
            request.option(OptionCode::ParameterRequestList),
            Some(&RENEWAL_PARAMETER_REQUEST_LIST[..])
        );
        assert!(request.option(OptionCode::RequestedIpAddress).is_none());
    }

    #[test]
    fn test_renewal_ack_extends_lease() {
        let mut client = bound_client(3600);
        client.process(Event::TimerExpired(TimerKind::RenewTimer));
        let xid = client.transaction_id();

        assert!(deliver(&mut client, &server_reply(MessageType::Ack, xid, 7200)));
        assert_eq!(client.renewal(), None);
        assert!(!client.transport().is_open());
        assert_eq!(client.current_lease().unwrap().lease_seconds, 7200);
        assert_eq!(client.timers().armed_seconds(TimerKind::RenewTimer), Some(3600));
        assert_eq!(client.timers().armed_seconds(TimerKind::RebindTimer), Some(6300));
    }

    #[test]
    fn test_rebind_broadcasts() {
        let mut client = bound_client(3600);
        client.process(Event::TimerExpired(TimerKind::RenewTimer));
        assert!(client.process(Event::TimerExpired(TimerKind::RebindTimer)));
        assert_eq!(client.renewal(), Some(Renewal::Rebinding));

        let request = client.transport().last_sent();
        assert_eq!(request.address, Ipv4Addr::BROADCAST);
        assert_eq!(&request.data[12..16], &ASSIGNED.octets());
        assert!(request.option(OptionCode::ServerIdentifier).is_none());
        assert_eq!(
            request.option(OptionCode::ParameterRequestList),
            Some(&RENEWAL_PARAMETER_REQUEST_LIST[..])
        );

        let xid = client.transaction_id();
        assert!(deliver(&mut client, &server_reply(MessageType::Ack, xid, 3600)));
        assert_eq!(client.renewal(), None);
        assert!(client.timers().is_armed(TimerKind::RenewTimer));
    }

    #[test]
    fn test_ack_while_bound_not_renewing_ignored() {
        let mut client = bound_client(3600);
        let xid = client.transaction_id();
        let obtained_at = client.bound_lease().unwrap().obtained_at;

        assert!(deliver(&mut client, &server_reply(MessageType::Ack, xid, 60)));
        assert_eq!(client.current_lease().unwrap().lease_seconds, 3600);
        assert_eq!(client.bound_lease().unwrap().obtained_at, obtained_at);
    }

    #[test]
    fn test_stale_renew_timer_ignored() {
        let mut client = bound_client(3600);
        client.process(Event::TimerExpired(TimerKind::RenewTimer));
        let sent = client.transport().sent.len();

        client.process(Event::TimerExpired(TimerKind::RenewTimer));
        assert_eq!(client.transport().sent.len(), sent);
    }

    #[test]
    fn test_renewal_send_failure_is_absorbed() {
        let mut client = bound_client(3600);
        client.transport.fail_send = true;

        assert!(client.process(Event::TimerExpired(TimerKind::RenewTimer)));
        assert_eq!(client.state(), LeaseState::Bound);
        assert!(client.timers().is_armed(TimerKind::RebindTimer));
    }

    #[test]
    fn test_discover_send_failure_is_absorbed() {
        let mut client = new_client();
        client.start().unwrap();
        client.transport.fail_send = true;

        client.process(Event::Tick);
        assert_eq!(client.state(), LeaseState::AwaitingOffer);
        assert!(client.timers().is_armed(TimerKind::DiscoverTimeout));
        assert!(client.transport().sent.is_empty());
    }

    #[test]
    fn test_expired_lease_released_on_tick() {
        let mut client = bound_client(0);
        std::thread::sleep(Duration::from_millis(5));

        assert!(!client.process(Event::Tick));
        assert_eq!(client.state(), LeaseState::Initial);
        assert!(client.sink().current().is_none());
    }

    #[test]
    fn test_wall_clock_step_keeps_lease() {
        let mut client = bound_client(3600);
        if let Some(lease) = client.lease.as_mut() {
            lease.bound_at -= chrono::TimeDelta::hours(2);
        }

        assert!(client.process(Event::Tick));
        assert_eq!(client.state(), LeaseState::Bound);
        assert!(client.sink().current().is_some());
        assert!(client.timers().is_armed(TimerKind::RenewTimer));
    }

    #[test]
    fn test_restart_while_bound() {
        let mut client = bound_client(3600);

        client.start().unwrap();
        assert_eq!(client.state(), LeaseState::Initial);
        assert!(client.current_lease().is_none());
        assert!(client.sink().current().is_none());
        for kind in TimerKind::ALL {
            assert!(!client.timers().is_armed(kind));
        }
        assert!(client.transport().is_open());
    }

    #[test]
    fn test_shutdown() {
        let mut client = new_client();
        client.start().unwrap();
        client.process(Event::Tick);

        client.shutdown();
        assert_eq!(client.state(), LeaseState::Initial);
        assert!(!client.transport().is_open());
        assert!(!client.timers().is_armed(TimerKind::DiscoverTimeout));
    }

    #[test]
    fn test_from_config() {
        let config = ClientConfig {
            hostname: "sensor".to_string(),
            mac_address: "aa:bb:cc:01:02:03".to_string(),
            discover_timeout_seconds: 4,
            ..Default::default()
        };
        let mut client = LeaseClient::from_config(
            &config,
            MockTransport::default(),
            DeadlineTimers::new(),
            MemorySink::new(),
        )
        .unwrap();

        assert_eq!(client.host_name().as_str(), "sensor_010203");
        client.process(Event::Tick);
        assert_eq!(client.timers().armed_seconds(TimerKind::DiscoverTimeout), Some(4));
    }
}
