//! DHCP message encoding and decoding per RFC 2131.
//!
//! A DHCP message consists of a fixed 236-byte header followed by a 4-byte
//! magic cookie and variable-length options. The client builds requests into
//! a caller-owned buffer and extracts a [`LeaseOffer`] from replies without
//! allocating.
//!
//! # Message Structure
//!
//! ```text
//! 0                   1                   2                   3
//! 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     op (1)    |   htype (1)   |   hlen (1)    |   hops (1)    |
//! +---------------+---------------+---------------+---------------+
//! |                            xid (4)                            |
//! +-------------------------------+-------------------------------+
//! |           secs (2)            |           flags (2)           |
//! +-------------------------------+-------------------------------+
//! |                          ciaddr (4)                           |
//! +---------------------------------------------------------------+
//! |                          yiaddr (4)                           |
//! +---------------------------------------------------------------+
//! |                          siaddr (4)                           |
//! +---------------------------------------------------------------+
//! |                          giaddr (4)                           |
//! +---------------------------------------------------------------+
//! |                          chaddr (16)                          |
//! +---------------------------------------------------------------+
//! |                          sname (64)                           |
//! +---------------------------------------------------------------+
//! |                          file (128)                           |
//! +---------------------------------------------------------------+
//! |                       magic cookie (4)                        |
//! +---------------------------------------------------------------+
//! |                          options (variable)                   |
//! +---------------------------------------------------------------+
//! ```
//!
//! # References
//!
//! - RFC 2131: Dynamic Host Configuration Protocol

use std::net::Ipv4Addr;

use crate::error::{Error, Result};
use crate::lease::LeaseOffer;
use crate::options::{
    HostName, MAX_HOST_NAME_LEN, MessageType, OptionCode, OptionSet, PARAMETER_REQUEST_LIST,
    RENEWAL_PARAMETER_REQUEST_LIST,
};

/// DHCP magic cookie that identifies DHCP packets (vs BOOTP).
pub const DHCP_MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];

const DHCP_OP_HTYPE_HLEN_HOPS_SIZE: usize = 4;
const DHCP_XID_SIZE: usize = 4;
const DHCP_SECS_SIZE: usize = 2;
const DHCP_FLAGS_SIZE: usize = 2;
const DHCP_ADDRESS_FIELDS_SIZE: usize = 16;
const DHCP_CHADDR_SIZE: usize = 16;
const DHCP_SNAME_SIZE: usize = 64;
const DHCP_FILE_SIZE: usize = 128;

const DHCP_CHADDR_OFFSET: usize = DHCP_OP_HTYPE_HLEN_HOPS_SIZE
    + DHCP_XID_SIZE
    + DHCP_SECS_SIZE
    + DHCP_FLAGS_SIZE
    + DHCP_ADDRESS_FIELDS_SIZE;

const DHCP_MAGIC_COOKIE_OFFSET: usize =
    DHCP_CHADDR_OFFSET + DHCP_CHADDR_SIZE + DHCP_SNAME_SIZE + DHCP_FILE_SIZE;

/// Size of the fixed header portion including magic cookie.
pub const DHCP_FIXED_HEADER_SIZE: usize = DHCP_MAGIC_COOKIE_OFFSET + DHCP_MAGIC_COOKIE.len();

/// Minimum DHCP packet size per RFC 2131 §2.
///
/// DHCP requires packets to be at least 300 bytes for compatibility
/// with BOOTP relay agents.
const DHCP_MIN_PACKET_SIZE: usize = 300;

/// Client identifier value: hardware type byte plus the 6-byte MAC.
const CLIENT_IDENTIFIER_LEN: usize = 1 + 6;

/// Worst case for the option area: every option this client can emit, at
/// its longest, plus the end marker.
const MAX_OPTIONS_SIZE: usize = 3
    + (2 + CLIENT_IDENTIFIER_LEN)
    + (2 + RENEWAL_PARAMETER_REQUEST_LIST.len())
    + (2 + 4)
    + (2 + MAX_HOST_NAME_LEN)
    + (2 + 4)
    + 1;

/// Largest message [`LeaseMessage::encode`] can produce.
///
/// Encode buffers must be at least this large.
pub const MAX_MESSAGE_SIZE: usize =
    max(DHCP_FIXED_HEADER_SIZE + MAX_OPTIONS_SIZE, DHCP_MIN_PACKET_SIZE);

const fn max(a: usize, b: usize) -> usize {
    if a > b { a } else { b }
}

/// BOOTP/DHCP operation code for client requests.
pub const BOOTREQUEST: u8 = 1;

/// BOOTP/DHCP operation code for server replies.
pub const BOOTREPLY: u8 = 2;

/// Hardware type for Ethernet (most common).
pub const HTYPE_ETHERNET: u8 = 1;

/// Hardware address length for Ethernet (6 bytes).
pub const HLEN_ETHERNET: u8 = 6;

/// Flags bit asking the server to broadcast its reply.
pub const BROADCAST_FLAG: u16 = 0x8000;

/// An outbound DHCP message.
///
/// Holds the fixed header plus the values of the options this client can
/// emit. Which of those options actually go on the wire is decided per call
/// to [`encode`](Self::encode).
#[derive(Debug, Clone, Copy)]
pub struct LeaseMessage {
    /// Operation code: [`BOOTREQUEST`] (1) or [`BOOTREPLY`] (2).
    pub op: u8,
    /// Hardware address type. [`HTYPE_ETHERNET`] (1) for Ethernet.
    pub htype: u8,
    /// Hardware address length. [`HLEN_ETHERNET`] (6) for Ethernet.
    pub hlen: u8,
    /// Hop count, always 0 from a client.
    pub hops: u8,
    /// Transaction ID, echoed in replies.
    pub xid: u32,
    /// Seconds elapsed since the client began acquisition.
    pub secs: u16,
    /// Flags. Bit 15 (0x8000) = broadcast flag.
    pub flags: u16,
    /// Client IP address (set while renewing or rebinding).
    pub ciaddr: Ipv4Addr,
    /// "Your" IP address.
    pub yiaddr: Ipv4Addr,
    /// Server IP address.
    pub siaddr: Ipv4Addr,
    /// Relay agent IP address.
    pub giaddr: Ipv4Addr,
    /// Client hardware address; bytes 6..16 stay zero.
    pub chaddr: [u8; 16],
    /// Server host name, unused by this client.
    pub sname: [u8; 64],
    /// Boot file name, unused by this client.
    pub file: [u8; 128],
    /// Value of option 12.
    pub host_name: HostName,
    /// Value of option 50.
    pub requested_address: Ipv4Addr,
    /// Value of option 54.
    pub server_identifier: Ipv4Addr,
}

impl LeaseMessage {
    /// Creates a BOOTREQUEST for `mac` with every address field unspecified.
    pub fn request(xid: u32, mac: [u8; 6], host_name: HostName) -> Self {
        let mut chaddr = [0u8; 16];
        chaddr[..6].copy_from_slice(&mac);

        Self {
            op: BOOTREQUEST,
            htype: HTYPE_ETHERNET,
            hlen: HLEN_ETHERNET,
            hops: 0,
            xid,
            secs: 0,
            flags: 0,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr,
            sname: [0u8; 64],
            file: [0u8; 128],
            host_name,
            requested_address: Ipv4Addr::UNSPECIFIED,
            server_identifier: Ipv4Addr::UNSPECIFIED,
        }
    }

    /// Returns the client MAC from the first six bytes of `chaddr`.
    pub fn mac(&self) -> [u8; 6] {
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&self.chaddr[..6]);
        mac
    }

    /// Returns true if the broadcast flag (bit 15) is set.
    pub fn is_broadcast(&self) -> bool {
        (self.flags & BROADCAST_FLAG) != 0
    }

    pub fn set_broadcast(&mut self, broadcast: bool) {
        if broadcast {
            self.flags |= BROADCAST_FLAG;
        } else {
            self.flags &= !BROADCAST_FLAG;
        }
    }

    /// Encodes the message into `buffer` and returns the encoded length.
    ///
    /// Options are emitted in a fixed order: message type, client identifier,
    /// parameter request list, requested address, host name, server
    /// identifier, each only if selected by `options`. The message is
    /// terminated with the End marker and zero-padded to 300 bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BufferTooSmall`] if `buffer` is shorter than
    /// [`MAX_MESSAGE_SIZE`]. Nothing is written in that case.
    pub fn encode(
        &self,
        options: OptionSet,
        message_type: MessageType,
        buffer: &mut [u8],
    ) -> Result<usize> {
        if buffer.len() < MAX_MESSAGE_SIZE {
            return Err(Error::BufferTooSmall {
                needed: MAX_MESSAGE_SIZE,
                available: buffer.len(),
            });
        }

        let mut writer = Writer::new(buffer);

        writer.put(&[self.op, self.htype, self.hlen, self.hops]);
        writer.put(&self.xid.to_be_bytes());
        writer.put(&self.secs.to_be_bytes());
        writer.put(&self.flags.to_be_bytes());

        writer.put(&self.ciaddr.octets());
        writer.put(&self.yiaddr.octets());
        writer.put(&self.siaddr.octets());
        writer.put(&self.giaddr.octets());

        writer.put(&self.chaddr);
        writer.put(&self.sname);
        writer.put(&self.file);

        writer.put(&DHCP_MAGIC_COOKIE);

        writer.option(OptionCode::MessageType, &[message_type as u8]);

        if options.contains(OptionSet::CLIENT_IDENTIFIER) {
            let mut client_id = [0u8; CLIENT_IDENTIFIER_LEN];
            client_id[0] = self.htype;
            client_id[1..].copy_from_slice(&self.chaddr[..6]);
            writer.option(OptionCode::ClientIdentifier, &client_id);
        }

        if options.contains(OptionSet::RENEWAL_PARAMETER_LIST) {
            writer.option(
                OptionCode::ParameterRequestList,
                &RENEWAL_PARAMETER_REQUEST_LIST,
            );
        } else if options.contains(OptionSet::PARAMETER_REQUEST_LIST) {
            writer.option(OptionCode::ParameterRequestList, &PARAMETER_REQUEST_LIST);
        }

        if options.contains(OptionSet::REQUESTED_ADDRESS) {
            writer.option(
                OptionCode::RequestedIpAddress,
                &self.requested_address.octets(),
            );
        }

        if options.contains(OptionSet::HOST_NAME) {
            writer.option(OptionCode::Hostname, self.host_name.as_bytes());
        }

        if options.contains(OptionSet::SERVER_IDENTIFIER) {
            writer.option(
                OptionCode::ServerIdentifier,
                &self.server_identifier.octets(),
            );
        }

        writer.put(&[OptionCode::End as u8]);

        Ok(writer.pad_to(DHCP_MIN_PACKET_SIZE))
    }
}

/// Sequential writer over a buffer already checked to be large enough.
struct Writer<'a> {
    buffer: &'a mut [u8],
    position: usize,
}

impl<'a> Writer<'a> {
    fn new(buffer: &'a mut [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    fn put(&mut self, bytes: &[u8]) {
        let end = self.position + bytes.len();
        self.buffer[self.position..end].copy_from_slice(bytes);
        self.position = end;
    }

    fn option(&mut self, code: OptionCode, value: &[u8]) {
        self.put(&[code as u8, value.len() as u8]);
        self.put(value);
    }

    fn pad_to(self, min_len: usize) -> usize {
        if self.position < min_len {
            self.buffer[self.position..min_len].fill(0);
            min_len
        } else {
            self.position
        }
    }
}

/// Iterator over the raw `(code, value)` pairs of an option area.
///
/// Pad bytes are skipped and the End marker stops the walk. If the data
/// runs out before End, the iterator yields a single
/// [`Error::Truncated`] and then stops.
#[derive(Debug, Clone)]
pub struct OptionWalker<'a> {
    data: &'a [u8],
    index: usize,
    done: bool,
}

impl<'a> OptionWalker<'a> {
    /// Walks the options of `data` starting at byte `start`.
    pub fn new(data: &'a [u8], start: usize) -> Self {
        Self {
            data,
            index: start,
            done: false,
        }
    }

    /// Walks the options of a full DHCP message.
    pub fn for_message(data: &'a [u8]) -> Self {
        Self::new(data, DHCP_FIXED_HEADER_SIZE)
    }

    fn truncated(&mut self) -> Option<Result<(u8, &'a [u8])>> {
        self.done = true;
        Some(Err(Error::Truncated {
            offset: self.index,
            available: self.data.len(),
        }))
    }
}

impl<'a> Iterator for OptionWalker<'a> {
    type Item = Result<(u8, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let Some(&code) = self.data.get(self.index) else {
                return self.truncated();
            };

            if code == OptionCode::Pad as u8 {
                self.index += 1;
                continue;
            }

            if code == OptionCode::End as u8 {
                self.done = true;
                return None;
            }

            let Some(&length) = self.data.get(self.index + 1) else {
                return self.truncated();
            };

            let start = self.index + 2;
            let end = start + length as usize;
            if end > self.data.len() {
                return self.truncated();
            }

            self.index = end;
            return Some(Ok((code, &self.data[start..end])));
        }
    }
}

/// Returns the value of the first option with `code` in a full DHCP message.
///
/// Stops silently at a structural error; use [`OptionWalker`] to see it.
pub fn find_option(data: &[u8], code: OptionCode) -> Option<&[u8]> {
    OptionWalker::for_message(data)
        .map_while(|option| option.ok())
        .find_map(|(option_code, value)| (option_code == code as u8).then_some(value))
}

fn read_address(value: &[u8]) -> Option<Ipv4Addr> {
    value
        .get(..4)
        .map(|bytes| Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]))
}

fn read_u32(value: &[u8]) -> Option<u32> {
    value
        .get(..4)
        .map(|bytes| u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Decodes a server reply into a [`LeaseOffer`].
///
/// The magic cookie and op code are checked before anything else. Options
/// the client does not use are skipped, and recognized options whose value
/// is too short are ignored. Only running out of data before the End marker
/// is an error; in that case no offer is returned at all.
///
/// # Errors
///
/// - [`Error::Truncated`] if the data is shorter than the fixed header or
///   ends before the End marker
/// - [`Error::BadMagicCookie`] if the cookie is not 99.130.83.99
/// - [`Error::NotReply`] if the op code is not [`BOOTREPLY`]
pub fn decode(data: &[u8]) -> Result<LeaseOffer> {
    if data.len() < DHCP_FIXED_HEADER_SIZE {
        return Err(Error::Truncated {
            offset: 0,
            available: data.len(),
        });
    }

    if data[DHCP_MAGIC_COOKIE_OFFSET..DHCP_FIXED_HEADER_SIZE] != DHCP_MAGIC_COOKIE {
        return Err(Error::BadMagicCookie);
    }

    if data[0] != BOOTREPLY {
        return Err(Error::NotReply(data[0]));
    }

    let transaction_id = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    let yiaddr = Ipv4Addr::new(data[16], data[17], data[18], data[19]);
    let siaddr = Ipv4Addr::new(data[20], data[21], data[22], data[23]);

    let mut offer = LeaseOffer {
        transaction_id,
        client_address: yiaddr,
        ..LeaseOffer::default()
    };
    let mut requested_address = None;
    let mut server_identifier = None;

    for option in OptionWalker::for_message(data) {
        let (code, value) = option?;

        match OptionCode::try_from(code) {
            Ok(OptionCode::SubnetMask) => offer.subnet_mask = read_address(value),
            Ok(OptionCode::Router) => offer.gateway = read_address(value),
            Ok(OptionCode::DnsServer) => offer.dns_server = read_address(value),
            Ok(OptionCode::RequestedIpAddress) => requested_address = read_address(value),
            Ok(OptionCode::ServerIdentifier) => server_identifier = read_address(value),
            Ok(OptionCode::LeaseTime) => {
                if let Some(seconds) = read_u32(value) {
                    offer.lease_seconds = seconds;
                }
            }
            Ok(OptionCode::MessageType) => {
                offer.message_type = value
                    .first()
                    .and_then(|&value| MessageType::try_from(value).ok());
            }
            _ => {}
        }
    }

    if offer.client_address.is_unspecified()
        && let Some(address) = requested_address
    {
        offer.client_address = address;
    }
    offer.server_address = server_identifier.unwrap_or(siaddr);

    Ok(offer)
}
