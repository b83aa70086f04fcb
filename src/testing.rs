//! Test doubles shared by the unit tests.

use std::collections::VecDeque;
use std::net::{Ipv4Addr, SocketAddrV4};

use crate::error::{Error, Result};
use crate::options::{MessageType, OptionCode};
use crate::packet::{
    BOOTREPLY, DHCP_FIXED_HEADER_SIZE, DHCP_MAGIC_COOKIE, HLEN_ETHERNET, HTYPE_ETHERNET,
};
use crate::transport::{DHCP_SERVER_PORT, Transport};

pub(crate) const SERVER: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
pub(crate) const ASSIGNED: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);
pub(crate) const MAC: [u8; 6] = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff];

#[derive(Debug, Clone)]
pub(crate) struct SentDatagram {
    pub data: Vec<u8>,
    pub address: Ipv4Addr,
    pub port: u16,
}

impl SentDatagram {
    pub fn xid(&self) -> u32 {
        u32::from_be_bytes([self.data[4], self.data[5], self.data[6], self.data[7]])
    }

    pub fn message_type(&self) -> Option<u8> {
        crate::packet::find_option(&self.data, OptionCode::MessageType)
            .and_then(|value| value.first().copied())
    }

    pub fn option(&self, code: OptionCode) -> Option<&[u8]> {
        crate::packet::find_option(&self.data, code)
    }
}

/// In-memory transport that records what the client sends.
#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    pub open: bool,
    pub fail_open: bool,
    pub fail_send: bool,
    pub opens: usize,
    pub sent: Vec<SentDatagram>,
    pub inbox: VecDeque<(Vec<u8>, SocketAddrV4)>,
}

impl MockTransport {
    pub fn last_sent(&self) -> &SentDatagram {
        self.sent.last().expect("nothing was sent")
    }

    pub fn deliver(&mut self, data: Vec<u8>) {
        let source = SocketAddrV4::new(SERVER, DHCP_SERVER_PORT);
        self.inbox.push_back((data, source));
    }
}

impl Transport for MockTransport {
    fn open(&mut self) -> Result<()> {
        if self.fail_open {
            return Err(Error::Socket("Failed to bind to 0.0.0.0:68".to_string()));
        }
        if !self.open {
            self.opens += 1;
        }
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
        self.inbox.clear();
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn send_to(&mut self, data: &[u8], address: Ipv4Addr, port: u16) -> Result<usize> {
        if !self.open {
            return Err(Error::TransportClosed);
        }
        if self.fail_send {
            return Err(Error::Io(std::io::Error::other("network unreachable")));
        }
        self.sent.push(SentDatagram {
            data: data.to_vec(),
            address,
            port,
        });
        Ok(data.len())
    }

    fn try_receive(&mut self, buffer: &mut [u8]) -> Option<(usize, SocketAddrV4)> {
        if !self.open {
            return None;
        }
        let (data, source) = self.inbox.pop_front()?;
        let size = data.len().min(buffer.len());
        buffer[..size].copy_from_slice(&data[..size]);
        Some((size, source))
    }
}

/// Builds a server reply carrying the usual configuration options.
pub(crate) fn server_reply(message_type: MessageType, xid: u32, lease_seconds: u32) -> Vec<u8> {
    let mut packet = vec![0u8; DHCP_FIXED_HEADER_SIZE];

    packet[0] = BOOTREPLY;
    packet[1] = HTYPE_ETHERNET;
    packet[2] = HLEN_ETHERNET;
    packet[4..8].copy_from_slice(&xid.to_be_bytes());
    if message_type != MessageType::Nak {
        packet[16..20].copy_from_slice(&ASSIGNED.octets());
    }
    packet[28..34].copy_from_slice(&MAC);
    packet[236..240].copy_from_slice(&DHCP_MAGIC_COOKIE);

    packet.extend_from_slice(&[OptionCode::MessageType as u8, 1, message_type as u8]);
    packet.extend_from_slice(&[OptionCode::ServerIdentifier as u8, 4]);
    packet.extend_from_slice(&SERVER.octets());
    if message_type != MessageType::Nak {
        packet.extend_from_slice(&[OptionCode::SubnetMask as u8, 4, 255, 255, 255, 0]);
        packet.extend_from_slice(&[OptionCode::Router as u8, 4]);
        packet.extend_from_slice(&SERVER.octets());
        packet.extend_from_slice(&[OptionCode::DnsServer as u8, 4, 10, 0, 0, 53]);
        packet.extend_from_slice(&[OptionCode::LeaseTime as u8, 4]);
        packet.extend_from_slice(&lease_seconds.to_be_bytes());
    }
    packet.push(OptionCode::End as u8);
    packet
}
