//! UDP datagram transport for the lease client.
//!
//! The state machine opens the transport when an exchange starts and closes it
//! as soon as the exchange completes, so the socket only exists while the
//! client is actually waiting for a reply.

use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// UDP port DHCP servers listen on.
pub const DHCP_SERVER_PORT: u16 = 67;

/// UDP port DHCP clients listen on.
pub const DHCP_CLIENT_PORT: u16 = 68;

/// A non-blocking datagram socket.
pub trait Transport {
    /// Opens the socket. Opening an open transport is a no-op.
    fn open(&mut self) -> Result<()>;

    /// Closes the socket, dropping anything still queued on it.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Sends one datagram and returns the number of bytes sent.
    fn send_to(&mut self, data: &[u8], address: Ipv4Addr, port: u16) -> Result<usize>;

    /// Receives one pending datagram into `buffer`, if any.
    ///
    /// Never blocks. Returns `None` when closed or when nothing is queued.
    fn try_receive(&mut self, buffer: &mut [u8]) -> Option<(usize, SocketAddrV4)>;
}

/// [`Transport`] over an OS UDP socket bound to the DHCP client port.
#[derive(Debug)]
pub struct UdpTransport {
    port: u16,
    interface_index: Option<u32>,
    socket: Option<UdpSocket>,
}

impl UdpTransport {
    pub fn new(port: u16, interface_index: Option<u32>) -> Self {
        Self {
            port,
            interface_index,
            socket: None,
        }
    }

    /// Returns the bound local address while open.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket
            .as_ref()
            .and_then(|socket| socket.local_addr().ok())
    }

    fn create_socket(&self) -> Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|error| Error::Socket(format!("Failed to create socket: {}", error)))?;

        socket
            .set_reuse_address(true)
            .map_err(|error| Error::Socket(format!("Failed to set SO_REUSEADDR: {}", error)))?;

        socket
            .set_broadcast(true)
            .map_err(|error| Error::Socket(format!("Failed to set SO_BROADCAST: {}", error)))?;

        socket
            .set_nonblocking(true)
            .map_err(|error| Error::Socket(format!("Failed to set non-blocking: {}", error)))?;

        let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, self.port);
        socket.bind(&bind_addr.into()).map_err(|error| {
            Error::Socket(format!("Failed to bind to {}: {}", bind_addr, error))
        })?;

        if let Some(interface_index) = self.interface_index {
            #[cfg(windows)]
            {
                use std::os::windows::io::AsRawSocket;
                let raw_socket = socket.as_raw_socket();

                let result = set_interface_index(raw_socket, interface_index);
                if let Err(error) = result {
                    warn!(
                        "Failed to set interface index {}: {}",
                        interface_index, error
                    );
                }
            }
            #[cfg(not(windows))]
            {
                warn!(
                    "interface_index ({}) is only supported on Windows and will be ignored",
                    interface_index
                );
            }
        }

        Ok(socket.into())
    }
}

impl Default for UdpTransport {
    fn default() -> Self {
        Self::new(DHCP_CLIENT_PORT, None)
    }
}

impl Transport for UdpTransport {
    fn open(&mut self) -> Result<()> {
        if self.socket.is_none() {
            let socket = self.create_socket()?;
            debug!("Transport open on port {}", self.port);
            self.socket = Some(socket);
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!("Transport closed");
        }
    }

    fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    fn send_to(&mut self, data: &[u8], address: Ipv4Addr, port: u16) -> Result<usize> {
        let socket = self.socket.as_ref().ok_or(Error::TransportClosed)?;
        let sent = socket.send_to(data, SocketAddrV4::new(address, port))?;
        Ok(sent)
    }

    fn try_receive(&mut self, buffer: &mut [u8]) -> Option<(usize, SocketAddrV4)> {
        let socket = self.socket.as_ref()?;
        match socket.recv_from(buffer) {
            Ok((size, SocketAddr::V4(source))) => Some((size, source)),
            Ok((_, SocketAddr::V6(source))) => {
                debug!("Ignoring datagram from IPv6 source {}", source);
                None
            }
            Err(error) if error.kind() == ErrorKind::WouldBlock => None,
            Err(error) => {
                warn!("Error receiving datagram: {}", error);
                None
            }
        }
    }
}

#[cfg(windows)]
fn set_interface_index(raw_socket: std::os::windows::io::RawSocket, index: u32) -> Result<()> {
    use windows_sys::Win32::Networking::WinSock::{IPPROTO_IP, SOCKET, setsockopt};

    const IP_UNICAST_IF: i32 = 31;

    let index_bytes = index.to_be_bytes();
    let result = unsafe {
        setsockopt(
            raw_socket as SOCKET,
            IPPROTO_IP,
            IP_UNICAST_IF,
            index_bytes.as_ptr(),
            std::mem::size_of::<u32>() as i32,
        )
    };

    if result != 0 {
        return Err(Error::Socket(format!(
            "setsockopt IP_UNICAST_IF failed: {}",
            std::io::Error::last_os_error()
        )));
    }

    Ok(())
}
