//! Socket creation and setup.
//!
//! Everything here hands out non-blocking mio types; the raw socket2 socket
//! only exists long enough to apply the options the higher-level types do
//! not expose (reuse-address, listen backlog, send timeout).

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use mio::net::{TcpListener, TcpStream};
use socket2::{Domain, Protocol, Socket, Type};

/// Backlog for the listen socket.
const LISTEN_BACKLOG: i32 = 128;

/// Send timeout applied to upstream sockets.
const UPSTREAM_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Options applied to a socket right after creation.
#[derive(Debug, Clone, Copy)]
pub struct SocketOptions {
    pub non_blocking: bool,
    pub reuse_addr: bool,
    pub kind: SocketKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    Stream,
    Dgram,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            non_blocking: true,
            reuse_addr: true,
            kind: SocketKind::Stream,
        }
    }
}

/// Creates a raw IPv4 socket with the options applied in order.
///
/// If any option fails to apply the descriptor is closed before the error
/// is returned (socket2 closes on drop).
fn create(options: SocketOptions) -> io::Result<Socket> {
    let (kind, protocol) = match options.kind {
        SocketKind::Stream => (Type::STREAM, Protocol::TCP),
        SocketKind::Dgram => (Type::DGRAM, Protocol::UDP),
    };
    let socket = Socket::new(Domain::IPV4, kind, Some(protocol))?;
    if options.non_blocking {
        socket.set_nonblocking(true)?;
    }
    if options.reuse_addr {
        socket.set_reuse_address(true)?;
    }
    Ok(socket)
}

/// Parses a configured listen address. Empty means all interfaces.
pub fn parse_bind_addr(address: &str) -> io::Result<Ipv4Addr> {
    if address.is_empty() {
        return Ok(Ipv4Addr::UNSPECIFIED);
    }
    address.parse().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid IPv4 listen address: {address}"),
        )
    })
}

/// Creates, binds, and starts a non-blocking listener.
pub fn bind_listener(address: &str, port: u16) -> io::Result<TcpListener> {
    let ip = parse_bind_addr(address)?;
    let socket = create(SocketOptions::default())?;
    let addr = SocketAddr::V4(SocketAddrV4::new(ip, port));
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    Ok(TcpListener::from_std(socket.into()))
}

/// Opens a non-blocking connection to an upstream.
///
/// TCP_NODELAY and a 5-second send timeout are applied to the socket; an
/// in-progress connect is success, and its completion (or asynchronous
/// failure) is reported by the first writability event on the returned
/// stream. Any other connect error closes the socket before returning.
pub fn connect_upstream(addr: SocketAddrV4) -> io::Result<TcpStream> {
    let socket = create(SocketOptions::default())?;
    socket.set_nodelay(true)?;

    let target = SocketAddr::V4(addr);
    match socket.connect(&target.into()) {
        Ok(()) => {}
        Err(err) if err.raw_os_error() == Some(libc::EINPROGRESS) => {}
        Err(err) => return Err(err),
    }

    let stream: std::net::TcpStream = socket.into();
    stream.set_write_timeout(Some(UPSTREAM_SEND_TIMEOUT))?;
    Ok(TcpStream::from_std(stream))
}

/// Reads and logs any pending SO_ERROR on the stream.
///
/// Diagnostic only, used after error/hangup notifications; never fails the
/// caller.
pub fn check_state(stream: &TcpStream) {
    match stream.take_error() {
        Ok(Some(error)) => tracing::error!(error = %error, "Socket error"),
        Ok(None) => {}
        Err(error) => tracing::error!(error = %error, "Failed to get socket error status"),
    }
}
