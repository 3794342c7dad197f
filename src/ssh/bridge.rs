//! Transport bridge for SSH-over-SSH
//!
//! A pair of connected local stream sockets splices a forwarded channel into
//! a second, independent SSH session:
//!
//! ```text
//!  primary session ──▶ BridgeSocket ═══ BridgeEnd ◀── pump ──▶ proxy channel
//! ```
//!
//! The primary session treats [`BridgeSocket`] as an ordinary network
//! socket. The pump copies bytes between [`BridgeEnd`] and the proxy's
//! `direct-tcpip` channel. Both ends are nonblocking.

use std::io::{self, Read, Write};
use std::net::Shutdown;

use tracing::debug;

/// The end handed to the primary session as its transport
#[cfg(unix)]
pub type BridgeSocket = std::os::unix::net::UnixStream;

/// The end handed to the primary session as its transport
#[cfg(not(unix))]
pub type BridgeSocket = std::net::TcpStream;

/// The end drained and filled by the pump
#[derive(Debug)]
pub struct BridgeEnd {
    socket: BridgeSocket,
}

impl BridgeEnd {
    pub fn socket(&self) -> &BridgeSocket {
        &self.socket
    }
}

impl Read for BridgeEnd {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.read(buf)
    }
}

impl Write for BridgeEnd {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.socket.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.socket.flush()
    }
}

/// Half-close: no more bytes will be written, reads stay open
pub trait ShutdownWrite {
    fn shutdown_write(&mut self) -> io::Result<()>;
}

impl ShutdownWrite for BridgeEnd {
    fn shutdown_write(&mut self) -> io::Result<()> {
        self.socket.shutdown(Shutdown::Write)
    }
}

/// Allocate a connected, nonblocking socket pair.
///
/// Returns the pump side and the transport side.
pub fn socket_pair() -> io::Result<(BridgeEnd, BridgeSocket)> {
    let (pump_side, transport_side) = connected_pair()?;
    pump_side.set_nonblocking(true)?;
    transport_side.set_nonblocking(true)?;
    debug!("Bridge socket pair allocated");
    Ok((BridgeEnd { socket: pump_side }, transport_side))
}

#[cfg(unix)]
fn connected_pair() -> io::Result<(BridgeSocket, BridgeSocket)> {
    BridgeSocket::pair()
}

#[cfg(not(unix))]
fn connected_pair() -> io::Result<(BridgeSocket, BridgeSocket)> {
    use std::net::{Ipv4Addr, TcpListener, TcpStream};

    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    let client = TcpStream::connect(listener.local_addr()?)?;
    let (server, peer) = listener.accept()?;
    // Loopback listener is briefly visible to other local processes
    if peer != client.local_addr()? {
        return Err(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "unexpected peer on bridge listener",
        ));
    }
    client.set_nodelay(true)?;
    server.set_nodelay(true)?;
    Ok((server, client))
}
