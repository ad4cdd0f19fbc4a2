//! Non-blocking socket plumbing.
//!
//! [`Connection`] pairs a socket with its bounded receive and send buffers.
//! [`listen`] and [`connect`] build the mio sockets the event loop drives.

mod buffer;
mod connection;

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use mio::net::{TcpListener, TcpStream};
use socket2::{Domain, Protocol, SockRef, Socket, TcpKeepalive, Type};
use tracing::{debug, warn};

pub use self::buffer::{Flush, RecvBuffer, SendBuffer};
pub use self::connection::Connection;

/// Default capacity of each receive and send buffer.
pub const DEFAULT_BUFFER_CAPACITY: usize = 4096;

pub const LISTEN_BACKLOG: i32 = 128;

/// Bind a non-blocking listener with `SO_REUSEADDR` set.
pub fn listen(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    socket.set_nonblocking(true)?;

    let listener = TcpListener::from_std(socket.into());
    debug!(addr = %listener.local_addr()?, "listening");
    Ok(listener)
}

/// Resolve `addr` and connect to the first address that accepts.
///
/// The connect itself blocks; the returned stream is non-blocking with
/// keepalive and `TCP_NODELAY` enabled.
pub fn connect<A: ToSocketAddrs>(addr: A) -> io::Result<TcpStream> {
    let mut last_err = None;
    for candidate in addr.to_socket_addrs()? {
        match std::net::TcpStream::connect(candidate) {
            Ok(stream) => {
                if let Err(e) = enable_keepalive(&stream) {
                    warn!(error = %e, "failed to enable TCP keepalive");
                }
                stream.set_nodelay(true)?;
                stream.set_nonblocking(true)?;
                debug!(peer = %candidate, "connected");
                return Ok(TcpStream::from_std(stream));
            }
            Err(e) => {
                debug!(peer = %candidate, error = %e, "connect failed");
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "address resolved to nothing")
    }))
}

fn enable_keepalive(stream: &std::net::TcpStream) -> io::Result<()> {
    let sock = SockRef::from(stream);
    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(120))
        .with_interval(Duration::from_secs(30));

    sock.set_tcp_keepalive(&keepalive)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_and_connect_loopback() {
        let listener = listen("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();

        let stream = connect(addr).unwrap();
        assert_eq!(stream.peer_addr().unwrap(), addr);
    }

    #[test]
    fn test_connect_refused() {
        let listener = listen("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        assert!(connect(addr).is_err());
    }
}
