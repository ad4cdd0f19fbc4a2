use std::io::{self, Read, Write};

use mio::event::Source;
use mio::{Interest, Registry, Token};

use crate::error::Result;

use super::buffer::{Flush, RecvBuffer, SendBuffer};

/// A socket together with its receive and send buffers.
///
/// Fields are crate-visible so a session can hold a frame borrowed from
/// `recv` while queueing replies on `send`.
#[derive(Debug)]
pub struct Connection<S> {
    pub(crate) stream: S,
    pub(crate) recv: RecvBuffer,
    pub(crate) send: SendBuffer,
    write_armed: bool,
    /// A flush emptied the queue, consuming the writable edge.
    write_drained: bool,
}

impl<S> Connection<S> {
    pub fn new(stream: S, recv_capacity: usize, send_capacity: usize) -> Self {
        Self {
            stream,
            recv: RecvBuffer::with_capacity(recv_capacity),
            send: SendBuffer::with_capacity(send_capacity),
            write_armed: false,
            write_drained: false,
        }
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn send_buffer(&mut self) -> &mut SendBuffer {
        &mut self.send
    }

    /// Whether the socket is registered for write readiness.
    pub fn is_write_armed(&self) -> bool {
        self.write_armed
    }
}

impl<S: Read + Write> Connection<S> {
    pub fn read_frame(&mut self) -> Result<Option<&[u8]>> {
        self.recv.read_frame(&mut self.stream)
    }

    pub fn flush(&mut self) -> Result<Flush> {
        let flushed = self.send.flush(&mut self.stream)?;
        if flushed == Flush::Flushed {
            self.write_drained = true;
        }
        Ok(flushed)
    }
}

impl<S: Source> Connection<S> {
    pub fn register(&mut self, registry: &Registry, token: Token) -> io::Result<()> {
        self.write_armed = false;
        self.write_drained = false;
        registry.register(&mut self.stream, token, Interest::READABLE)
    }

    /// Ask for write readiness exactly while output is queued.
    ///
    /// Readiness is edge-triggered: once a flush drained the queue without
    /// blocking, no further writable event arrives on its own, so bytes
    /// queued afterwards need a fresh registration.
    pub fn sync_interest(&mut self, registry: &Registry, token: Token) -> io::Result<()> {
        let wants_write = !self.send.is_empty();
        let rearm = wants_write && self.write_drained;
        if wants_write == self.write_armed && !rearm {
            return Ok(());
        }

        let interest = if wants_write {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        };
        registry.reregister(&mut self.stream, token, interest)?;
        self.write_armed = wants_write;
        self.write_drained = false;
        Ok(())
    }

    pub fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        registry.deregister(&mut self.stream)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mio::{Events, Poll};

    use super::*;
    use crate::testing::MockStream;

    #[test]
    fn test_read_and_flush_through_connection() {
        let mut stream = MockStream::new();
        stream.push_input(b"NICK bob\r\n");
        let mut conn = Connection::new(stream, 64, 64);

        assert_eq!(conn.read_frame().unwrap(), Some(&b"NICK bob"[..]));
        conn.send_buffer().enqueue(b"PING :1\r\n").unwrap();
        assert_eq!(conn.flush().unwrap(), Flush::Flushed);
        assert_eq!(conn.stream().output, b"PING :1\r\n");
        assert!(!conn.is_write_armed());
    }

    fn wait_writable(poll: &mut Poll, events: &mut Events, token: Token) -> bool {
        poll.poll(events, Some(Duration::from_millis(500))).unwrap();
        events.iter().any(|e| e.token() == token && e.is_writable())
    }

    #[test]
    fn test_requeue_after_drain_rearms_write_interest() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let stream = mio::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (_peer, _) = listener.accept().unwrap();

        let token = Token(7);
        let mut poll = Poll::new().unwrap();
        let mut events = Events::with_capacity(16);
        let mut conn = Connection::new(stream, 64, 64);
        conn.register(poll.registry(), token).unwrap();

        conn.send_buffer().enqueue(b"PRIVMSG #a :one\r\n").unwrap();
        conn.sync_interest(poll.registry(), token).unwrap();
        assert!(conn.is_write_armed());

        let mut writable = false;
        for _ in 0..10 {
            if wait_writable(&mut poll, &mut events, token) {
                writable = true;
                break;
            }
        }
        assert!(writable);
        assert_eq!(conn.flush().unwrap(), Flush::Flushed);

        // Queued while still armed, after the edge was consumed.
        conn.send_buffer().enqueue(b"PRIVMSG #a :two\r\n").unwrap();
        conn.sync_interest(poll.registry(), token).unwrap();
        assert!(wait_writable(&mut poll, &mut events, token));
        assert_eq!(conn.flush().unwrap(), Flush::Flushed);
        assert!(conn.send_buffer().is_empty());

        conn.sync_interest(poll.registry(), token).unwrap();
        assert!(!conn.is_write_armed());
    }
}
