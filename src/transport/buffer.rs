//! Bounded receive and send buffers.
//!
//! The receive side hands out borrowed frames and defers discarding them
//! until the next call, so a frame stays valid exactly as long as the caller
//! holds the `&mut` borrow.

use std::io::{self, Read, Write};

use bytes::{Buf, BytesMut};
use tracing::trace;

use crate::error::{ProtocolError, Result};
use crate::message::MessageRef;

/// Inbound bytes awaiting framing.
#[derive(Debug)]
pub struct RecvBuffer {
    buf: BytesMut,
    capacity: usize,
    /// Length of the frame handed out by the previous call, delimiter included.
    consumed: usize,
    /// The peer has shut down its side; remaining frames are still served.
    eof: bool,
}

impl RecvBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            capacity,
            consumed: 0,
            eof: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of buffered bytes not yet handed out.
    pub fn len(&self) -> usize {
        self.buf.len() - self.consumed
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the next complete line, reading from `io` only when no complete
    /// line is already buffered.
    ///
    /// The frame excludes its `\n` and one preceding `\r`. `Ok(None)` means
    /// the socket would block before a full line arrived.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::ConnectionClosed`] once the peer has closed and every
    /// buffered line was returned, [`ProtocolError::BufferExhausted`] when the
    /// buffer fills without a line terminator, [`ProtocolError::Io`] on a
    /// socket failure.
    pub fn read_frame<R: Read>(&mut self, io: &mut R) -> Result<Option<&[u8]>> {
        self.advance_consumed();

        if self.find_line_end().is_none() {
            if self.eof {
                return Err(ProtocolError::ConnectionClosed);
            }
            if self.is_full() {
                return Err(ProtocolError::BufferExhausted {
                    capacity: self.capacity,
                });
            }
            self.fill(io)?;
        }

        match self.find_line_end() {
            Some(newline) => {
                self.consumed = newline + 1;
                let mut end = newline;
                if end > 0 && self.buf[end - 1] == b'\r' {
                    end -= 1;
                }
                Ok(Some(&self.buf[..end]))
            }
            None if self.eof => Err(ProtocolError::ConnectionClosed),
            None if self.is_full() => Err(ProtocolError::BufferExhausted {
                capacity: self.capacity,
            }),
            None => Ok(None),
        }
    }

    fn advance_consumed(&mut self) {
        if self.consumed > 0 {
            self.buf.advance(self.consumed);
            self.consumed = 0;
        }
    }

    fn find_line_end(&self) -> Option<usize> {
        self.buf.iter().position(|&b| b == b'\n')
    }

    fn is_full(&self) -> bool {
        self.buf.len() >= self.capacity
    }

    /// Read until the socket would block, the peer closes, or the buffer is full.
    fn fill<R: Read>(&mut self, io: &mut R) -> Result<()> {
        while !self.is_full() {
            let start = self.buf.len();
            self.buf.resize(self.capacity, 0);
            let result = io.read(&mut self.buf[start..]);
            let n = *result.as_ref().unwrap_or(&0);
            self.buf.truncate(start + n);

            match result {
                Ok(0) => {
                    trace!(buffered = start, "peer closed");
                    self.eof = true;
                    break;
                }
                Ok(n) => trace!(read = n, "received bytes"),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// Outcome of a [`SendBuffer::flush`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flush {
    /// Every queued byte was written.
    Flushed,
    /// The socket would block with bytes still queued.
    Partial,
}

/// Outbound bytes awaiting write readiness.
#[derive(Debug)]
pub struct SendBuffer {
    buf: BytesMut,
    capacity: usize,
}

impl SendBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Queue `bytes` in full, or nothing at all.
    pub fn enqueue(&mut self, bytes: &[u8]) -> Result<usize> {
        if self.buf.len() + bytes.len() > self.capacity {
            return Err(ProtocolError::CapacityExceeded {
                queued: self.buf.len(),
                requested: bytes.len(),
                capacity: self.capacity,
            });
        }
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    /// Serialize `msg`, terminate it with CRLF and queue the line.
    pub fn enqueue_message(&mut self, msg: &MessageRef<'_>, limit: usize) -> Result<usize> {
        let line = msg.to_line(limit)?;
        self.enqueue(&line)
    }

    /// Write queued bytes until the buffer drains or the socket would block.
    pub fn flush<W: Write>(&mut self, io: &mut W) -> Result<Flush> {
        while !self.buf.is_empty() {
            match io.write(&self.buf) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                Ok(n) => {
                    trace!(written = n, "sent bytes");
                    self.buf.advance(n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(if self.buf.is_empty() {
            Flush::Flushed
        } else {
            Flush::Partial
        })
    }
}
