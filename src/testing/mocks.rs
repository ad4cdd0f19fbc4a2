//! Mock non-blocking stream.
//!
//! Reads are served from queued chunks, one chunk (or part of one) per call,
//! and report `WouldBlock` once the queue is empty, just like a drained
//! non-blocking socket.

use std::collections::VecDeque;
use std::io::{self, Read, Write};

#[derive(Debug, Default)]
pub struct MockStream {
    input: VecDeque<Vec<u8>>,
    closed: bool,
    interrupt_next: bool,
    /// Bytes accepted by `write`.
    pub output: Vec<u8>,
    /// Remaining bytes `write` will accept before returning `WouldBlock`.
    pub write_budget: Option<usize>,
}

impl MockStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one chunk to be returned by a later `read`.
    pub fn push_input(&mut self, bytes: &[u8]) -> &mut Self {
        self.input.push_back(bytes.to_vec());
        self
    }

    /// After the queued input, report end of stream.
    pub fn close(&mut self) -> &mut Self {
        self.closed = true;
        self
    }

    /// Make the next `read` fail with `Interrupted`.
    pub fn interrupt(&mut self) -> &mut Self {
        self.interrupt_next = true;
        self
    }

    /// Number of queued input chunks not yet fully read.
    pub fn pending_input(&self) -> usize {
        self.input.len()
    }

    pub fn output_str(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if std::mem::take(&mut self.interrupt_next) {
            return Err(io::ErrorKind::Interrupted.into());
        }
        let Some(chunk) = self.input.front_mut() else {
            return if self.closed {
                Ok(0)
            } else {
                Err(io::ErrorKind::WouldBlock.into())
            };
        };
        let n = buf.len().min(chunk.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        chunk.drain(..n);
        if chunk.is_empty() {
            self.input.pop_front();
        }
        Ok(n)
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = match self.write_budget {
            Some(0) => return Err(io::ErrorKind::WouldBlock.into()),
            Some(budget) => budget.min(buf.len()),
            None => buf.len(),
        };
        if let Some(budget) = self.write_budget.as_mut() {
            *budget -= n;
        }
        self.output.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
