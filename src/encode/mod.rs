//! Zero-copy encoding for IRC messages.
//!
//! This module provides the [`IrcEncode`] trait for writing IRC messages directly
//! to byte buffers without intermediate `String` allocations.
//!
//! # Example
//!
//! ```
//! use slirc_bnc::encode::IrcEncode;
//! use slirc_bnc::MessageRef;
//!
//! let msg = MessageRef::new("PRIVMSG").with_param("#channel").with_trailing("Hello!");
//! let mut buf = Vec::new();
//! msg.encode(&mut buf).unwrap();
//!
//! assert_eq!(&buf, b"PRIVMSG #channel :Hello!");
//! ```

use std::io::{self, Write};

/// A trait for encoding IRC protocol elements directly to a byte stream.
///
/// Implementors write the bare wire form; the line terminator belongs to the
/// transport and is never emitted here.
pub trait IrcEncode {
    /// Encode this value to the given writer.
    ///
    /// Returns the number of bytes written on success.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the write fails.
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<usize>;

    /// Encode this value to a new `Vec<u8>`.
    #[must_use]
    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(512);
        let _ = self.encode(&mut buf);
        buf
    }
}

/// Check if a string needs colon-prefixing as a trailing IRC argument.
#[inline]
pub(crate) fn needs_colon_prefix(s: &str) -> bool {
    s.is_empty() || s.contains(' ') || s.starts_with(':')
}

/// Write a command with arguments.
///
/// The last argument gets a `:` prefix if it needs one or if `force_trailing`
/// is set.
pub(crate) fn write_cmd<W: Write>(
    w: &mut W,
    cmd: &[u8],
    args: &[&str],
    force_trailing: bool,
) -> io::Result<usize> {
    let mut written = w.write(cmd)?;

    let Some((trailing, middle)) = args.split_last() else {
        return Ok(written);
    };

    for param in middle {
        written += w.write(b" ")?;
        written += w.write(param.as_bytes())?;
    }

    written += w.write(b" ")?;

    if force_trailing || needs_colon_prefix(trailing) {
        written += w.write(b":")?;
    }

    written += w.write(trailing.as_bytes())?;
    Ok(written)
}
