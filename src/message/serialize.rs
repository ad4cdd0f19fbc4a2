use std::io::{self, Write};

use crate::encode::{needs_colon_prefix, write_cmd, IrcEncode};
use crate::error::EncodeError;

use super::MessageRef;

impl IrcEncode for MessageRef<'_> {
    fn encode<W: Write>(&self, w: &mut W) -> io::Result<usize> {
        let mut written = 0;

        if let Some(tags) = self.tags {
            written += w.write(b"@")?;
            written += w.write(tags.as_bytes())?;
            written += w.write(b" ")?;
        }

        if let Some(source) = self.source {
            written += w.write(b":")?;
            written += w.write(source.as_bytes())?;
            written += w.write(b" ")?;
        }

        written += write_cmd(w, self.command.as_bytes(), &self.params, self.trailing)?;
        Ok(written)
    }
}

impl MessageRef<'_> {
    /// Render the wire form without a terminator.
    ///
    /// # Errors
    ///
    /// Fails if a non-final parameter cannot be written unambiguously or the
    /// rendered line is longer than `limit` bytes.
    pub fn serialize(&self, limit: usize) -> Result<Vec<u8>, EncodeError> {
        let middle = self.params.len().saturating_sub(1);
        if let Some(index) = self.params[..middle]
            .iter()
            .position(|p| needs_colon_prefix(p))
        {
            return Err(EncodeError::InvalidMiddleParam { index });
        }

        let bytes = self.to_bytes();
        if bytes.len() > limit {
            return Err(EncodeError::TooLong {
                actual: bytes.len(),
                limit,
            });
        }
        Ok(bytes)
    }

    /// Render the wire form terminated by CRLF, ready to be queued on a socket.
    ///
    /// The limit applies to the line without its terminator.
    pub fn to_line(&self, limit: usize) -> Result<Vec<u8>, EncodeError> {
        let mut line = self.serialize(limit)?;
        line.extend_from_slice(b"\r\n");
        Ok(line)
    }
}
