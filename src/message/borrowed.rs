use std::fmt;

use crate::encode::IrcEncode;
use crate::error::MessageParseError;

use super::parse::parse_message;

/// A parsed IRC message borrowing from its source line.
///
/// Two messages compare equal when their tags, source, command and
/// parameters match; the `trailing` hint only affects how the last
/// parameter is written back out.
#[derive(Clone, Debug, Default)]
pub struct MessageRef<'a> {
    /// Raw tags string (without the leading `@`), if present.
    pub tags: Option<&'a str>,
    /// Raw source string (without the leading `:`), if present.
    pub source: Option<&'a str>,
    /// The command verb or three-digit numeric.
    pub command: &'a str,
    /// Parameters in wire order, trailing included.
    pub params: Vec<&'a str>,
    /// The last parameter was written with a leading `:`.
    pub trailing: bool,
}

impl<'a> MessageRef<'a> {
    /// Create a message with just a command.
    pub fn new(command: &'a str) -> Self {
        Self {
            command,
            ..Self::default()
        }
    }

    /// Parse a single line, tolerating a trailing CR/LF.
    pub fn parse(line: &'a str) -> Result<Self, MessageParseError> {
        parse_message(line)
    }

    /// Set the source.
    #[must_use]
    pub fn with_source(mut self, source: &'a str) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the raw tags string.
    #[must_use]
    pub fn with_tags(mut self, tags: &'a str) -> Self {
        self.tags = Some(tags);
        self
    }

    /// Append a middle parameter.
    #[must_use]
    pub fn with_param(mut self, param: &'a str) -> Self {
        self.params.push(param);
        self.trailing = false;
        self
    }

    /// Append a final parameter that is always written with a `:` prefix.
    #[must_use]
    pub fn with_trailing(mut self, param: &'a str) -> Self {
        self.params.push(param);
        self.trailing = true;
        self
    }

    /// Get the parameter at `index`.
    pub fn param(&self, index: usize) -> Option<&'a str> {
        self.params.get(index).copied()
    }

    /// Get the last parameter, which is the free-form text for most commands.
    pub fn last_param(&self) -> Option<&'a str> {
        self.params.last().copied()
    }
}

impl PartialEq for MessageRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.tags == other.tags
            && self.source == other.source
            && self.command == other.command
            && self.params == other.params
    }
}

impl Eq for MessageRef<'_> {}

impl fmt::Display for MessageRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Every field is a &str, so the encoded bytes are valid UTF-8.
        f.write_str(&String::from_utf8_lossy(&self.to_bytes()))
    }
}
