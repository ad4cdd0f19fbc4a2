//! IRC message model.
//!
//! A [`MessageRef`] borrows every field from the line it was parsed from, so
//! framing, parsing and forwarding never copy message text.

mod borrowed;
mod parse;
mod serialize;

pub use self::borrowed::MessageRef;

/// Maximum number of parameters a message may carry.
pub const PARAM_MAX: usize = 15;

/// Default serialization limit: a 2048-byte line minus its CRLF terminator.
pub const DEFAULT_LINE_LIMIT: usize = 2046;
