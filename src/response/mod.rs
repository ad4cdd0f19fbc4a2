//! IRC numeric replies generated by the bouncer itself.
//!
//! Everything else the server sends passes through untouched, so only the
//! numerics the bouncer emits or intercepts are listed.
//!
//! # Reference
//! - RFC 2812: Internet Relay Chat: Client Protocol
//! - Modern IRC documentation: <https://modern.ircdocs.horse/>

#![allow(non_camel_case_types)]

/// IRC server response code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
#[non_exhaustive]
pub enum Response {
    /// 001 - Welcome to the IRC network
    RPL_WELCOME = 1,
    /// 005 - Server supported features (ISUPPORT)
    RPL_ISUPPORT = 5,
    /// 461 - Not enough parameters
    ERR_NEEDMOREPARAMS = 461,
}

impl Response {
    /// Returns the numeric code as u16
    #[inline]
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// The zero-padded wire form used as a message command.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Response::RPL_WELCOME => "001",
            Response::RPL_ISUPPORT => "005",
            Response::ERR_NEEDMOREPARAMS => "461",
        }
    }

    /// Creates a Response from a numeric code
    pub fn from_code(code: u16) -> Option<Response> {
        match code {
            1 => Some(Response::RPL_WELCOME),
            5 => Some(Response::RPL_ISUPPORT),
            461 => Some(Response::ERR_NEEDMOREPARAMS),
            _ => None,
        }
    }

    /// Check if this is an error response (400-599)
    #[inline]
    pub fn is_error(&self) -> bool {
        (400..600).contains(&self.code())
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:03}", self.code())
    }
}
