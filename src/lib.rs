//! # slirc-bnc
//!
//! A single-upstream IRC bouncer. One connection to a real IRC server is
//! shared by any number of clients, which all see the server's traffic and
//! can each send commands upstream.
//!
//! ## Features
//!
//! - Zero-copy parsing into borrowed [`MessageRef`] values
//! - Bounded per-connection buffers with lazy compaction
//! - A single-threaded [`mio`] event loop, no locks
//! - Local answers to keepalive and registration traffic
//! - Server feature (`RPL_ISUPPORT`) caching, replayed to late clients
//!
//! ## Quick Start
//!
//! ```rust
//! use slirc_bnc::MessageRef;
//!
//! let msg = MessageRef::parse(":nick!user@host PRIVMSG #channel :Hello!\r\n").unwrap();
//! assert_eq!(msg.source, Some("nick!user@host"));
//! assert_eq!(msg.command, "PRIVMSG");
//! assert_eq!(msg.params, vec!["#channel", "Hello!"]);
//!
//! let wire = msg.serialize(slirc_bnc::message::DEFAULT_LINE_LIMIT).unwrap();
//! assert_eq!(wire, b":nick!user@host PRIVMSG #channel :Hello!");
//! ```
//!
//! Running a bouncer:
//!
//! ```no_run
//! use slirc_bnc::bouncer::{Bouncer, Identity, Settings};
//! use slirc_bnc::transport;
//!
//! # fn main() -> anyhow::Result<()> {
//! let listener = transport::listen("127.0.0.1:16667".parse()?)?;
//! let upstream = transport::connect("irc.example.net:6667")?;
//!
//! let mut bouncer = Bouncer::new(listener, upstream, Settings::default())?;
//! bouncer.login(&Identity {
//!     nick: "bob".into(),
//!     user: "bob".into(),
//!     realname: "Bob".into(),
//! })?;
//! let reason = bouncer.run()?;
//! println!("stopped: {reason}");
//! # Ok(())
//! # }
//! ```

#![deny(clippy::all)]

pub mod bouncer;
pub mod config;
pub mod encode;
pub mod error;
pub mod isupport;
pub mod message;
pub mod response;
pub mod transport;

mod testing;

pub use self::bouncer::{Bouncer, Shutdown};
pub use self::config::{Config, ConfigError};
pub use self::encode::IrcEncode;
pub use self::error::{EncodeError, MessageParseError, ProtocolError};
pub use self::isupport::{FeatureCache, IsupportEntry};
pub use self::message::{MessageRef, PARAM_MAX};
pub use self::response::Response;
