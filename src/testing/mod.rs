//! Testing utilities for the bouncer.
//!
//! Only compiled for unit tests. Integration tests under `tests/` drive the
//! bouncer over real loopback sockets instead.
//!
//! # Organization
//! - `mocks.rs` - an in-memory non-blocking stream

#![cfg(test)]

pub mod mocks;

pub use mocks::MockStream;
