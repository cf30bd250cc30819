//! Non-blocking Unix socketpair channel for descriptor-bearing messages.
//!
//! A [`Channel`] is two connected stream endpoints. [`Endpoint::send`] and
//! [`Endpoint::receive`] are single-shot, non-retrying primitives over
//! `sendmsg`/`recvmsg`; would-block is reported as [`Attempt::WouldBlock`]
//! rather than as an error.
//!
//! The [`strategy`] module drives plain byte transfers over the same channel
//! for comparing write-call strategies.

#[cfg(unix)]
pub mod endpoint;
#[cfg(unix)]
pub mod error;
#[cfg(unix)]
pub mod strategy;

#[cfg(unix)]
pub use endpoint::{Attempt, Channel, Endpoint};
#[cfg(unix)]
pub use error::{BenchError, ChannelError, Result};
#[cfg(unix)]
pub use strategy::{WriteBench, WriteStrategy, MAX_DATA_SIZE, MAX_HEADER_SIZE};
