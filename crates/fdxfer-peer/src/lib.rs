//! Descriptor transmitter and receiver over a [`fdxfer_channel::Channel`].
//!
//! The [`Transmitter`] duplicates a descriptor and sends the duplicate with a
//! one-byte marker, one per call. When the peer's ancillary backlog fills up
//! it reports saturation according to its [`SaturationPolicy`] instead of
//! retrying. The [`Receiver`] takes one message at a time, keeps or validates
//! the first descriptor, and closes the rest. [`Session`] runs the two
//! against each other.

#[cfg(unix)]
pub mod config;
#[cfg(unix)]
pub mod descriptor;
#[cfg(unix)]
pub mod error;
#[cfg(unix)]
pub mod receiver;
#[cfg(unix)]
pub mod session;
#[cfg(unix)]
pub mod transmitter;

#[cfg(unix)]
pub use config::{
    SaturationPolicy, TransferConfig, DEFAULT_MAX_RECEIVE_DATA, DEFAULT_MAX_RECEIVE_DESCRIPTORS,
};
#[cfg(unix)]
pub use descriptor::{check_open, duplicate};
#[cfg(unix)]
pub use error::{PeerError, Result};
#[cfg(unix)]
pub use receiver::{Accepted, ReceiveStep, Received, Receiver};
#[cfg(unix)]
pub use session::{Session, SessionReport};
#[cfg(unix)]
pub use transmitter::{is_saturation, ProbeOutcome, SaturationReport, SendStep, Transmitter};
