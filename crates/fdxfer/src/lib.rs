//! Descriptor passing over non-blocking Unix socketpairs.
//!
//! fdxfer moves open file descriptors between the two ends of a local
//! stream channel as `SCM_RIGHTS` ancillary data, detects when the receiving
//! side's ancillary capacity is exhausted, and recovers without leaking
//! descriptors.
//!
//! # Crate Structure
//!
//! - [`codec`]: ancillary-data envelope encoding and decoding
//! - [`channel`]: the socketpair channel and the write-strategy benchmark
//! - [`peer`]: transmitter, receiver and session driver

/// Re-export codec types.
pub mod codec {
    pub use fdxfer_codec::*;
}

/// Re-export channel types.
pub mod channel {
    pub use fdxfer_channel::*;
}

/// Re-export peer types.
pub mod peer {
    pub use fdxfer_peer::*;
}
