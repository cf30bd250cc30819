//! Ancillary-data envelope codec for descriptor transfer over Unix sockets.
//!
//! An [`Envelope`] is a data segment plus a control section holding zero or
//! more typed [`AncillaryRecord`]s. Descriptors travel in a rights record
//! (`SOL_SOCKET` / `SCM_RIGHTS`) whose payload is a whole number of
//! descriptor values, in send order.
//!
//! The codec never opens or closes descriptors: it only moves their values
//! in and out of correctly laid-out control sections.

pub mod error;

#[cfg(unix)]
pub mod buffer;
#[cfg(unix)]
mod cmsg;
#[cfg(unix)]
pub mod codec;
#[cfg(unix)]
pub mod envelope;
#[cfg(unix)]
pub mod record;

pub use error::{CodecError, MalformedEnvelope, Result};

#[cfg(unix)]
pub use buffer::ControlBuffer;
#[cfg(unix)]
pub use cmsg::Records;
#[cfg(unix)]
pub use codec::{
    decode_rights, encode_rights, rights_space, DecodedRights, DEFAULT_MARKER,
    MAX_DESCRIPTORS_PER_MESSAGE,
};
#[cfg(unix)]
pub use envelope::{Envelope, MAX_RECORD_PAYLOAD};
#[cfg(unix)]
pub use record::{AncillaryRecord, RecordKind, DESCRIPTOR_WIRE_WIDTH};
