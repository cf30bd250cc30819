use std::os::fd::RawFd;

use bytes::{BufMut, Bytes, BytesMut};

use crate::cmsg;
use crate::error::MalformedEnvelope;

/// Wire width of one descriptor inside a rights record.
pub const DESCRIPTOR_WIRE_WIDTH: usize = std::mem::size_of::<RawFd>();

/// Kind tag of an ancillary record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// `SOL_SOCKET` / `SCM_RIGHTS`: descriptor ownership transfer.
    Rights,
    /// Any other (level, type) pair, kept verbatim.
    Other { level: i32, kind: i32 },
}

impl RecordKind {
    /// Classify a raw `(cmsg_level, cmsg_type)` pair.
    pub fn from_raw(level: i32, kind: i32) -> Self {
        if level == libc::SOL_SOCKET && kind == libc::SCM_RIGHTS {
            RecordKind::Rights
        } else {
            RecordKind::Other { level, kind }
        }
    }

    /// The `cmsg_level` this kind encodes to.
    pub fn level(self) -> i32 {
        match self {
            RecordKind::Rights => libc::SOL_SOCKET,
            RecordKind::Other { level, .. } => level,
        }
    }

    /// The `cmsg_type` this kind encodes to.
    pub fn kind(self) -> i32 {
        match self {
            RecordKind::Rights => libc::SCM_RIGHTS,
            RecordKind::Other { kind, .. } => kind,
        }
    }
}

/// One ancillary record: a kind tag plus its payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AncillaryRecord {
    kind: RecordKind,
    payload: Bytes,
}

impl AncillaryRecord {
    /// Create a record with an arbitrary kind and payload.
    pub fn new(kind: RecordKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// Create a rights record carrying `fds` in order.
    pub fn rights(fds: &[RawFd]) -> Self {
        let mut payload = BytesMut::with_capacity(fds.len() * DESCRIPTOR_WIRE_WIDTH);
        for fd in fds {
            payload.put_slice(&fd.to_ne_bytes());
        }
        Self::new(RecordKind::Rights, payload.freeze())
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn payload(&self) -> &[u8] {
        self.payload.as_ref()
    }

    /// Bytes this record occupies in a control section, padding included.
    pub fn wire_size(&self) -> usize {
        cmsg::space(self.payload.len())
    }

    /// Descriptor values carried by a rights record, in send order.
    ///
    /// Fails if the record is not a rights record or its payload is not a
    /// whole number of descriptors.
    pub fn descriptors(&self) -> Result<Vec<RawFd>, MalformedEnvelope> {
        if self.kind != RecordKind::Rights {
            return Err(MalformedEnvelope::UnexpectedKind {
                level: self.kind.level(),
                kind: self.kind.kind(),
            });
        }

        if self.payload.len() % DESCRIPTOR_WIRE_WIDTH != 0 {
            return Err(MalformedEnvelope::MisalignedLength {
                len: self.payload.len(),
                width: DESCRIPTOR_WIRE_WIDTH,
            });
        }

        Ok(self
            .payload
            .chunks_exact(DESCRIPTOR_WIRE_WIDTH)
            .map(|chunk| {
                let mut raw = [0u8; DESCRIPTOR_WIRE_WIDTH];
                raw.copy_from_slice(chunk);
                RawFd::from_ne_bytes(raw)
            })
            .collect())
    }
}
