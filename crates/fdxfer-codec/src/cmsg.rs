//! Raw `cmsghdr` layout.
//!
//! All pointer work over control sections lives here. Everything above this
//! module deals in [`AncillaryRecord`] values.

use std::mem;
use std::ptr;

use bytes::Bytes;
use libc::{c_uint, cmsghdr};

use crate::buffer::ControlBuffer;
use crate::error::MalformedEnvelope;
use crate::record::{AncillaryRecord, RecordKind};

/// Bytes a record with `payload_len` payload bytes occupies, padding included.
#[allow(unused_unsafe)]
pub(crate) fn space(payload_len: usize) -> usize {
    // SAFETY: pure arithmetic on the platform alignment rules.
    unsafe { libc::CMSG_SPACE(payload_len as c_uint) as usize }
}

/// Value of `cmsg_len` for a record with `payload_len` payload bytes.
#[allow(unused_unsafe)]
pub(crate) fn len(payload_len: usize) -> usize {
    // SAFETY: pure arithmetic on the platform alignment rules.
    unsafe { libc::CMSG_LEN(payload_len as c_uint) as usize }
}

/// Offset of the payload from the start of its header (`CMSG_DATA`).
pub(crate) fn data_offset() -> usize {
    len(0)
}

/// Lay `records` out back to back in a freshly allocated control buffer.
///
/// The buffer is exactly the sum of each record's `CMSG_SPACE`.
pub(crate) fn write_records(records: &[AncillaryRecord]) -> ControlBuffer {
    let total = records.iter().map(AncillaryRecord::wire_size).sum();
    let mut buf = ControlBuffer::zeroed(total);
    let bytes = buf.as_bytes_mut();
    let base = data_offset();

    let mut offset = 0usize;
    for record in records {
        let payload = record.payload();

        // SAFETY: cmsghdr is plain old data; zero is a valid bit pattern.
        let mut header: cmsghdr = unsafe { mem::zeroed() };
        header.cmsg_len = len(payload.len()) as _;
        header.cmsg_level = record.kind().level();
        header.cmsg_type = record.kind().kind();

        // SAFETY: `offset + space(..)` never exceeds `total`, and
        // space(..) >= size_of::<cmsghdr>(), so the write is in bounds.
        unsafe {
            ptr::write_unaligned(bytes.as_mut_ptr().add(offset).cast::<cmsghdr>(), header);
        }
        bytes[offset + base..offset + base + payload.len()].copy_from_slice(payload);
        offset += record.wire_size();
    }

    buf
}

/// Walks the records of a control section in order.
///
/// Trailing bytes too short to hold a header are treated as padding. A
/// record whose declared length is inconsistent with the buffer ends the walk
/// with an error.
pub struct Records<'a> {
    bytes: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> Records<'a> {
    pub(crate) fn new(buf: &'a ControlBuffer) -> Self {
        Self {
            bytes: buf.as_bytes(),
            offset: 0,
            failed: false,
        }
    }
}

impl Iterator for Records<'_> {
    type Item = Result<AncillaryRecord, MalformedEnvelope>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset + mem::size_of::<cmsghdr>() > self.bytes.len() {
            return None;
        }

        // SAFETY: bounds checked above; read_unaligned tolerates any offset.
        let header: cmsghdr = unsafe {
            ptr::read_unaligned(self.bytes.as_ptr().add(self.offset).cast::<cmsghdr>())
        };

        let base = data_offset();
        let declared = header.cmsg_len as usize;
        if declared < base {
            self.failed = true;
            return Some(Err(MalformedEnvelope::RecordTooShort {
                len: declared,
                header: base,
            }));
        }

        let available = self.bytes.len() - self.offset;
        if declared > available {
            self.failed = true;
            return Some(Err(MalformedEnvelope::RecordOverrun {
                declared,
                available,
            }));
        }

        let payload =
            Bytes::copy_from_slice(&self.bytes[self.offset + base..self.offset + declared]);
        self.offset += space(declared - base);

        Some(Ok(AncillaryRecord::new(
            RecordKind::from_raw(header.cmsg_level, header.cmsg_type),
            payload,
        )))
    }
}

/// Build a control section holding one bare header with an arbitrary
/// `cmsg_len`, for exercising the length checks.
#[cfg(test)]
pub(crate) fn raw_header(level: i32, kind: i32, cmsg_len: usize, buf_len: usize) -> ControlBuffer {
    let mut buf = ControlBuffer::zeroed(buf_len);
    // SAFETY: cmsghdr is plain old data; zero is a valid bit pattern.
    let mut header: cmsghdr = unsafe { mem::zeroed() };
    header.cmsg_len = cmsg_len as _;
    header.cmsg_level = level;
    header.cmsg_type = kind;
    assert!(buf_len >= mem::size_of::<cmsghdr>());
    // SAFETY: asserted above that the header fits.
    unsafe {
        ptr::write_unaligned(buf.as_bytes_mut().as_mut_ptr().cast::<cmsghdr>(), header);
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_platform_macros() {
        assert!(data_offset() >= mem::size_of::<cmsghdr>());
        assert_eq!(len(8), data_offset() + 8);
        assert!(space(4) >= len(4));
        assert_eq!(space(0), data_offset());
    }

    #[test]
    fn walks_multiple_records_in_order() {
        let first = AncillaryRecord::new(RecordKind::Rights, vec![1u8, 0, 0, 0]);
        let second = AncillaryRecord::new(
            RecordKind::Other {
                level: libc::SOL_SOCKET,
                kind: 77,
            },
            vec![9u8; 5],
        );
        let buf = write_records(&[first.clone(), second.clone()]);
        assert_eq!(buf.len(), space(4) + space(5));

        let records: Vec<_> = Records::new(&buf).collect::<Result<_, _>>().unwrap();
        assert_eq!(records, vec![first, second]);
    }

    #[test]
    fn empty_section_yields_nothing() {
        let buf = ControlBuffer::empty();
        assert!(Records::new(&buf).next().is_none());
    }

    #[test]
    fn header_shorter_than_itself_is_rejected() {
        let buf = raw_header(libc::SOL_SOCKET, libc::SCM_RIGHTS, 3, space(0));
        let mut records = Records::new(&buf);
        assert!(matches!(
            records.next(),
            Some(Err(MalformedEnvelope::RecordTooShort { len: 3, .. }))
        ));
        assert!(records.next().is_none());
    }

    #[test]
    fn declared_length_past_buffer_is_rejected() {
        let buf = raw_header(libc::SOL_SOCKET, libc::SCM_RIGHTS, len(64), space(4));
        assert!(matches!(
            Records::new(&buf).next(),
            Some(Err(MalformedEnvelope::RecordOverrun { .. }))
        ));
    }
}
