use std::os::fd::RawFd;

use bytes::Bytes;
use tracing::trace;

use crate::cmsg;
use crate::envelope::Envelope;
use crate::error::{CodecError, MalformedEnvelope, Result};
use crate::record::{AncillaryRecord, DESCRIPTOR_WIRE_WIDTH};

/// Most descriptors carried by one envelope (Linux `SCM_MAX_FD`).
pub const MAX_DESCRIPTORS_PER_MESSAGE: usize = 253;

/// Marker byte sent as the data segment of a descriptor-bearing message.
pub const DEFAULT_MARKER: u8 = b'x';

/// Control-section size needed to carry `count` descriptors in one record.
pub fn rights_space(count: usize) -> usize {
    cmsg::space(count * DESCRIPTOR_WIRE_WIDTH)
}

/// Encode `fds` as one rights record next to a one-byte `marker` payload.
///
/// The control section is sized for exactly `fds.len()` descriptors.
///
/// Wire layout (Linux, 64-bit, one descriptor):
/// ```text
/// data:    ┌────────┐
///          │ marker │
///          └────────┘
/// control: ┌──────────────┬────────────┬────────────┬──────────┬─────────┐
///          │ cmsg_len (8) │ level (4)  │ type (4)   │ fd (4)   │ pad (4) │
///          │ = 20         │ SOL_SOCKET │ SCM_RIGHTS │          │         │
///          └──────────────┴────────────┴────────────┴──────────┴─────────┘
/// ```
pub fn encode_rights(fds: &[RawFd], marker: u8) -> Result<Envelope> {
    if fds.is_empty() || fds.len() > MAX_DESCRIPTORS_PER_MESSAGE {
        return Err(CodecError::DescriptorCount {
            count: fds.len(),
            max: MAX_DESCRIPTORS_PER_MESSAGE,
        });
    }
    Envelope::with_records(vec![marker], &[AncillaryRecord::rights(fds)])
}

/// Result of decoding a rights-bearing envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRights {
    /// The data segment.
    pub payload: Bytes,
    /// Descriptor values in send order. Ownership belongs to the caller.
    pub descriptors: Vec<RawFd>,
}

/// Decode the first ancillary record of `envelope` as a rights record.
///
/// Never closes descriptors; that is left to the caller.
pub fn decode_rights(envelope: &Envelope) -> Result<DecodedRights> {
    let record = envelope
        .records()
        .next()
        .ok_or(MalformedEnvelope::MissingRecord)??;
    let descriptors = record.descriptors()?;

    trace!(
        count = descriptors.len(),
        payload_len = envelope.payload().len(),
        "decoded rights record"
    );

    Ok(DecodedRights {
        payload: envelope.payload().clone(),
        descriptors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ControlBuffer;
    use crate::record::RecordKind;

    #[test]
    fn encode_decode_round_trip_preserves_order() {
        for count in 1..=MAX_DESCRIPTORS_PER_MESSAGE {
            let fds: Vec<RawFd> = (0..count as RawFd).map(|i| 1000 - i).collect();
            let envelope = encode_rights(&fds, b'x').unwrap();
            let decoded = decode_rights(&envelope).unwrap();
            assert_eq!(decoded.descriptors, fds);
            assert_eq!(decoded.payload.as_ref(), b"x");
        }
    }

    #[test]
    fn control_section_sized_for_exact_count() {
        for count in [1usize, 2, 7, 20] {
            let fds: Vec<RawFd> = (0..count as RawFd).collect();
            let envelope = encode_rights(&fds, b'x').unwrap();
            assert_eq!(envelope.control().len(), rights_space(count));

            let record = envelope.records().next().unwrap().unwrap();
            assert_eq!(record.kind(), RecordKind::Rights);
            assert_eq!(record.payload().len(), count * DESCRIPTOR_WIRE_WIDTH);
        }
    }

    #[test]
    fn rejects_out_of_range_counts() {
        assert!(matches!(
            encode_rights(&[], b'x'),
            Err(CodecError::DescriptorCount { count: 0, .. })
        ));
        let too_many = vec![3; MAX_DESCRIPTORS_PER_MESSAGE + 1];
        assert!(matches!(
            encode_rights(&too_many, b'x'),
            Err(CodecError::DescriptorCount { .. })
        ));
    }

    #[test]
    fn missing_record_is_malformed() {
        let envelope = Envelope::data_only(&b"x"[..]);
        let err = decode_rights(&envelope).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Malformed(MalformedEnvelope::MissingRecord)
        ));
        assert!(err.is_malformed());
    }

    #[test]
    fn control_too_short_for_a_header_is_missing_record() {
        let envelope = Envelope::from_received(
            Bytes::from_static(b"x"),
            ControlBuffer::zeroed(4),
            false,
        );
        assert!(matches!(
            decode_rights(&envelope),
            Err(CodecError::Malformed(MalformedEnvelope::MissingRecord))
        ));
    }

    #[test]
    fn non_multiple_length_is_malformed() {
        for extra in 1..DESCRIPTOR_WIRE_WIDTH {
            let record = AncillaryRecord::new(
                RecordKind::Rights,
                vec![0u8; DESCRIPTOR_WIRE_WIDTH + extra],
            );
            let envelope = Envelope::with_records(&b"x"[..], &[record]).unwrap();
            assert!(matches!(
                decode_rights(&envelope),
                Err(CodecError::Malformed(MalformedEnvelope::MisalignedLength { .. }))
            ));
        }
    }

    #[test]
    fn wrong_kind_is_malformed() {
        let record = AncillaryRecord::new(
            RecordKind::Other {
                level: libc::SOL_SOCKET,
                kind: libc::SCM_RIGHTS + 100,
            },
            vec![0u8; DESCRIPTOR_WIRE_WIDTH],
        );
        let envelope = Envelope::with_records(&b"x"[..], &[record]).unwrap();
        assert!(matches!(
            decode_rights(&envelope),
            Err(CodecError::Malformed(MalformedEnvelope::UnexpectedKind { .. }))
        ));
    }

    #[test]
    fn only_first_record_is_decoded() {
        let rights = AncillaryRecord::rights(&[11, 12]);
        let trailing = AncillaryRecord::new(
            RecordKind::Other {
                level: libc::SOL_SOCKET,
                kind: libc::SCM_RIGHTS + 100,
            },
            vec![1u8, 2, 3],
        );
        let envelope = Envelope::with_records(&b"y"[..], &[rights, trailing]).unwrap();
        let decoded = decode_rights(&envelope).unwrap();
        assert_eq!(decoded.descriptors, vec![11, 12]);
        assert_eq!(decoded.payload.as_ref(), b"y");
    }

    #[test]
    fn truncated_record_overruns_control_section() {
        let full = encode_rights(&[5, 6, 7], b'x').unwrap();
        let mut control = full.control().clone();
        control.truncate(cmsg::len(DESCRIPTOR_WIRE_WIDTH));
        let envelope = Envelope::from_received(full.payload().clone(), control, true);
        assert!(matches!(
            decode_rights(&envelope),
            Err(CodecError::Malformed(MalformedEnvelope::RecordOverrun { .. }))
        ));
    }
}
