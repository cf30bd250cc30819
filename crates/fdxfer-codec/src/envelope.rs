use bytes::Bytes;

use crate::buffer::ControlBuffer;
use crate::cmsg::{self, Records};
use crate::error::{CodecError, Result};
use crate::record::AncillaryRecord;

/// Largest payload accepted for a single ancillary record.
pub const MAX_RECORD_PAYLOAD: usize = 64 * 1024;

/// The unit exchanged on the wire: a data segment plus a control section.
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    payload: Bytes,
    control: ControlBuffer,
    truncated: bool,
}

impl Envelope {
    /// An envelope with a data segment and no ancillary records.
    pub fn data_only(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            control: ControlBuffer::empty(),
            truncated: false,
        }
    }

    /// An envelope carrying `records` alongside `payload`.
    ///
    /// Some local-channel implementations reject a zero-length data segment
    /// when ancillary data is attached, so an empty payload is refused here.
    pub fn with_records(payload: impl Into<Bytes>, records: &[AncillaryRecord]) -> Result<Self> {
        let payload = payload.into();
        if !records.is_empty() && payload.is_empty() {
            return Err(CodecError::EmptyPayload);
        }
        if let Some(record) = records
            .iter()
            .find(|r| r.payload().len() > MAX_RECORD_PAYLOAD)
        {
            return Err(CodecError::RecordTooLarge {
                size: record.payload().len(),
                max: MAX_RECORD_PAYLOAD,
            });
        }

        Ok(Self {
            payload,
            control: cmsg::write_records(records),
            truncated: false,
        })
    }

    /// Wrap what a receive call produced.
    ///
    /// `control` must already be truncated to the length the kernel reported.
    pub fn from_received(payload: Bytes, control: ControlBuffer, truncated: bool) -> Self {
        Self {
            payload,
            control,
            truncated,
        }
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn control(&self) -> &ControlBuffer {
        &self.control
    }

    /// Whether the control section is non-empty.
    pub fn has_control(&self) -> bool {
        !self.control.is_empty()
    }

    /// Whether the kernel reported the control section as truncated.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Iterate the ancillary records in order.
    pub fn records(&self) -> Records<'_> {
        Records::new(&self.control)
    }
}
