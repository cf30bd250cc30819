/// Structural violations found in a received envelope.
///
/// Every variant indicates protocol or implementation corruption, never a
/// transient condition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedEnvelope {
    /// The control section holds no ancillary record.
    #[error("no ancillary record present")]
    MissingRecord,

    /// The first record is not a rights-transfer record.
    #[error("unexpected ancillary record kind (level {level}, type {kind})")]
    UnexpectedKind { level: i32, kind: i32 },

    /// A rights payload is not a whole number of descriptors.
    #[error("rights payload of {len} bytes is not a multiple of {width}")]
    MisalignedLength { len: usize, width: usize },

    /// The declared record length is smaller than a bare record header.
    #[error("ancillary record length {len} is shorter than its header ({header} bytes)")]
    RecordTooShort { len: usize, header: usize },

    /// The declared record length runs past the end of the control section.
    #[error("ancillary record declares {declared} bytes but only {available} remain")]
    RecordOverrun { declared: usize, available: usize },
}

/// Errors that can occur while encoding or decoding envelopes.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Descriptor count outside `1..=MAX_DESCRIPTORS_PER_MESSAGE`.
    #[error("descriptor count {count} out of range (1..={max})")]
    DescriptorCount { count: usize, max: usize },

    /// Ancillary records attached to a zero-length data segment.
    #[error("data segment must not be empty when ancillary records are attached")]
    EmptyPayload,

    /// A single record payload is larger than the codec accepts.
    #[error("ancillary record payload too large ({size} bytes, max {max})")]
    RecordTooLarge { size: usize, max: usize },

    /// The envelope violates a structural invariant.
    #[error("malformed envelope: {0}")]
    Malformed(#[from] MalformedEnvelope),
}

impl CodecError {
    /// Whether this error describes a corrupt received envelope.
    pub fn is_malformed(&self) -> bool {
        matches!(self, CodecError::Malformed(_))
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;
