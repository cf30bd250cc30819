use fdxfer_channel::ChannelError;
use fdxfer_codec::CodecError;

/// Errors that can occur while transferring descriptors.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Channel-level error.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Envelope encoding or decoding error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Duplicating the source descriptor failed.
    #[error("failed to duplicate descriptor: {0}")]
    Duplicate(std::io::Error),

    /// Duplication returned the original descriptor value.
    #[error("duplicate of descriptor {fd} returned the same value")]
    DuplicateReused { fd: i32 },

    /// A send or receive failed in a way the protocol does not recover from.
    #[error("iteration {iteration}: {operation} failed: {source}")]
    Unexpected {
        iteration: u64,
        operation: &'static str,
        source: std::io::Error,
    },

    /// The one-byte marker was not transferred whole.
    #[error("iteration {iteration}: sent {sent} of {expected} bytes")]
    PartialSend {
        iteration: u64,
        sent: usize,
        expected: usize,
    },

    /// Ancillary capacity was exhausted under the fail-fast policy.
    #[error("iteration {iteration}: ancillary capacity exhausted: {source}")]
    Saturated {
        iteration: u64,
        source: std::io::Error,
    },

    /// A rights record arrived with no descriptors in it.
    #[error("received rights record carries no descriptors")]
    NoDescriptors,

    /// A lower-level error raised while working on one iteration.
    #[error("iteration {iteration}: {operation} failed: {source}")]
    AtIteration {
        iteration: u64,
        operation: &'static str,
        source: Box<PeerError>,
    },

    /// The accepted descriptor failed validation.
    #[error("received descriptor failed validation: {0}")]
    Validation(std::io::Error),
}

impl PeerError {
    /// Whether this error means the protocol or implementation is corrupt,
    /// as opposed to an environmental failure.
    pub fn is_invariant_violation(&self) -> bool {
        match self {
            PeerError::Codec(err) => err.is_malformed(),
            PeerError::AtIteration { source, .. } => source.is_invariant_violation(),
            PeerError::DuplicateReused { .. }
            | PeerError::PartialSend { .. }
            | PeerError::NoDescriptors => true,
            _ => false,
        }
    }

    /// Attach the iteration and operation this error interrupted.
    ///
    /// Errors that already name their iteration are returned unchanged.
    pub fn at_iteration(self, iteration: u64, operation: &'static str) -> Self {
        match self {
            PeerError::Unexpected { .. }
            | PeerError::PartialSend { .. }
            | PeerError::Saturated { .. }
            | PeerError::AtIteration { .. } => self,
            other => PeerError::AtIteration {
                iteration,
                operation,
                source: Box::new(other),
            },
        }
    }

    /// The OS error code behind this error, if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            PeerError::Channel(err) => err.raw_os_error(),
            PeerError::Duplicate(err)
            | PeerError::Validation(err)
            | PeerError::Unexpected { source: err, .. }
            | PeerError::Saturated { source: err, .. } => err.raw_os_error(),
            PeerError::AtIteration { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PeerError>;
