/// Errors that can occur on a descriptor-transfer channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Descriptor-table or kernel memory limits prevented channel creation.
    #[error("resource exhausted creating channel: {0}")]
    ResourceExhausted(std::io::Error),

    /// Channel creation failed for another reason.
    #[error("failed to create channel: {0}")]
    Create(std::io::Error),

    /// Configuring a socket option failed.
    #[error("socket configuration failed: {0}")]
    Socket(std::io::Error),

    /// A send attempt failed with something other than would-block.
    #[error("send failed: {0}")]
    Send(std::io::Error),

    /// A receive attempt failed with something other than would-block.
    #[error("receive failed: {0}")]
    Receive(std::io::Error),

    /// The peer endpoint has been closed.
    #[error("peer endpoint closed")]
    Closed,
}

impl ChannelError {
    /// Classify a socketpair creation failure.
    pub(crate) fn from_create(err: std::io::Error) -> Self {
        match err.raw_os_error() {
            Some(libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM) => {
                ChannelError::ResourceExhausted(err)
            }
            _ => ChannelError::Create(err),
        }
    }

    /// The OS error code behind this error, if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            ChannelError::ResourceExhausted(err)
            | ChannelError::Create(err)
            | ChannelError::Socket(err)
            | ChannelError::Send(err)
            | ChannelError::Receive(err) => err.raw_os_error(),
            ChannelError::Closed => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;

/// Errors from the write-strategy benchmark.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    /// Header size outside `1..=MAX_HEADER_SIZE`.
    #[error("header size {size} out of range (1..={max})")]
    HeaderSize { size: usize, max: usize },

    /// Data size outside `1..=MAX_DATA_SIZE`.
    #[error("data size {size} out of range (1..={max})")]
    DataSize { size: usize, max: usize },

    /// Unrecognised strategy name.
    #[error("unknown write mode: {0}")]
    UnknownStrategy(String),

    /// A write moved fewer bytes than requested.
    #[error("{strategy}: short write ({written} of {expected} bytes)")]
    ShortWrite {
        strategy: &'static str,
        written: usize,
        expected: usize,
    },

    /// The peer read returned fewer bytes than one iteration wrote.
    #[error("short read ({read} of {expected} bytes)")]
    ShortRead { read: usize, expected: usize },

    /// An I/O call failed.
    #[error("{operation} failed: {source}")]
    Io {
        operation: &'static str,
        source: std::io::Error,
    },
}
