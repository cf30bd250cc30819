use std::fmt;

use fdxfer_channel::{BenchError, ChannelError};
use fdxfer_peer::PeerError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const HEALTH_CHECK_FAILED: i32 = 30;
pub const USAGE: i32 = 64;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn channel_error(context: &str, err: ChannelError) -> CliError {
    CliError::new(FAILURE, format!("{context}: {err}"))
}

pub fn bench_error(context: &str, err: BenchError) -> CliError {
    match err {
        BenchError::HeaderSize { .. }
        | BenchError::DataSize { .. }
        | BenchError::UnknownStrategy(_) => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(FAILURE, format!("{context}: {other}")),
    }
}

/// Map a peer error to an exit code.
///
/// Invariant violations do not return: the process aborts.
pub fn peer_error(context: &str, err: PeerError) -> CliError {
    if err.is_invariant_violation() {
        invariant_violated(context, &err);
    }
    tracing::error!(errno = ?err.raw_os_error(), error = %err, "{context} failed");
    match err {
        PeerError::Channel(err) => channel_error(context, err),
        other => CliError::new(FAILURE, format!("{context}: {other}")),
    }
}

fn invariant_violated(context: &str, err: &PeerError) -> ! {
    tracing::error!(error = %err, "invariant violated");
    eprintln!("fatal: {context}: {err}");
    std::process::abort();
}
