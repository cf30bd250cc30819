use std::fmt;
use std::str::FromStr;

use fdxfer_codec::DEFAULT_MARKER;

/// Default data buffer size for a single receive.
pub const DEFAULT_MAX_RECEIVE_DATA: usize = 1000;
/// Default descriptor capacity of a single receive.
pub const DEFAULT_MAX_RECEIVE_DESCRIPTORS: usize = 20;

/// What the transmitter does when the peer's ancillary backlog is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaturationPolicy {
    /// Treat saturation as a fatal error.
    Fail,
    /// Close the undelivered descriptor, report, and stop.
    Report,
    /// As `Report`, after first probing the byte stream with a
    /// descriptor-less send of the marker.
    #[default]
    Probe,
}

impl SaturationPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            SaturationPolicy::Fail => "fail",
            SaturationPolicy::Report => "report",
            SaturationPolicy::Probe => "probe",
        }
    }
}

impl fmt::Display for SaturationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SaturationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail" => Ok(SaturationPolicy::Fail),
            "report" => Ok(SaturationPolicy::Report),
            "probe" => Ok(SaturationPolicy::Probe),
            other => Err(format!(
                "unknown saturation policy '{other}' (expected fail, report or probe)"
            )),
        }
    }
}

/// Configuration shared by the transmitter and receiver.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Data byte sent with every descriptor. Default: `b'x'`.
    pub marker: u8,
    /// Saturation handling. Default: probe.
    pub policy: SaturationPolicy,
    /// Data bytes read per receive. Default: 1000.
    pub max_receive_data: usize,
    /// Descriptors accepted per receive. Default: 20.
    pub max_receive_descriptors: usize,
    /// Whether a message without ancillary data is malformed. Default: true.
    pub require_descriptors: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            marker: DEFAULT_MARKER,
            policy: SaturationPolicy::default(),
            max_receive_data: DEFAULT_MAX_RECEIVE_DATA,
            max_receive_descriptors: DEFAULT_MAX_RECEIVE_DESCRIPTORS,
            require_descriptors: true,
        }
    }
}
