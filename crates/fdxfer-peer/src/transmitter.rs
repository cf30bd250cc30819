use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd};

use fdxfer_channel::{Attempt, ChannelError, Endpoint};
use fdxfer_codec::{encode_rights, Envelope};
use tracing::{trace, warn};

use crate::config::{SaturationPolicy, TransferConfig};
use crate::descriptor::duplicate;
use crate::error::{PeerError, Result};

/// Result of the descriptor-less send made after saturation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The marker went through; the byte stream is still writable.
    Sent { bytes: usize },
    /// The byte stream is full as well.
    WouldBlock,
    /// The probe failed outright.
    Failed {
        errno: Option<i32>,
        description: String,
    },
}

/// Details of a saturation event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaturationReport {
    /// Zero-based index of the send that saturated.
    pub iteration: u64,
    /// OS error code of the failed descriptor-bearing send.
    pub errno: i32,
    /// Human-readable form of `errno`.
    pub description: String,
    /// Probe result; `None` unless the policy is [`SaturationPolicy::Probe`].
    pub probe: Option<ProbeOutcome>,
}

/// Outcome of one transmit iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendStep {
    /// The descriptor and marker were accepted by the kernel.
    Delivered,
    /// The peer's ancillary backlog is full; the caller should stop sending.
    Saturated(SaturationReport),
}

/// Sends one duplicated descriptor per iteration over a channel endpoint.
pub struct Transmitter<'a> {
    endpoint: &'a Endpoint,
    marker: u8,
    policy: SaturationPolicy,
}

impl<'a> Transmitter<'a> {
    pub fn new(endpoint: &'a Endpoint, config: &TransferConfig) -> Self {
        Self {
            endpoint,
            marker: config.marker,
            policy: config.policy,
        }
    }

    pub fn policy(&self) -> SaturationPolicy {
        self.policy
    }

    /// Duplicate `source` and try to send the duplicate with the marker byte.
    ///
    /// The duplicate is closed locally in every outcome: after delivery the
    /// peer holds its own copy, and after saturation it was never sent.
    pub fn send_one(&self, source: BorrowedFd<'_>, iteration: u64) -> Result<SendStep> {
        let dup =
            duplicate(source).map_err(|err| err.at_iteration(iteration, "duplicate descriptor"))?;
        let envelope = encode_rights(&[dup.as_raw_fd()], self.marker)
            .map_err(|err| PeerError::from(err).at_iteration(iteration, "encode descriptor"))?;
        let expected = envelope.payload().len();

        match self.endpoint.send(&envelope) {
            Ok(Attempt::Ready(sent)) if sent == expected => {
                trace!(iteration, fd = dup.as_raw_fd(), "descriptor delivered");
                drop(dup);
                Ok(SendStep::Delivered)
            }
            Ok(Attempt::Ready(sent)) => Err(PeerError::PartialSend {
                iteration,
                sent,
                expected,
            }),
            Ok(Attempt::WouldBlock) => {
                self.saturated(iteration, dup, io::Error::from_raw_os_error(libc::EAGAIN))
            }
            Err(ChannelError::Send(err)) if is_saturation(&err) => {
                self.saturated(iteration, dup, err)
            }
            Err(ChannelError::Send(source)) => Err(PeerError::Unexpected {
                iteration,
                operation: "send descriptor",
                source,
            }),
            Err(other) => Err(PeerError::from(other).at_iteration(iteration, "send descriptor")),
        }
    }

    fn saturated(&self, iteration: u64, dup: OwnedFd, err: io::Error) -> Result<SendStep> {
        // Never transferred, so this process still owns the only copy.
        drop(dup);

        if self.policy == SaturationPolicy::Fail {
            return Err(PeerError::Saturated {
                iteration,
                source: err,
            });
        }

        let probe = match self.policy {
            SaturationPolicy::Probe => Some(
                self.probe()
                    .map_err(|failure| failure.at_iteration(iteration, "send marker"))?,
            ),
            _ => None,
        };

        let report = SaturationReport {
            iteration,
            errno: err.raw_os_error().unwrap_or_default(),
            description: err.to_string(),
            probe,
        };
        warn!(
            iteration,
            errno = report.errno,
            error = %report.description,
            probe = ?report.probe,
            "ancillary capacity exhausted"
        );
        Ok(SendStep::Saturated(report))
    }

    /// Send the marker alone to check the byte stream is still writable.
    fn probe(&self) -> Result<ProbeOutcome> {
        let envelope = Envelope::data_only(vec![self.marker]);
        match self.endpoint.send(&envelope) {
            Ok(Attempt::Ready(bytes)) => Ok(ProbeOutcome::Sent { bytes }),
            Ok(Attempt::WouldBlock) => Ok(ProbeOutcome::WouldBlock),
            Err(ChannelError::Send(err)) => Ok(ProbeOutcome::Failed {
                errno: err.raw_os_error(),
                description: err.to_string(),
            }),
            Err(other) => Err(other.into()),
        }
    }
}

/// Whether a failed descriptor-bearing send means the ancillary backlog is
/// full rather than that something is broken.
pub fn is_saturation(err: &io::Error) -> bool {
    let Some(code) = err.raw_os_error() else {
        return false;
    };
    #[cfg(any(target_os = "macos", target_os = "ios"))]
    if code == libc::EMSGSIZE {
        return true;
    }
    code == libc::EAGAIN
        || code == libc::EWOULDBLOCK
        || code == libc::ETOOMANYREFS
        || code == libc::ENOBUFS
}

#[cfg(test)]
mod tests {
    use std::os::fd::AsFd;

    use fdxfer_channel::Channel;

    use super::*;

    #[test]
    fn delivers_one_descriptor() {
        let channel = Channel::create().unwrap();
        let transmitter = Transmitter::new(channel.sender(), &TransferConfig::default());
        let step = transmitter
            .send_one(channel.sender().as_fd(), 0)
            .unwrap();
        assert_eq!(step, SendStep::Delivered);
    }

    #[test]
    fn keeps_configured_policy() {
        let channel = Channel::create().unwrap();
        let config = TransferConfig {
            policy: SaturationPolicy::Probe,
            ..TransferConfig::default()
        };
        let transmitter = Transmitter::new(channel.sender(), &config);
        assert_eq!(transmitter.policy(), SaturationPolicy::Probe);
    }

    #[test]
    fn classifies_saturation_errnos() {
        assert!(is_saturation(&io::Error::from_raw_os_error(libc::EAGAIN)));
        assert!(is_saturation(&io::Error::from_raw_os_error(libc::ETOOMANYREFS)));
        assert!(is_saturation(&io::Error::from_raw_os_error(libc::ENOBUFS)));
        assert!(!is_saturation(&io::Error::from_raw_os_error(libc::EPIPE)));
        assert!(!is_saturation(&io::Error::from_raw_os_error(libc::EBADF)));
        assert!(!is_saturation(&io::Error::other("not an os error")));
    }

    #[test]
    fn send_to_closed_peer_is_unexpected() {
        let (sender, receiver) = Channel::create().unwrap().into_parts();
        drop(receiver);
        let transmitter = Transmitter::new(&sender, &TransferConfig::default());
        let err = transmitter.send_one(sender.as_fd(), 7).unwrap_err();
        assert!(matches!(
            err,
            PeerError::Unexpected { iteration: 7, .. }
        ));
        assert!(!err.is_invariant_violation());
    }
}
