use std::io;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};

use bytes::Bytes;
use fdxfer_channel::{Attempt, Endpoint};
use fdxfer_codec::{decode_rights, CodecError, MalformedEnvelope};
use tracing::{trace, warn};

use crate::config::TransferConfig;
use crate::descriptor::{adopt, check_open};
use crate::error::{PeerError, Result};

/// A message taken off the channel with its first descriptor still open.
#[derive(Debug)]
pub struct Accepted {
    /// The data segment.
    pub payload: Bytes,
    /// The first received descriptor. `None` only for messages without
    /// ancillary data when descriptors are not required.
    pub descriptor: Option<OwnedFd>,
    /// How many descriptors arrived, the kept one included.
    pub descriptor_count: usize,
    /// Whether the kernel truncated the control section.
    pub truncated: bool,
}

/// Summary of one completed receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub payload: Bytes,
    pub descriptor_count: usize,
    pub truncated: bool,
}

/// Outcome of one receive attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveStep {
    /// Nothing was ready.
    Empty,
    /// A message was received, validated and its descriptors closed.
    Received(Received),
}

/// Takes descriptor-bearing messages off a channel endpoint.
pub struct Receiver<'a> {
    endpoint: &'a Endpoint,
    max_data: usize,
    max_descriptors: usize,
    require_descriptors: bool,
}

impl<'a> Receiver<'a> {
    pub fn new(endpoint: &'a Endpoint, config: &TransferConfig) -> Self {
        Self {
            endpoint,
            max_data: config.max_receive_data,
            max_descriptors: config.max_receive_descriptors,
            require_descriptors: config.require_descriptors,
        }
    }

    /// Receive one message and keep its first descriptor.
    ///
    /// Surplus descriptors are closed before returning. `Ok(None)` means
    /// nothing was ready.
    pub fn accept(&self) -> Result<Option<Accepted>> {
        let envelope = match self
            .endpoint
            .receive(self.max_data, self.max_descriptors)?
        {
            Attempt::Ready(envelope) => envelope,
            Attempt::WouldBlock => return Ok(None),
        };

        if envelope.is_truncated() {
            warn!(
                max_descriptors = self.max_descriptors,
                "control data truncated; surplus descriptors were discarded by the kernel"
            );
        }

        if !envelope.has_control() {
            if self.require_descriptors {
                return Err(CodecError::from(MalformedEnvelope::MissingRecord).into());
            }
            return Ok(Some(Accepted {
                payload: envelope.payload().clone(),
                descriptor: None,
                descriptor_count: 0,
                truncated: envelope.is_truncated(),
            }));
        }

        let decoded = decode_rights(&envelope)?;
        // SAFETY: recvmsg installed these descriptors into this process and
        // nothing else has seen their values.
        let mut owned = unsafe { adopt(&decoded.descriptors) }.into_iter();
        let Some(first) = owned.next() else {
            return Err(PeerError::NoDescriptors);
        };

        let surplus = owned.len();
        // Closes every descriptor but the first.
        drop(owned);

        trace!(
            count = decoded.descriptors.len(),
            surplus,
            payload_len = decoded.payload.len(),
            "accepted descriptor"
        );

        Ok(Some(Accepted {
            payload: decoded.payload,
            descriptor: Some(first),
            descriptor_count: decoded.descriptors.len(),
            truncated: envelope.is_truncated(),
        }))
    }

    /// Receive one message, check its first descriptor with `validate`, then
    /// close everything.
    pub fn receive_with<F>(&self, validate: F) -> Result<ReceiveStep>
    where
        F: FnOnce(BorrowedFd<'_>) -> io::Result<()>,
    {
        let Some(accepted) = self.accept()? else {
            return Ok(ReceiveStep::Empty);
        };

        if let Some(descriptor) = &accepted.descriptor {
            validate(descriptor.as_fd()).map_err(PeerError::Validation)?;
        }

        Ok(ReceiveStep::Received(Received {
            payload: accepted.payload,
            descriptor_count: accepted.descriptor_count,
            truncated: accepted.truncated,
        }))
    }

    /// Receive one message and check that its first descriptor is open.
    pub fn receive_once(&self) -> Result<ReceiveStep> {
        self.receive_with(check_open)
    }
}
