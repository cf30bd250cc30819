use std::os::fd::AsFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fdxfer_channel::Channel;
use tracing::{debug, info};

use crate::config::TransferConfig;
use crate::error::Result;
use crate::receiver::{ReceiveStep, Receiver};
use crate::transmitter::{SaturationReport, SendStep, Transmitter};

/// What a [`Session::run`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    /// Sends requested.
    pub iterations: u64,
    /// Sends attempted, the saturating one included.
    pub attempted: u64,
    /// Descriptors the kernel accepted.
    pub delivered: u64,
    /// Messages received back in drain mode.
    pub drained: u64,
    /// Set when the run stopped on saturation.
    pub saturation: Option<SaturationReport>,
    /// The single receive made after saturation.
    pub final_receive: Option<ReceiveStep>,
    /// Whether the stop flag ended the run early.
    pub interrupted: bool,
}

impl SessionReport {
    fn new(iterations: u64) -> Self {
        Self {
            iterations,
            attempted: 0,
            delivered: 0,
            drained: 0,
            saturation: None,
            final_receive: None,
            interrupted: false,
        }
    }

    pub fn is_saturated(&self) -> bool {
        self.saturation.is_some()
    }
}

/// Drives a transmitter and receiver over one channel.
///
/// Every iteration sends a duplicate of the sending endpoint's own socket
/// descriptor to the receiving endpoint.
pub struct Session {
    channel: Channel,
    config: TransferConfig,
    drain: bool,
    stop: Option<Arc<AtomicBool>>,
}

impl Session {
    pub fn new(channel: Channel, config: TransferConfig) -> Self {
        Self {
            channel,
            config,
            drain: false,
            stop: None,
        }
    }

    /// Receive each delivered message before the next send.
    pub fn with_drain(mut self, drain: bool) -> Self {
        self.drain = drain;
        self
    }

    /// Stop between iterations once `stop` is set.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn run(&self, iterations: u64) -> Result<SessionReport> {
        let sender = self.channel.sender();
        let transmitter = Transmitter::new(sender, &self.config);
        let receiver = Receiver::new(self.channel.receiver(), &self.config);
        let mut report = SessionReport::new(iterations);

        info!(
            iterations,
            drain = self.drain,
            policy = %transmitter.policy(),
            "starting descriptor transfer"
        );

        for iteration in 0..iterations {
            if self.stopped() {
                report.interrupted = true;
                info!(iteration, "stop requested");
                break;
            }

            report.attempted += 1;
            match transmitter.send_one(sender.as_fd(), iteration)? {
                SendStep::Delivered => {
                    report.delivered += 1;
                    if self.drain {
                        let step = receiver
                            .receive_once()
                            .map_err(|err| err.at_iteration(iteration, "drain receive"))?;
                        if let ReceiveStep::Received(_) = step {
                            report.drained += 1;
                        }
                    }
                }
                SendStep::Saturated(saturation) => {
                    report.saturation = Some(saturation);
                    let last = receiver
                        .receive_once()
                        .map_err(|err| err.at_iteration(iteration, "receive after saturation"))?;
                    debug!(?last, "receive after saturation");
                    report.final_receive = Some(last);
                    break;
                }
            }
        }

        info!(
            attempted = report.attempted,
            delivered = report.delivered,
            drained = report.drained,
            saturated = report.is_saturated(),
            "descriptor transfer finished"
        );
        Ok(report)
    }

    fn stopped(&self) -> bool {
        self.stop
            .as_ref()
            .is_some_and(|stop| stop.load(Ordering::Relaxed))
    }
}
