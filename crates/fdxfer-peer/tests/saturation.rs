#![cfg(unix)]

//! Saturation behavior against a real socketpair.
//!
//! The kernel's in-flight descriptor limit is per user, so these tests hold
//! a lock to keep one saturated channel alive at a time.

use std::os::fd::AsFd;
use std::sync::{Mutex, MutexGuard};

use fdxfer_channel::{Attempt, Channel};
use fdxfer_codec::Envelope;
use fdxfer_peer::{
    is_saturation, PeerError, ProbeOutcome, ReceiveStep, Receiver, SaturationPolicy,
    SaturationReport, SendStep, Session, TransferConfig, Transmitter,
};

const SEND_BOUND: u64 = 1_000_000;

static SERIAL: Mutex<()> = Mutex::new(());

fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn config(policy: SaturationPolicy) -> TransferConfig {
    TransferConfig {
        policy,
        ..TransferConfig::default()
    }
}

fn saturate(channel: &Channel, config: &TransferConfig) -> (u64, SaturationReport) {
    let transmitter = Transmitter::new(channel.sender(), config);
    for iteration in 0..SEND_BOUND {
        match transmitter
            .send_one(channel.sender().as_fd(), iteration)
            .unwrap()
        {
            SendStep::Delivered => continue,
            SendStep::Saturated(report) => return (iteration, report),
        }
    }
    panic!("no saturation within {SEND_BOUND} sends");
}

#[test]
fn report_policy_stops_without_probe() {
    let _guard = serial();
    let channel = Channel::create().unwrap();
    let (iteration, report) = saturate(&channel, &config(SaturationPolicy::Report));

    assert!(iteration > 0, "first send should always be accepted");
    assert_eq!(report.iteration, iteration);
    assert!(report.probe.is_none());
    assert!(is_saturation(&std::io::Error::from_raw_os_error(report.errno)));
    assert!(!report.description.is_empty());
}

#[test]
fn fail_policy_turns_saturation_into_an_error() {
    let _guard = serial();
    let channel = Channel::create().unwrap();
    let transmitter = Transmitter::new(channel.sender(), &config(SaturationPolicy::Fail));

    for iteration in 0..SEND_BOUND {
        match transmitter.send_one(channel.sender().as_fd(), iteration) {
            Ok(SendStep::Delivered) => continue,
            Ok(SendStep::Saturated(_)) => panic!("fail policy must not report"),
            Err(err) => {
                assert!(matches!(err, PeerError::Saturated { .. }));
                assert!(!err.is_invariant_violation());
                return;
            }
        }
    }
    panic!("no saturation within {SEND_BOUND} sends");
}

#[test]
fn probe_policy_reports_probe_outcome() {
    let _guard = serial();
    let channel = Channel::create().unwrap();
    let (_, report) = saturate(&channel, &config(SaturationPolicy::Probe));

    match report.probe {
        Some(ProbeOutcome::Sent { bytes }) => assert_eq!(bytes, 1),
        Some(ProbeOutcome::WouldBlock) => {}
        other => panic!("unexpected probe outcome: {other:?}"),
    }
}

#[test]
fn draining_after_saturation_makes_channel_writable() {
    let _guard = serial();
    let channel = Channel::create().unwrap();
    let (delivered, _) = saturate(&channel, &config(SaturationPolicy::Report));

    let relaxed = TransferConfig {
        require_descriptors: false,
        ..TransferConfig::default()
    };
    let receiver = Receiver::new(channel.receiver(), &relaxed);
    let mut drained = 0u64;
    while let ReceiveStep::Received(received) = receiver.receive_once().unwrap() {
        assert_eq!(received.descriptor_count, 1);
        drained += 1;
        assert!(drained <= delivered, "drained more than was delivered");
    }
    assert_eq!(drained, delivered);

    let sent = channel
        .sender()
        .send(&Envelope::data_only(&b"x"[..]))
        .unwrap();
    assert_eq!(sent, Attempt::Ready(1));
}

#[test]
fn session_receives_once_after_saturation() {
    let _guard = serial();
    let session = Session::new(Channel::create().unwrap(), config(SaturationPolicy::Report));
    let report = session.run(SEND_BOUND).unwrap();

    let saturation = report.saturation.as_ref().expect("session should saturate");
    assert_eq!(report.attempted, report.delivered + 1);
    assert_eq!(saturation.iteration, report.delivered);
    assert_eq!(report.drained, 0);
    match report.final_receive {
        Some(ReceiveStep::Received(received)) => {
            assert_eq!(received.descriptor_count, 1);
            assert_eq!(received.payload.as_ref(), b"x");
        }
        other => panic!("unexpected final receive: {other:?}"),
    }
}

#[test]
fn drained_session_completes_every_iteration() {
    let _guard = serial();
    let session = Session::new(Channel::create().unwrap(), TransferConfig::default())
        .with_drain(true);
    let report = session.run(20_000).unwrap();

    assert!(!report.is_saturated());
    assert_eq!(report.delivered, 20_000);
    assert_eq!(report.drained, 20_000);
    assert_eq!(report.final_receive, None);
}
