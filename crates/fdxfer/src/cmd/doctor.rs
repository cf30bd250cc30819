use std::os::fd::AsFd;

use fdxfer_channel::Channel;
use fdxfer_peer::{ReceiveStep, Receiver, SaturationPolicy, SendStep, TransferConfig, Transmitter};
use serde::Serialize;

use crate::cmd::DoctorArgs;
use crate::exit::{CliResult, HEALTH_CHECK_FAILED, SUCCESS};
use crate::output::{print_json, OutputFormat};

/// Soft descriptor limits below this leave little room before saturation.
const LOW_FD_LIMIT: libc::rlim_t = 256;

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Pass,
    Fail,
    Warn,
    Info,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    name: &'static str,
    status: CheckStatus,
    detail: String,
}

impl CheckResult {
    fn new(name: &'static str, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name,
            status,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorOutput {
    kind: &'static str,
    checks: Vec<CheckResult>,
    overall: &'static str,
}

pub fn run(_args: DoctorArgs, format: OutputFormat) -> CliResult<i32> {
    let checks = vec![
        descriptor_round_trip_check(),
        open_file_limit_check(),
        socket_buffers_check(),
        compiled_features_check(),
    ];

    let has_fail = checks.iter().any(|c| matches!(c.status, CheckStatus::Fail));
    let overall = if has_fail { "fail" } else { "pass" };

    let output = DoctorOutput {
        kind: "doctor-report",
        checks,
        overall,
    };

    print_doctor(&output, format);

    if has_fail {
        Ok(HEALTH_CHECK_FAILED)
    } else {
        Ok(SUCCESS)
    }
}

fn print_doctor(output: &DoctorOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(output),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("fdxfer doctor\n");
            for c in &output.checks {
                println!(
                    "  [{:>4}] {:<22} {}",
                    status_text(c.status),
                    c.name,
                    c.detail
                );
            }
            if output.overall == "pass" {
                println!("\n  Result: all checks passed");
            } else {
                println!("\n  Result: one or more checks failed");
            }
        }
        OutputFormat::Raw => {
            println!("{}", output.overall);
        }
    }
}

fn status_text(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Pass => "PASS",
        CheckStatus::Fail => "FAIL",
        CheckStatus::Warn => "WARN",
        CheckStatus::Info => "INFO",
    }
}

fn descriptor_round_trip_check() -> CheckResult {
    const NAME: &str = "descriptor_round_trip";

    let channel = match Channel::create() {
        Ok(channel) => channel,
        Err(err) => return CheckResult::new(NAME, CheckStatus::Fail, err.to_string()),
    };
    let config = TransferConfig {
        policy: SaturationPolicy::Report,
        ..TransferConfig::default()
    };
    let transmitter = Transmitter::new(channel.sender(), &config);
    let receiver = Receiver::new(channel.receiver(), &config);

    match transmitter.send_one(channel.sender().as_fd(), 0) {
        Ok(SendStep::Delivered) => {}
        Ok(SendStep::Saturated(report)) => {
            return CheckResult::new(
                NAME,
                CheckStatus::Fail,
                format!("first send saturated: {}", report.description),
            )
        }
        Err(err) => return CheckResult::new(NAME, CheckStatus::Fail, err.to_string()),
    }

    match receiver.receive_once() {
        Ok(ReceiveStep::Received(received)) if received.descriptor_count == 1 => CheckResult::new(
            NAME,
            CheckStatus::Pass,
            "SCM_RIGHTS send and receive succeeded",
        ),
        Ok(ReceiveStep::Received(received)) => CheckResult::new(
            NAME,
            CheckStatus::Fail,
            format!("expected 1 descriptor, received {}", received.descriptor_count),
        ),
        Ok(ReceiveStep::Empty) => {
            CheckResult::new(NAME, CheckStatus::Fail, "sent message was not receivable")
        }
        Err(err) => CheckResult::new(NAME, CheckStatus::Fail, err.to_string()),
    }
}

fn open_file_limit_check() -> CheckResult {
    const NAME: &str = "open_file_limit";

    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: `limit` is a valid, writable rlimit.
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) };
    if rc != 0 {
        return CheckResult::new(
            NAME,
            CheckStatus::Fail,
            format!("getrlimit failed: {}", std::io::Error::last_os_error()),
        );
    }

    let detail = format!(
        "soft={} hard={}",
        rlimit_text(limit.rlim_cur),
        rlimit_text(limit.rlim_max)
    );
    if limit.rlim_cur != libc::RLIM_INFINITY && limit.rlim_cur < LOW_FD_LIMIT {
        CheckResult::new(NAME, CheckStatus::Warn, detail)
    } else {
        CheckResult::new(NAME, CheckStatus::Info, detail)
    }
}

fn rlimit_text(value: libc::rlim_t) -> String {
    if value == libc::RLIM_INFINITY {
        "unlimited".to_string()
    } else {
        value.to_string()
    }
}

fn socket_buffers_check() -> CheckResult {
    const NAME: &str = "socket_buffers";

    let sizes = Channel::create().and_then(|channel| {
        Ok((
            channel.sender().send_buffer_size()?,
            channel.receiver().receive_buffer_size()?,
        ))
    });
    match sizes {
        Ok((send, receive)) => CheckResult::new(
            NAME,
            CheckStatus::Info,
            format!("send={send} receive={receive} bytes"),
        ),
        Err(err) => CheckResult::new(NAME, CheckStatus::Fail, err.to_string()),
    }
}

fn compiled_features_check() -> CheckResult {
    let mut features = Vec::new();
    if cfg!(feature = "cli") {
        features.push("cli");
    }

    CheckResult::new("compiled_features", CheckStatus::Info, features.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doctor_output_has_overall_status() {
        let output = DoctorOutput {
            kind: "doctor-report",
            checks: vec![CheckResult::new("x", CheckStatus::Pass, "ok")],
            overall: "pass",
        };
        let json = serde_json::to_string(&output).expect("doctor output should serialize");
        assert!(json.contains("\"overall\":\"pass\""));
        assert!(json.contains("\"status\":\"pass\""));
    }

    #[test]
    fn round_trip_passes_on_a_fresh_channel() {
        let check = descriptor_round_trip_check();
        assert!(matches!(check.status, CheckStatus::Pass), "{}", check.detail);
    }

    #[test]
    fn open_file_limit_is_readable() {
        let check = open_file_limit_check();
        assert!(!matches!(check.status, CheckStatus::Fail), "{}", check.detail);
        assert!(check.detail.starts_with("soft="));
    }
}
