use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use fdxfer_peer::{ProbeOutcome, ReceiveStep, SaturationPolicy, SaturationReport, SessionReport};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProbeOutput {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    bytes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    errno: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<&ProbeOutcome> for ProbeOutput {
    fn from(outcome: &ProbeOutcome) -> Self {
        match outcome {
            ProbeOutcome::Sent { bytes } => Self {
                status: "sent",
                bytes: Some(*bytes),
                errno: None,
                error: None,
            },
            ProbeOutcome::WouldBlock => Self {
                status: "would_block",
                bytes: None,
                errno: None,
                error: None,
            },
            ProbeOutcome::Failed { errno, description } => Self {
                status: "failed",
                bytes: None,
                errno: *errno,
                error: Some(description.clone()),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SaturationOutput {
    iteration: u64,
    errno: i32,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    probe: Option<ProbeOutput>,
}

impl From<&SaturationReport> for SaturationOutput {
    fn from(report: &SaturationReport) -> Self {
        Self {
            iteration: report.iteration,
            errno: report.errno,
            error: report.description.clone(),
            probe: report.probe.as_ref().map(ProbeOutput::from),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReceiveOutput {
    status: &'static str,
    payload_size: usize,
    descriptors: usize,
    truncated: bool,
}

impl From<&ReceiveStep> for ReceiveOutput {
    fn from(step: &ReceiveStep) -> Self {
        match step {
            ReceiveStep::Empty => Self {
                status: "empty",
                payload_size: 0,
                descriptors: 0,
                truncated: false,
            },
            ReceiveStep::Received(received) => Self {
                status: "received",
                payload_size: received.payload.len(),
                descriptors: received.descriptor_count,
                truncated: received.truncated,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransferOutput {
    kind: &'static str,
    policy: &'static str,
    drain: bool,
    iterations: u64,
    attempted: u64,
    delivered: u64,
    drained: u64,
    saturated: bool,
    interrupted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    saturation: Option<SaturationOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    final_receive: Option<ReceiveOutput>,
}

impl TransferOutput {
    pub fn new(report: &SessionReport, policy: SaturationPolicy, drain: bool) -> Self {
        Self {
            kind: "send-fd-report",
            policy: policy.as_str(),
            drain,
            iterations: report.iterations,
            attempted: report.attempted,
            delivered: report.delivered,
            drained: report.drained,
            saturated: report.is_saturated(),
            interrupted: report.interrupted,
            saturation: report.saturation.as_ref().map(SaturationOutput::from),
            final_receive: report.final_receive.as_ref().map(ReceiveOutput::from),
        }
    }
}

pub fn print_transfer(out: &TransferOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut rows = vec![
                ("policy", out.policy.to_string()),
                ("drain", out.drain.to_string()),
                ("iterations", out.iterations.to_string()),
                ("attempted", out.attempted.to_string()),
                ("delivered", out.delivered.to_string()),
                ("drained", out.drained.to_string()),
                ("saturated", out.saturated.to_string()),
            ];
            if let Some(saturation) = &out.saturation {
                rows.push(("saturated_at", saturation.iteration.to_string()));
                rows.push(("error", saturation.error.clone()));
                if let Some(probe) = &saturation.probe {
                    rows.push(("probe", probe.status.to_string()));
                }
            }
            if let Some(last) = &out.final_receive {
                rows.push((
                    "final_receive",
                    format!("{} ({} descriptors)", last.status, last.descriptors),
                ));
            }
            if out.interrupted {
                rows.push(("interrupted", "true".to_string()));
            }
            print_table(&rows);
        }
        OutputFormat::Pretty => print_transfer_pretty(out),
        OutputFormat::Raw => {
            print_raw(format!("{}\n", out.delivered).as_bytes());
        }
    }
}

fn print_transfer_pretty(out: &TransferOutput) {
    let Some(saturation) = &out.saturation else {
        println!(
            "Sent {} of {} descriptors ({} drained)",
            out.delivered, out.iterations, out.drained
        );
        return;
    };

    println!("Failed sendmsg (with FD) at i = {}", saturation.iteration);
    println!(
        "result = -1, error = {} ({})",
        saturation.errno, saturation.error
    );
    if let Some(probe) = &saturation.probe {
        println!("Send another with no FDs ...");
        match (probe.bytes, probe.errno) {
            (Some(bytes), _) => println!("result = {bytes}"),
            (None, Some(errno)) => println!(
                "result = -1, error = {errno} ({})",
                probe.error.as_deref().unwrap_or("unknown")
            ),
            (None, None) => println!("result = -1 ({})", probe.status),
        }
    }
    if let Some(last) = &out.final_receive {
        println!("Receiving a message ...");
        if last.status == "empty" {
            println!("result = -1 (nothing to receive)");
        } else {
            println!("result = {}", last.payload_size);
            println!("Received {} FDs ...", last.descriptors);
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BenchOutput {
    pub kind: &'static str,
    pub mode: &'static str,
    pub description: &'static str,
    pub header_size: usize,
    pub data_size: usize,
    pub iterations: u64,
    pub completed: u64,
    pub bytes_per_iteration: usize,
    pub total_bytes: u64,
    pub calls_per_iteration: usize,
    pub segments: usize,
    pub elapsed_ns: u64,
    pub ns_per_iteration: f64,
    pub interrupted: bool,
}

pub fn print_bench(out: &BenchOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let rows = vec![
                ("mode", out.mode.to_string()),
                ("header_size", out.header_size.to_string()),
                ("data_size", out.data_size.to_string()),
                ("iterations", out.completed.to_string()),
                ("bytes_per_iteration", out.bytes_per_iteration.to_string()),
                ("total_bytes", out.total_bytes.to_string()),
                ("segments", out.segments.to_string()),
                ("elapsed_ms", format!("{:.3}", out.elapsed_ns as f64 / 1e6)),
                ("ns_per_iteration", format!("{:.1}", out.ns_per_iteration)),
            ];
            print_table(&rows);
        }
        OutputFormat::Pretty => {
            println!(
                "mode={}, header_size={}, data_size={}",
                out.mode, out.header_size, out.data_size
            );
            println!(
                "{} iterations of {} in {:.3} ms ({:.1} ns/iteration)",
                out.completed,
                out.description,
                out.elapsed_ns as f64 / 1e6,
                out.ns_per_iteration
            );
        }
        OutputFormat::Raw => {
            print_raw(format!("{:.1}\n", out.ns_per_iteration).as_bytes());
        }
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn print_table(rows: &[(&str, String)]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["FIELD", "VALUE"]);
    for (field, value) in rows {
        table.add_row(vec![field.to_string(), value.clone()]);
    }
    println!("{table}");
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use fdxfer_peer::Received;

    use super::*;

    fn saturated_report() -> SessionReport {
        SessionReport {
            iterations: 10,
            attempted: 4,
            delivered: 3,
            drained: 0,
            saturation: Some(SaturationReport {
                iteration: 3,
                errno: 11,
                description: "Resource temporarily unavailable (os error 11)".to_string(),
                probe: Some(ProbeOutcome::Sent { bytes: 1 }),
            }),
            final_receive: Some(ReceiveStep::Received(Received {
                payload: Bytes::from_static(b"x"),
                descriptor_count: 1,
                truncated: false,
            })),
            interrupted: false,
        }
    }

    #[test]
    fn transfer_output_serializes_saturation() {
        let out = TransferOutput::new(&saturated_report(), SaturationPolicy::Probe, false);
        let json = serde_json::to_value(&out).expect("transfer output should serialize");
        assert_eq!(json["saturated"], true);
        assert_eq!(json["delivered"], 3);
        assert_eq!(json["saturation"]["iteration"], 3);
        assert_eq!(json["saturation"]["probe"]["status"], "sent");
        assert_eq!(json["saturation"]["probe"]["bytes"], 1);
        assert_eq!(json["final_receive"]["descriptors"], 1);
    }

    #[test]
    fn clean_run_omits_saturation_fields() {
        let report = SessionReport {
            saturation: None,
            final_receive: None,
            attempted: 10,
            delivered: 10,
            ..saturated_report()
        };
        let out = TransferOutput::new(&report, SaturationPolicy::Report, true);
        let json = serde_json::to_string(&out).expect("transfer output should serialize");
        assert!(json.contains("\"saturated\":false"));
        assert!(!json.contains("saturation\""));
        assert!(!json.contains("final_receive"));
    }

    #[test]
    fn failed_probe_keeps_errno() {
        let out = ProbeOutput::from(&ProbeOutcome::Failed {
            errno: Some(32),
            description: "Broken pipe".to_string(),
        });
        assert_eq!(out.status, "failed");
        assert_eq!(out.errno, Some(32));
    }
}
