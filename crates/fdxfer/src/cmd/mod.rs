use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Args, Subcommand};
use fdxfer_peer::SaturationPolicy;

use crate::exit::{CliError, CliResult, INTERNAL};
use crate::output::OutputFormat;

pub mod doctor;
pub mod send_fd;
pub mod version;
pub mod writes;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send duplicated descriptors until done or the peer saturates.
    SendFd(SendFdArgs),
    /// Time one way of writing a header and data over a socketpair.
    WritesCost(WritesCostArgs),
    /// Run local environment health checks.
    Doctor(DoctorArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::SendFd(args) => send_fd::run(args, format),
        Command::WritesCost(args) => writes::run(args, format),
        Command::Doctor(args) => doctor::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct SendFdArgs {
    /// Number of descriptors to send.
    #[arg(default_value_t = 1_000_000)]
    pub iterations: u64,
    /// What to do when the peer's descriptor backlog is full (fail, report, probe).
    #[arg(long, default_value = "probe")]
    pub policy: SaturationPolicy,
    /// Receive each message before sending the next.
    #[arg(long)]
    pub drain: bool,
    /// Single ASCII byte sent alongside each descriptor.
    #[arg(long, default_value = "x", value_parser = parse_marker)]
    pub marker: u8,
}

#[derive(Args, Debug)]
pub struct WritesCostArgs {
    /// Write mode, e.g. one_write, two_writes, one_writev, single-send.
    pub mode: String,
    /// Header size in bytes (1..=102400).
    pub header_size: usize,
    /// Data size in bytes (1..=104857600).
    pub data_size: usize,
    /// Number of write/read rounds.
    #[arg(long, default_value_t = 1_000_000)]
    pub iterations: u64,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Args, Debug, Default)]
pub struct DoctorArgs {}

fn parse_marker(value: &str) -> Result<u8, String> {
    match value.as_bytes() {
        [byte] if byte.is_ascii() => Ok(*byte),
        _ => Err(format!("marker must be a single ASCII character, got '{value}'")),
    }
}

/// Returns a flag that becomes true once Ctrl-C is pressed.
fn install_ctrlc_handler() -> CliResult<Arc<AtomicBool>> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))?;
    Ok(stop)
}
