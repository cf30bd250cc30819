mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "fdxfer", version, about = "Descriptor passing and write-cost harness")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(
        long,
        value_name = "FORMAT",
        default_value = "text",
        env = "FDXFER_LOG_FORMAT",
        global = true
    )]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        env = "FDXFER_LOG_LEVEL",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                exit::USAGE
            } else {
                exit::SUCCESS
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fdxfer_peer::SaturationPolicy;

    #[test]
    fn send_fd_defaults() {
        let cli = Cli::try_parse_from(["fdxfer", "send-fd"]).expect("send-fd should parse");
        match cli.command {
            Command::SendFd(args) => {
                assert_eq!(args.iterations, 1_000_000);
                assert_eq!(args.policy, SaturationPolicy::Probe);
                assert_eq!(args.marker, b'x');
                assert!(!args.drain);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_send_fd_options() {
        let cli = Cli::try_parse_from([
            "fdxfer", "send-fd", "500", "--policy", "report", "--drain", "--marker", "m",
        ])
        .expect("send-fd args should parse");
        match cli.command {
            Command::SendFd(args) => {
                assert_eq!(args.iterations, 500);
                assert_eq!(args.policy, SaturationPolicy::Report);
                assert_eq!(args.marker, b'm');
                assert!(args.drain);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_negative_iterations() {
        let err = Cli::try_parse_from(["fdxfer", "send-fd", "-5"])
            .expect_err("negative count should fail");
        assert!(err.use_stderr());
    }

    #[test]
    fn rejects_multi_byte_marker() {
        let err = Cli::try_parse_from(["fdxfer", "send-fd", "--marker", "xy"])
            .expect_err("two-character marker should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn parses_writes_cost_subcommand() {
        let cli = Cli::try_parse_from([
            "fdxfer",
            "writes-cost",
            "two_writes",
            "8",
            "16",
            "--iterations",
            "10",
        ])
        .expect("writes-cost args should parse");
        match cli.command {
            Command::WritesCost(args) => {
                assert_eq!(args.mode, "two_writes");
                assert_eq!(args.header_size, 8);
                assert_eq!(args.data_size, 16);
                assert_eq!(args.iterations, 10);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn writes_cost_requires_three_positionals() {
        let err = Cli::try_parse_from(["fdxfer", "writes-cost", "one_write", "8"])
            .expect_err("missing data size should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }
}
