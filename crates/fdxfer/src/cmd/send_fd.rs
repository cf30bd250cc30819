use fdxfer_channel::Channel;
use fdxfer_peer::{Session, TransferConfig};
use tracing::info;

use crate::cmd::{install_ctrlc_handler, SendFdArgs};
use crate::exit::{channel_error, peer_error, CliResult, FAILURE, SUCCESS};
use crate::output::{print_transfer, OutputFormat, TransferOutput};

pub fn run(args: SendFdArgs, format: OutputFormat) -> CliResult<i32> {
    let config = TransferConfig {
        marker: args.marker,
        policy: args.policy,
        ..TransferConfig::default()
    };

    let channel = Channel::create().map_err(|err| channel_error("channel setup failed", err))?;
    let stop = install_ctrlc_handler()?;
    let session = Session::new(channel, config)
        .with_drain(args.drain)
        .with_stop_flag(stop);

    let report = session
        .run(args.iterations)
        .map_err(|err| peer_error("send-fd failed", err))?;

    if report.interrupted {
        info!(delivered = report.delivered, "interrupted");
    }

    print_transfer(
        &TransferOutput::new(&report, args.policy, args.drain),
        format,
    );

    if report.is_saturated() {
        Ok(FAILURE)
    } else {
        Ok(SUCCESS)
    }
}
