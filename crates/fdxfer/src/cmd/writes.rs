use std::sync::atomic::Ordering;
use std::time::Instant;

use fdxfer_channel::{Channel, WriteBench, WriteStrategy};
use tracing::{debug, info};

use crate::cmd::{install_ctrlc_handler, WritesCostArgs};
use crate::exit::{bench_error, channel_error, CliResult, SUCCESS};
use crate::output::{print_bench, BenchOutput, OutputFormat};

pub fn run(args: WritesCostArgs, format: OutputFormat) -> CliResult<i32> {
    let strategy: WriteStrategy = args
        .mode
        .parse()
        .map_err(|err| bench_error("invalid mode", err))?;
    let mut bench = WriteBench::new(args.header_size, args.data_size)
        .map_err(|err| bench_error("invalid size", err))?;

    let channel = Channel::create().map_err(|err| channel_error("channel setup failed", err))?;
    let stop = install_ctrlc_handler()?;

    info!(
        mode = strategy.name(),
        header_size = bench.header_size(),
        data_size = bench.data_size(),
        iterations = args.iterations,
        "starting write benchmark"
    );

    let mut completed = 0u64;
    let started = Instant::now();
    while completed < args.iterations {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        bench
            .round(&channel, strategy)
            .map_err(|err| bench_error(strategy.name(), err))?;
        completed += 1;
    }
    let elapsed = started.elapsed();
    debug!(completed, elapsed_ms = elapsed.as_millis() as u64, "benchmark finished");

    let elapsed_ns = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
    let ns_per_iteration = if completed == 0 {
        0.0
    } else {
        elapsed_ns as f64 / completed as f64
    };

    let out = BenchOutput {
        kind: "writes-cost-report",
        mode: strategy.name(),
        description: strategy.description(),
        header_size: bench.header_size(),
        data_size: bench.data_size(),
        iterations: args.iterations,
        completed,
        bytes_per_iteration: bench.total_size(),
        total_bytes: completed.saturating_mul(bench.total_size() as u64),
        calls_per_iteration: strategy.calls_per_iteration(),
        segments: strategy.segments(),
        elapsed_ns,
        ns_per_iteration,
        interrupted: completed < args.iterations,
    };
    print_bench(&out, format);

    Ok(SUCCESS)
}
