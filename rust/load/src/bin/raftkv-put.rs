//! Open-loop put benchmark: fire synthetic puts at the service as fast as the workers take them.

use clap::Parser;
use raftkv_error::RaftKvError;

use raftkv_load::cli::{cancel_on_ctrl_c, exit_with, load_config_or_exit, PutArgs, RunArgs};
use raftkv_load::{progress_bar, BenchmarkRunner, BindingRegistry, SyntheticPuts};

#[derive(Parser, Debug)]
struct Args {
    #[command(flatten)]
    run: RunArgs,
    #[command(flatten)]
    put: PutArgs,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = load_config_or_exit(|config| {
        args.run.apply(config);
        args.put.apply(config);
    });
    config.tracing().init();

    let workload = match SyntheticPuts::from_config(&config) {
        Ok(workload) => workload,
        Err(err) => exit_with("invalid workload", err.boxed()),
    };
    let cancel = cancel_on_ctrl_c();
    let total_ops = config.total_ops;
    let runner = BenchmarkRunner::new(config, BindingRegistry::with_defaults());
    let bar = progress_bar(total_ops);
    match runner.run("put", &workload, total_ops, &bar, &cancel).await {
        Ok(report) => {
            println!("{}", report);
            if let Some(delta) = report.cache_hit_delta() {
                println!("cache hits during run: {}", delta);
            }
            if report.send_errors > 0 || report.timed_out {
                tracing::warn!(
                    send_errors = report.send_errors,
                    timed_out = report.timed_out,
                    "run finished with partial results"
                );
            }
        }
        Err(err) => {
            bar.abandon();
            exit_with("run failed", err.boxed());
        }
    }
}
