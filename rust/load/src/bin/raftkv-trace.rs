//! Replay a cache trace against the service: insert every key the trace touches, then replay.

use std::sync::Arc;

use clap::Parser;
use raftkv_error::RaftKvError;

use raftkv_load::cli::{cancel_on_ctrl_c, exit_with, load_config_or_exit, RunArgs, TraceArgs};
use raftkv_load::{
    progress_bar, BenchmarkRunner, BindingRegistry, RunReport, TraceLoadPhase, TraceWorkload,
};

#[derive(Parser, Debug)]
struct Args {
    #[command(flatten)]
    run: RunArgs,
    #[command(flatten)]
    trace: TraceArgs,
    /// Print the full report as JSON.
    #[arg(long)]
    json: bool,
}

fn print_report(report: &RunReport, json: bool) {
    println!("[{}] {}", report.phase, report);
    if let Some(delta) = report.cache_hit_delta() {
        println!("[{}] cache hits during run: {}", report.phase, delta);
    }
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(json) => println!("{}", json),
            Err(err) => eprintln!("could not render report: {}", err),
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = load_config_or_exit(|config| {
        args.run.apply(config);
        args.trace.apply(config);
    });
    config.tracing().init();

    let Some(trace_config) = config.trace.clone() else {
        eprintln!("no trace configured; pass --trace-file or set load.trace.path");
        std::process::exit(1);
    };
    let trace = match TraceWorkload::open(&trace_config).await {
        Ok(trace) => Arc::new(trace),
        Err(err) => exit_with("could not open trace", err.boxed()),
    };
    let cancel = cancel_on_ctrl_c();
    let total_ops = config.total_ops;
    let runner = BenchmarkRunner::new(config, BindingRegistry::with_defaults());

    if trace_config.load_phase {
        let keys = trace.unique_key_count() as u64;
        let load = TraceLoadPhase::new(Arc::clone(&trace));
        let bar = progress_bar(keys);
        match runner.run("load", &load, keys, &bar, &cancel).await {
            Ok(report) => print_report(&report, args.json),
            Err(err) => {
                bar.abandon();
                exit_with("load phase failed", err.boxed());
            }
        }
        if cancel.is_cancelled() {
            return;
        }
    }

    let replay_ops = if trace_config.loop_replay {
        total_ops
    } else {
        total_ops.min(trace.len() as u64)
    };
    let bar = progress_bar(replay_ops);
    match runner
        .run("replay", &*trace, replay_ops, &bar, &cancel)
        .await
    {
        Ok(report) => print_report(&report, args.json),
        Err(err) => {
            bar.abandon();
            exit_with("replay failed", err.boxed());
        }
    }
}
