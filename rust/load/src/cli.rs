//! Command-line flags shared by the binaries.  Flags override the config file and environment.

use clap::Args;
use raftkv_error::{ErrorCodes, RaftKvError};
use tokio_util::sync::CancellationToken;

use crate::config::{LoadConfig, ReadMode, RootConfig, TraceConfig};

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Comma-separated service endpoints.
    #[arg(long, value_delimiter = ',')]
    pub endpoints: Option<Vec<String>>,
    /// Put path: `raft` (streaming) or `raft-unary`.
    #[arg(long)]
    pub binding: Option<String>,
    /// Total number of operations.
    #[arg(long = "total")]
    pub total_ops: Option<u64>,
    /// Number of concurrent workers, each with its own connection.
    #[arg(long)]
    pub parallel: Option<usize>,
    #[arg(long)]
    pub dial_timeout_ms: Option<u64>,
    /// Stop the run after this many seconds.
    #[arg(long)]
    pub max_execution_time_secs: Option<u64>,
    /// Fetch the server's cache-hit counter before and after the run.
    #[arg(long)]
    pub cache_hits: bool,
    /// Reset the server's cache-hit counter before the run.
    #[arg(long)]
    pub reset_cache_hits: bool,
}

impl RunArgs {
    pub fn apply(&self, config: &mut LoadConfig) {
        if let Some(endpoints) = self.endpoints.as_ref() {
            config.client.endpoints = endpoints.clone();
        }
        if let Some(binding) = self.binding.as_ref() {
            config.binding = binding.clone();
        }
        if let Some(total_ops) = self.total_ops {
            config.total_ops = total_ops;
        }
        if let Some(parallel) = self.parallel {
            config.parallel = parallel;
        }
        if let Some(dial_timeout_ms) = self.dial_timeout_ms {
            config.client.connect_timeout_ms = dial_timeout_ms;
        }
        if self.max_execution_time_secs.is_some() {
            config.max_execution_time_secs = self.max_execution_time_secs;
        }
        config.collect_cache_hits |= self.cache_hits;
        config.reset_cache_hits |= self.reset_cache_hits;
    }
}

#[derive(Args, Debug, Default)]
pub struct PutArgs {
    /// Bytes per key.
    #[arg(long)]
    pub key_size: Option<usize>,
    /// Bytes per value.
    #[arg(long = "val-size")]
    pub value_size: Option<usize>,
    /// Number of distinct keys; 1 always uses the same key.
    #[arg(long = "key-space-size")]
    pub key_space: Option<u64>,
}

impl PutArgs {
    pub fn apply(&self, config: &mut LoadConfig) {
        if let Some(key_size) = self.key_size {
            config.key_size = key_size;
        }
        if let Some(value_size) = self.value_size {
            config.value_size = value_size;
        }
        if let Some(key_space) = self.key_space {
            config.key_space = key_space;
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct TraceArgs {
    /// Trace file; `.zst`/`.zstd` and `.gz` files are decompressed.
    #[arg(long = "trace-file")]
    pub path: Option<String>,
    /// Parse at most this many records; 0 parses everything.
    #[arg(long)]
    pub max_records: Option<usize>,
    #[arg(long, value_enum)]
    pub read_mode: Option<ReadMode>,
    /// Start over when the trace is exhausted.
    #[arg(long = "loop")]
    pub loop_replay: bool,
    /// Value size used when reads are turned into writes.
    #[arg(long)]
    pub write_value_size: Option<usize>,
    /// Skip inserting the trace's keys before replay.
    #[arg(long)]
    pub skip_load: bool,
}

impl TraceArgs {
    pub fn apply(&self, config: &mut LoadConfig) {
        let mut trace = match (config.trace.take(), self.path.as_ref()) {
            (Some(mut trace), Some(path)) => {
                trace.path = path.clone();
                trace
            }
            (None, Some(path)) => TraceConfig::new(path.clone()),
            (Some(trace), None) => trace,
            (None, None) => return,
        };
        if let Some(max_records) = self.max_records {
            trace.max_records = max_records;
        }
        if let Some(read_mode) = self.read_mode {
            trace.read_mode = read_mode;
        }
        if let Some(write_value_size) = self.write_value_size {
            trace.write_value_size = write_value_size;
        }
        trace.loop_replay |= self.loop_replay;
        if self.skip_load {
            trace.load_phase = false;
        }
        config.trace = Some(trace);
    }
}

/// One-line rendering of a fatal error: context, cause, and the name of its code.
pub fn describe(context: &str, err: &dyn RaftKvError) -> String {
    format!("{}: {} ({})", context, err, err.code().name())
}

/// Process exit status for a fatal error.  The gRPC code doubles as the status so scripts can tell
/// an unreachable service from a bad flag.
pub fn exit_status(code: ErrorCodes) -> i32 {
    match code as i32 {
        0 => 1,
        status => status,
    }
}

/// Report a fatal error and exit with a status derived from its code.
pub fn exit_with(context: &str, err: Box<dyn RaftKvError>) -> ! {
    if err.should_trace_error() {
        tracing::error!(code = err.code().name(), error = %err, "{}", context);
    }
    eprintln!("{}", describe(context, err.as_ref()));
    std::process::exit(exit_status(err.code()))
}

/// Load configuration and apply command-line overrides, or print the cause and exit.
pub fn load_config_or_exit(apply: impl FnOnce(&mut LoadConfig)) -> LoadConfig {
    let mut config = match RootConfig::load() {
        Ok(root) => root.load,
        Err(err) => exit_with("could not load configuration", err.boxed()),
    };
    apply(&mut config);
    if let Err(err) = config.validate() {
        exit_with("invalid configuration", err.boxed());
    }
    config
}

/// A token that is cancelled on Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; stopping the run");
            token.cancel();
        }
    });
    cancel
}
