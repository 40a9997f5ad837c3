//! raftkv-load is an open-loop load generator for the raft key-value service.
//!
//! A run opens one session per worker.  Each session owns its own connection and, for the default
//! `raft` binding, one long-lived `StreamProposals` call whose acknowledgments are counted by a
//! separate drain task.  A single producer draws operations from a workload (synthetic puts or a
//! replayed cache trace) and pushes them onto a bounded queue shared by every worker.  Nothing
//! waits for acknowledgments: the measured rate is the rate at which load was offered, timed from
//! the first submission to the last.
//!
//! Bindings are looked up by name in a [BindingRegistry] built at startup; the `raft-unary`
//! binding swaps the stream for one `Put` call per item with a bounded in-flight window.

use opentelemetry::global;
use opentelemetry::metrics::Counter;

pub mod binding;
pub mod cli;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod errors;
pub mod keys;
pub mod runner;
pub mod session;
pub mod stats;
pub mod trace;
pub mod unary;
pub mod worker;
pub mod workload;

pub use binding::{Binding, BindingRegistry, SessionContext, StreamBinding, UnaryBinding};
pub use config::{ClientConfig, LoadConfig, ReadMode, RootConfig, TraceConfig};
pub use connection::{dial, ConnectionLedger, KvConnection};
pub use dispatcher::{progress_bar, NoProgress, ProgressSink, WorkerSummary};
pub use errors::{Error, SessionError, TraceError};
pub use keys::KeySynthesizer;
pub use runner::BenchmarkRunner;
pub use session::{DrainOutcome, KvSession, StateCell, WorkerState};
pub use stats::{throughput, RunReport, StatsCollector};
pub use trace::{TraceLoadPhase, TraceWorkload};
pub use workload::{SyntheticPuts, Workload};

////////////////////////////////////////////// Metrics /////////////////////////////////////////////

/// Counters exported through the global meter.  They cost nothing unless an exporter is installed.
#[derive(Debug)]
pub struct Metrics {
    /// Operations handed to the work queue.
    submitted: Counter<u64>,
    /// Puts handed to a transport.
    sent: Counter<u64>,
    /// Acknowledgments received.
    acked: Counter<u64>,
    /// Puts that failed, either on hand-off or after it.
    send_errors: Counter<u64>,
    /// Point reads that failed, including reads of missing keys.
    read_errors: Counter<u64>,
    /// No-op operations dropped by the dispatcher.
    skipped: Counter<u64>,
}

impl Metrics {
    pub fn new() -> Self {
        let meter = global::meter("raftkv-load");
        let submitted = meter.u64_counter("submitted").build();
        let sent = meter.u64_counter("sent").build();
        let acked = meter.u64_counter("acked").build();
        let send_errors = meter.u64_counter("send_errors").build();
        let read_errors = meter.u64_counter("read_errors").build();
        let skipped = meter.u64_counter("skipped").build();
        Metrics {
            submitted,
            sent,
            acked,
            send_errors,
            read_errors,
            skipped,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
