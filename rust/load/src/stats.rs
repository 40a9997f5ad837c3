use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::ClientConfig;
use crate::connection::{dial, ConnectionLedger, KvConnection};
use crate::dispatcher::WorkerSummary;

/// Operations per second; zero when no time has elapsed.
pub fn throughput(ops: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        ops as f64 / secs
    } else {
        0.0
    }
}

////////////////////////////////////////// StatsCollector //////////////////////////////////////////

/// Out-of-band access to the server's cache-hit counter over a connection of its own.
///
/// Nothing here is fatal: a failure is logged and shows up as a missing value in the report.
#[derive(Clone, Debug)]
pub struct StatsCollector {
    connection: Option<KvConnection>,
}

impl StatsCollector {
    pub async fn connect(endpoint: &str, config: &ClientConfig) -> Self {
        let ledger = Arc::new(ConnectionLedger::default());
        match dial(endpoint, config, ledger).await {
            Ok(connection) => StatsCollector {
                connection: Some(connection),
            },
            Err(err) => {
                tracing::warn!("stats collector could not connect: {}", err);
                StatsCollector { connection: None }
            }
        }
    }

    pub fn disconnected() -> Self {
        StatsCollector { connection: None }
    }

    pub async fn cache_hits(&self) -> Option<u64> {
        let connection = self.connection.as_ref()?;
        match connection.cache_hits().await {
            Ok(hits) => Some(hits),
            Err(err) => {
                tracing::warn!("could not fetch cache hits: {}", err);
                None
            }
        }
    }

    pub async fn reset_cache_hits(&self) -> bool {
        let Some(connection) = self.connection.as_ref() else {
            return false;
        };
        match connection.reset_cache_hits().await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!("could not reset cache hits: {}", err);
                false
            }
        }
    }
}

///////////////////////////////////////////// RunReport ////////////////////////////////////////////

/// The outcome of one run.
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub phase: String,
    pub binding: String,
    pub workers: usize,
    pub submitted: u64,
    pub skipped: u64,
    pub elapsed: Duration,
    pub throughput: f64,
    pub sent: u64,
    pub acked: u64,
    pub send_errors: u64,
    pub reads: u64,
    pub read_errors: u64,
    pub cache_hits_before: Option<u64>,
    pub cache_hits_after: Option<u64>,
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub exhausted: bool,
    pub cancelled: bool,
    pub timed_out: bool,
    pub per_worker: Vec<WorkerSummary>,
}

impl RunReport {
    /// Cache hits accrued during the run, when both ends were fetched.
    pub fn cache_hit_delta(&self) -> Option<u64> {
        match (self.cache_hits_before, self.cache_hits_after) {
            (Some(before), Some(after)) => Some(after.saturating_sub(before)),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Done {} ops in {:?} → {:.2} ops/sec",
            self.submitted, self.elapsed, self.throughput
        )
    }
}
