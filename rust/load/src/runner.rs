use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::binding::{BindingRegistry, SessionContext};
use crate::config::{ConfigError, LoadConfig};
use crate::connection::ConnectionLedger;
use crate::dispatcher::{dispatch, work_queue, worker_loop, ProgressSink, WorkerSummary};
use crate::errors::Error;
use crate::session::{DrainOutcome, KvSession};
use crate::stats::{throughput, RunReport, StatsCollector};
use crate::workload::Workload;
use crate::Metrics;

/// Drives runs: opens one session per worker, dispatches a workload across them, and reports.
#[derive(Debug)]
pub struct BenchmarkRunner {
    config: LoadConfig,
    registry: BindingRegistry,
    metrics: Arc<Metrics>,
}

impl BenchmarkRunner {
    pub fn new(config: LoadConfig, registry: BindingRegistry) -> Self {
        BenchmarkRunner {
            config,
            registry,
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn config(&self) -> &LoadConfig {
        &self.config
    }

    async fn stats_collector(&self) -> StatsCollector {
        if !self.config.collect_cache_hits && !self.config.reset_cache_hits {
            return StatsCollector::disconnected();
        }
        match self.config.client.endpoint_for(0) {
            Some(endpoint) => StatsCollector::connect(endpoint, &self.config.client).await,
            None => StatsCollector::disconnected(),
        }
    }

    async fn open_sessions(
        &self,
        ledger: &Arc<ConnectionLedger>,
        run: &CancellationToken,
    ) -> Result<Vec<Box<dyn KvSession>>, Error> {
        let binding = self.registry.get(&self.config.binding)?;
        let mut contexts = Vec::with_capacity(self.config.parallel);
        for worker_id in 0..self.config.parallel {
            let Some(endpoint) = self.config.client.endpoint_for(worker_id) else {
                return Err(ConfigError::Invalid("no endpoints configured".to_string()).into());
            };
            contexts.push(SessionContext {
                worker_id,
                endpoint: endpoint.to_string(),
                client: self.config.client.clone(),
                unary_in_flight: self.config.unary_in_flight,
                ledger: Arc::clone(ledger),
                cancel: run.clone(),
                metrics: Arc::clone(&self.metrics),
            });
        }
        let opened =
            futures::future::join_all(contexts.into_iter().map(|ctx| binding.open(ctx))).await;
        let mut sessions = Vec::with_capacity(opened.len());
        let mut first_err = None;
        for res in opened {
            match res {
                Ok(session) => sessions.push(session),
                Err(err) => {
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
            }
        }
        if let Some(err) = first_err {
            // Workers that did come up are torn down before the run fails.
            run.cancel();
            for session in sessions {
                session.close().await;
            }
            return Err(err);
        }
        Ok(sessions)
    }

    /// Run `workload` for up to `total_ops` operations.
    ///
    /// Setup failures (bad configuration, unknown binding, dial failure, a stream that will not
    /// open) are returned as errors with every opened connection closed.  Per-request failures
    /// are only counted.  Cancelling `cancel`, or reaching the maximum execution time, ends the
    /// run early with partial counts.
    pub async fn run(
        &self,
        phase: &str,
        workload: &dyn Workload,
        total_ops: u64,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<RunReport, Error> {
        self.config.validate()?;
        let run = cancel.child_token();
        let ledger = Arc::new(ConnectionLedger::default());

        let stats = self.stats_collector().await;
        if self.config.reset_cache_hits && stats.reset_cache_hits().await {
            tracing::info!("reset cache hits");
        }
        let cache_hits_before = if self.config.collect_cache_hits {
            stats.cache_hits().await
        } else {
            None
        };

        tracing::info!(
            phase,
            workload = workload.name(),
            binding = self.config.binding.as_str(),
            workers = self.config.parallel,
            total_ops,
            "starting run"
        );
        let sessions = self.open_sessions(&ledger, &run).await?;

        let (tx, rx) = work_queue(self.config.parallel);
        let workers: Vec<_> = sessions
            .into_iter()
            .map(|session| {
                tokio::spawn(worker_loop(
                    session,
                    rx.clone(),
                    run.clone(),
                    Arc::clone(&self.metrics),
                ))
            })
            .collect();
        drop(rx);

        let timed_out = Arc::new(AtomicBool::new(false));
        let timer = self.config.max_execution_time_secs.map(|secs| {
            let run = run.clone();
            let timed_out = Arc::clone(&timed_out);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(secs)).await;
                tracing::warn!("maximum execution time of {}s reached", secs);
                timed_out.store(true, Ordering::Release);
                run.cancel();
            })
        });

        let outcome = dispatch(workload, total_ops, tx, progress, &run, &self.metrics).await;
        progress.finish();

        let mut per_worker: Vec<WorkerSummary> = Vec::with_capacity(workers.len());
        let mut open_failure = None;
        let mut join_failure = None;
        for worker in workers {
            match worker.await {
                Ok((summary, close)) => {
                    if let DrainOutcome::OpenFailed(status) = close.outcome {
                        open_failure.get_or_insert((summary.worker_id, status));
                    }
                    per_worker.push(summary);
                }
                Err(err) => {
                    run.cancel();
                    join_failure.get_or_insert(err);
                }
            }
        }
        if let Some(timer) = timer {
            timer.abort();
        }
        if let Some(err) = join_failure {
            return Err(err.into());
        }
        if let Some((worker, status)) = open_failure {
            return Err(Error::StreamOpen { worker, status });
        }

        let cache_hits_after = if self.config.collect_cache_hits {
            stats.cache_hits().await
        } else {
            None
        };

        let sum = |f: fn(&WorkerSummary) -> u64| per_worker.iter().map(f).sum::<u64>();
        let report = RunReport {
            phase: phase.to_string(),
            binding: self.config.binding.clone(),
            workers: per_worker.len(),
            submitted: outcome.submitted,
            skipped: outcome.skipped,
            elapsed: outcome.elapsed,
            throughput: throughput(outcome.submitted, outcome.elapsed),
            sent: sum(|w| w.sent),
            acked: sum(|w| w.acked),
            send_errors: sum(|w| w.send_errors),
            reads: sum(|w| w.reads),
            read_errors: sum(|w| w.read_errors),
            cache_hits_before,
            cache_hits_after,
            connections_opened: ledger.opened(),
            connections_closed: ledger.closed(),
            exhausted: outcome.exhausted,
            cancelled: outcome.cancelled || cancel.is_cancelled(),
            timed_out: timed_out.load(Ordering::Acquire),
            per_worker,
        };
        tracing::info!(
            phase,
            submitted = report.submitted,
            acked = report.acked,
            send_errors = report.send_errors,
            read_errors = report.read_errors,
            throughput = report.throughput,
            "run finished"
        );
        Ok(report)
    }
}
