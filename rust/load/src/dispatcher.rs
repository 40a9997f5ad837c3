use std::sync::Arc;
use std::time::{Duration, Instant};

use async_channel::{Receiver, Sender};
use bytes::Bytes;
use raftkv_error::RaftKvError;
use raftkv_types::{KvOp, WorkItem};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::session::{KvSession, SessionClose, WorkerState};
use crate::workload::Workload;
use crate::Metrics;

/////////////////////////////////////////// ProgressSink ///////////////////////////////////////////

/// Receives one tick per operation taken from the workload.  Progress tracks offered load, so it
/// ticks on submission, never on acknowledgment.
pub trait ProgressSink: Send + Sync {
    fn submitted(&self);
    fn finish(&self) {}
}

/// Discards progress.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn submitted(&self) {}
}

impl ProgressSink for indicatif::ProgressBar {
    fn submitted(&self) {
        self.inc(1);
    }

    fn finish(&self) {
        indicatif::ProgressBar::finish(self);
    }
}

/// A progress bar sized for `total` operations.
pub fn progress_bar(total: u64) -> indicatif::ProgressBar {
    let bar = indicatif::ProgressBar::new(total);
    if let Ok(style) = indicatif::ProgressStyle::with_template(
        "{elapsed_precise} [{bar:60}] {pos}/{len} ({per_sec})",
    ) {
        bar.set_style(style);
    }
    bar
}

///////////////////////////////////////////// Dispatch /////////////////////////////////////////////

/// The work queue shared by the producer and every worker.  Capacity equals the worker count, so
/// the producer runs at most one item per worker ahead.
pub fn work_queue(workers: usize) -> (Sender<KvOp>, Receiver<KvOp>) {
    async_channel::bounded(workers.max(1))
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DispatchOutcome {
    /// Operations handed to the queue.
    pub submitted: u64,
    /// No-op operations drawn from the workload and dropped.
    pub skipped: u64,
    /// Time from the first submission to the last.
    pub elapsed: Duration,
    /// The workload ran dry before `total_ops`.
    pub exhausted: bool,
    pub cancelled: bool,
}

/// Draw up to `total_ops` operations from `workload` and push them onto the queue as fast as the
/// queue admits them.  The queue is closed on return, whatever the reason.
pub async fn dispatch(
    workload: &dyn Workload,
    total_ops: u64,
    queue: Sender<KvOp>,
    progress: &dyn ProgressSink,
    cancel: &CancellationToken,
    metrics: &Metrics,
) -> DispatchOutcome {
    let mut outcome = DispatchOutcome::default();
    let start = Instant::now();
    for _ in 0..total_ops {
        if cancel.is_cancelled() {
            outcome.cancelled = true;
            break;
        }
        let Some(op) = workload.next_op() else {
            outcome.exhausted = true;
            break;
        };
        if op.is_nop() {
            outcome.skipped += 1;
            metrics.skipped.add(1, &[]);
            progress.submitted();
            continue;
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                outcome.cancelled = true;
                break;
            }
            res = queue.send(op) => {
                if res.is_err() {
                    // Every worker has gone away.
                    outcome.cancelled = true;
                    break;
                }
            }
        }
        outcome.submitted += 1;
        metrics.submitted.add(1, &[]);
        progress.submitted();
    }
    outcome.elapsed = start.elapsed();
    queue.close();
    outcome
}

////////////////////////////////////////////// Worker //////////////////////////////////////////////

/// What one worker did over a run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WorkerSummary {
    pub worker_id: usize,
    /// Puts handed to the transport.
    pub sent: u64,
    pub acked: u64,
    pub send_errors: u64,
    pub reads: u64,
    pub read_errors: u64,
    /// The states the worker's session passed through.
    pub states: Vec<WorkerState>,
    pub final_state: WorkerState,
    pub outcome: String,
}

#[derive(Debug, Default)]
struct Tally {
    sent: u64,
    send_errors: u64,
    reads: u64,
    read_errors: u64,
}

async fn write(session: &mut dyn KvSession, item: WorkItem, tally: &mut Tally, metrics: &Metrics) {
    match session.put(item).await {
        Ok(()) => {
            tally.sent += 1;
            metrics.sent.add(1, &[]);
        }
        Err(err) => {
            tally.send_errors += 1;
            metrics.send_errors.add(1, &[]);
            tracing::warn!(
                worker_id = session.worker_id(),
                code = err.code().name(),
                "send failed: {}",
                err
            );
        }
    }
}

async fn read(session: &mut dyn KvSession, key: Bytes, tally: &mut Tally, metrics: &Metrics) -> bool {
    tally.reads += 1;
    match session.get(key).await {
        Ok(_) => true,
        Err(err) => {
            tally.read_errors += 1;
            metrics.read_errors.add(1, &[]);
            // Missing keys are expected in a replayed trace; only real failures are warnings.
            if err.should_trace_error() {
                tracing::warn!(
                    worker_id = session.worker_id(),
                    code = err.code().name(),
                    "read failed: {}",
                    err
                );
            } else {
                tracing::debug!(worker_id = session.worker_id(), "read failed: {}", err);
            }
            false
        }
    }
}

async fn execute(session: &mut dyn KvSession, op: KvOp, tally: &mut Tally, metrics: &Metrics) {
    tracing::trace!(worker_id = session.worker_id(), op = %op.kind(), "executing");
    match op {
        KvOp::Put(item) | KvOp::Insert(item) => write(session, item, tally, metrics).await,
        KvOp::Delete(key) => write(session, WorkItem::tombstone(key), tally, metrics).await,
        KvOp::Read(key) => {
            read(session, key, tally, metrics).await;
        }
        KvOp::ReadModifyWrite(item) => {
            // A failed read short-circuits the write.
            if read(session, item.key().clone(), tally, metrics).await {
                write(session, item, tally, metrics).await;
            }
        }
        KvOp::Nop => {}
    }
}

/// Pull operations off the queue until it closes or the run is cancelled, then close the session.
pub async fn worker_loop(
    mut session: Box<dyn KvSession>,
    queue: Receiver<KvOp>,
    cancel: CancellationToken,
    metrics: Arc<Metrics>,
) -> (WorkerSummary, SessionClose) {
    let mut tally = Tally::default();
    loop {
        let op = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            op = queue.recv() => match op {
                Ok(op) => op,
                Err(_) => break,
            },
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = execute(session.as_mut(), op, &mut tally, &metrics) => {}
        }
    }
    let worker_id = session.worker_id();
    let close = session.close().await;
    let summary = WorkerSummary {
        worker_id,
        sent: tally.sent,
        acked: close.acked,
        send_errors: tally.send_errors + close.failed,
        reads: tally.reads,
        read_errors: tally.read_errors,
        states: close.states.clone(),
        final_state: close.final_state,
        outcome: close.outcome.to_string(),
    };
    tracing::debug!(
        worker_id,
        sent = summary.sent,
        acked = summary.acked,
        send_errors = summary.send_errors,
        read_errors = summary.read_errors,
        "worker finished"
    );
    (summary, close)
}
