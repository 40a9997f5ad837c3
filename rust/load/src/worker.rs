use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use raftkv_types::raft_proto::PutRequest;
use raftkv_types::WorkItem;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::connection::KvConnection;
use crate::errors::SessionError;
use crate::session::{DrainOutcome, KvSession, SessionClose, StateCell, WorkerState};
use crate::Metrics;

/// A worker's persistent proposal stream.
///
/// Puts are pushed onto the outbound half of a long-lived `StreamProposals` call without waiting
/// for replies; a drain task counts the replies.  The stream is opened by the drain task so that
/// a server which withholds response headers until it sees the first request cannot stall the
/// worker.  A failure to open cancels the whole run.
pub struct StreamHandle {
    worker_id: usize,
    connection: KvConnection,
    outbound: Option<mpsc::Sender<PutRequest>>,
    cancel: CancellationToken,
    sent: u64,
    acked: Arc<AtomicU64>,
    drain: Option<JoinHandle<DrainOutcome>>,
    state: Arc<StateCell>,
    metrics: Arc<Metrics>,
}

struct DrainContext {
    worker_id: usize,
    connection: KvConnection,
    acked: Arc<AtomicU64>,
    state: Arc<StateCell>,
    cancel: CancellationToken,
    run: CancellationToken,
    grace: Duration,
    metrics: Arc<Metrics>,
}

impl StreamHandle {
    /// Start streaming on an already-dialed connection.  `run` is the run-scoped token; the
    /// handle works under a child of it.  `state` moves to `Streaming` once the server accepts
    /// the stream.
    pub fn open(
        worker_id: usize,
        connection: KvConnection,
        state: Arc<StateCell>,
        outbound_buffer: usize,
        grace: Duration,
        run: CancellationToken,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(outbound_buffer);
        let cancel = run.child_token();
        let acked = Arc::new(AtomicU64::new(0));
        let ctx = DrainContext {
            worker_id,
            connection: connection.clone(),
            acked: Arc::clone(&acked),
            state: Arc::clone(&state),
            cancel: cancel.clone(),
            run,
            grace,
            metrics: Arc::clone(&metrics),
        };
        let drain = tokio::spawn(drain_loop(ctx, ReceiverStream::new(rx)));
        tracing::debug!(worker_id, endpoint = connection.endpoint(), "opening proposal stream");
        StreamHandle {
            worker_id,
            connection,
            outbound: Some(tx),
            cancel,
            sent: 0,
            acked,
            drain: Some(drain),
            state,
            metrics,
        }
    }
}

async fn drain_loop(ctx: DrainContext, outbound: ReceiverStream<PutRequest>) -> DrainOutcome {
    let mut client = ctx.connection.client();
    let opened = tokio::select! {
        res = client.stream_proposals(outbound) => res,
        _ = async {
            ctx.cancel.cancelled().await;
            tokio::time::sleep(ctx.grace).await;
        } => return DrainOutcome::GraceExpired,
    };
    let mut inbound = match opened {
        Ok(resp) => resp.into_inner(),
        Err(status) => {
            tracing::error!(
                worker_id = ctx.worker_id,
                "failed to open proposal stream: {}",
                status
            );
            ctx.run.cancel();
            return DrainOutcome::OpenFailed(status);
        }
    };
    ctx.state.advance(WorkerState::Streaming);
    let ack = || {
        ctx.acked.fetch_add(1, Ordering::Relaxed);
        ctx.metrics.acked.add(1, &[]);
    };
    loop {
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break,
            msg = inbound.message() => match msg {
                Ok(Some(_)) => ack(),
                Ok(None) => return DrainOutcome::Completed,
                Err(status) => return DrainOutcome::Failed(status),
            },
        }
    }
    // Cancelled.  Keep counting until the server finishes or the grace runs out.
    let deadline = tokio::time::sleep(ctx.grace);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => return DrainOutcome::GraceExpired,
            msg = inbound.message() => match msg {
                Ok(Some(_)) => ack(),
                Ok(None) => return DrainOutcome::Completed,
                Err(status) => return DrainOutcome::Failed(status),
            },
        }
    }
}

#[async_trait]
impl KvSession for StreamHandle {
    fn worker_id(&self) -> usize {
        self.worker_id
    }

    fn connection(&self) -> &KvConnection {
        &self.connection
    }

    async fn put(&mut self, item: WorkItem) -> Result<(), SessionError> {
        let Some(outbound) = self.outbound.as_ref() else {
            return Err(SessionError::StreamClosed(self.worker_id));
        };
        outbound
            .send(PutRequest::from(item))
            .await
            .map_err(|_| SessionError::StreamClosed(self.worker_id))?;
        self.sent += 1;
        Ok(())
    }

    async fn close(mut self: Box<Self>) -> SessionClose {
        self.state.advance(WorkerState::Draining);
        // Half-close: the request stream ends once the buffered requests are flushed, and the
        // drain task runs until the server ends its side.  Only a cancelled run cuts it short.
        drop(self.outbound.take());
        let outcome = match self.drain.take() {
            Some(drain) => match drain.await {
                Ok(outcome) => outcome,
                Err(err) => DrainOutcome::Lost(err.to_string()),
            },
            None => DrainOutcome::Completed,
        };
        self.cancel.cancel();
        self.state.advance(WorkerState::Closed);
        let acked = self.acked.load(Ordering::Acquire);
        let failed = self.sent.saturating_sub(acked);
        if failed > 0 {
            self.metrics.send_errors.add(failed, &[]);
        }
        match &outcome {
            DrainOutcome::Completed if failed == 0 => {
                tracing::debug!(worker_id = self.worker_id, acked, "proposal stream closed")
            }
            outcome => tracing::warn!(
                worker_id = self.worker_id,
                sent = self.sent,
                acked,
                failed,
                "proposal stream ended: {}",
                outcome
            ),
        }
        SessionClose {
            states: self.state.history(),
            final_state: self.state.get(),
            acked,
            failed,
            outcome,
        }
        // The connection is released when `self` drops here, after the drain task has finished.
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
