use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use raftkv_types::WorkItem;
use tokio_util::sync::CancellationToken;

use crate::connection::KvConnection;
use crate::errors::SessionError;
use crate::session::{DrainOutcome, KvSession, SessionClose, StateCell, WorkerState};
use crate::Metrics;

/// Put path that issues one unary `Put` per item.
///
/// Up to `window` puts are outstanding per worker.  Completions are reaped opportunistically on
/// every put and in full on close, so a put only waits when the window is full.  Close waits for
/// every outstanding put unless the run is cancelled, in which case the grace period bounds it
/// and whatever is left counts as failed.
pub struct UnaryHandle {
    worker_id: usize,
    connection: KvConnection,
    in_flight: FuturesUnordered<BoxFuture<'static, Result<(), SessionError>>>,
    window: usize,
    acked: u64,
    failed: u64,
    grace: Duration,
    cancel: CancellationToken,
    state: Arc<StateCell>,
    metrics: Arc<Metrics>,
}

impl UnaryHandle {
    pub fn new(
        worker_id: usize,
        connection: KvConnection,
        state: Arc<StateCell>,
        window: usize,
        grace: Duration,
        cancel: CancellationToken,
        metrics: Arc<Metrics>,
    ) -> Self {
        UnaryHandle {
            worker_id,
            connection,
            in_flight: FuturesUnordered::new(),
            window: window.max(1),
            acked: 0,
            failed: 0,
            grace,
            cancel,
            state,
            metrics,
        }
    }

    fn record(&mut self, res: Result<(), SessionError>) {
        match res {
            Ok(()) => {
                self.acked += 1;
                self.metrics.acked.add(1, &[]);
            }
            Err(err) => {
                self.failed += 1;
                self.metrics.send_errors.add(1, &[]);
                tracing::warn!(worker_id = self.worker_id, "unary put failed: {}", err);
            }
        }
    }

    fn reap_ready(&mut self) {
        while let Some(Some(res)) = self.in_flight.next().now_or_never() {
            self.record(res);
        }
    }
}

#[async_trait]
impl KvSession for UnaryHandle {
    fn worker_id(&self) -> usize {
        self.worker_id
    }

    fn connection(&self) -> &KvConnection {
        &self.connection
    }

    async fn put(&mut self, item: WorkItem) -> Result<(), SessionError> {
        while self.in_flight.len() >= self.window {
            match self.in_flight.next().await {
                Some(res) => self.record(res),
                None => break,
            }
        }
        let connection = self.connection.clone();
        self.in_flight
            .push(async move { connection.put(item).await }.boxed());
        // Polling once hands the new request to the transport.
        self.reap_ready();
        Ok(())
    }

    async fn close(mut self: Box<Self>) -> SessionClose {
        self.state.advance(WorkerState::Draining);
        let cancel = self.cancel.clone();
        let grace = self.grace;
        let expired = async move {
            cancel.cancelled_owned().await;
            tokio::time::sleep(grace).await;
        };
        tokio::pin!(expired);
        let outcome = loop {
            tokio::select! {
                res = self.in_flight.next() => match res {
                    Some(res) => self.record(res),
                    None => break DrainOutcome::Completed,
                },
                _ = &mut expired => break DrainOutcome::GraceExpired,
            }
        };
        let abandoned = self.in_flight.len() as u64;
        if abandoned > 0 {
            tracing::warn!(
                worker_id = self.worker_id,
                abandoned,
                "unary puts still outstanding when the grace period ran out"
            );
            self.failed += abandoned;
            self.metrics.send_errors.add(abandoned, &[]);
        }
        self.in_flight.clear();
        self.state.advance(WorkerState::Closed);
        SessionClose {
            states: self.state.history(),
            final_state: self.state.get(),
            acked: self.acked,
            failed: self.failed,
            outcome,
        }
    }
}
