use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::connection::{dial, ConnectionLedger, KvConnection};
use crate::errors::Error;
use crate::session::{KvSession, StateCell, WorkerState};
use crate::unary::UnaryHandle;
use crate::worker::StreamHandle;
use crate::Metrics;

/// Everything a binding needs to open one worker's session.
#[derive(Clone, Debug)]
pub struct SessionContext {
    pub worker_id: usize,
    pub endpoint: String,
    pub client: ClientConfig,
    pub unary_in_flight: usize,
    pub ledger: Arc<ConnectionLedger>,
    /// The run-scoped cancellation token.
    pub cancel: CancellationToken,
    pub metrics: Arc<Metrics>,
}

/// A way of putting items to the service.
#[async_trait]
pub trait Binding: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;
    async fn open(&self, ctx: SessionContext) -> Result<Box<dyn KvSession>, Error>;
}

/// Dial the worker's endpoint, taking a fresh session from `Idle` to `Connected`.
async fn connect(ctx: &SessionContext) -> Result<(Arc<StateCell>, KvConnection), Error> {
    let state = Arc::new(StateCell::default());
    let connection = dial(&ctx.endpoint, &ctx.client, Arc::clone(&ctx.ledger)).await?;
    state.advance(WorkerState::Connected);
    Ok((state, connection))
}

/// Puts over one long-lived `StreamProposals` call per worker.
#[derive(Debug, Default)]
pub struct StreamBinding;

#[async_trait]
impl Binding for StreamBinding {
    fn name(&self) -> &'static str {
        "raft"
    }

    async fn open(&self, ctx: SessionContext) -> Result<Box<dyn KvSession>, Error> {
        let (state, connection) = connect(&ctx).await?;
        Ok(Box::new(StreamHandle::open(
            ctx.worker_id,
            connection,
            state,
            ctx.client.outbound_buffer,
            Duration::from_millis(ctx.client.drain_grace_ms),
            ctx.cancel,
            ctx.metrics,
        )))
    }
}

/// Puts as individual `Put` calls.
#[derive(Debug, Default)]
pub struct UnaryBinding;

#[async_trait]
impl Binding for UnaryBinding {
    fn name(&self) -> &'static str {
        "raft-unary"
    }

    async fn open(&self, ctx: SessionContext) -> Result<Box<dyn KvSession>, Error> {
        let (state, connection) = connect(&ctx).await?;
        Ok(Box::new(UnaryHandle::new(
            ctx.worker_id,
            connection,
            state,
            ctx.unary_in_flight,
            Duration::from_millis(ctx.client.drain_grace_ms),
            ctx.cancel,
            ctx.metrics,
        )))
    }
}

/// Maps configured binding names to bindings.  Built once at startup and handed to the runner.
#[derive(Clone, Debug, Default)]
pub struct BindingRegistry {
    bindings: HashMap<&'static str, Arc<dyn Binding>>,
}

impl BindingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the streaming (`raft`) and unary (`raft-unary`) bindings.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(StreamBinding));
        registry.register(Arc::new(UnaryBinding));
        registry
    }

    /// Register a binding under its name, replacing any binding of the same name.
    pub fn register(&mut self, binding: Arc<dyn Binding>) {
        self.bindings.insert(binding.name(), binding);
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.bindings.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Binding>, Error> {
        self.bindings
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownBinding(name.to_string(), self.names().join(", ")))
    }
}
