use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use raftkv_types::WorkItem;
use serde::Serialize;

use crate::connection::KvConnection;
use crate::errors::SessionError;

/// Lifecycle of a worker's session.  A session only moves forward and enters `Closed` once.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum WorkerState {
    #[default]
    Idle = 0,
    Connected = 1,
    Streaming = 2,
    Draining = 3,
    Closed = 4,
}

impl WorkerState {
    const ALL: [WorkerState; 5] = [
        WorkerState::Idle,
        WorkerState::Connected,
        WorkerState::Streaming,
        WorkerState::Draining,
        WorkerState::Closed,
    ];

    fn from_u8(v: u8) -> Self {
        Self::ALL
            .get(v as usize)
            .copied()
            .unwrap_or(WorkerState::Closed)
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Idle => f.write_str("idle"),
            WorkerState::Connected => f.write_str("connected"),
            WorkerState::Streaming => f.write_str("streaming"),
            WorkerState::Draining => f.write_str("draining"),
            WorkerState::Closed => f.write_str("closed"),
        }
    }
}

/// The state of one session, shared with its background tasks.  Transitions never go backwards;
/// every state passed through is remembered.
#[derive(Debug)]
pub struct StateCell {
    current: AtomicU8,
    visited: AtomicU8,
}

impl Default for StateCell {
    fn default() -> Self {
        StateCell {
            current: AtomicU8::new(WorkerState::Idle as u8),
            visited: AtomicU8::new(WorkerState::Idle.bit()),
        }
    }
}

impl StateCell {
    pub fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.current.load(Ordering::Acquire))
    }

    /// Move to `next`.  Returns false, leaving the state alone, if the session is already at or
    /// past `next`.
    pub fn advance(&self, next: WorkerState) -> bool {
        let prev = self.current.fetch_max(next as u8, Ordering::AcqRel);
        if prev < next as u8 {
            self.visited.fetch_or(next.bit(), Ordering::AcqRel);
            true
        } else {
            false
        }
    }

    /// The states entered so far, in lifecycle order.
    pub fn history(&self) -> Vec<WorkerState> {
        let visited = self.visited.load(Ordering::Acquire);
        WorkerState::ALL
            .into_iter()
            .filter(|s| visited & s.bit() != 0)
            .collect()
    }
}

/// How the acknowledgment side of a session ended.
#[derive(Debug)]
pub enum DrainOutcome {
    /// The server closed its side cleanly.
    Completed,
    /// The grace period ran out before the server closed its side.
    GraceExpired,
    /// The acknowledgment stream failed.
    Failed(tonic::Status),
    /// The stream never opened.
    OpenFailed(tonic::Status),
    /// The drain task died.
    Lost(String),
}

impl std::fmt::Display for DrainOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DrainOutcome::Completed => f.write_str("completed"),
            DrainOutcome::GraceExpired => f.write_str("grace period expired"),
            DrainOutcome::Failed(status) => write!(f, "failed: {}", status.message()),
            DrainOutcome::OpenFailed(status) => write!(f, "open failed: {}", status.message()),
            DrainOutcome::Lost(err) => write!(f, "drain task lost: {}", err),
        }
    }
}

/// What a session reports when it closes.
#[derive(Debug)]
pub struct SessionClose {
    /// Every state the session passed through, ending in `Closed`.
    pub states: Vec<WorkerState>,
    pub final_state: WorkerState,
    pub acked: u64,
    /// Puts accepted for sending that were never acknowledged, because they failed or were
    /// abandoned when a cancelled run's grace period ran out.
    pub failed: u64,
    pub outcome: DrainOutcome,
}

/// One worker's path to the service.
///
/// Writes go through `put`, which returns as soon as the item is handed to the transport; the
/// acknowledgment is counted asynchronously.  Point reads always use the unary `Get` on the
/// session's connection.
#[async_trait]
pub trait KvSession: Send {
    fn worker_id(&self) -> usize;
    fn connection(&self) -> &KvConnection;

    async fn put(&mut self, item: WorkItem) -> Result<(), SessionError>;

    async fn get(&mut self, key: Bytes) -> Result<Bytes, SessionError> {
        let connection = self.connection().clone();
        connection.get(key).await
    }

    /// Half-close, drain, and drop the connection, in that order.  Draining waits for the server
    /// to finish unless the run was cancelled, in which case it is bounded by the grace period.
    async fn close(self: Box<Self>) -> SessionClose;
}
