use std::time::Duration;

use raftkv_error::{ErrorCodes, RaftKvError};
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that stop a run.  Everything here is a setup failure: the binaries print the cause and
/// exit non-zero.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("no binding named {0:?}; known bindings: {1}")]
    UnknownBinding(String, String),
    #[error("invalid endpoint {endpoint}: {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: tonic::transport::Error,
    },
    #[error("failed to dial {endpoint}: {source}")]
    Dial {
        endpoint: String,
        #[source]
        source: tonic::transport::Error,
    },
    #[error("timed out dialing {endpoint} after {timeout:?}")]
    DialTimeout { endpoint: String, timeout: Duration },
    #[error("worker {worker} failed to open its proposal stream: {status}")]
    StreamOpen { worker: usize, status: tonic::Status },
    #[error(transparent)]
    Trace(#[from] TraceError),
    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl RaftKvError for Error {
    fn code(&self) -> ErrorCodes {
        match self {
            Error::Config(err) => err.code(),
            Error::UnknownBinding(..) => ErrorCodes::InvalidArgument,
            Error::InvalidEndpoint { .. } => ErrorCodes::InvalidArgument,
            Error::Dial { .. } => ErrorCodes::Unavailable,
            Error::DialTimeout { .. } => ErrorCodes::DeadlineExceeded,
            Error::StreamOpen { status, .. } => status.code().into(),
            Error::Trace(err) => err.code(),
            Error::Join(_) => ErrorCodes::Internal,
        }
    }
}

/// Per-request failures.  These are absorbed at the worker boundary and surface only through
/// logs and counters.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("key not found")]
    NotFound,
    #[error("rpc failed: {0}")]
    Rpc(#[from] tonic::Status),
    #[error("proposal stream of worker {0} is closed")]
    StreamClosed(usize),
    #[error("request deadline of {0:?} exceeded")]
    Timeout(Duration),
}

impl RaftKvError for SessionError {
    fn code(&self) -> ErrorCodes {
        match self {
            SessionError::NotFound => ErrorCodes::NotFound,
            SessionError::Rpc(status) => status.code().into(),
            SessionError::StreamClosed(_) => ErrorCodes::Unavailable,
            SessionError::Timeout(_) => ErrorCodes::DeadlineExceeded,
        }
    }

    fn should_trace_error(&self) -> bool {
        !matches!(self, SessionError::NotFound)
    }
}

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("could not open trace {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not read trace: {0}")]
    Io(#[from] std::io::Error),
    #[error("trace {0} holds no usable records")]
    Empty(String),
}

impl RaftKvError for TraceError {
    fn code(&self) -> ErrorCodes {
        match self {
            TraceError::Open { source, .. } => source.code(),
            TraceError::Io(err) => err.code(),
            TraceError::Empty(_) => ErrorCodes::FailedPrecondition,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_distinct_from_transport_errors() {
        let not_found = SessionError::NotFound;
        let transport = SessionError::Rpc(tonic::Status::unavailable("connection reset"));
        assert_eq!(ErrorCodes::NotFound, not_found.code());
        assert_eq!(ErrorCodes::Unavailable, transport.code());
        assert!(!not_found.should_trace_error());
        assert!(transport.should_trace_error());
    }

    #[test]
    fn setup_errors_carry_their_codes() {
        let err = Error::DialTimeout {
            endpoint: "http://localhost:12380".to_string(),
            timeout: Duration::from_secs(2),
        };
        assert_eq!(ErrorCodes::DeadlineExceeded, err.code());
        let err = Error::Trace(TraceError::Empty("trace.csv".to_string()));
        assert_eq!(ErrorCodes::FailedPrecondition, err.code());
        let err = Error::UnknownBinding("etcd".to_string(), "raft".to_string());
        assert_eq!(ErrorCodes::InvalidArgument, err.code());
        assert_eq!("InvalidArgumentError", err.boxed().code().name());
    }
}
