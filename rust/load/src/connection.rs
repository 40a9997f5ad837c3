use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use raftkv_types::raft_proto::raft_kv_service_client::RaftKvServiceClient;
use raftkv_types::raft_proto::{self, Empty};
use raftkv_types::WorkItem;
use tonic::transport::{Channel, Endpoint};

use crate::config::ClientConfig;
use crate::errors::{Error, SessionError};

/// Counts connections opened and closed during a run.
#[derive(Debug, Default)]
pub struct ConnectionLedger {
    opened: AtomicU64,
    closed: AtomicU64,
}

impl ConnectionLedger {
    pub fn opened(&self) -> u64 {
        self.opened.load(Ordering::Acquire)
    }

    pub fn closed(&self) -> u64 {
        self.closed.load(Ordering::Acquire)
    }
}

/// Records the close of a connection when the last handle to it goes away.
#[derive(Debug)]
struct ConnectionLease {
    ledger: Arc<ConnectionLedger>,
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        self.ledger.closed.fetch_add(1, Ordering::AcqRel);
    }
}

/// A dialed connection to one endpoint.  Clones share the underlying HTTP/2 connection, which
/// closes when the last clone is dropped.
#[derive(Clone, Debug)]
pub struct KvConnection {
    endpoint: String,
    client: RaftKvServiceClient<Channel>,
    request_timeout: Duration,
    _lease: Arc<ConnectionLease>,
}

fn endpoint_uri(endpoint: &str) -> String {
    if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{}", endpoint)
    }
}

/// Dial `endpoint`, failing if the connection is not up within the configured dial timeout.
pub async fn dial(
    endpoint: &str,
    config: &ClientConfig,
    ledger: Arc<ConnectionLedger>,
) -> Result<KvConnection, Error> {
    let uri = endpoint_uri(endpoint);
    let timeout = Duration::from_millis(config.connect_timeout_ms);
    let endpoint = Endpoint::from_shared(uri.clone())
        .map_err(|source| Error::InvalidEndpoint {
            endpoint: uri.clone(),
            source,
        })?
        .connect_timeout(timeout)
        .initial_stream_window_size(config.initial_stream_window_size)
        .initial_connection_window_size(config.initial_connection_window_size)
        .tcp_nodelay(true);
    tracing::debug!("dialing {}", uri);
    let channel = match tokio::time::timeout(timeout, endpoint.connect()).await {
        Ok(Ok(channel)) => channel,
        Ok(Err(source)) => {
            return Err(Error::Dial {
                endpoint: uri,
                source,
            })
        }
        Err(_) => {
            return Err(Error::DialTimeout {
                endpoint: uri,
                timeout,
            })
        }
    };
    let client = RaftKvServiceClient::new(channel)
        .max_encoding_message_size(config.max_encoding_message_size)
        .max_decoding_message_size(config.max_decoding_message_size);
    ledger.opened.fetch_add(1, Ordering::AcqRel);
    Ok(KvConnection {
        endpoint: uri,
        client,
        request_timeout: Duration::from_millis(config.request_timeout_ms),
        _lease: Arc::new(ConnectionLease { ledger }),
    })
}

impl KvConnection {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// A client on this connection.  Clients are cheap to clone and share the connection.
    pub fn client(&self) -> RaftKvServiceClient<Channel> {
        self.client.clone()
    }

    async fn with_deadline<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, tonic::Status>>,
    ) -> Result<T, SessionError> {
        match tokio::time::timeout(self.request_timeout, fut).await {
            Ok(res) => Ok(res?),
            Err(_) => Err(SessionError::Timeout(self.request_timeout)),
        }
    }

    pub async fn put(&self, item: WorkItem) -> Result<(), SessionError> {
        let mut client = self.client();
        let req = raft_proto::PutRequest::from(item);
        self.with_deadline(client.put(req)).await?;
        Ok(())
    }

    /// Point read.  A key the service does not hold is [SessionError::NotFound].
    pub async fn get(&self, key: Bytes) -> Result<Bytes, SessionError> {
        let mut client = self.client();
        let req = raft_proto::GetRequest { key: key.to_vec() };
        let resp = self.with_deadline(client.get(req)).await?.into_inner();
        if !resp.found {
            return Err(SessionError::NotFound);
        }
        Ok(Bytes::from(resp.value))
    }

    pub async fn cache_hits(&self) -> Result<u64, SessionError> {
        let mut client = self.client();
        let resp = self.with_deadline(client.get_cache_hits(Empty {})).await?;
        Ok(resp.into_inner().cachehits)
    }

    pub async fn reset_cache_hits(&self) -> Result<(), SessionError> {
        let mut client = self.client();
        self.with_deadline(client.reset_cache_hits(Empty {}))
            .await?;
        Ok(())
    }
}
