#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use raftkv_load::{ClientConfig, LoadConfig};
use raftkv_types::raft_proto::raft_kv_service_server::{RaftKvService, RaftKvServiceServer};
use raftkv_types::raft_proto::{
    CacheHitsResponse, Empty, GetRequest, GetResponse, PutRequest, PutResponse,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tonic::{Request, Response, Status, Streaming};

/// What the fake service saw.
#[derive(Debug, Default)]
pub struct FakeState {
    pub unary_puts: AtomicU64,
    pub stream_puts: AtomicU64,
    pub gets: AtomicU64,
    pub streams_opened: AtomicU64,
    pub cache_hits: AtomicU64,
    pub store: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
    pub ack_delay: Option<Duration>,
    pub reject_streams: bool,
}

impl FakeState {
    pub fn puts(&self) -> u64 {
        self.unary_puts.load(Ordering::Acquire) + self.stream_puts.load(Ordering::Acquire)
    }

    pub fn value(&self, key: &[u8]) -> Option<Vec<u8>> {
        // SAFETY(raftkv): Mutex poisoning.
        self.store.lock().unwrap().get(key).cloned()
    }

    fn apply(&self, req: &PutRequest) {
        // SAFETY(raftkv): Mutex poisoning.
        let mut store = self.store.lock().unwrap();
        if req.value.is_empty() {
            store.remove(&req.key);
        } else {
            store.insert(req.key.clone(), req.value.clone());
        }
    }
}

#[derive(Clone, Debug)]
struct FakeRaftKv {
    state: Arc<FakeState>,
}

#[async_trait]
impl RaftKvService for FakeRaftKv {
    async fn put(&self, request: Request<PutRequest>) -> Result<Response<PutResponse>, Status> {
        let req = request.into_inner();
        if let Some(delay) = self.state.ack_delay {
            tokio::time::sleep(delay).await;
        }
        self.state.apply(&req);
        self.state.unary_puts.fetch_add(1, Ordering::AcqRel);
        Ok(Response::new(PutResponse {
            key: req.key,
            value: req.value,
        }))
    }

    async fn get(&self, request: Request<GetRequest>) -> Result<Response<GetResponse>, Status> {
        let req = request.into_inner();
        self.state.gets.fetch_add(1, Ordering::AcqRel);
        match self.state.value(&req.key) {
            Some(value) => {
                self.state.cache_hits.fetch_add(1, Ordering::AcqRel);
                Ok(Response::new(GetResponse { found: true, value }))
            }
            None => Ok(Response::new(GetResponse {
                found: false,
                value: vec![],
            })),
        }
    }

    async fn get_cache_hits(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<CacheHitsResponse>, Status> {
        Ok(Response::new(CacheHitsResponse {
            cachehits: self.state.cache_hits.load(Ordering::Acquire),
        }))
    }

    async fn reset_cache_hits(&self, _request: Request<Empty>) -> Result<Response<Empty>, Status> {
        self.state.cache_hits.store(0, Ordering::Release);
        Ok(Response::new(Empty {}))
    }

    type StreamProposalsStream = ReceiverStream<Result<PutResponse, Status>>;

    async fn stream_proposals(
        &self,
        request: Request<Streaming<PutRequest>>,
    ) -> Result<Response<Self::StreamProposalsStream>, Status> {
        if self.state.reject_streams {
            return Err(Status::unavailable("not the leader"));
        }
        self.state.streams_opened.fetch_add(1, Ordering::AcqRel);
        let mut inbound = request.into_inner();
        let (tx, rx) = mpsc::channel(1024);
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            while let Ok(Some(req)) = inbound.message().await {
                state.apply(&req);
                state.stream_puts.fetch_add(1, Ordering::AcqRel);
                if let Some(delay) = state.ack_delay {
                    tokio::time::sleep(delay).await;
                }
                let resp = PutResponse {
                    key: req.key,
                    value: req.value,
                };
                if tx.send(Ok(resp)).await.is_err() {
                    break;
                }
            }
        });
        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

/// Serve a fake on an ephemeral loopback port and return its address.
pub async fn serve(state: Arc<FakeState>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let service = RaftKvServiceServer::new(FakeRaftKv { state });
    tokio::spawn(async move {
        let _ = tonic::transport::Server::builder()
            .add_service(service)
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await;
    });
    format!("127.0.0.1:{}", addr.port())
}

/// A small run against `endpoint`.
pub fn test_config(endpoint: &str, parallel: usize, total_ops: u64) -> LoadConfig {
    LoadConfig {
        parallel,
        total_ops,
        client: ClientConfig {
            endpoints: vec![endpoint.to_string()],
            connect_timeout_ms: 1000,
            drain_grace_ms: 2000,
            ..ClientConfig::default()
        },
        ..LoadConfig::default()
    }
}
