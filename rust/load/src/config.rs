use figment::providers::{Env, Format, Yaml};
use raftkv_error::{ErrorCodes, RaftKvError};
use raftkv_tracing::{LogFilter, TracingConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_CONFIG_PATH: &str = "./raftkv_load_config.yaml";
const CONFIG_PATH_ENV_VAR: &str = "CONFIG_PATH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("error loading config: {0}")]
    Figment(#[from] Box<figment::Error>),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl RaftKvError for ConfigError {
    fn code(&self) -> ErrorCodes {
        ErrorCodes::InvalidArgument
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
/// Root config for raftkv-load.  Can be part of a larger config file.
pub struct RootConfig {
    #[serde(default)]
    pub load: LoadConfig,
}

impl RootConfig {
    /// Load from `$CONFIG_PATH`, or `./raftkv_load_config.yaml` when unset.
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var(CONFIG_PATH_ENV_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(&path)
    }

    pub fn load_from_path(path: &str) -> Result<Self, ConfigError> {
        // Unfortunately, figment doesn't support environment variables with underscores. So we have to map and replace them.
        // Excluding our own environment variables, which are prefixed with RAFTKV_.
        let mut f = figment::Figment::from(
            Env::prefixed("RAFTKV_").map(|k| k.as_str().replace("__", ".").into()),
        );
        if std::path::Path::new(path).exists() {
            f = figment::Figment::from(Yaml::file(path)).merge(f);
        }
        let config: RootConfig = f.extract().map_err(Box::new)?;
        config.load.validate()?;
        Ok(config)
    }
}

/////////////////////////////////////////// ClientConfig ///////////////////////////////////////////

/// How workers reach the key-value service.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Service endpoints.  Worker `i` connects to `endpoints[i % endpoints.len()]`.
    #[serde(default = "ClientConfig::default_endpoints")]
    pub endpoints: Vec<String>,
    #[serde(default = "ClientConfig::default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "ClientConfig::default_window_size")]
    pub initial_stream_window_size: u32,
    #[serde(default = "ClientConfig::default_window_size")]
    pub initial_connection_window_size: u32,
    /// How long a closing stream may keep draining acknowledgments after its send side closes.
    #[serde(default = "ClientConfig::default_drain_grace_ms")]
    pub drain_grace_ms: u64,
    /// Requests buffered between a worker and its proposal stream.
    #[serde(default = "ClientConfig::default_outbound_buffer")]
    pub outbound_buffer: usize,
    /// Deadline for unary reads and diagnostics.
    #[serde(default = "ClientConfig::default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "ClientConfig::default_max_message_size")]
    pub max_encoding_message_size: usize,
    #[serde(default = "ClientConfig::default_max_message_size")]
    pub max_decoding_message_size: usize,
}

impl ClientConfig {
    fn default_endpoints() -> Vec<String> {
        vec!["localhost:12380".to_string()]
    }

    fn default_connect_timeout_ms() -> u64 {
        2000
    }

    fn default_window_size() -> u32 {
        64 * 1024 * 1024
    }

    fn default_drain_grace_ms() -> u64 {
        5000
    }

    fn default_outbound_buffer() -> usize {
        1024
    }

    fn default_request_timeout_ms() -> u64 {
        5000
    }

    fn default_max_message_size() -> usize {
        32 * 1024 * 1024
    }

    pub fn endpoint_for(&self, worker: usize) -> Option<&str> {
        if self.endpoints.is_empty() {
            None
        } else {
            Some(self.endpoints[worker % self.endpoints.len()].as_str())
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            endpoints: ClientConfig::default_endpoints(),
            connect_timeout_ms: ClientConfig::default_connect_timeout_ms(),
            initial_stream_window_size: ClientConfig::default_window_size(),
            initial_connection_window_size: ClientConfig::default_window_size(),
            drain_grace_ms: ClientConfig::default_drain_grace_ms(),
            outbound_buffer: ClientConfig::default_outbound_buffer(),
            request_timeout_ms: ClientConfig::default_request_timeout_ms(),
            max_encoding_message_size: ClientConfig::default_max_message_size(),
            max_decoding_message_size: ClientConfig::default_max_message_size(),
        }
    }
}

//////////////////////////////////////////// TraceConfig ///////////////////////////////////////////

/// What a trace `get` turns into.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ReadMode {
    /// Issue a point read.
    #[default]
    Read,
    /// Drop the operation.
    Skip,
    /// Write a small fixed value instead, to measure commit latency.
    Write,
}

impl std::fmt::Display for ReadMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadMode::Read => f.write_str("read"),
            ReadMode::Skip => f.write_str("skip"),
            ReadMode::Write => f.write_str("write"),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TraceConfig {
    pub path: String,
    /// Stop parsing after this many records; zero parses everything.
    #[serde(default)]
    pub max_records: usize,
    #[serde(default)]
    pub read_mode: ReadMode,
    #[serde(default)]
    pub loop_replay: bool,
    #[serde(default = "TraceConfig::default_write_value_size")]
    pub write_value_size: usize,
    /// Insert every unique key before replaying.
    #[serde(default = "TraceConfig::default_load_phase")]
    pub load_phase: bool,
}

impl TraceConfig {
    pub fn new(path: impl Into<String>) -> Self {
        TraceConfig {
            path: path.into(),
            max_records: 0,
            read_mode: ReadMode::default(),
            loop_replay: false,
            write_value_size: TraceConfig::default_write_value_size(),
            load_phase: TraceConfig::default_load_phase(),
        }
    }

    fn default_write_value_size() -> usize {
        1
    }

    fn default_load_phase() -> bool {
        true
    }
}

//////////////////////////////////////////// LoadConfig ////////////////////////////////////////////

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LoadConfig {
    #[serde(default = "LoadConfig::default_service_name")]
    pub service_name: String,
    #[serde(default)]
    pub otel_endpoint: Option<String>,
    #[serde(default)]
    pub log_filters: Vec<LogFilter>,
    #[serde(default)]
    pub client: ClientConfig,
    /// Which put path to use: `raft` streams proposals, `raft-unary` issues one call per item.
    #[serde(default = "LoadConfig::default_binding")]
    pub binding: String,
    /// Outstanding puts per worker for the unary binding.
    #[serde(default = "LoadConfig::default_unary_in_flight")]
    pub unary_in_flight: usize,
    #[serde(default = "LoadConfig::default_total_ops")]
    pub total_ops: u64,
    /// Number of workers, each with its own connection.
    #[serde(default = "LoadConfig::default_parallel")]
    pub parallel: usize,
    #[serde(default = "LoadConfig::default_key_size")]
    pub key_size: usize,
    #[serde(default = "LoadConfig::default_value_size")]
    pub value_size: usize,
    /// Number of distinct keys; one means every put targets the same all-zero key.
    #[serde(default = "LoadConfig::default_key_space")]
    pub key_space: u64,
    #[serde(default)]
    pub trace: Option<TraceConfig>,
    #[serde(default)]
    pub max_execution_time_secs: Option<u64>,
    /// Fetch the server's cache-hit counter before and after each run.
    #[serde(default)]
    pub collect_cache_hits: bool,
    /// Reset the server's cache-hit counter before each run.
    #[serde(default)]
    pub reset_cache_hits: bool,
}

impl LoadConfig {
    fn default_service_name() -> String {
        "raftkv-load".to_string()
    }

    fn default_binding() -> String {
        "raft".to_string()
    }

    fn default_unary_in_flight() -> usize {
        16
    }

    fn default_total_ops() -> u64 {
        1_000_000
    }

    fn default_parallel() -> usize {
        256
    }

    fn default_key_size() -> usize {
        8
    }

    fn default_value_size() -> usize {
        8
    }

    fn default_key_space() -> u64 {
        1
    }

    pub fn tracing(&self) -> TracingConfig {
        TracingConfig {
            service_name: self.service_name.clone(),
            otel_endpoint: self.otel_endpoint.clone(),
            filters: self.log_filters.clone(),
        }
    }

    /// Reject configurations that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(msg: impl Into<String>) -> Result<(), ConfigError> {
            Err(ConfigError::Invalid(msg.into()))
        }
        if self.client.endpoints.is_empty() {
            return invalid("at least one endpoint is required");
        }
        if self.client.endpoints.iter().any(|e| e.trim().is_empty()) {
            return invalid("endpoints must not be empty strings");
        }
        if self.client.outbound_buffer == 0 {
            return invalid("outbound_buffer must be at least 1");
        }
        if self.parallel == 0 {
            return invalid("parallel must be at least 1");
        }
        if self.key_size == 0 {
            return invalid("key_size must be at least 1");
        }
        if self.key_space == 0 {
            return invalid("key_space must be at least 1");
        }
        if self.unary_in_flight == 0 {
            return invalid("unary_in_flight must be at least 1");
        }
        if self.binding.trim().is_empty() {
            return invalid("binding must be set");
        }
        if let Some(trace) = self.trace.as_ref() {
            if trace.path.is_empty() {
                return invalid("trace.path must be set");
            }
            if trace.write_value_size == 0 {
                return invalid("trace.write_value_size must be at least 1");
            }
        }
        Ok(())
    }
}

impl Default for LoadConfig {
    fn default() -> Self {
        LoadConfig {
            service_name: LoadConfig::default_service_name(),
            otel_endpoint: None,
            log_filters: vec![],
            client: ClientConfig::default(),
            binding: LoadConfig::default_binding(),
            unary_in_flight: LoadConfig::default_unary_in_flight(),
            total_ops: LoadConfig::default_total_ops(),
            parallel: LoadConfig::default_parallel(),
            key_size: LoadConfig::default_key_size(),
            value_size: LoadConfig::default_value_size(),
            key_space: LoadConfig::default_key_space(),
            trace: None,
            max_execution_time_secs: None,
            collect_cache_hits: false,
            reset_cache_hits: false,
        }
    }
}
