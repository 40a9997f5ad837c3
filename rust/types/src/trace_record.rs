use serde::{Deserialize, Serialize};

/// The operation column of a cache trace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceOperation {
    Get,
    Gets,
    Set,
    Add,
    Replace,
    Cas,
    Delete,
    Append,
    Prepend,
    Incr,
    Decr,
    Other,
}

impl TraceOperation {
    /// Parse an operation column.  Matching is case-insensitive and anything unrecognized maps
    /// to [TraceOperation::Other].
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "get" => TraceOperation::Get,
            "gets" => TraceOperation::Gets,
            "set" => TraceOperation::Set,
            "add" => TraceOperation::Add,
            "replace" => TraceOperation::Replace,
            "cas" => TraceOperation::Cas,
            "delete" => TraceOperation::Delete,
            "append" => TraceOperation::Append,
            "prepend" => TraceOperation::Prepend,
            "incr" => TraceOperation::Incr,
            "decr" => TraceOperation::Decr,
            _ => TraceOperation::Other,
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(self, TraceOperation::Get | TraceOperation::Gets)
    }

    pub fn is_write(&self) -> bool {
        matches!(
            self,
            TraceOperation::Set
                | TraceOperation::Add
                | TraceOperation::Replace
                | TraceOperation::Cas
                | TraceOperation::Append
                | TraceOperation::Prepend
        )
    }
}

impl std::fmt::Display for TraceOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TraceOperation::Get => "get",
            TraceOperation::Gets => "gets",
            TraceOperation::Set => "set",
            TraceOperation::Add => "add",
            TraceOperation::Replace => "replace",
            TraceOperation::Cas => "cas",
            TraceOperation::Delete => "delete",
            TraceOperation::Append => "append",
            TraceOperation::Prepend => "prepend",
            TraceOperation::Incr => "incr",
            TraceOperation::Decr => "decr",
            TraceOperation::Other => "other",
        };
        f.write_str(s)
    }
}

/// One line of a cache trace:
/// `timestamp, anonymized key, key size, value size, client id, operation, ttl`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Seconds since the start of the trace.
    pub timestamp_seconds: f64,
    pub key: String,
    pub key_size: i64,
    /// Size of the value in bytes; zero or negative for requests that carry no value.
    pub value_size: i64,
    pub client_id: String,
    pub operation: TraceOperation,
    /// Time-to-live set by the client; zero for non-write requests.
    pub ttl_seconds: i64,
}

impl TraceRecord {
    /// The value size to use when writing this record, substituting `default` when the trace
    /// carries no usable size.
    pub fn value_size_or(&self, default: usize) -> usize {
        if self.value_size > 0 {
            self.value_size as usize
        } else {
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operations_parse_case_insensitively() {
        assert_eq!(TraceOperation::Get, TraceOperation::parse("GET"));
        assert_eq!(TraceOperation::Gets, TraceOperation::parse("gets"));
        assert_eq!(TraceOperation::Cas, TraceOperation::parse(" Cas "));
        assert_eq!(TraceOperation::Other, TraceOperation::parse("touch"));
        assert!(TraceOperation::Append.is_write());
        assert!(!TraceOperation::Delete.is_write());
        assert!(TraceOperation::Gets.is_read());
    }

    #[test]
    fn value_size_falls_back() {
        let mut record = TraceRecord {
            timestamp_seconds: 0.0,
            key: "a".to_string(),
            key_size: 1,
            value_size: 0,
            client_id: "c1".to_string(),
            operation: TraceOperation::Set,
            ttl_seconds: 0,
        };
        assert_eq!(100, record.value_size_or(100));
        record.value_size = -4;
        assert_eq!(100, record.value_size_or(100));
        record.value_size = 12;
        assert_eq!(12, record.value_size_or(100));
    }
}
