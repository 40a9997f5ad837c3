use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::WorkItem;

/// The unit of work on the dispatch queue.
///
/// Synthetic workloads only ever produce `Put`.  Trace replay produces the full range: a trace
/// `add` becomes an `Insert`, a `get` can become a `Read`, and `incr`/`decr` become a
/// `ReadModifyWrite` whose write half carries a placeholder value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KvOp {
    Put(WorkItem),
    Insert(WorkItem),
    Delete(Bytes),
    Read(Bytes),
    ReadModifyWrite(WorkItem),
    Nop,
}

impl KvOp {
    pub fn kind(&self) -> OpKind {
        match self {
            KvOp::Put(_) => OpKind::Put,
            KvOp::Insert(_) => OpKind::Insert,
            KvOp::Delete(_) => OpKind::Delete,
            KvOp::Read(_) => OpKind::Read,
            KvOp::ReadModifyWrite(_) => OpKind::ReadModifyWrite,
            KvOp::Nop => OpKind::Nop,
        }
    }

    pub fn is_nop(&self) -> bool {
        matches!(self, KvOp::Nop)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Put,
    Insert,
    Delete,
    Read,
    ReadModifyWrite,
    Nop,
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Put => f.write_str("put"),
            OpKind::Insert => f.write_str("insert"),
            OpKind::Delete => f.write_str("delete"),
            OpKind::Read => f.write_str("read"),
            OpKind::ReadModifyWrite => f.write_str("read_modify_write"),
            OpKind::Nop => f.write_str("nop"),
        }
    }
}
