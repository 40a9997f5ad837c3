use bytes::Bytes;

use crate::raft_proto;

/// A single key/value pair bound for the backend.
///
/// Work items are immutable once built.  The key and value are reference-counted so that a
/// producer can hand the same value buffer to every item of a run without copying it; ownership
/// of the item itself moves from the producer to whichever worker dequeues it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkItem {
    key: Bytes,
    value: Bytes,
}

impl WorkItem {
    pub fn new(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// A delete travels as a put with an empty value.
    pub fn tombstone(key: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: Bytes::new(),
        }
    }

    pub fn key(&self) -> &Bytes {
        &self.key
    }

    pub fn value(&self) -> &Bytes {
        &self.value
    }

}

impl From<WorkItem> for raft_proto::PutRequest {
    fn from(item: WorkItem) -> Self {
        raft_proto::PutRequest {
            key: item.key.to_vec(),
            value: item.value.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tombstone_has_empty_value() {
        let item = WorkItem::tombstone(&b"k"[..]);
        assert!(item.value().is_empty());
        assert_eq!(&b"k"[..], &item.key()[..]);
        let req = raft_proto::PutRequest::from(item);
        assert!(req.value.is_empty());
    }

    #[test]
    fn shared_value_is_not_copied() {
        let value = Bytes::from(vec![7u8; 32]);
        let a = WorkItem::new(&b"a"[..], value.clone());
        let b = WorkItem::new(&b"b"[..], value.clone());
        assert_eq!(a.value().as_ptr(), b.value().as_ptr());
        assert_eq!(32, a.value().len());
    }
}
