use bytes::Bytes;
use rand::RngCore;
use raftkv_types::{KvOp, WorkItem};

use crate::config::{ConfigError, LoadConfig};
use crate::keys::KeySynthesizer;

/// A source of operations for the dispatcher.
///
/// `next_op` may be called from any task; returning `None` means the workload is exhausted and the
/// dispatcher stops early.
pub trait Workload: Send + Sync {
    fn name(&self) -> &'static str;
    fn next_op(&self) -> Option<KvOp>;
}

/// Open-loop puts of synthetic keys, all carrying one random value generated up front.
#[derive(Clone, Debug)]
pub struct SyntheticPuts {
    keys: KeySynthesizer,
    value: Bytes,
}

impl SyntheticPuts {
    pub fn new(key_size: usize, key_space: u64, value_size: usize) -> Result<Self, ConfigError> {
        let keys = KeySynthesizer::new(key_size, key_space)?;
        let mut value = vec![0u8; value_size];
        rand::thread_rng().fill_bytes(&mut value);
        Ok(SyntheticPuts {
            keys,
            value: Bytes::from(value),
        })
    }

    pub fn from_config(config: &LoadConfig) -> Result<Self, ConfigError> {
        Self::new(config.key_size, config.key_space, config.value_size)
    }

    pub fn value(&self) -> &Bytes {
        &self.value
    }
}

impl Workload for SyntheticPuts {
    fn name(&self) -> &'static str {
        "synthetic-put"
    }

    fn next_op(&self) -> Option<KvOp> {
        Some(KvOp::Put(WorkItem::new(
            self.keys.next_key(),
            self.value.clone(),
        )))
    }
}
