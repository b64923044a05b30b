use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use uuid::Uuid;

/// Per-learner cache generations.
///
/// Cached views are keyed by the generation observed before the store was read.
/// A committed review bumps the generation, so a view computed from a read that
/// raced the commit lands under a key no later reader asks for. The epoch keeps
/// generations of different processes apart when the cache outlives a restart.
#[derive(Debug)]
pub struct Generations {
    epoch: String,
    counters: Mutex<HashMap<String, u64>>,
}

impl Default for Generations {
    fn default() -> Self {
        Self::new()
    }
}

impl Generations {
    pub fn new() -> Self {
        let mut epoch = Uuid::new_v4().simple().to_string();
        epoch.truncate(8);
        Self {
            epoch,
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Token to embed in cache keys. Must be taken before reading the store.
    pub fn current(&self, learner_id: &str) -> String {
        let counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        let n = counters.get(learner_id).copied().unwrap_or(0);
        format!("g{}.{}", self.epoch, n)
    }

    /// Call after the write is durable and before the old entries are dropped.
    pub fn bump(&self, learner_id: &str) {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        *counters.entry(learner_id.to_string()).or_insert(0) += 1;
    }
}
