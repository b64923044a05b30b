//! Expired cache entry sweep (every 10 minutes).
//! Reads already treat expired entries as misses; this reclaims the space.

use chrono::{DateTime, Utc};

use crate::store::Store;

/// 单次清理最多删除的条目数
const MAX_REMOVALS_PER_RUN: usize = 10_000;

pub async fn run(store: &Store) {
    tracing::debug!("Cache cleanup worker tick");
    sweep(store, Utc::now());
}

pub fn sweep(store: &Store, now: DateTime<Utc>) -> usize {
    match store.purge_expired_cache_entries(now, MAX_REMOVALS_PER_RUN) {
        Ok(removed) => {
            if removed >= MAX_REMOVALS_PER_RUN {
                tracing::info!(
                    removed,
                    "Cache cleanup: reached single-run limit, remaining items deferred to next run"
                );
            } else if removed > 0 {
                tracing::info!(removed, "Cache cleanup: removed expired entries");
            }
            removed
        }
        Err(e) => {
            tracing::warn!(error = %e, "Cache cleanup failed");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[tokio::test]
    async fn sweep_removes_only_expired_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::open(tmp.path().join("db").to_str().unwrap()).unwrap();
        let now = Utc::now();
        store
            .put_cache_entry("practice:learner:a:stats", b"{}", now - Duration::seconds(1))
            .unwrap();
        store
            .put_cache_entry("practice:learner:b:stats", b"{}", now + Duration::minutes(10))
            .unwrap();

        assert_eq!(sweep(&store, now), 1);
        assert_eq!(sweep(&store, now), 0);
        assert_eq!(store.cache_entries.len(), 1);
    }
}
