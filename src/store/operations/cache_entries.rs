use chrono::{DateTime, Utc};

use crate::store::{Store, StoreError};

/// Values are stored as an 8-byte big-endian expiry (ms) followed by the payload.
const EXPIRY_HEADER_LEN: usize = 8;

fn encode_entry(expires_at: DateTime<Utc>, payload: &[u8]) -> Vec<u8> {
    let expires_ms = expires_at.timestamp_millis().max(0) as u64;
    let mut raw = Vec::with_capacity(EXPIRY_HEADER_LEN + payload.len());
    raw.extend_from_slice(&expires_ms.to_be_bytes());
    raw.extend_from_slice(payload);
    raw
}

fn decode_expiry(raw: &[u8]) -> Option<i64> {
    let header: [u8; EXPIRY_HEADER_LEN] = raw.get(..EXPIRY_HEADER_LEN)?.try_into().ok()?;
    i64::try_from(u64::from_be_bytes(header)).ok()
}

impl Store {
    /// Returns the payload if present and not yet expired. Expired entries are removed lazily.
    pub fn get_cache_entry(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let Some(raw) = self.cache_entries.get(key.as_bytes())? else {
            return Ok(None);
        };
        match decode_expiry(&raw) {
            Some(expires_ms) if expires_ms > now.timestamp_millis() => {
                Ok(Some(raw[EXPIRY_HEADER_LEN..].to_vec()))
            }
            _ => {
                self.cache_entries.remove(key.as_bytes())?;
                Ok(None)
            }
        }
    }

    pub fn put_cache_entry(
        &self,
        key: &str,
        payload: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if key.is_empty() {
            return Err(StoreError::Validation("cache key must not be empty".to_string()));
        }
        self.cache_entries
            .insert(key.as_bytes(), encode_entry(expires_at, payload))?;
        Ok(())
    }

    pub fn delete_cache_entry(&self, key: &str) -> Result<(), StoreError> {
        self.cache_entries.remove(key.as_bytes())?;
        Ok(())
    }

    /// Remove every entry whose key satisfies `matches`. Keys sharing `prefix` are the only ones inspected.
    pub fn delete_cache_entries_matching(
        &self,
        prefix: &str,
        matches: impl Fn(&str) -> bool,
    ) -> Result<usize, StoreError> {
        let mut removed = 0usize;
        for item in self.cache_entries.scan_prefix(prefix.as_bytes()) {
            let (key, _) = item?;
            let text = String::from_utf8_lossy(&key);
            if matches(&text) {
                self.cache_entries.remove(&key)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Sweep expired entries, stopping after `max_removals`.
    pub fn purge_expired_cache_entries(
        &self,
        now: DateTime<Utc>,
        max_removals: usize,
    ) -> Result<usize, StoreError> {
        let now_ms = now.timestamp_millis();
        let mut removed = 0usize;

        for item in self.cache_entries.iter() {
            if removed >= max_removals {
                break;
            }
            let (key, value) = item?;
            let expired = decode_expiry(&value).map_or(true, |expires_ms| expires_ms <= now_ms);
            if expired {
                self.cache_entries.remove(&key)?;
                removed += 1;
            }
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn expired_entries_read_as_missing_and_are_purged() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();
        let now = Utc::now();

        store
            .put_cache_entry("fresh", b"1", now + Duration::minutes(5))
            .unwrap();
        store
            .put_cache_entry("stale", b"2", now - Duration::minutes(5))
            .unwrap();
        store
            .put_cache_entry("stale-2", b"3", now - Duration::minutes(1))
            .unwrap();

        assert_eq!(store.get_cache_entry("fresh", now).unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get_cache_entry("stale", now).unwrap(), None);

        let removed = store.purge_expired_cache_entries(now, 100).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.cache_entries.len(), 1);
    }
}
