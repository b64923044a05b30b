use crate::store::StoreError;

/// 标识符最大长度
const MAX_ID_LEN: usize = 128;

/// Characters that would change the meaning of a composite key or a cache glob.
const RESERVED_ID_CHARS: [char; 4] = [':', '*', '?', '['];

/// Ids are embedded in composite keys joined by `:` and in cache invalidation patterns.
fn validate_id(kind: &str, id: &str) -> Result<(), StoreError> {
    if id.is_empty() {
        return Err(StoreError::Validation(format!("{kind} id must not be empty")));
    }
    if id.len() > MAX_ID_LEN {
        return Err(StoreError::Validation(format!(
            "{kind} id exceeds {MAX_ID_LEN} characters"
        )));
    }
    if let Some(c) = id.chars().find(|c| RESERVED_ID_CHARS.contains(c)) {
        return Err(StoreError::Validation(format!(
            "{kind} id must not contain '{c}'"
        )));
    }
    Ok(())
}

pub fn learner_key(learner_id: &str) -> Result<String, StoreError> {
    validate_id("learner", learner_id)?;
    Ok(learner_id.to_string())
}

pub fn problem_key(problem_id: &str) -> Result<String, StoreError> {
    validate_id("problem", problem_id)?;
    Ok(problem_id.to_string())
}

pub fn card_key(learner_id: &str, problem_id: &str) -> Result<String, StoreError> {
    validate_id("learner", learner_id)?;
    validate_id("problem", problem_id)?;
    Ok(format!("{}:{}", learner_id, problem_id))
}

pub fn card_prefix(learner_id: &str) -> Result<String, StoreError> {
    validate_id("learner", learner_id)?;
    Ok(format!("{}:", learner_id))
}

pub fn card_due_index_key(
    learner_id: &str,
    due_ts_ms: i64,
    problem_id: &str,
) -> Result<String, StoreError> {
    validate_id("learner", learner_id)?;
    validate_id("problem", problem_id)?;
    let ts = due_ts_ms.max(0) as u64;
    Ok(format!("{}:{:020}:{}", learner_id, ts, problem_id))
}

pub fn card_due_index_prefix(learner_id: &str) -> Result<String, StoreError> {
    card_prefix(learner_id)
}

/// Parse `(due_ts_ms, problem_id)` out of a `{learner}:{ts:020}:{problem}` key.
pub fn parse_due_index_item_key(key: &[u8]) -> Option<(i64, String)> {
    let text = std::str::from_utf8(key).ok()?;
    let mut parts = text.splitn(3, ':');
    let _learner = parts.next()?;
    let ts = parts.next()?.parse::<u64>().ok()?;
    let problem_id = parts.next()?;
    if problem_id.is_empty() {
        return None;
    }
    Some((i64::try_from(ts).ok()?, problem_id.to_string()))
}

/// Newest first: the timestamp is stored reversed so a prefix scan walks backwards in time.
pub fn review_event_key(
    learner_id: &str,
    timestamp_ms: i64,
    event_id: &str,
) -> Result<String, StoreError> {
    validate_id("learner", learner_id)?;
    let ts = timestamp_ms.max(0) as u64;
    let reverse_ts = u64::MAX - ts;
    Ok(format!("{}:{:020}:{}", learner_id, reverse_ts, event_id))
}

pub fn review_event_prefix(learner_id: &str) -> Result<String, StoreError> {
    card_prefix(learner_id)
}

pub fn config_version_key(config_type: &str, version: u32) -> Result<String, StoreError> {
    validate_id("config", config_type)?;
    Ok(format!("{}:v{:010}", config_type, version))
}

pub fn config_version_prefix(config_type: &str) -> Result<String, StoreError> {
    validate_id("config", config_type)?;
    Ok(format!("{}:v", config_type))
}

pub fn config_latest_key(config_type: &str) -> Result<String, StoreError> {
    validate_id("config", config_type)?;
    Ok(format!("{}:latest", config_type))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn review_event_key_orders_by_time_desc() {
        let k_new = review_event_key("l1", 2000, "e2").unwrap();
        let k_old = review_event_key("l1", 1000, "e1").unwrap();
        assert!(k_new < k_old);
    }

    #[test]
    fn due_index_key_orders_by_time_asc_and_parses_back() {
        let early = card_due_index_key("l1", 1000, "two-sum").unwrap();
        let late = card_due_index_key("l1", 2000, "lru-cache").unwrap();
        assert!(early < late);

        let (ts, problem) = parse_due_index_item_key(early.as_bytes()).unwrap();
        assert_eq!(ts, 1000);
        assert_eq!(problem, "two-sum");
    }

    #[test]
    fn separator_in_id_is_rejected() {
        let err = card_key("l1", "bad:id").unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(learner_key("").is_err());
    }

    #[test]
    fn glob_characters_in_id_are_rejected() {
        for id in ["a*", "a?", "a[b]", "*"] {
            let err = learner_key(id).unwrap_err();
            assert!(matches!(err, StoreError::Validation(_)), "{id} accepted");
        }
        assert!(problem_key("two*sum").is_err());
        assert!(learner_key("ada-lovelace_1.0").is_ok());
    }
}
