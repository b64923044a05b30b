use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::operations::cards::CardState;
use crate::store::{Store, StoreError};

/// Immutable audit record of one review submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReviewEvent {
    pub id: String,
    pub learner_id: String,
    pub problem_id: String,
    /// `{learner_id}:{problem_id}` of the card this review was applied to.
    pub card_key: String,
    pub rating: u8,
    pub response_time_ms: Option<u64>,
    pub old_state: CardState,
    pub new_state: CardState,
    pub old_difficulty: f64,
    pub new_difficulty: f64,
    pub old_stability: f64,
    pub new_stability: f64,
    pub old_interval_days: u32,
    pub new_interval_days: u32,
    pub elapsed_days: u32,
    /// Retrievability of the card at the moment it was reviewed.
    pub retrievability: f64,
    pub reviewed_at: DateTime<Utc>,
}

impl ReviewEvent {
    pub fn is_success(&self) -> bool {
        self.rating >= 3
    }

    pub fn is_lapse(&self) -> bool {
        self.rating == 1
    }

    #[cfg(test)]
    pub(crate) fn for_test(
        learner_id: &str,
        problem_id: &str,
        rating: u8,
        reviewed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            learner_id: learner_id.to_string(),
            problem_id: problem_id.to_string(),
            card_key: format!("{}:{}", learner_id, problem_id),
            rating,
            response_time_ms: None,
            old_state: CardState::New,
            new_state: CardState::Learning,
            old_difficulty: 0.0,
            new_difficulty: 5.0,
            old_stability: 0.0,
            new_stability: 2.4,
            old_interval_days: 0,
            new_interval_days: 2,
            elapsed_days: 0,
            retrievability: 1.0,
            reviewed_at,
        }
    }
}

impl Store {
    /// Events reviewed at or after `window_start`, newest first, at most `max_rows`.
    pub fn find_recent_events(
        &self,
        learner_id: &str,
        window_start: DateTime<Utc>,
        max_rows: usize,
    ) -> Result<Vec<ReviewEvent>, StoreError> {
        let prefix = keys::review_event_prefix(learner_id)?;
        let mut events = Vec::new();

        for item in self.review_events.scan_prefix(prefix.as_bytes()) {
            if events.len() >= max_rows {
                break;
            }
            let (_, value) = item?;
            let event: ReviewEvent = Self::deserialize(&value)?;
            if event.reviewed_at < window_start {
                break;
            }
            events.push(event);
        }

        Ok(events)
    }

    pub fn list_review_events(
        &self,
        learner_id: &str,
        limit: usize,
    ) -> Result<Vec<ReviewEvent>, StoreError> {
        let prefix = keys::review_event_prefix(learner_id)?;
        let mut events = Vec::with_capacity(limit.min(256));
        for item in self.review_events.scan_prefix(prefix.as_bytes()).take(limit) {
            let (_, value) = item?;
            events.push(Self::deserialize(&value)?);
        }
        Ok(events)
    }

    pub fn count_events_since(
        &self,
        learner_id: &str,
        since: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        Ok(self.find_recent_events(learner_id, since, usize::MAX)?.len())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use tempfile::tempdir;

    use super::*;

    fn append(store: &Store, event: &ReviewEvent) {
        let key =
            keys::review_event_key(&event.learner_id, event.reviewed_at.timestamp_millis(), &event.id)
                .unwrap();
        store
            .review_events
            .insert(key.as_bytes(), Store::serialize(event).unwrap())
            .unwrap();
    }

    #[test]
    fn recent_events_respect_window_and_cap() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();
        let now = Utc::now();

        for days_ago in [1, 2, 3, 40] {
            append(
                &store,
                &ReviewEvent::for_test("l1", "p1", 3, now - Duration::days(days_ago)),
            );
        }
        append(&store, &ReviewEvent::for_test("l2", "p1", 3, now));

        let window = store
            .find_recent_events("l1", now - Duration::days(30), 100)
            .unwrap();
        assert_eq!(window.len(), 3);
        assert!(window[0].reviewed_at > window[1].reviewed_at);

        let capped = store
            .find_recent_events("l1", now - Duration::days(30), 2)
            .unwrap();
        assert_eq!(capped.len(), 2);

        assert_eq!(store.list_review_events("l1", 10).unwrap().len(), 4);
    }
}
