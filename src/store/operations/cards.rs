use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::ConflictableTransactionError;
use sled::Transactional;

use crate::store::keys;
use crate::store::operations::review_events::ReviewEvent;
use crate::store::{map_transaction_error, Store, StoreError};

/// 单次到期扫描最多读取的索引条目数
const MAX_DUE_SCAN: usize = 5_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardState {
    New,
    Learning,
    Review,
    Relearning,
}

impl CardState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Learning => "LEARNING",
            Self::Review => "REVIEW",
            Self::Relearning => "RELEARNING",
        }
    }

    pub fn is_learning(self) -> bool {
        matches!(self, Self::Learning | Self::Relearning)
    }
}

/// Spaced-repetition record for one (learner, problem) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub learner_id: String,
    pub problem_id: String,
    pub state: CardState,
    pub difficulty: f64,
    pub stability: f64,
    pub review_count: u32,
    pub lapses: u32,
    pub last_review_at: Option<DateTime<Utc>>,
    pub next_review_at: Option<DateTime<Utc>>,
    pub interval_days: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Card {
    pub fn new(learner_id: &str, problem_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            learner_id: learner_id.to_string(),
            problem_id: problem_id.to_string(),
            state: CardState::New,
            difficulty: 0.0,
            stability: 0.0,
            review_count: 0,
            lapses: 0,
            last_review_at: None,
            next_review_at: None,
            interval_days: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LearningStats {
    pub total_cards: u64,
    pub new_cards: u64,
    pub learning_cards: u64,
    pub review_cards: u64,
    pub relearning_cards: u64,
    pub due_cards: u64,
    pub total_lapses: u64,
    pub avg_review_count: f64,
    pub avg_difficulty: f64,
    pub avg_stability: f64,
}

fn due_index_key_for_card(card: &Card) -> Result<Option<String>, StoreError> {
    match card.next_review_at {
        Some(next_review_at) => Ok(Some(keys::card_due_index_key(
            &card.learner_id,
            next_review_at.timestamp_millis(),
            &card.problem_id,
        )?)),
        None => Ok(None),
    }
}

impl Store {
    pub fn get_card(&self, learner_id: &str, problem_id: &str) -> Result<Option<Card>, StoreError> {
        let key = keys::card_key(learner_id, problem_id)?;
        match self.cards.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// Atomic conditional insert. Fails with `Conflict` when a card already exists for the pair.
    pub fn insert_card(&self, card: &Card) -> Result<(), StoreError> {
        let key = keys::card_key(&card.learner_id, &card.problem_id)?;
        let value = Self::serialize(card)?;

        match self
            .cards
            .compare_and_swap(key.as_bytes(), None::<&[u8]>, Some(value))?
        {
            Ok(()) => Ok(()),
            Err(_) => Err(StoreError::Conflict {
                entity: "card".to_string(),
                key,
            }),
        }
    }

    /// Write the reviewed card, move its due-index entry and append the review event
    /// in one transaction. The stored card must still carry `expected_review_count`,
    /// otherwise another review won the race and `Conflict` is returned.
    pub fn commit_review(
        &self,
        card: &Card,
        expected_review_count: u32,
        event: &ReviewEvent,
    ) -> Result<(), StoreError> {
        let card_key = keys::card_key(&card.learner_id, &card.problem_id)?;
        let card_value = Self::serialize(card)?;
        let next_due_key = due_index_key_for_card(card)?;
        let event_key = keys::review_event_key(
            &event.learner_id,
            event.reviewed_at.timestamp_millis(),
            &event.id,
        )?;
        let event_value = Self::serialize(event)?;

        (&self.cards, &self.card_due_index, &self.review_events)
            .transaction(|(tx_cards, tx_due, tx_events)| {
                let Some(old_raw) = tx_cards.get(card_key.as_bytes())? else {
                    return Err(ConflictableTransactionError::Abort(StoreError::NotFound {
                        entity: "card".to_string(),
                        key: card_key.clone(),
                    }));
                };
                let stored: Card = serde_json::from_slice(&old_raw).map_err(|error| {
                    ConflictableTransactionError::Abort(StoreError::Serialization(error))
                })?;

                if stored.review_count != expected_review_count {
                    return Err(ConflictableTransactionError::Abort(StoreError::Conflict {
                        entity: "card".to_string(),
                        key: card_key.clone(),
                    }));
                }

                if let Some(old_due_key) =
                    due_index_key_for_card(&stored).map_err(ConflictableTransactionError::Abort)?
                {
                    tx_due.remove(old_due_key.as_bytes())?;
                }

                tx_cards.insert(card_key.as_bytes(), card_value.as_slice())?;
                if let Some(due_key) = &next_due_key {
                    tx_due.insert(due_key.as_bytes(), &[])?;
                }
                tx_events.insert(event_key.as_bytes(), event_value.as_slice())?;

                Ok(())
            })
            .map_err(map_transaction_error)?;

        Ok(())
    }

    pub fn list_cards(&self, learner_id: &str) -> Result<Vec<Card>, StoreError> {
        let prefix = keys::card_prefix(learner_id)?;
        let mut cards = Vec::new();
        for item in self.cards.scan_prefix(prefix.as_bytes()) {
            let (_, value) = item?;
            cards.push(Self::deserialize(&value)?);
        }
        Ok(cards)
    }

    /// New cards for a learner, oldest first.
    pub fn find_new_cards(&self, learner_id: &str, limit: usize) -> Result<Vec<Card>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut cards: Vec<Card> = self
            .list_cards(learner_id)?
            .into_iter()
            .filter(|card| card.state == CardState::New)
            .collect();
        cards.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.problem_id.cmp(&b.problem_id))
        });
        cards.truncate(limit);
        Ok(cards)
    }

    /// Cards whose `next_review_at` is at or before `now`, earliest due first.
    pub fn find_due_cards(
        &self,
        learner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Card>, StoreError> {
        let prefix = keys::card_due_index_prefix(learner_id)?;
        let now_ms = now.timestamp_millis().max(0);
        let mut due = Vec::new();

        for item in self.card_due_index.scan_prefix(prefix.as_bytes()) {
            let (key, _) = item?;
            let Some((due_ts_ms, problem_id)) = keys::parse_due_index_item_key(&key) else {
                continue;
            };
            if due_ts_ms > now_ms {
                break;
            }

            if let Some(card) = self.get_card(learner_id, &problem_id)? {
                let card_due_ms = card
                    .next_review_at
                    .map(|at| at.timestamp_millis().max(0));
                // Stale index entries are skipped.
                if card_due_ms == Some(due_ts_ms) {
                    due.push(card);
                    if due.len() >= MAX_DUE_SCAN {
                        tracing::warn!(learner_id, "Due card scan truncated");
                        break;
                    }
                }
            }
        }

        Ok(due)
    }

    pub fn aggregate_learning_stats(
        &self,
        learner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<LearningStats, StoreError> {
        let mut stats = LearningStats::default();
        let mut review_sum = 0u64;
        let mut difficulty_sum = 0.0;
        let mut stability_sum = 0.0;

        for card in self.list_cards(learner_id)? {
            stats.total_cards += 1;
            match card.state {
                CardState::New => stats.new_cards += 1,
                CardState::Learning => stats.learning_cards += 1,
                CardState::Review => stats.review_cards += 1,
                CardState::Relearning => stats.relearning_cards += 1,
            }
            if card.is_due(now) {
                stats.due_cards += 1;
            }
            stats.total_lapses += u64::from(card.lapses);
            review_sum += u64::from(card.review_count);
            difficulty_sum += card.difficulty;
            stability_sum += card.stability;
        }

        if stats.total_cards > 0 {
            let n = stats.total_cards as f64;
            stats.avg_review_count = review_sum as f64 / n;
            stats.avg_difficulty = difficulty_sum / n;
            stats.avg_stability = stability_sum / n;
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use tempfile::tempdir;

    use super::*;
    use crate::store::operations::review_events::ReviewEvent;

    fn open_store(dir: &tempfile::TempDir) -> Store {
        Store::open(dir.path().join("db").to_str().unwrap()).unwrap()
    }

    fn reviewed(card: &Card, due: DateTime<Utc>) -> Card {
        Card {
            state: CardState::Review,
            difficulty: 5.0,
            stability: 3.0,
            review_count: card.review_count + 1,
            last_review_at: Some(due - Duration::days(3)),
            next_review_at: Some(due),
            interval_days: 3,
            ..card.clone()
        }
    }

    fn event_for(card: &Card, at: DateTime<Utc>) -> ReviewEvent {
        ReviewEvent::for_test(&card.learner_id, &card.problem_id, 3, at)
    }

    #[test]
    fn second_insert_conflicts() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let card = Card::new("l1", "p1", Utc::now());

        store.insert_card(&card).unwrap();
        let err = store.insert_card(&card).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[test]
    fn commit_review_moves_due_index_and_appends_event() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let now = Utc::now();
        let card = Card::new("l1", "p1", now - Duration::days(10));
        store.insert_card(&card).unwrap();

        let first = reviewed(&card, now - Duration::days(1));
        store.commit_review(&first, 0, &event_for(&first, now)).unwrap();
        assert_eq!(store.find_due_cards("l1", now).unwrap().len(), 1);

        let second = reviewed(&first, now + Duration::days(5));
        store
            .commit_review(&second, 1, &event_for(&second, now + Duration::seconds(1)))
            .unwrap();
        assert!(store.find_due_cards("l1", now).unwrap().is_empty());
        assert_eq!(store.card_due_index.len(), 1);
        assert_eq!(store.review_events.len(), 2);
    }

    #[test]
    fn stale_review_count_is_rejected() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let now = Utc::now();
        let card = Card::new("l1", "p1", now);
        store.insert_card(&card).unwrap();

        let next = reviewed(&card, now + Duration::days(1));
        let err = store
            .commit_review(&next, 7, &event_for(&next, now))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(store.review_events.len(), 0);
    }

    #[test]
    fn stats_count_states_and_due() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let now = Utc::now();
        let a = Card::new("l1", "a", now);
        let b = Card::new("l1", "b", now);
        store.insert_card(&a).unwrap();
        store.insert_card(&b).unwrap();
        let b2 = reviewed(&b, now - Duration::hours(1));
        store.commit_review(&b2, 0, &event_for(&b2, now)).unwrap();

        let stats = store.aggregate_learning_stats("l1", now).unwrap();
        assert_eq!(stats.total_cards, 2);
        assert_eq!(stats.new_cards, 1);
        assert_eq!(stats.review_cards, 1);
        assert_eq!(stats.due_cards, 1);
        assert!((stats.avg_difficulty - 2.5).abs() < 1e-9);
    }
}
