use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::practice::config::QueueConfig;
use crate::practice::scheduler::{days_overdue, Scheduler};
use crate::store::operations::cards::{Card, CardState, LearningStats};
use crate::store::operations::problems::{Problem, ProblemDifficulty};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueCard {
    pub problem_id: String,
    pub title: Option<String>,
    pub problem_difficulty: Option<ProblemDifficulty>,
    pub state: CardState,
    pub difficulty: f64,
    pub stability: f64,
    pub review_count: u32,
    pub lapses: u32,
    pub next_review_at: Option<DateTime<Utc>>,
    pub priority: f64,
    pub days_overdue: f64,
    pub retrievability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewQueue {
    pub learner_id: String,
    pub cards: Vec<QueueCard>,
    pub total_count: usize,
    pub new_count: usize,
    pub learning_count: usize,
    pub review_count: usize,
    pub stats: LearningStats,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueQuotas {
    pub new_cards: usize,
    pub learning_cards: usize,
}

pub fn quotas(limit: usize, config: &QueueConfig) -> QueueQuotas {
    QueueQuotas {
        new_cards: (limit / 3).min(config.max_new_cards),
        learning_cards: (limit / 2).min(config.max_learning_cards),
    }
}

/// Priority descending, then most overdue, then least stable, then problem id.
fn queue_order(a: &QueueCard, b: &QueueCard) -> Ordering {
    b.priority
        .partial_cmp(&a.priority)
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            b.days_overdue
                .partial_cmp(&a.days_overdue)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.stability.partial_cmp(&b.stability).unwrap_or(Ordering::Equal))
        .then_with(|| a.problem_id.cmp(&b.problem_id))
}

fn score(card: &Card, scheduler: &Scheduler<'_>, now: DateTime<Utc>) -> QueueCard {
    QueueCard {
        problem_id: card.problem_id.clone(),
        title: None,
        problem_difficulty: None,
        state: card.state,
        difficulty: card.difficulty,
        stability: card.stability,
        review_count: card.review_count,
        lapses: card.lapses,
        next_review_at: card.next_review_at,
        priority: scheduler.priority_score(card, now),
        days_overdue: days_overdue(card, now),
        retrievability: scheduler.retrievability(card, now),
    }
}

/// Pick at most `limit` cards: a bounded share of new cards, a bounded share of
/// due learning cards, and due review cards for whatever budget remains.
///
/// `new_cards` must be oldest first. `due_cards` may hold any non-new state.
pub fn select(
    new_cards: &[Card],
    due_cards: &[Card],
    limit: usize,
    config: &QueueConfig,
    scheduler: &Scheduler<'_>,
    now: DateTime<Utc>,
) -> Vec<QueueCard> {
    if limit == 0 {
        return Vec::new();
    }
    let quotas = quotas(limit, config);

    let mut selected: Vec<QueueCard> = new_cards
        .iter()
        .filter(|card| card.state == CardState::New)
        .take(quotas.new_cards)
        .map(|card| score(card, scheduler, now))
        .collect();

    let mut learning: Vec<QueueCard> = due_cards
        .iter()
        .filter(|card| card.state.is_learning())
        .filter(|card| card.next_review_at.map_or(true, |at| at <= now))
        .map(|card| score(card, scheduler, now))
        .collect();
    learning.sort_by(queue_order);
    learning.truncate(quotas.learning_cards);
    selected.extend(learning);

    let mut reviews: Vec<QueueCard> = due_cards
        .iter()
        .filter(|card| card.state == CardState::Review && card.is_due(now))
        .map(|card| score(card, scheduler, now))
        .collect();
    reviews.sort_by(queue_order);
    reviews.truncate(limit.saturating_sub(selected.len()));
    selected.extend(reviews);

    selected.sort_by(queue_order);
    selected
}

/// Fill in catalogue details for display.
pub fn attach_problems(cards: &mut [QueueCard], problems: &HashMap<String, Problem>) {
    for card in cards {
        if let Some(problem) = problems.get(&card.problem_id) {
            card.title = Some(problem.title.clone());
            card.problem_difficulty = Some(problem.difficulty);
        }
    }
}

pub fn assemble(
    learner_id: &str,
    cards: Vec<QueueCard>,
    stats: LearningStats,
    now: DateTime<Utc>,
) -> ReviewQueue {
    let new_count = cards.iter().filter(|c| c.state == CardState::New).count();
    let learning_count = cards.iter().filter(|c| c.state.is_learning()).count();
    let review_count = cards.iter().filter(|c| c.state == CardState::Review).count();
    ReviewQueue {
        learner_id: learner_id.to_string(),
        total_count: cards.len(),
        cards,
        new_count,
        learning_count,
        review_count,
        stats,
        generated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::practice::scheduler::{SchedulerParameters, SchedulerPolicy};

    fn card(id: &str, state: CardState, overdue_days: i64, stability: f64, now: DateTime<Utc>) -> Card {
        let mut card = Card::new("l1", id, now - Duration::days(100));
        if state != CardState::New {
            card.state = state;
            card.difficulty = 5.0;
            card.stability = stability;
            card.review_count = 3;
            card.last_review_at = Some(now - Duration::days(overdue_days + 5));
            card.next_review_at = Some(now - Duration::days(overdue_days));
        }
        card
    }

    #[test]
    fn quotas_follow_limit_and_caps() {
        let config = QueueConfig::default();
        assert_eq!(
            quotas(9, &config),
            QueueQuotas {
                new_cards: 3,
                learning_cards: 4
            }
        );
        assert_eq!(
            quotas(90, &config),
            QueueQuotas {
                new_cards: 10,
                learning_cards: 20
            }
        );
    }

    #[test]
    fn review_cards_fill_remaining_budget_in_priority_order() {
        let now = Utc::now();
        let params = SchedulerParameters::default();
        let scheduler = Scheduler::new(&params, SchedulerPolicy::default());
        let config = QueueConfig::default();

        let new_cards: Vec<Card> = (0..5)
            .map(|i| card(&format!("n{i}"), CardState::New, 0, 0.0, now))
            .collect();
        let mut due = vec![
            card("l0", CardState::Learning, 1, 2.0, now),
            card("l1", CardState::Relearning, 0, 1.0, now),
        ];
        due.extend((0..6).map(|i| card(&format!("r{i}"), CardState::Review, i, 5.0, now)));

        let queue = select(&new_cards, &due, 6, &config, &scheduler, now);
        assert_eq!(queue.len(), 6);
        assert_eq!(queue.iter().filter(|c| c.state == CardState::New).count(), 2);
        assert_eq!(queue.iter().filter(|c| c.state.is_learning()).count(), 2);

        let reviews: Vec<&QueueCard> = queue
            .iter()
            .filter(|c| c.state == CardState::Review)
            .collect();
        assert_eq!(reviews.len(), 2);
        assert_eq!(reviews[0].problem_id, "r5");
        assert!(queue
            .windows(2)
            .all(|w| queue_order(&w[0], &w[1]) != Ordering::Greater));
    }

    #[test]
    fn ties_prefer_lower_stability() {
        let now = Utc::now();
        let params = SchedulerParameters::default();
        let scheduler = Scheduler::new(&params, SchedulerPolicy::default());
        let mut a = score(&card("a", CardState::Review, 2, 8.0, now), &scheduler, now);
        let mut b = score(&card("b", CardState::Review, 2, 3.0, now), &scheduler, now);
        a.priority = 1.0;
        b.priority = 1.0;
        assert_eq!(queue_order(&a, &b), Ordering::Greater);
    }

    #[test]
    fn ties_prefer_more_overdue_before_stability() {
        let now = Utc::now();
        let params = SchedulerParameters::default();
        let scheduler = Scheduler::new(&params, SchedulerPolicy::default());
        let mut late = score(&card("late", CardState::Review, 6, 8.0, now), &scheduler, now);
        let mut recent = score(&card("recent", CardState::Review, 1, 3.0, now), &scheduler, now);
        late.priority = 1.0;
        recent.priority = 1.0;
        assert!(late.days_overdue > recent.days_overdue);
        assert_eq!(queue_order(&late, &recent), Ordering::Less);

        let mut ordered = vec![recent.clone(), late.clone()];
        ordered.sort_by(queue_order);
        assert_eq!(ordered[0].problem_id, "late");
    }
}
