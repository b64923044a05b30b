//! FSRS-style spaced-repetition transition function.
//!
//! Everything here is pure: a card and a rating go in, a new card comes out.
//! Persisting the result is the caller's job.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::operations::cards::{Card, CardState};

pub const WEIGHT_COUNT: usize = 17;

pub const DEFAULT_WEIGHTS: [f64; WEIGHT_COUNT] = [
    0.4, 0.6, 2.4, 5.8, 4.93, 0.94, 0.86, 0.01, 1.49, 0.14, 0.94, 2.18, 0.05, 0.34, 1.26, 0.29,
    2.61,
];

const MIN_STABILITY: f64 = 0.01;
const MAX_STABILITY: f64 = 36_500.0;
const MIN_DIFFICULTY: f64 = 1.0;
const MAX_DIFFICULTY: f64 = 10.0;

/// Stability multipliers for Hard/Good/Easy while still learning.
const LEARNING_HARD_FACTOR: f64 = 1.2;
const LEARNING_GOOD_FACTOR: f64 = 1.5;
const LEARNING_EASY_FACTOR: f64 = 2.0;
const RELEARNING_DAMPING: f64 = 0.8;

/// Retention level the exponential curve is anchored to (R = 0.9 when t = S).
const CURVE_ANCHOR: f64 = 0.9;
const POWER_LAW_FACTOR: f64 = 9.0;

const OVERDUE_BONUS_PER_DAY: f64 = 0.1;
const MAX_OVERDUE_BONUS: f64 = 2.0;
const LAPSE_BONUS_PER_LAPSE: f64 = 0.05;
const MAX_LAPSE_BONUS: f64 = 0.3;
const MAX_PRIORITY: f64 = 5.0;

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Error, PartialEq)]
pub enum SchedulerError {
    #[error("rating must be between 1 and 4, got {0}")]
    InvalidRating(i64),
    #[error("invalid scheduler parameters: {0}")]
    InvalidParameters(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Rating {
    Again = 1,
    Hard = 2,
    Good = 3,
    Easy = 4,
}

impl Rating {
    pub const ALL: [Rating; 4] = [Rating::Again, Rating::Hard, Rating::Good, Rating::Easy];

    pub fn value(self) -> u8 {
        self as u8
    }

    fn grade(self) -> f64 {
        f64::from(self.value())
    }
}

impl TryFrom<i64> for Rating {
    type Error = SchedulerError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Again),
            2 => Ok(Self::Hard),
            3 => Ok(Self::Good),
            4 => Ok(Self::Easy),
            other => Err(SchedulerError::InvalidRating(other)),
        }
    }
}

impl TryFrom<u8> for Rating {
    type Error = SchedulerError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::try_from(i64::from(value))
    }
}

impl From<Rating> for u8 {
    fn from(value: Rating) -> Self {
        value.value()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum RetrievabilityCurve {
    /// `0.9^(t/S)`
    #[default]
    Exponential,
    /// `(1 + t/(9S))^-1`
    PowerLaw,
}

/// Personalized parameter vector. Supplied externally and never fitted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerParameters {
    pub weights: [f64; WEIGHT_COUNT],
    pub target_retention: f64,
    pub maximum_interval: u32,
    pub easy_bonus: f64,
    pub hard_interval_factor: f64,
}

impl Default for SchedulerParameters {
    fn default() -> Self {
        Self {
            weights: DEFAULT_WEIGHTS,
            target_retention: 0.9,
            maximum_interval: 36_500,
            easy_bonus: 1.3,
            hard_interval_factor: 0.8,
        }
    }
}

impl SchedulerParameters {
    pub fn validate(&self) -> Result<(), String> {
        for (index, weight) in self.weights.iter().enumerate() {
            if !weight.is_finite() {
                return Err(format!("weights[{index}] must be finite"));
            }
            let (lo, hi) = if index < 4 { (0.01, 100.0) } else { (-10.0, 10.0) };
            if !(lo..=hi).contains(weight) {
                return Err(format!("weights[{index}] must be in [{lo}, {hi}]"));
            }
        }
        if !(self.target_retention > 0.7 && self.target_retention < 0.99) {
            return Err("targetRetention must be in (0.7, 0.99)".to_string());
        }
        if !(1..=36_500).contains(&self.maximum_interval) {
            return Err("maximumInterval must be in [1, 36500]".to_string());
        }
        if !(1.0..=5.0).contains(&self.easy_bonus) {
            return Err("easyBonus must be in [1, 5]".to_string());
        }
        if !(self.hard_interval_factor > 0.0 && self.hard_interval_factor <= 1.0) {
            return Err("hardIntervalFactor must be in (0, 1]".to_string());
        }
        Ok(())
    }
}

/// Scheduling knobs that are global rather than per learner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerPolicy {
    #[serde(default = "default_graduate_on_easy")]
    pub graduate_on_easy: bool,
    #[serde(default)]
    pub retrievability_curve: RetrievabilityCurve,
}

fn default_graduate_on_easy() -> bool {
    true
}

impl Default for SchedulerPolicy {
    fn default() -> Self {
        Self {
            graduate_on_easy: default_graduate_on_easy(),
            retrievability_curve: RetrievabilityCurve::Exponential,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingOutcome {
    pub rating: Rating,
    pub new_state: CardState,
    pub new_difficulty: f64,
    pub new_stability: f64,
    pub next_review_at: DateTime<Utc>,
    pub interval_days: u32,
    pub elapsed_days: u32,
    /// Retrievability at review time, before the update.
    pub retrievability: f64,
    pub lapses: u32,
    pub review_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalPreview {
    pub rating: Rating,
    pub state: CardState,
    pub interval_days: u32,
    pub next_review_at: DateTime<Utc>,
}

pub struct Scheduler<'a> {
    params: &'a SchedulerParameters,
    policy: SchedulerPolicy,
}

impl<'a> Scheduler<'a> {
    pub fn new(params: &'a SchedulerParameters, policy: SchedulerPolicy) -> Self {
        Self { params, policy }
    }

    pub fn next_review(
        &self,
        card: &Card,
        rating: Rating,
        now: DateTime<Utc>,
    ) -> SchedulingOutcome {
        let w = &self.params.weights;
        let elapsed = elapsed_days(card.last_review_at, now);
        let retrievability = self.retrievability(card, now);

        let (new_state, difficulty, stability, lapses) = match card.state {
            CardState::New => {
                let state = if rating == Rating::Easy && self.policy.graduate_on_easy {
                    CardState::Review
                } else {
                    CardState::Learning
                };
                (
                    state,
                    init_difficulty(w, rating),
                    init_stability(w, rating),
                    card.lapses,
                )
            }
            CardState::Learning | CardState::Relearning => {
                let difficulty = next_difficulty(w, card.difficulty, rating);
                let relearning = card.state == CardState::Relearning;
                match rating {
                    Rating::Again => (
                        card.state,
                        difficulty,
                        card.stability.min(w[0]),
                        card.lapses + 1,
                    ),
                    Rating::Hard => (
                        card.state,
                        difficulty,
                        learning_stability(w, card.stability, LEARNING_HARD_FACTOR, relearning),
                        card.lapses,
                    ),
                    Rating::Good | Rating::Easy => {
                        let factor = if rating == Rating::Easy {
                            LEARNING_EASY_FACTOR
                        } else {
                            LEARNING_GOOD_FACTOR
                        };
                        (
                            CardState::Review,
                            difficulty,
                            learning_stability(w, card.stability, factor, relearning),
                            card.lapses,
                        )
                    }
                }
            }
            CardState::Review => {
                let difficulty = next_difficulty(w, card.difficulty, rating);
                match rating {
                    Rating::Again => (
                        CardState::Relearning,
                        difficulty,
                        forget_stability(w, card.difficulty, card.stability, retrievability),
                        card.lapses + 1,
                    ),
                    _ => (
                        CardState::Review,
                        difficulty,
                        recall_stability(w, card.difficulty, card.stability, retrievability, rating),
                        card.lapses,
                    ),
                }
            }
        };

        let stability = clamp_stability(stability);
        let interval_days = self.interval_for(stability, rating);

        SchedulingOutcome {
            rating,
            new_state,
            new_difficulty: difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY),
            new_stability: stability,
            next_review_at: now + Duration::days(i64::from(interval_days)),
            interval_days,
            elapsed_days: elapsed.floor() as u32,
            retrievability,
            lapses,
            review_count: card.review_count.saturating_add(1),
        }
    }

    /// `next_review` followed by writing the outcome into a copy of the card.
    pub fn apply(&self, card: &Card, rating: Rating, now: DateTime<Utc>) -> (Card, SchedulingOutcome) {
        let outcome = self.next_review(card, rating, now);
        let next = Card {
            state: outcome.new_state,
            difficulty: outcome.new_difficulty,
            stability: outcome.new_stability,
            review_count: outcome.review_count,
            lapses: outcome.lapses,
            last_review_at: Some(now),
            next_review_at: Some(outcome.next_review_at),
            interval_days: outcome.interval_days,
            updated_at: now,
            ..card.clone()
        };
        (next, outcome)
    }

    pub fn preview(&self, card: &Card, now: DateTime<Utc>) -> Vec<IntervalPreview> {
        Rating::ALL
            .iter()
            .map(|rating| {
                let outcome = self.next_review(card, *rating, now);
                IntervalPreview {
                    rating: *rating,
                    state: outcome.new_state,
                    interval_days: outcome.interval_days,
                    next_review_at: outcome.next_review_at,
                }
            })
            .collect()
    }

    pub fn retrievability(&self, card: &Card, now: DateTime<Utc>) -> f64 {
        if card.last_review_at.is_none() {
            return 1.0;
        }
        retrievability(
            elapsed_days(card.last_review_at, now),
            card.stability,
            self.policy.retrievability_curve,
        )
    }

    /// Queue ordering score in [0, 5]. Never persisted.
    pub fn priority_score(&self, card: &Card, now: DateTime<Utc>) -> f64 {
        let overdue_bonus = (days_overdue(card, now) * OVERDUE_BONUS_PER_DAY).min(MAX_OVERDUE_BONUS);
        let state_base = match card.state {
            CardState::Relearning => 1.0,
            CardState::Learning => 0.9,
            CardState::New => 0.8,
            CardState::Review => 0.5 + (1.0 - self.retrievability(card, now)) * 0.5,
        };
        let difficulty_bonus = card.difficulty.clamp(0.0, MAX_DIFFICULTY) / 20.0;
        let lapse_bonus = (f64::from(card.lapses) * LAPSE_BONUS_PER_LAPSE).min(MAX_LAPSE_BONUS);

        (overdue_bonus + state_base + difficulty_bonus + lapse_bonus).clamp(0.0, MAX_PRIORITY)
    }

    fn interval_for(&self, stability: f64, rating: Rating) -> u32 {
        let base = interval_from_stability(
            stability,
            self.params.target_retention,
            self.policy.retrievability_curve,
        );
        let adjusted = match rating {
            Rating::Hard => base * self.params.hard_interval_factor,
            Rating::Easy => base * self.params.easy_bonus,
            _ => base,
        };
        let max = f64::from(self.params.maximum_interval.max(1));
        if !adjusted.is_finite() {
            return max as u32;
        }
        adjusted.round().clamp(1.0, max) as u32
    }
}

/// Days between `last_review_at` and `now`, fractional, never negative.
pub fn elapsed_days(last_review_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    match last_review_at {
        Some(last) => ((now - last).num_seconds() as f64 / SECONDS_PER_DAY).max(0.0),
        None => 0.0,
    }
}

/// Days past `next_review_at`; zero when not yet due or never scheduled.
pub fn days_overdue(card: &Card, now: DateTime<Utc>) -> f64 {
    match card.next_review_at {
        Some(due) if due <= now => (now - due).num_seconds() as f64 / SECONDS_PER_DAY,
        _ => 0.0,
    }
}

pub fn retrievability(elapsed_days: f64, stability: f64, curve: RetrievabilityCurve) -> f64 {
    if stability <= 0.0 {
        return 0.0;
    }
    let t = elapsed_days.max(0.0);
    let r = match curve {
        RetrievabilityCurve::Exponential => CURVE_ANCHOR.powf(t / stability),
        RetrievabilityCurve::PowerLaw => 1.0 / (1.0 + t / (POWER_LAW_FACTOR * stability)),
    };
    r.clamp(0.0, 1.0)
}

/// Inverse of [`retrievability`]: days until recall probability falls to `target_retention`.
pub fn interval_from_stability(
    stability: f64,
    target_retention: f64,
    curve: RetrievabilityCurve,
) -> f64 {
    match curve {
        RetrievabilityCurve::Exponential => stability * target_retention.ln() / CURVE_ANCHOR.ln(),
        RetrievabilityCurve::PowerLaw => {
            POWER_LAW_FACTOR * stability * (1.0 / target_retention - 1.0)
        }
    }
}

fn clamp_stability(stability: f64) -> f64 {
    if stability.is_nan() {
        return MIN_STABILITY;
    }
    stability.clamp(MIN_STABILITY, MAX_STABILITY)
}

fn init_difficulty(w: &[f64; WEIGHT_COUNT], rating: Rating) -> f64 {
    (w[4] - (rating.grade() - 3.0) * w[5]).clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
}

fn init_stability(w: &[f64; WEIGHT_COUNT], rating: Rating) -> f64 {
    clamp_stability(w[usize::from(rating.value()) - 1])
}

/// Difficulty drifts by rating and reverts slightly toward the Good anchor.
fn next_difficulty(w: &[f64; WEIGHT_COUNT], difficulty: f64, rating: Rating) -> f64 {
    let shifted = difficulty - w[6] * (rating.grade() - 3.0);
    let reverted = w[7] * init_difficulty(w, Rating::Good) + (1.0 - w[7]) * shifted;
    reverted.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
}

fn learning_stability(w: &[f64; WEIGHT_COUNT], stability: f64, factor: f64, relearning: bool) -> f64 {
    let grown = stability.max(MIN_STABILITY) * (1.0 + w[6] * factor + w[7]);
    if relearning {
        grown * RELEARNING_DAMPING
    } else {
        grown
    }
}

fn recall_stability(
    w: &[f64; WEIGHT_COUNT],
    difficulty: f64,
    stability: f64,
    retrievability: f64,
    rating: Rating,
) -> f64 {
    let hard_penalty = if rating == Rating::Hard { w[15] } else { 1.0 };
    let easy_bonus = if rating == Rating::Easy { w[16] } else { 1.0 };
    let s = stability.max(MIN_STABILITY);
    let d = difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY);
    let growth = w[8].exp()
        * (11.0 - d)
        * s.powf(-w[9])
        * ((w[10] * (1.0 - retrievability)).exp() - 1.0)
        * hard_penalty
        * easy_bonus;
    s * (1.0 + growth.max(0.0))
}

fn forget_stability(w: &[f64; WEIGHT_COUNT], difficulty: f64, stability: f64, retrievability: f64) -> f64 {
    let s = stability.max(MIN_STABILITY);
    let d = difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY);
    let post_lapse = w[11]
        * d.powf(-w[12])
        * ((s + 1.0).powf(w[13]) - 1.0)
        * (w[14] * (1.0 - retrievability)).exp();
    post_lapse.min(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review_card(stability: f64, days_since_review: i64, now: DateTime<Utc>) -> Card {
        Card {
            state: CardState::Review,
            difficulty: 5.0,
            stability,
            review_count: 4,
            lapses: 0,
            last_review_at: Some(now - Duration::days(days_since_review)),
            next_review_at: Some(now - Duration::days(days_since_review) + Duration::days(10)),
            interval_days: 10,
            ..Card::new("l1", "p1", now - Duration::days(60))
        }
    }

    #[test]
    fn rating_rejects_out_of_range() {
        assert_eq!(Rating::try_from(0_i64), Err(SchedulerError::InvalidRating(0)));
        assert_eq!(Rating::try_from(5_i64), Err(SchedulerError::InvalidRating(5)));
        assert_eq!(Rating::try_from(3_i64), Ok(Rating::Good));
    }

    #[test]
    fn new_card_good_enters_learning_with_future_due_date() {
        let params = SchedulerParameters::default();
        let scheduler = Scheduler::new(&params, SchedulerPolicy::default());
        let now = Utc::now();
        let card = Card::new("l1", "p1", now);

        let outcome = scheduler.next_review(&card, Rating::Good, now);
        assert_eq!(outcome.new_state, CardState::Learning);
        assert!(outcome.new_difficulty > 0.0);
        assert!(outcome.new_stability > 0.0);
        assert!(outcome.next_review_at > now);
        assert_eq!(outcome.lapses, 0);
    }

    #[test]
    fn new_card_easy_graduates_only_when_policy_allows() {
        let params = SchedulerParameters::default();
        let now = Utc::now();
        let card = Card::new("l1", "p1", now);

        let graduating = Scheduler::new(&params, SchedulerPolicy::default());
        assert_eq!(
            graduating.next_review(&card, Rating::Easy, now).new_state,
            CardState::Review
        );

        let strict = Scheduler::new(
            &params,
            SchedulerPolicy {
                graduate_on_easy: false,
                ..SchedulerPolicy::default()
            },
        );
        assert_eq!(
            strict.next_review(&card, Rating::Easy, now).new_state,
            CardState::Learning
        );
    }

    #[test]
    fn review_lapse_resets_interval() {
        let params = SchedulerParameters::default();
        let scheduler = Scheduler::new(&params, SchedulerPolicy::default());
        let now = Utc::now();
        let card = review_card(10.0, 20, now);

        let outcome = scheduler.next_review(&card, Rating::Again, now);
        assert_eq!(outcome.new_state, CardState::Relearning);
        assert_eq!(outcome.lapses, card.lapses + 1);
        assert!(outcome.interval_days < 10);
        assert!(outcome.new_stability < card.stability);
    }

    #[test]
    fn review_success_grows_stability_and_easy_beats_hard() {
        let params = SchedulerParameters::default();
        let scheduler = Scheduler::new(&params, SchedulerPolicy::default());
        let now = Utc::now();
        let card = review_card(10.0, 10, now);

        let hard = scheduler.next_review(&card, Rating::Hard, now);
        let good = scheduler.next_review(&card, Rating::Good, now);
        let easy = scheduler.next_review(&card, Rating::Easy, now);

        assert!(good.new_stability > card.stability);
        assert!(hard.interval_days <= good.interval_days);
        assert!(good.interval_days <= easy.interval_days);
        assert_eq!(good.new_state, CardState::Review);
    }

    #[test]
    fn learning_again_counts_lapse_and_stays() {
        let params = SchedulerParameters::default();
        let scheduler = Scheduler::new(&params, SchedulerPolicy::default());
        let now = Utc::now();
        let (learning, _) = scheduler.apply(&Card::new("l1", "p1", now), Rating::Good, now);

        let outcome = scheduler.next_review(&learning, Rating::Again, now + Duration::days(2));
        assert_eq!(outcome.new_state, CardState::Learning);
        assert_eq!(outcome.lapses, 1);
        assert!(outcome.new_stability <= learning.stability);

        let hard = scheduler.next_review(&learning, Rating::Hard, now + Duration::days(2));
        assert_eq!(hard.new_state, CardState::Learning);
        let good = scheduler.next_review(&learning, Rating::Good, now + Duration::days(2));
        assert_eq!(good.new_state, CardState::Review);
    }

    #[test]
    fn curves_agree_at_one_stability() {
        for curve in [RetrievabilityCurve::Exponential, RetrievabilityCurve::PowerLaw] {
            let r = retrievability(7.0, 7.0, curve);
            assert!((r - 0.9).abs() < 1e-9, "{curve:?}");
            let interval = interval_from_stability(7.0, 0.9, curve);
            assert!((interval - 7.0).abs() < 1e-9, "{curve:?}");
        }
        assert_eq!(retrievability(3.0, 0.0, RetrievabilityCurve::Exponential), 0.0);
    }

    #[test]
    fn priority_orders_states_and_is_clamped() {
        let params = SchedulerParameters::default();
        let scheduler = Scheduler::new(&params, SchedulerPolicy::default());
        let now = Utc::now();
        let mut card = Card::new("l1", "p1", now);
        let new_priority = scheduler.priority_score(&card, now);

        card.state = CardState::Relearning;
        let relearning_priority = scheduler.priority_score(&card, now);
        assert!(relearning_priority > new_priority);

        card.lapses = 100;
        card.difficulty = 10.0;
        card.next_review_at = Some(now - Duration::days(400));
        let p = scheduler.priority_score(&card, now);
        assert!(p <= 5.0);
    }

    #[test]
    fn parameter_validation_catches_bad_values() {
        assert!(SchedulerParameters::default().validate().is_ok());

        let mut params = SchedulerParameters::default();
        params.hard_interval_factor = 1.2;
        assert!(params.validate().is_err());

        let mut params = SchedulerParameters::default();
        params.weights[2] = f64::NAN;
        assert!(params.validate().is_err());

        let mut params = SchedulerParameters::default();
        params.target_retention = 0.99;
        assert!(params.validate().is_err());
    }
}
