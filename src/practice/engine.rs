use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::cache::{keys as cache_keys, Cache, CacheLayer, Generations};
use crate::constants::{
    DEFAULT_REVIEW_HISTORY_LIMIT, MAX_CAS_RETRIES, MAX_DISPLAY_NAME_LEN, MAX_PROBLEM_TAGS,
    MAX_RECOMMENDATION_ITEMS, MAX_REVIEW_HISTORY_LIMIT,
};
use crate::practice::config::PracticeConfig;
use crate::practice::profile::{self, ProfileInputs};
use crate::practice::queue::{self, ReviewQueue};
use crate::practice::scheduler::{
    IntervalPreview, Rating, Scheduler, SchedulerParameters, SchedulingOutcome,
};
use crate::practice::types::{
    LearnerProfile, LearningObjective, RecommendationCandidate, RecommendationItem,
};
use crate::practice::{hybrid, mixer, PracticeError};
use crate::store::keys;
use crate::store::operations::cards::{Card, LearningStats};
use crate::store::operations::learners::Learner;
use crate::store::operations::problems::{Problem, ProblemDifficulty};
use crate::store::operations::review_events::ReviewEvent;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLearner {
    #[serde(default)]
    pub id: Option<String>,
    pub display_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemUpsert {
    pub title: String,
    pub difficulty: ProblemDifficulty,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSubmission {
    pub problem_id: String,
    /// Validated into a [`Rating`] before anything is read or written.
    pub rating: i64,
    #[serde(default)]
    pub response_time_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResult {
    pub card: Card,
    pub outcome: SchedulingOutcome,
    pub event_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardPreview {
    pub card: Card,
    pub previews: Vec<IntervalPreview>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveParameters {
    pub personalized: bool,
    pub parameters: SchedulerParameters,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationRequest {
    #[serde(default)]
    pub items: Vec<RecommendationItem>,
    #[serde(default)]
    pub candidates: Vec<RecommendationCandidate>,
    #[serde(default)]
    pub objective: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationResult {
    pub objective: LearningObjective,
    pub items: Vec<RecommendationItem>,
    pub profile_summary: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmupReport {
    pub scanned: usize,
    pub warmed: usize,
}

/// Read-heavy paths (queue, stats, profile) degrade to documented defaults when
/// the store fails; write paths propagate errors.
#[derive(Clone)]
pub struct PracticeEngine {
    config: Arc<RwLock<PracticeConfig>>,
    store: Arc<Store>,
    cache_backend: Arc<dyn Cache>,
    generations: Arc<Generations>,
}

impl PracticeEngine {
    pub fn new(config: PracticeConfig, store: Arc<Store>, cache_backend: Arc<dyn Cache>) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            store,
            cache_backend,
            generations: Arc::new(Generations::new()),
        }
    }

    /// Validate, persist as a new config version, then swap in.
    pub async fn reload_config(&self, new_config: PracticeConfig) -> Result<u32, PracticeError> {
        new_config.validate().map_err(PracticeError::Validation)?;
        let version = self.store.save_practice_config(&new_config)?;
        let mut cfg = self.config.write().await;
        *cfg = new_config;
        tracing::info!(version, "Practice config reloaded");
        Ok(version)
    }

    pub async fn get_config(&self) -> PracticeConfig {
        self.config.read().await.clone()
    }

    fn cache(&self, config: &PracticeConfig) -> CacheLayer {
        CacheLayer::new(
            self.cache_backend.clone(),
            config.cache.enabled,
            config.cache.ttl_jitter_ratio,
        )
    }

    /// Call only after the write is committed. The generation moves first, so a view
    /// read before the commit can only be written under a key nobody reads any more.
    fn invalidate_learner(&self, config: &PracticeConfig, learner_id: &str) -> usize {
        self.generations.bump(learner_id);
        self.cache(config).invalidate_learner(learner_id)
    }

    // ---- learners & problems ----

    pub async fn register_learner(&self, input: NewLearner) -> Result<Learner, PracticeError> {
        let display_name = input.display_name.trim();
        if display_name.is_empty() || display_name.chars().count() > MAX_DISPLAY_NAME_LEN {
            return Err(PracticeError::Validation(format!(
                "displayName must be 1-{MAX_DISPLAY_NAME_LEN} characters"
            )));
        }
        let id = input
            .id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let now = Utc::now();
        let learner = Learner {
            id,
            display_name: display_name.to_string(),
            scheduler_parameters: None,
            created_at: now,
            updated_at: now,
        };
        self.store.create_learner(&learner)?;
        tracing::info!(learner_id = %learner.id, "Learner registered");
        Ok(learner)
    }

    pub fn get_learner(&self, learner_id: &str) -> Result<Learner, PracticeError> {
        self.store
            .get_learner(learner_id)?
            .ok_or_else(|| PracticeError::NotFound {
                entity: "learner",
                id: learner_id.to_string(),
            })
    }

    pub fn ensure_learner(&self, learner_id: &str) -> Result<(), PracticeError> {
        if self.store.learner_exists(learner_id)? {
            Ok(())
        } else {
            Err(PracticeError::NotFound {
                entity: "learner",
                id: learner_id.to_string(),
            })
        }
    }

    fn ensure_problem(&self, problem_id: &str) -> Result<Problem, PracticeError> {
        self.store
            .get_problem(problem_id)?
            .ok_or_else(|| PracticeError::NotFound {
                entity: "problem",
                id: problem_id.to_string(),
            })
    }

    pub async fn learner_parameters(
        &self,
        learner_id: &str,
    ) -> Result<EffectiveParameters, PracticeError> {
        let learner = self.get_learner(learner_id)?;
        let config = self.get_config().await;
        Ok(EffectiveParameters {
            personalized: learner.scheduler_parameters.is_some(),
            parameters: effective_parameters(&learner, &config),
        })
    }

    /// `None` clears the override so the configured defaults apply again.
    pub async fn set_learner_parameters(
        &self,
        learner_id: &str,
        parameters: Option<SchedulerParameters>,
    ) -> Result<EffectiveParameters, PracticeError> {
        if let Some(params) = &parameters {
            params.validate().map_err(PracticeError::Validation)?;
        }
        let learner = self.store.set_learner_parameters(learner_id, parameters)?;
        let config = self.get_config().await;
        self.invalidate_learner(&config, learner_id);
        tracing::info!(
            learner_id,
            personalized = learner.scheduler_parameters.is_some(),
            "Scheduler parameters updated"
        );
        Ok(EffectiveParameters {
            personalized: learner.scheduler_parameters.is_some(),
            parameters: effective_parameters(&learner, &config),
        })
    }

    pub fn upsert_problem(
        &self,
        problem_id: &str,
        input: ProblemUpsert,
    ) -> Result<Problem, PracticeError> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(PracticeError::Validation("title must not be empty".to_string()));
        }
        if input.tags.len() > MAX_PROBLEM_TAGS {
            return Err(PracticeError::Validation(format!(
                "at most {MAX_PROBLEM_TAGS} tags are allowed"
            )));
        }

        let now = Utc::now();
        let created_at = self
            .store
            .get_problem(problem_id)?
            .map_or(now, |existing| existing.created_at);
        let mut tags: Vec<String> = Vec::with_capacity(input.tags.len());
        for tag in input.tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            if !tags.iter().any(|existing| existing == tag) {
                tags.push(tag.to_string());
            }
        }

        let problem = Problem {
            id: problem_id.to_string(),
            title: title.to_string(),
            difficulty: input.difficulty,
            tags,
            created_at,
            updated_at: now,
        };
        self.store.upsert_problem(&problem)?;
        Ok(problem)
    }

    // ---- cards & reviews ----

    /// Returns `(card, created)`. A creation race is resolved by re-reading the winner.
    fn find_or_insert_card(
        &self,
        learner_id: &str,
        problem_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(Card, bool), StoreError> {
        if let Some(card) = self.store.get_card(learner_id, problem_id)? {
            return Ok((card, false));
        }

        let card = Card::new(learner_id, problem_id, now);
        match self.store.insert_card(&card) {
            Ok(()) => Ok((card, true)),
            Err(StoreError::Conflict { key, .. }) => {
                tracing::debug!(%key, "Card created concurrently, re-reading");
                let existing = self.store.get_card(learner_id, problem_id)?.ok_or(
                    StoreError::NotFound {
                        entity: "card".to_string(),
                        key,
                    },
                )?;
                Ok((existing, false))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get_or_create_card(
        &self,
        learner_id: &str,
        problem_id: &str,
    ) -> Result<Card, PracticeError> {
        self.ensure_learner(learner_id)?;
        self.ensure_problem(problem_id)?;
        let (card, created) = self.find_or_insert_card(learner_id, problem_id, Utc::now())?;
        if created {
            let config = self.get_config().await;
            self.invalidate_learner(&config, learner_id);
            tracing::debug!(learner_id, problem_id, "Card created");
        }
        Ok(card)
    }

    pub async fn preview_intervals(
        &self,
        learner_id: &str,
        problem_id: &str,
    ) -> Result<CardPreview, PracticeError> {
        let card = self.get_or_create_card(learner_id, problem_id).await?;
        let config = self.get_config().await;
        let params = self.parameters_for(learner_id, &config);
        let scheduler = Scheduler::new(&params, config.scheduler.policy);
        let previews = scheduler.preview(&card, Utc::now());
        Ok(CardPreview { card, previews })
    }

    /// Schedule one review and persist it. The card write, its due-index move and the
    /// event append commit together; a concurrent review of the same card forces a
    /// recompute from the fresh card.
    pub async fn submit_review(
        &self,
        learner_id: &str,
        submission: ReviewSubmission,
    ) -> Result<ReviewResult, PracticeError> {
        let rating = Rating::try_from(submission.rating)?;
        let learner = self.get_learner(learner_id)?;
        self.ensure_problem(&submission.problem_id)?;

        let config = self.get_config().await;
        let params = effective_parameters(&learner, &config);
        let scheduler = Scheduler::new(&params, config.scheduler.policy);
        let problem_id = submission.problem_id.as_str();

        for attempt in 1..=MAX_CAS_RETRIES {
            let now = Utc::now();
            let (card, _) = self.find_or_insert_card(learner_id, problem_id, now)?;
            let (next, outcome) = scheduler.apply(&card, rating, now);
            let event = review_event(&card, &next, &outcome, submission.response_time_ms, now)?;

            match self.store.commit_review(&next, card.review_count, &event) {
                Ok(()) => {
                    let invalidated = self.invalidate_learner(&config, learner_id);
                    tracing::info!(
                        learner_id,
                        problem_id,
                        rating = rating.value(),
                        from = card.state.as_str(),
                        to = next.state.as_str(),
                        interval_days = outcome.interval_days,
                        invalidated,
                        "Review recorded"
                    );
                    return Ok(ReviewResult {
                        card: next,
                        outcome,
                        event_id: event.id,
                    });
                }
                Err(StoreError::Conflict { .. }) => {
                    tracing::debug!(learner_id, problem_id, attempt, "Concurrent review, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StoreError::CasRetryExhausted {
            entity: "card".to_string(),
            key: keys::card_key(learner_id, problem_id)?,
            attempts: MAX_CAS_RETRIES,
        }
        .into())
    }

    pub fn list_reviews(
        &self,
        learner_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ReviewEvent>, PracticeError> {
        let limit = limit
            .unwrap_or(DEFAULT_REVIEW_HISTORY_LIMIT)
            .min(MAX_REVIEW_HISTORY_LIMIT);
        Ok(self.store.list_review_events(learner_id, limit)?)
    }

    // ---- read paths ----

    /// Personalized parameters when present, defaults otherwise (including on store failure).
    fn parameters_for(&self, learner_id: &str, config: &PracticeConfig) -> SchedulerParameters {
        match self.store.get_learner(learner_id) {
            Ok(Some(learner)) => effective_parameters(&learner, config),
            Ok(None) => config.scheduler.default_parameters.clone(),
            Err(e) => {
                tracing::warn!(learner_id, error = %e, "Learner lookup failed, using default parameters");
                config.scheduler.default_parameters.clone()
            }
        }
    }

    pub async fn generate_queue(
        &self,
        learner_id: &str,
        limit: Option<usize>,
    ) -> Result<ReviewQueue, PracticeError> {
        keys::learner_key(learner_id)?;
        let config = self.get_config().await;
        let limit = limit
            .unwrap_or(config.queue.default_limit)
            .min(config.queue.max_limit);

        let cache = self.cache(&config);
        let generation = self.generations.current(learner_id);
        let cache_key = cache_keys::queue_key(learner_id, &generation, limit);
        if let Some(queue) = cache.get::<ReviewQueue>(&cache_key) {
            tracing::debug!(learner_id, limit, "Queue cache hit");
            return Ok(queue);
        }

        let now = Utc::now();
        let stats = self.stats_with_cache(learner_id, &generation, &config, &cache, now);
        let params = self.parameters_for(learner_id, &config);
        let scheduler = Scheduler::new(&params, config.scheduler.policy);
        let quotas = queue::quotas(limit, &config.queue);

        let fetched = self
            .store
            .find_new_cards(learner_id, quotas.new_cards)
            .and_then(|new_cards| Ok((new_cards, self.store.find_due_cards(learner_id, now)?)));
        let (new_cards, due_cards) = match fetched {
            Ok(fetched) => fetched,
            Err(e) => {
                tracing::warn!(learner_id, error = %e, "Queue query failed, returning empty queue");
                return Ok(queue::assemble(learner_id, Vec::new(), stats, now));
            }
        };

        let mut cards = queue::select(&new_cards, &due_cards, limit, &config.queue, &scheduler, now);
        let problem_ids: Vec<String> = cards.iter().map(|c| c.problem_id.clone()).collect();
        match self.store.get_problems_batch(&problem_ids) {
            Ok(problems) => queue::attach_problems(&mut cards, &problems),
            Err(e) => tracing::warn!(learner_id, error = %e, "Problem lookup failed for queue"),
        }

        let review_queue = queue::assemble(learner_id, cards, stats, now);
        cache.put(
            &cache_key,
            &review_queue,
            StdDuration::from_secs(config.queue.queue_cache_ttl_secs),
        );
        Ok(review_queue)
    }

    pub async fn learning_stats(&self, learner_id: &str) -> Result<LearningStats, PracticeError> {
        keys::learner_key(learner_id)?;
        let config = self.get_config().await;
        let cache = self.cache(&config);
        let generation = self.generations.current(learner_id);
        Ok(self.stats_with_cache(learner_id, &generation, &config, &cache, Utc::now()))
    }

    fn stats_with_cache(
        &self,
        learner_id: &str,
        generation: &str,
        config: &PracticeConfig,
        cache: &CacheLayer,
        now: DateTime<Utc>,
    ) -> LearningStats {
        let key = cache_keys::stats_key(learner_id, generation);
        if let Some(stats) = cache.get::<LearningStats>(&key) {
            return stats;
        }
        match self.store.aggregate_learning_stats(learner_id, now) {
            Ok(stats) => {
                cache.put(
                    &key,
                    &stats,
                    StdDuration::from_secs(config.queue.stats_cache_ttl_secs),
                );
                stats
            }
            Err(e) => {
                tracing::warn!(learner_id, error = %e, "Stats query failed, using zeros");
                LearningStats::default()
            }
        }
    }

    pub async fn build_profile(
        &self,
        learner_id: &str,
        refresh: bool,
    ) -> Result<LearnerProfile, PracticeError> {
        keys::learner_key(learner_id)?;
        let config = self.get_config().await;
        Ok(self.profile_with_cache(learner_id, &config, refresh, Utc::now()))
    }

    fn profile_with_cache(
        &self,
        learner_id: &str,
        config: &PracticeConfig,
        refresh: bool,
        now: DateTime<Utc>,
    ) -> LearnerProfile {
        let cache = self.cache(config);
        let cacheable = config.profiling.cache_enabled;
        let key = cache_keys::profile_key(learner_id, &self.generations.current(learner_id));
        if cacheable && !refresh {
            if let Some(profile) = cache.get::<LearnerProfile>(&key) {
                return profile;
            }
        }

        let window_start = now - Duration::days(config.profiling.recent_days);
        let events = match self.store.find_recent_events(
            learner_id,
            window_start,
            config.profiling.review_limit,
        ) {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(learner_id, error = %e, "Event query failed, using neutral profile");
                return LearnerProfile::neutral(learner_id, now);
            }
        };

        let problem_ids: Vec<String> = events
            .iter()
            .map(|event| event.problem_id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let problems = self
            .store
            .get_problems_batch(&problem_ids)
            .unwrap_or_else(|e| {
                tracing::warn!(learner_id, error = %e, "Problem lookup failed for profile");
                HashMap::new()
            });

        let params = self.parameters_for(learner_id, config);
        let scheduler = Scheduler::new(&params, config.scheduler.policy);
        let retrievability: HashMap<String, f64> = match self.store.list_cards(learner_id) {
            Ok(cards) => cards
                .iter()
                .filter(|card| card.last_review_at.is_some())
                .map(|card| (card.problem_id.clone(), scheduler.retrievability(card, now)))
                .collect(),
            Err(e) => {
                tracing::warn!(learner_id, error = %e, "Card lookup failed for profile");
                HashMap::new()
            }
        };

        let inputs = ProfileInputs {
            events: &events,
            problems: &problems,
            retrievability: &retrievability,
        };
        let built = profile::build_profile(learner_id, &inputs, &config.profiling, now);
        if cacheable {
            cache.put(
                &key,
                &built,
                StdDuration::from_secs(config.profiling.cache_ttl_secs),
            );
        }
        built
    }

    /// Hybrid re-rank of externally supplied items, then strategic mixing.
    pub async fn recommend(
        &self,
        learner_id: &str,
        request: RecommendationRequest,
    ) -> Result<RecommendationResult, PracticeError> {
        keys::learner_key(learner_id)?;
        if request.items.len() > MAX_RECOMMENDATION_ITEMS
            || request.candidates.len() > MAX_RECOMMENDATION_ITEMS
        {
            return Err(PracticeError::Validation(format!(
                "at most {MAX_RECOMMENDATION_ITEMS} items and candidates are accepted"
            )));
        }

        let config = self.get_config().await;
        let now = Utc::now();
        let profile = self.profile_with_cache(learner_id, &config, false, now);
        let objective = request
            .objective
            .as_deref()
            .map(LearningObjective::parse)
            .unwrap_or_else(|| profile.recommendation_focus());
        let limit = request
            .limit
            .unwrap_or(config.queue.default_limit)
            .min(config.queue.max_limit);

        let domains = &config.profiling.tag_domains;
        let ranked = hybrid::rank(
            &request.items,
            &request.candidates,
            &profile,
            &config.hybrid,
            domains,
        );
        let items = mixer::mix(
            &ranked,
            &request.candidates,
            &profile,
            objective,
            limit,
            &config.mixing,
            domains,
        );

        tracing::debug!(
            learner_id,
            objective = objective.as_str(),
            input = request.items.len(),
            output = items.len(),
            "Recommendations mixed"
        );
        Ok(RecommendationResult {
            objective,
            items,
            profile_summary: profile.summary(),
        })
    }

    /// Rebuild and cache profiles of recently active learners.
    pub async fn warm_profiles(&self, now: DateTime<Utc>) -> Result<WarmupReport, PracticeError> {
        let config = self.get_config().await;
        let mut report = WarmupReport::default();
        if !config.cache.enabled || !config.profiling.cache_enabled {
            tracing::debug!("Profile cache disabled, skipping warmup");
            return Ok(report);
        }

        let since = now - Duration::days(config.warmup.lookback_days);
        let learner_ids = self.store.list_learner_ids()?;
        for learner_id in learner_ids.iter().take(config.warmup.max_learners_per_run) {
            report.scanned += 1;
            let recent = match self.store.find_recent_events(
                learner_id,
                since,
                config.warmup.min_recent_reviews,
            ) {
                Ok(events) => events.len(),
                Err(e) => {
                    tracing::warn!(learner_id = %learner_id, error = %e, "Warmup event query failed");
                    continue;
                }
            };
            if recent < config.warmup.min_recent_reviews {
                continue;
            }
            self.profile_with_cache(learner_id, &config, true, now);
            report.warmed += 1;
        }

        Ok(report)
    }
}

fn effective_parameters(learner: &Learner, config: &PracticeConfig) -> SchedulerParameters {
    learner
        .scheduler_parameters
        .clone()
        .unwrap_or_else(|| config.scheduler.default_parameters.clone())
}

fn review_event(
    before: &Card,
    after: &Card,
    outcome: &SchedulingOutcome,
    response_time_ms: Option<u64>,
    now: DateTime<Utc>,
) -> Result<ReviewEvent, StoreError> {
    Ok(ReviewEvent {
        id: Uuid::new_v4().to_string(),
        learner_id: before.learner_id.clone(),
        problem_id: before.problem_id.clone(),
        card_key: keys::card_key(&before.learner_id, &before.problem_id)?,
        rating: outcome.rating.value(),
        response_time_ms,
        old_state: before.state,
        new_state: after.state,
        old_difficulty: before.difficulty,
        new_difficulty: after.difficulty,
        old_stability: before.stability,
        new_stability: after.stability,
        old_interval_days: before.interval_days,
        new_interval_days: after.interval_days,
        elapsed_days: outcome.elapsed_days,
        retrievability: outcome.retrievability,
        reviewed_at: now,
    })
}
