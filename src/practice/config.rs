use serde::{Deserialize, Serialize};

use crate::practice::domains::DomainMap;
use crate::practice::scheduler::{SchedulerParameters, SchedulerPolicy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerConfig {
    /// Used for learners without personalized parameters.
    #[serde(default)]
    pub default_parameters: SchedulerParameters,
    #[serde(default)]
    pub policy: SchedulerPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueConfig {
    pub max_new_cards: usize,
    pub max_learning_cards: usize,
    pub default_limit: usize,
    pub max_limit: usize,
    pub queue_cache_ttl_secs: u64,
    pub stats_cache_ttl_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_new_cards: 10,
            max_learning_cards: 20,
            default_limit: 20,
            max_limit: 100,
            queue_cache_ttl_secs: 300,
            stats_cache_ttl_secs: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilingConfig {
    pub recent_days: i64,
    pub review_limit: usize,
    pub half_life_days: f64,
    pub trend_days: i64,
    pub min_trend_events: usize,
    pub trend_threshold: f64,
    pub min_samples: u32,
    pub weak_threshold: f64,
    pub strong_threshold: f64,
    /// Beta prior on accuracy.
    pub alpha: f64,
    pub beta: f64,
    pub default_retention: f64,
    pub max_domains_per_problem: usize,
    pub cache_enabled: bool,
    pub cache_ttl_secs: u64,
    #[serde(default)]
    pub tag_domains: DomainMap,
}

impl Default for ProfilingConfig {
    fn default() -> Self {
        Self {
            recent_days: 90,
            review_limit: 2000,
            half_life_days: 30.0,
            trend_days: 30,
            min_trend_events: 5,
            trend_threshold: 0.15,
            min_samples: 10,
            weak_threshold: 0.45,
            strong_threshold: 0.75,
            alpha: 1.0,
            beta: 1.0,
            default_retention: 0.6,
            max_domains_per_problem: 2,
            cache_enabled: true,
            cache_ttl_secs: 3600,
            tag_domains: DomainMap::default(),
        }
    }
}

/// Weights of the four hybrid components. They need not sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HybridWeights {
    pub external: f64,
    pub urgency: f64,
    pub similarity: f64,
    pub personalization: f64,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            external: 0.45,
            urgency: 0.30,
            similarity: 0.15,
            personalization: 0.10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MixingConfig {
    pub enabled: bool,
    pub refresh_accuracy_threshold: f64,
}

impl Default for MixingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            refresh_accuracy_threshold: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_jitter_ratio: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_jitter_ratio: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmupConfig {
    pub lookback_days: i64,
    pub min_recent_reviews: usize,
    pub max_learners_per_run: usize,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            lookback_days: 7,
            min_recent_reviews: 5,
            max_learners_per_run: 500,
        }
    }
}

/// Upper bound for every day-count window (about ten years).
pub const MAX_WINDOW_DAYS: i64 = 3650;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PracticeConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub profiling: ProfilingConfig,
    #[serde(default)]
    pub hybrid: HybridWeights,
    #[serde(default)]
    pub mixing: MixingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub warmup: WarmupConfig,
}

impl PracticeConfig {
    pub fn from_env(env_config: &crate::config::PracticeEnvConfig) -> Self {
        let mut config = Self::default();
        config.cache.enabled = env_config.cache_enabled;
        config.mixing.enabled = env_config.mixing_enabled;
        config.scheduler.default_parameters.target_retention = env_config.target_retention;
        config
    }

    pub fn validate(&self) -> Result<(), String> {
        self.scheduler
            .default_parameters
            .validate()
            .map_err(|e| format!("scheduler.defaultParameters: {e}"))?;

        if self.queue.max_limit == 0 || self.queue.default_limit == 0 {
            return Err("queue limits must be > 0".to_string());
        }
        if self.queue.default_limit > self.queue.max_limit {
            return Err("queue.defaultLimit must not exceed queue.maxLimit".to_string());
        }

        let p = &self.profiling;
        if !(1..=MAX_WINDOW_DAYS).contains(&p.recent_days)
            || !(1..=MAX_WINDOW_DAYS).contains(&p.trend_days)
        {
            return Err(format!(
                "profiling windows must be between 1 and {MAX_WINDOW_DAYS} days"
            ));
        }
        if p.review_limit == 0 {
            return Err("profiling.reviewLimit must be > 0".to_string());
        }
        if !(p.half_life_days > 0.0) {
            return Err("profiling.halfLifeDays must be > 0".to_string());
        }
        if !(0.0..=1.0).contains(&p.weak_threshold)
            || !(0.0..=1.0).contains(&p.strong_threshold)
            || p.weak_threshold >= p.strong_threshold
        {
            return Err("profiling thresholds must satisfy 0 <= weak < strong <= 1".to_string());
        }
        if !(0.0..=1.0).contains(&p.trend_threshold) {
            return Err("profiling.trendThreshold must be in [0,1]".to_string());
        }
        if !(p.alpha > 0.0) || !(p.beta > 0.0) {
            return Err("profiling.alpha and profiling.beta must be > 0".to_string());
        }
        if !(0.0..=1.0).contains(&p.default_retention) {
            return Err("profiling.defaultRetention must be in [0,1]".to_string());
        }
        if p.max_domains_per_problem == 0 {
            return Err("profiling.maxDomainsPerProblem must be > 0".to_string());
        }

        let h = &self.hybrid;
        for (name, weight) in [
            ("external", h.external),
            ("urgency", h.urgency),
            ("similarity", h.similarity),
            ("personalization", h.personalization),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(format!("hybrid.{name} must be a non-negative number"));
            }
        }

        if !(0.0..=1.0).contains(&self.mixing.refresh_accuracy_threshold) {
            return Err("mixing.refreshAccuracyThreshold must be in [0,1]".to_string());
        }
        if !(0.0..0.5).contains(&self.cache.ttl_jitter_ratio) {
            return Err("cache.ttlJitterRatio must be in [0,0.5)".to_string());
        }
        if !(1..=MAX_WINDOW_DAYS).contains(&self.warmup.lookback_days) {
            return Err(format!(
                "warmup.lookbackDays must be between 1 and {MAX_WINDOW_DAYS}"
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(PracticeConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: PracticeConfig =
            serde_json::from_str(r#"{"hybrid":{"external":1.0,"urgency":1.0,"similarity":1.0,"personalization":1.0}}"#)
                .unwrap();
        assert_eq!(config.queue, QueueConfig::default());
        assert_eq!(config.hybrid.external, 1.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let mut config = PracticeConfig::default();
        config.profiling.weak_threshold = 0.8;
        assert!(config.validate().is_err());

        let mut config = PracticeConfig::default();
        config.hybrid.urgency = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn oversized_windows_are_rejected() {
        let mut config = PracticeConfig::default();
        config.profiling.recent_days = i64::MAX / 1000;
        assert!(config.validate().is_err());

        let mut config = PracticeConfig::default();
        config.profiling.trend_days = i64::MAX;
        assert!(config.validate().is_err());

        let mut config = PracticeConfig::default();
        config.warmup.lookback_days = MAX_WINDOW_DAYS + 1;
        assert!(config.validate().is_err());

        let mut config = PracticeConfig::default();
        config.profiling.recent_days = MAX_WINDOW_DAYS;
        config.warmup.lookback_days = MAX_WINDOW_DAYS;
        assert!(config.validate().is_ok());
    }
}
