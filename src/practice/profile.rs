//! Learner profile built from recent review events.
//!
//! Every review is weighted by `exp(-age_days / half_life)` so recent practice dominates.
//! The builder never fails: no events means the neutral default profile.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::practice::config::ProfilingConfig;
use crate::practice::types::{
    DifficultyPreference, DifficultyTrend, DomainSkill, LearnerProfile, LearningObjective,
    LearningPattern, PreferredLevel, SkillStrength,
};
use crate::store::operations::problems::{Problem, ProblemDifficulty};
use crate::store::operations::review_events::ReviewEvent;

const ACCURACY_WEIGHT: f64 = 0.45;
const RETENTION_WEIGHT: f64 = 0.25;
const LAPSE_WEIGHT: f64 = 0.15;
const RESPONSE_TIME_WEIGHT: f64 = 0.15;

const NEUTRAL_MASTERY: f64 = 0.5;
const STRUGGLING_BELOW: f64 = 0.4;
const ADVANCED_ABOVE: f64 = 0.7;
const CHALLENGE_HARD_RATIO: f64 = 0.4;
const CONFIDENCE_EASY_RATIO: f64 = 0.5;

const TOP_DOMAINS: usize = 3;
const SUFFICIENT_PROBLEMS: u32 = 10;
const SUFFICIENT_ATTEMPTS: u32 = 20;

/// Everything the builder reads, fetched up front by the caller.
pub struct ProfileInputs<'a> {
    /// Newest first.
    pub events: &'a [ReviewEvent],
    pub problems: &'a HashMap<String, Problem>,
    /// Current retrievability of each reviewed card, keyed by problem id.
    pub retrievability: &'a HashMap<String, f64>,
}

#[derive(Default)]
struct DomainAccumulator {
    weight: f64,
    success_weight: f64,
    retention_weight: f64,
    retention_sum: f64,
    response_weight: f64,
    response_sum: f64,
    lapses: u32,
    attempts: u32,
    problems: HashSet<String>,
}

fn decay_weight(reviewed_at: DateTime<Utc>, now: DateTime<Utc>, half_life_days: f64) -> f64 {
    let age_days = (now - reviewed_at).num_days().max(0) as f64;
    (-age_days / half_life_days).exp()
}

/// 1.0 for answers under 30 seconds, falling off to 0 beyond ~13 minutes.
pub fn response_time_score(avg_response_time_ms: Option<f64>) -> f64 {
    let Some(ms) = avg_response_time_ms.filter(|ms| *ms > 0.0) else {
        return 0.5;
    };
    let minutes = ms / 60_000.0;
    if minutes <= 0.5 {
        1.0
    } else if minutes <= 2.0 {
        (1.0 - (minutes - 0.5) * 0.13).max(0.8)
    } else if minutes <= 5.0 {
        (0.8 - (minutes - 2.0) * 0.13).max(0.4)
    } else {
        (0.4 - (minutes - 5.0) * 0.05).max(0.0)
    }
}

pub fn build_profile(
    learner_id: &str,
    inputs: &ProfileInputs<'_>,
    config: &ProfilingConfig,
    now: DateTime<Utc>,
) -> LearnerProfile {
    if inputs.events.is_empty() {
        return LearnerProfile::neutral(learner_id, now);
    }

    let mut domains: HashMap<String, DomainAccumulator> = HashMap::new();
    let mut affinity: HashMap<String, f64> = HashMap::new();
    let mut seen_problem_tags: HashSet<(String, String)> = HashSet::new();
    let mut unique_problems: HashSet<&str> = HashSet::new();
    let mut successes = 0u32;

    for event in inputs.events {
        let weight = decay_weight(event.reviewed_at, now, config.half_life_days);
        unique_problems.insert(event.problem_id.as_str());
        if event.is_success() {
            successes += 1;
        }

        let Some(problem) = inputs.problems.get(&event.problem_id) else {
            continue;
        };

        for domain in config
            .tag_domains
            .domains_for_tags(&problem.tags, config.max_domains_per_problem)
        {
            let acc = domains.entry(domain).or_default();
            acc.weight += weight;
            acc.attempts += 1;
            if event.is_success() {
                acc.success_weight += weight;
            }
            if event.is_lapse() {
                acc.lapses += 1;
            }
            if let Some(r) = inputs
                .retrievability
                .get(&event.problem_id)
                .copied()
                .filter(|r| *r > 0.0)
            {
                acc.retention_sum += r * weight;
                acc.retention_weight += weight;
            }
            if let Some(rt) = event.response_time_ms.filter(|rt| *rt > 0) {
                acc.response_sum += rt as f64 * weight;
                acc.response_weight += weight;
            }
            acc.problems.insert(event.problem_id.clone());
        }

        // Newest events come first, so each (problem, tag) keeps its most recent weight.
        for tag in &problem.tags {
            let tag = tag.trim().to_lowercase();
            if tag.is_empty() {
                continue;
            }
            if seen_problem_tags.insert((event.problem_id.clone(), tag.clone())) {
                *affinity.entry(tag).or_insert(0.0) += weight;
            }
        }
    }

    let domain_skills: BTreeMap<String, DomainSkill> = domains
        .into_iter()
        .map(|(domain, acc)| {
            let skill = domain_skill(&domain, &acc, config);
            (domain, skill)
        })
        .collect();

    let overall_mastery = overall_mastery(&domain_skills);
    let total = inputs.events.len() as u32;
    let average_accuracy =
        (f64::from(successes) + config.alpha) / (f64::from(total) + config.alpha + config.beta);

    LearnerProfile {
        learner_id: learner_id.to_string(),
        difficulty_preference: difficulty_preference(inputs, config, now),
        tag_affinity: normalize_affinity(affinity),
        overall_mastery,
        average_accuracy,
        learning_pattern: classify_pattern(overall_mastery),
        total_attempts: total,
        unique_problems: unique_problems.len() as u32,
        domain_skills,
        generated_at: now,
    }
}

fn domain_skill(domain: &str, acc: &DomainAccumulator, config: &ProfilingConfig) -> DomainSkill {
    let accuracy =
        (acc.success_weight + config.alpha) / (acc.weight + config.alpha + config.beta);
    let retention = if acc.retention_weight > 0.0 {
        acc.retention_sum / acc.retention_weight
    } else {
        config.default_retention
    };
    let lapse_rate = if acc.attempts > 0 {
        f64::from(acc.lapses) / f64::from(acc.attempts)
    } else {
        0.0
    };
    let avg_response_time_ms =
        (acc.response_weight > 0.0).then(|| acc.response_sum / acc.response_weight);

    let skill_score = (ACCURACY_WEIGHT * accuracy
        + RETENTION_WEIGHT * retention
        + LAPSE_WEIGHT * (1.0 - lapse_rate)
        + RESPONSE_TIME_WEIGHT * response_time_score(avg_response_time_ms))
    .clamp(0.0, 1.0);

    let samples = acc.problems.len() as u32;
    let strength = if samples < config.min_samples {
        SkillStrength::Normal
    } else if skill_score < config.weak_threshold {
        SkillStrength::Weak
    } else if skill_score > config.strong_threshold {
        SkillStrength::Strong
    } else {
        SkillStrength::Normal
    };

    DomainSkill {
        domain: domain.to_string(),
        samples,
        attempts: acc.attempts,
        accuracy,
        retention,
        lapse_rate,
        avg_response_time_ms,
        skill_score,
        strength,
    }
}

fn overall_mastery(skills: &BTreeMap<String, DomainSkill>) -> f64 {
    let (weighted, total) = skills.values().fold((0.0, 0.0), |(weighted, total), skill| {
        let weight = f64::from(skill.samples.max(1));
        (weighted + skill.skill_score * weight, total + weight)
    });
    if total > 0.0 {
        (weighted / total).clamp(0.0, 1.0)
    } else {
        NEUTRAL_MASTERY
    }
}

fn classify_pattern(mastery: f64) -> LearningPattern {
    if mastery < STRUGGLING_BELOW {
        LearningPattern::Struggling
    } else if mastery > ADVANCED_ABOVE {
        LearningPattern::Advanced
    } else {
        LearningPattern::SteadyProgress
    }
}

fn hard_ratio(levels: &[ProblemDifficulty]) -> f64 {
    let hard = levels
        .iter()
        .filter(|level| **level == ProblemDifficulty::Hard)
        .count();
    hard as f64 / levels.len() as f64
}

fn difficulty_preference(
    inputs: &ProfileInputs<'_>,
    config: &ProfilingConfig,
    now: DateTime<Utc>,
) -> DifficultyPreference {
    let mut counts = [0u32; 3];
    let mut recent = Vec::new();
    let mut prior = Vec::new();

    for event in inputs.events {
        let Some(problem) = inputs.problems.get(&event.problem_id) else {
            continue;
        };
        counts[problem.difficulty.level() as usize] += 1;

        let age_days = (now - event.reviewed_at).num_days();
        if age_days < config.trend_days {
            recent.push(problem.difficulty);
        } else if age_days < config.trend_days.saturating_mul(2) {
            prior.push(problem.difficulty);
        }
    }

    let total: u32 = counts.iter().sum();
    if total == 0 {
        return DifficultyPreference::default();
    }
    let easy = f64::from(counts[0]) / f64::from(total);
    let medium = f64::from(counts[1]) / f64::from(total);
    let hard = f64::from(counts[2]) / f64::from(total);

    let trend = if recent.len() >= config.min_trend_events && prior.len() >= config.min_trend_events
    {
        let delta = hard_ratio(&recent) - hard_ratio(&prior);
        if delta > config.trend_threshold {
            DifficultyTrend::Increasing
        } else if delta < -config.trend_threshold {
            DifficultyTrend::Decreasing
        } else {
            DifficultyTrend::Stable
        }
    } else {
        DifficultyTrend::Stable
    };

    let preferred = if hard > CHALLENGE_HARD_RATIO {
        PreferredLevel::SeekingChallenge
    } else if easy > CONFIDENCE_EASY_RATIO {
        PreferredLevel::BuildingConfidence
    } else {
        PreferredLevel::Balanced
    };

    DifficultyPreference {
        easy,
        medium,
        hard,
        trend,
        preferred,
    }
}

fn normalize_affinity(raw: HashMap<String, f64>) -> BTreeMap<String, f64> {
    let max = raw.values().copied().fold(0.0_f64, f64::max);
    if max <= 0.0 {
        return BTreeMap::new();
    }
    raw.into_iter().map(|(tag, w)| (tag, w / max)).collect()
}

impl LearnerProfile {
    /// Cold-start profile for learners without reviews.
    pub fn neutral(learner_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            learner_id: learner_id.to_string(),
            domain_skills: BTreeMap::new(),
            difficulty_preference: DifficultyPreference::default(),
            tag_affinity: BTreeMap::new(),
            overall_mastery: NEUTRAL_MASTERY,
            average_accuracy: NEUTRAL_MASTERY,
            learning_pattern: LearningPattern::SteadyProgress,
            total_attempts: 0,
            unique_problems: 0,
            generated_at: now,
        }
    }

    /// Up to three weak domains, weakest first.
    pub fn weak_domains(&self) -> Vec<String> {
        let mut weak: Vec<&DomainSkill> = self
            .domain_skills
            .values()
            .filter(|skill| skill.strength == SkillStrength::Weak)
            .collect();
        weak.sort_by(|a, b| {
            a.skill_score
                .partial_cmp(&b.skill_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.domain.cmp(&b.domain))
        });
        weak.into_iter()
            .take(TOP_DOMAINS)
            .map(|skill| skill.domain.clone())
            .collect()
    }

    /// Up to three strong domains, strongest first.
    pub fn strong_domains(&self) -> Vec<String> {
        let mut strong: Vec<&DomainSkill> = self
            .domain_skills
            .values()
            .filter(|skill| skill.strength == SkillStrength::Strong)
            .collect();
        strong.sort_by(|a, b| {
            b.skill_score
                .partial_cmp(&a.skill_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.domain.cmp(&b.domain))
        });
        strong
            .into_iter()
            .take(TOP_DOMAINS)
            .map(|skill| skill.domain.clone())
            .collect()
    }

    pub fn needs_more_practice(&self) -> bool {
        self.learning_pattern == LearningPattern::Struggling
            || self.overall_mastery < 0.5
            || self.average_accuracy < 0.6
    }

    pub fn ready_for_challenge(&self) -> bool {
        self.learning_pattern == LearningPattern::Advanced
            || self.overall_mastery > 0.7
            || self.difficulty_preference.hard > CHALLENGE_HARD_RATIO
    }

    pub fn has_sufficient_data(&self) -> bool {
        self.unique_problems >= SUFFICIENT_PROBLEMS && self.total_attempts >= SUFFICIENT_ATTEMPTS
    }

    /// 0..1 estimate of how much the profile can be trusted.
    pub fn data_quality(&self, min_samples: u32) -> f64 {
        let sufficient_domains = self
            .domain_skills
            .values()
            .filter(|skill| skill.samples >= min_samples)
            .count();
        let domain_part = (sufficient_domains as f64 / 5.0).min(1.0);
        let attempt_part = (f64::from(self.total_attempts) / 100.0).min(1.0);
        (domain_part + attempt_part) / 2.0
    }

    pub fn dominant_difficulty(&self) -> ProblemDifficulty {
        let p = &self.difficulty_preference;
        if p.hard >= p.medium && p.hard >= p.easy {
            ProblemDifficulty::Hard
        } else if p.medium >= p.easy {
            ProblemDifficulty::Medium
        } else {
            ProblemDifficulty::Easy
        }
    }

    pub fn recommendation_focus(&self) -> LearningObjective {
        if !self.weak_domains().is_empty() && self.needs_more_practice() {
            LearningObjective::WeaknessFocus
        } else if self.ready_for_challenge() {
            LearningObjective::ProgressiveDifficulty
        } else {
            LearningObjective::TopicCoverage
        }
    }

    pub fn summary(&self) -> String {
        let pattern = match self.learning_pattern {
            LearningPattern::Struggling => "struggling",
            LearningPattern::SteadyProgress => "steady progress",
            LearningPattern::Advanced => "advanced",
        };
        let weak = self.weak_domains();
        let weak_part = if weak.is_empty() {
            "no weak domains identified".to_string()
        } else {
            format!("weak in {}", weak.join(", "))
        };
        format!(
            "{} attempts over {} problems, mastery {:.0}%, {}, {}",
            self.total_attempts,
            self.unique_problems,
            self.overall_mastery * 100.0,
            pattern,
            weak_part
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn problem(id: &str, difficulty: ProblemDifficulty, tags: &[&str]) -> Problem {
        let now = Utc::now();
        Problem {
            id: id.to_string(),
            title: id.to_string(),
            difficulty,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            created_at: now,
            updated_at: now,
        }
    }

    fn event(problem_id: &str, rating: u8, at: DateTime<Utc>) -> ReviewEvent {
        ReviewEvent::for_test("l1", problem_id, rating, at)
    }

    #[test]
    fn empty_history_gives_neutral_profile() {
        let problems = HashMap::new();
        let retrievability = HashMap::new();
        let inputs = ProfileInputs {
            events: &[],
            problems: &problems,
            retrievability: &retrievability,
        };
        let profile = build_profile("l1", &inputs, &ProfilingConfig::default(), Utc::now());
        assert_eq!(profile.overall_mastery, 0.5);
        assert!(profile.domain_skills.is_empty());
        assert_eq!(profile.learning_pattern, LearningPattern::SteadyProgress);
        assert_eq!(profile.difficulty_preference.preferred, PreferredLevel::Balanced);
    }

    #[test]
    fn failing_graph_and_passing_arrays_split_into_weak_and_strong() {
        let now = Utc::now();
        let mut problems = HashMap::new();
        let mut retrievability = HashMap::new();
        let mut events = Vec::new();
        for i in 0..12 {
            let g = format!("g{i}");
            let a = format!("a{i}");
            problems.insert(g.clone(), problem(&g, ProblemDifficulty::Hard, &["graph"]));
            problems.insert(a.clone(), problem(&a, ProblemDifficulty::Easy, &["array"]));
            retrievability.insert(g.clone(), 0.2);
            retrievability.insert(a.clone(), 0.95);
            events.push(event(&g, 1, now - Duration::days(i)));
            events.push(event(&a, 4, now - Duration::days(i)));
        }
        events.sort_by(|x, y| y.reviewed_at.cmp(&x.reviewed_at));

        let inputs = ProfileInputs {
            events: &events,
            problems: &problems,
            retrievability: &retrievability,
        };
        let profile = build_profile("l1", &inputs, &ProfilingConfig::default(), now);

        assert_eq!(profile.weak_domains(), vec!["graph".to_string()]);
        assert_eq!(profile.strong_domains(), vec!["arrays".to_string()]);
        assert_eq!(profile.domain_skills["graph"].lapse_rate, 1.0);
        assert_eq!(profile.domain_skills["graph"].samples, 12);
        assert!((profile.difficulty_preference.hard - 0.5).abs() < 1e-9);
        assert!(profile.has_sufficient_data());
    }

    #[test]
    fn repeated_reviews_do_not_inflate_tag_affinity() {
        let now = Utc::now();
        let mut problems = HashMap::new();
        problems.insert("p1".to_string(), problem("p1", ProblemDifficulty::Medium, &["tree"]));
        problems.insert("p2".to_string(), problem("p2", ProblemDifficulty::Medium, &["graph"]));
        let events = vec![
            event("p1", 3, now),
            event("p2", 3, now),
            event("p1", 3, now - Duration::hours(1)),
            event("p1", 3, now - Duration::hours(2)),
        ];
        let retrievability = HashMap::new();
        let inputs = ProfileInputs {
            events: &events,
            problems: &problems,
            retrievability: &retrievability,
        };
        let profile = build_profile("l1", &inputs, &ProfilingConfig::default(), now);

        assert_eq!(profile.tag_affinity["tree"], 1.0);
        assert_eq!(profile.tag_affinity["graph"], 1.0);
        // No retrievability data falls back to the neutral retention.
        assert_eq!(profile.domain_skills["trees"].retention, 0.6);
    }

    #[test]
    fn trend_needs_enough_events_in_both_windows() {
        let now = Utc::now();
        let mut problems = HashMap::new();
        problems.insert("h".to_string(), problem("h", ProblemDifficulty::Hard, &["math"]));
        problems.insert("e".to_string(), problem("e", ProblemDifficulty::Easy, &["math"]));

        let mut events: Vec<ReviewEvent> = (0..6)
            .map(|i| event("h", 3, now - Duration::days(i)))
            .collect();
        let retrievability = HashMap::new();

        let inputs = ProfileInputs {
            events: &events,
            problems: &problems,
            retrievability: &retrievability,
        };
        let config = ProfilingConfig::default();
        assert_eq!(
            build_profile("l1", &inputs, &config, now).difficulty_preference.trend,
            DifficultyTrend::Stable
        );

        events.extend((0..6).map(|i| event("e", 3, now - Duration::days(35 + i))));
        let inputs = ProfileInputs {
            events: &events,
            problems: &problems,
            retrievability: &retrievability,
        };
        assert_eq!(
            build_profile("l1", &inputs, &config, now).difficulty_preference.trend,
            DifficultyTrend::Increasing
        );
    }

    #[test]
    fn response_time_score_bands() {
        assert_eq!(response_time_score(None), 0.5);
        assert_eq!(response_time_score(Some(20_000.0)), 1.0);
        assert!((response_time_score(Some(60_000.0)) - 0.935).abs() < 1e-9);
        assert_eq!(response_time_score(Some(60_000.0 * 30.0)), 0.0);
    }
}
