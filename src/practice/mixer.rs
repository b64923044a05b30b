//! Splits the recommendation budget across strategic buckets.

use std::collections::{HashMap, HashSet};

use crate::practice::config::MixingConfig;
use crate::practice::domains::DomainMap;
use crate::practice::hybrid::sort_by_score;
use crate::practice::types::{
    LearnerProfile, LearningObjective, RecommendationCandidate, RecommendationItem,
};

const UNTAGGED_TOPIC: &str = "untagged";
const FILL_SUFFIX: &str = "HYBRID_FILL";
const FILL_STRATEGY: &str = "hybrid_fill";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    WeaknessFocus,
    ProgressiveDifficulty,
    TopicCoverage,
    ExamPrep,
    MasteryRefresh,
}

impl Bucket {
    pub fn suffix(self) -> &'static str {
        match self {
            Self::WeaknessFocus => "WEAKNESS_FOCUS",
            Self::ProgressiveDifficulty => "PROGRESSIVE",
            Self::TopicCoverage => "COVERAGE",
            Self::ExamPrep => "EXAM_PREP",
            Self::MasteryRefresh => "MASTERY_REFRESH",
        }
    }

    pub fn strategy(self) -> &'static str {
        match self {
            Self::WeaknessFocus => "weakness_focus",
            Self::ProgressiveDifficulty => "progressive_difficulty",
            Self::TopicCoverage => "topic_coverage",
            Self::ExamPrep => "exam_prep",
            Self::MasteryRefresh => "mastery_refresh",
        }
    }
}

/// Share of the budget per bucket, primary bucket first.
pub fn quota_table(objective: LearningObjective) -> &'static [(Bucket, f64)] {
    use Bucket::*;
    match objective {
        LearningObjective::WeaknessFocus => &[
            (WeaknessFocus, 0.6),
            (ProgressiveDifficulty, 0.2),
            (TopicCoverage, 0.2),
        ],
        LearningObjective::ProgressiveDifficulty => &[
            (ProgressiveDifficulty, 0.5),
            (WeaknessFocus, 0.3),
            (TopicCoverage, 0.2),
        ],
        LearningObjective::TopicCoverage => &[
            (TopicCoverage, 0.5),
            (ProgressiveDifficulty, 0.3),
            (WeaknessFocus, 0.2),
        ],
        LearningObjective::ExamPrep => &[
            (ExamPrep, 0.6),
            (WeaknessFocus, 0.25),
            (MasteryRefresh, 0.15),
        ],
        LearningObjective::RefreshMastered => &[
            (MasteryRefresh, 0.6),
            (TopicCoverage, 0.25),
            (ProgressiveDifficulty, 0.15),
        ],
        LearningObjective::Balanced => &[
            (WeaknessFocus, 0.25),
            (ProgressiveDifficulty, 0.25),
            (TopicCoverage, 0.25),
            (MasteryRefresh, 0.25),
        ],
    }
}

struct BucketContext<'a> {
    profile: &'a LearnerProfile,
    weak: HashSet<String>,
    domains: &'a DomainMap,
    refresh_threshold: f64,
}

impl BucketContext<'_> {
    fn eligible(&self, bucket: Bucket, candidate: &RecommendationCandidate) -> bool {
        match bucket {
            Bucket::WeaknessFocus => self
                .domains
                .normalize_tags(&candidate.tags)
                .iter()
                .any(|tag| self.weak.contains(tag)),
            Bucket::ProgressiveDifficulty => match candidate.difficulty {
                Some(difficulty) => {
                    let target = self
                        .profile
                        .difficulty_preference
                        .preferred
                        .target_difficulty();
                    (difficulty.level() - target.level()).abs() <= 1
                }
                None => true,
            },
            Bucket::TopicCoverage => true,
            Bucket::ExamPrep => candidate.attempts.is_some(),
            Bucket::MasteryRefresh => candidate
                .recent_accuracy
                .is_some_and(|accuracy| accuracy >= self.refresh_threshold),
        }
    }
}

fn primary_topic(candidate: &RecommendationCandidate) -> String {
    candidate
        .tags
        .iter()
        .map(|tag| tag.trim().to_lowercase())
        .find(|tag| !tag.is_empty())
        .unwrap_or_else(|| UNTAGGED_TOPIC.to_string())
}

/// Interleave topics so each one is visited once before any repeats.
/// Topics are ordered by their best-scoring item; `pool` must already be sorted by score.
pub fn round_robin_by_topic<'a>(
    pool: &[&'a RecommendationItem],
    topic_of: impl Fn(&RecommendationItem) -> String,
    quota: usize,
) -> Vec<&'a RecommendationItem> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<&'a RecommendationItem>> = HashMap::new();
    for item in pool {
        let topic = topic_of(item);
        if !groups.contains_key(&topic) {
            order.push(topic.clone());
        }
        groups.entry(topic).or_default().push(item);
    }

    let mut picked = Vec::with_capacity(quota);
    let mut round = 0;
    while picked.len() < quota {
        let mut progressed = false;
        for topic in &order {
            if picked.len() >= quota {
                break;
            }
            if let Some(item) = groups.get(topic).and_then(|items| items.get(round)) {
                picked.push(*item);
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
        round += 1;
    }
    picked
}

fn tagged(item: &RecommendationItem, suffix: &str, strategy: &str) -> RecommendationItem {
    let source = if item.source.is_empty() {
        suffix.to_string()
    } else {
        format!("{}_{}", item.source, suffix)
    };
    RecommendationItem {
        source,
        strategy: Some(strategy.to_string()),
        ..item.clone()
    }
}

pub fn mix(
    items: &[RecommendationItem],
    candidates: &[RecommendationCandidate],
    profile: &LearnerProfile,
    objective: LearningObjective,
    limit: usize,
    config: &MixingConfig,
    domains: &DomainMap,
) -> Vec<RecommendationItem> {
    if limit == 0 {
        return Vec::new();
    }

    let mut pool: Vec<RecommendationItem> = Vec::with_capacity(items.len());
    let mut seen = HashSet::new();
    for item in items {
        if seen.insert(item.problem_id.clone()) {
            pool.push(item.clone());
        }
    }
    sort_by_score(&mut pool);

    if !config.enabled {
        pool.truncate(limit);
        return pool;
    }

    let by_id: HashMap<&str, &RecommendationCandidate> = candidates
        .iter()
        .map(|candidate| (candidate.problem_id.as_str(), candidate))
        .collect();
    let context = BucketContext {
        profile,
        weak: profile.weak_domains().into_iter().collect(),
        domains,
        refresh_threshold: config.refresh_accuracy_threshold,
    };

    let mut selected: HashSet<String> = HashSet::new();
    let mut output: Vec<RecommendationItem> = Vec::with_capacity(limit);

    for (bucket, share) in quota_table(objective) {
        let quota = ((limit as f64) * share) as usize;
        let quota = quota.min(limit - output.len());
        if quota == 0 {
            continue;
        }

        let eligible: Vec<&RecommendationItem> = pool
            .iter()
            .filter(|item| !selected.contains(&item.problem_id))
            .filter(|item| {
                by_id
                    .get(item.problem_id.as_str())
                    .is_some_and(|candidate| context.eligible(*bucket, candidate))
            })
            .collect();

        let picked: Vec<&RecommendationItem> = if *bucket == Bucket::TopicCoverage {
            round_robin_by_topic(
                &eligible,
                |item| {
                    by_id
                        .get(item.problem_id.as_str())
                        .map(|candidate| primary_topic(candidate))
                        .unwrap_or_else(|| UNTAGGED_TOPIC.to_string())
                },
                quota,
            )
        } else {
            eligible.into_iter().take(quota).collect()
        };

        for item in picked {
            selected.insert(item.problem_id.clone());
            output.push(tagged(item, bucket.suffix(), bucket.strategy()));
        }
    }

    let remaining = limit.saturating_sub(output.len());
    let fill: Vec<RecommendationItem> = pool
        .iter()
        .filter(|item| !selected.contains(&item.problem_id))
        .take(remaining)
        .map(|item| tagged(item, FILL_SUFFIX, FILL_STRATEGY))
        .collect();
    output.extend(fill);

    sort_by_score(&mut output);
    output.truncate(limit);
    output
}
