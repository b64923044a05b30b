use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::practice::config::HybridWeights;
use crate::practice::domains::DomainMap;
use crate::practice::types::{
    LearnerProfile, RecommendationCandidate, RecommendationItem, NEUTRAL_SCORE,
};

pub const HYBRID_SOURCE: &str = "HYBRID";

const SIGNAL_THRESHOLD: f64 = 0.7;
const OVERDUE_SATURATION_DAYS: f64 = 7.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HybridBreakdown {
    pub external: f64,
    pub urgency: f64,
    pub similarity: f64,
    pub personalization: f64,
    pub score: f64,
}

fn unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

fn external_score(item: &RecommendationItem) -> f64 {
    if item.score.is_finite() {
        unit(item.score)
    } else {
        NEUTRAL_SCORE
    }
}

/// Missing fields simply contribute nothing.
pub fn urgency_component(candidate: &RecommendationCandidate) -> f64 {
    let mut urgency = 0.0;
    if let Some(u) = candidate.urgency_score {
        urgency += 0.6 * unit(u);
    }
    if let Some(r) = candidate.retention_probability {
        urgency += 0.3 * (1.0 - unit(r));
    }
    if let Some(days) = candidate.days_overdue {
        urgency += 0.1 * unit(days.max(0.0) / OVERDUE_SATURATION_DAYS);
    }
    unit(urgency)
}

pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

pub fn similarity_component(
    candidate: &RecommendationCandidate,
    profile: &LearnerProfile,
    domains: &DomainMap,
) -> f64 {
    let tags = domains.normalize_tags(&candidate.tags);
    let weak: HashSet<String> = profile.weak_domains().into_iter().collect();
    let strong: HashSet<String> = profile.strong_domains().into_iter().collect();
    unit(0.6 * jaccard(&tags, &weak) + 0.4 * jaccard(&tags, &strong))
}

pub fn personalization_component(
    candidate: &RecommendationCandidate,
    profile: &LearnerProfile,
    domains: &DomainMap,
) -> f64 {
    let difficulty_match = match candidate.difficulty {
        Some(difficulty) => {
            let target = profile.difficulty_preference.preferred.target_difficulty();
            let distance = (difficulty.level() - target.level()).abs();
            if distance == 0 {
                1.0
            } else {
                (1.0 - f64::from(distance) * 0.3).max(0.0)
            }
        }
        None => 0.0,
    };

    let known: Vec<f64> = domains
        .normalize_tags(&candidate.tags)
        .iter()
        .filter_map(|domain| profile.domain_skills.get(domain))
        .map(|skill| skill.skill_score)
        .collect();
    let domain_affinity = if known.is_empty() {
        NEUTRAL_SCORE
    } else {
        known.iter().sum::<f64>() / known.len() as f64
    };

    // Optimal challenge: recent accuracy a little below overall mastery.
    let accuracy_match = match candidate.recent_accuracy {
        Some(accuracy) => {
            let target = (profile.overall_mastery - 0.1).clamp(0.3, 0.8);
            (1.0 - (unit(accuracy) - target).abs() * 2.0).max(0.0)
        }
        None => 0.0,
    };

    unit(0.5 * difficulty_match + 0.3 * domain_affinity + 0.2 * accuracy_match)
}

pub fn score_candidate(
    item: &RecommendationItem,
    candidate: &RecommendationCandidate,
    profile: &LearnerProfile,
    weights: &HybridWeights,
    domains: &DomainMap,
) -> HybridBreakdown {
    let external = external_score(item);
    let urgency = urgency_component(candidate);
    let similarity = similarity_component(candidate, profile, domains);
    let personalization = personalization_component(candidate, profile, domains);
    let score = unit(
        weights.external * external
            + weights.urgency * urgency
            + weights.similarity * similarity
            + weights.personalization * personalization,
    );

    HybridBreakdown {
        external,
        urgency,
        similarity,
        personalization,
        score,
    }
}

fn annotate_reason(reason: &str, breakdown: &HybridBreakdown) -> String {
    let signal = if breakdown.urgency > SIGNAL_THRESHOLD {
        Some("High FSRS urgency")
    } else if breakdown.personalization > SIGNAL_THRESHOLD {
        Some("Strong personal match")
    } else if breakdown.similarity > SIGNAL_THRESHOLD {
        Some("Similar to your learning pattern")
    } else {
        None
    };
    match signal {
        Some(signal) if reason.is_empty() => format!("[{signal}]"),
        Some(signal) => format!("{reason} [{signal}]"),
        None => reason.to_string(),
    }
}

/// Sort by score descending; ties by problem id so output is deterministic.
pub fn sort_by_score(items: &mut [RecommendationItem]) {
    items.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.problem_id.cmp(&b.problem_id))
    });
}

/// Re-score externally ranked items with scheduling and personalization signals.
pub fn rank(
    items: &[RecommendationItem],
    candidates: &[RecommendationCandidate],
    profile: &LearnerProfile,
    weights: &HybridWeights,
    domains: &DomainMap,
) -> Vec<RecommendationItem> {
    let by_id: HashMap<&str, &RecommendationCandidate> = candidates
        .iter()
        .map(|candidate| (candidate.problem_id.as_str(), candidate))
        .collect();

    let mut ranked: Vec<RecommendationItem> = items
        .iter()
        .map(|item| match by_id.get(item.problem_id.as_str()) {
            Some(candidate) => {
                let breakdown = score_candidate(item, candidate, profile, weights, domains);
                RecommendationItem {
                    score: breakdown.score,
                    reason: annotate_reason(&item.reason, &breakdown),
                    source: HYBRID_SOURCE.to_string(),
                    ..item.clone()
                }
            }
            None => {
                tracing::warn!(
                    problem_id = %item.problem_id,
                    "No candidate features for item, keeping external score"
                );
                RecommendationItem {
                    score: external_score(item),
                    source: HYBRID_SOURCE.to_string(),
                    ..item.clone()
                }
            }
        })
        .collect();

    sort_by_score(&mut ranked);
    ranked
}
