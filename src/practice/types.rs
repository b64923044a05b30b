use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::operations::problems::ProblemDifficulty;

pub const NEUTRAL_SCORE: f64 = 0.5;

fn neutral_score() -> f64 {
    NEUTRAL_SCORE
}

/// Externally generated candidate features. Read-only input to ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationCandidate {
    pub problem_id: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub difficulty: Option<ProblemDifficulty>,
    #[serde(default)]
    pub attempts: Option<u32>,
    #[serde(default)]
    pub recent_accuracy: Option<f64>,
    #[serde(default)]
    pub urgency_score: Option<f64>,
    #[serde(default)]
    pub retention_probability: Option<f64>,
    #[serde(default)]
    pub days_overdue: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationItem {
    pub problem_id: String,
    #[serde(default = "neutral_score")]
    pub score: f64,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub strategy: Option<String>,
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningObjective {
    WeaknessFocus,
    ProgressiveDifficulty,
    TopicCoverage,
    ExamPrep,
    RefreshMastered,
    /// Fallback for unrecognized objectives.
    Balanced,
}

impl LearningObjective {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "weakness_focus" => Self::WeaknessFocus,
            "progressive_difficulty" => Self::ProgressiveDifficulty,
            "topic_coverage" => Self::TopicCoverage,
            "exam_prep" => Self::ExamPrep,
            "refresh_mastered" => Self::RefreshMastered,
            _ => Self::Balanced,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::WeaknessFocus => "weakness_focus",
            Self::ProgressiveDifficulty => "progressive_difficulty",
            Self::TopicCoverage => "topic_coverage",
            Self::ExamPrep => "exam_prep",
            Self::RefreshMastered => "refresh_mastered",
            Self::Balanced => "balanced",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkillStrength {
    Weak,
    Normal,
    Strong,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainSkill {
    pub domain: String,
    /// Distinct problems reviewed in this domain.
    pub samples: u32,
    pub attempts: u32,
    pub accuracy: f64,
    pub retention: f64,
    pub lapse_rate: f64,
    pub avg_response_time_ms: Option<f64>,
    pub skill_score: f64,
    pub strength: SkillStrength,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DifficultyTrend {
    Increasing,
    Stable,
    Decreasing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PreferredLevel {
    SeekingChallenge,
    Balanced,
    BuildingConfidence,
}

impl PreferredLevel {
    /// The problem difficulty that best fits this preference.
    pub fn target_difficulty(self) -> ProblemDifficulty {
        match self {
            Self::BuildingConfidence => ProblemDifficulty::Easy,
            Self::Balanced => ProblemDifficulty::Medium,
            Self::SeekingChallenge => ProblemDifficulty::Hard,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyPreference {
    pub easy: f64,
    pub medium: f64,
    pub hard: f64,
    pub trend: DifficultyTrend,
    pub preferred: PreferredLevel,
}

impl Default for DifficultyPreference {
    fn default() -> Self {
        Self {
            easy: 0.3,
            medium: 0.5,
            hard: 0.2,
            trend: DifficultyTrend::Stable,
            preferred: PreferredLevel::Balanced,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LearningPattern {
    Struggling,
    SteadyProgress,
    Advanced,
}

/// Derived, cache-only snapshot of a learner's skills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerProfile {
    pub learner_id: String,
    pub domain_skills: BTreeMap<String, DomainSkill>,
    pub difficulty_preference: DifficultyPreference,
    pub tag_affinity: BTreeMap<String, f64>,
    pub overall_mastery: f64,
    pub average_accuracy: f64,
    pub learning_pattern: LearningPattern,
    pub total_attempts: u32,
    pub unique_problems: u32,
    pub generated_at: DateTime<Utc>,
}
