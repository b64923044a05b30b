use chrono::Utc;

use practice_backend::practice::types::{RecommendationCandidate, RecommendationItem};
use practice_backend::store::operations::learners::Learner;
use practice_backend::store::operations::problems::{Problem, ProblemDifficulty};
use practice_backend::store::Store;

pub fn seed_learner(store: &Store, display_name: &str) -> Learner {
    let now = Utc::now();
    let learner = Learner {
        id: uuid::Uuid::new_v4().to_string(),
        display_name: display_name.to_string(),
        scheduler_parameters: None,
        created_at: now,
        updated_at: now,
    };
    store.create_learner(&learner).expect("create seed learner");
    learner
}

pub fn seed_problem(store: &Store, id: &str, difficulty: ProblemDifficulty, tags: &[&str]) -> Problem {
    let now = Utc::now();
    let problem = Problem {
        id: id.to_string(),
        title: format!("Problem {id}"),
        difficulty,
        tags: tags.iter().map(|t| t.to_string()).collect(),
        created_at: now,
        updated_at: now,
    };
    store.upsert_problem(&problem).expect("upsert seed problem");
    problem
}

/// `count` medium problems tagged `array`, ids `p-0..p-{count}`.
pub fn seed_problems(store: &Store, count: usize) -> Vec<Problem> {
    (0..count)
        .map(|idx| seed_problem(store, &format!("p-{idx}"), ProblemDifficulty::Medium, &["array"]))
        .collect()
}

pub fn item(problem_id: &str, score: f64) -> RecommendationItem {
    RecommendationItem {
        problem_id: problem_id.to_string(),
        score,
        reason: "external".to_string(),
        strategy: None,
        source: "LLM".to_string(),
    }
}

pub fn candidate(problem_id: &str, tags: &[&str]) -> RecommendationCandidate {
    RecommendationCandidate {
        problem_id: problem_id.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        difficulty: Some(ProblemDifficulty::Medium),
        attempts: Some(2),
        recent_accuracy: Some(0.5),
        urgency_score: Some(0.5),
        retention_probability: Some(0.6),
        days_overdue: Some(1.0),
    }
}
