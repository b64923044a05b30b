use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProblemDifficulty {
    Easy,
    Medium,
    Hard,
}

impl ProblemDifficulty {
    pub fn level(self) -> i32 {
        match self {
            Self::Easy => 0,
            Self::Medium => 1,
            Self::Hard => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "EASY",
            Self::Medium => "MEDIUM",
            Self::Hard => "HARD",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    pub id: String,
    pub title: String,
    pub difficulty: ProblemDifficulty,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Store {
    pub fn upsert_problem(&self, problem: &Problem) -> Result<(), StoreError> {
        let key = keys::problem_key(&problem.id)?;
        self.problems
            .insert(key.as_bytes(), Self::serialize(problem)?)?;
        Ok(())
    }

    pub fn get_problem(&self, problem_id: &str) -> Result<Option<Problem>, StoreError> {
        let key = keys::problem_key(problem_id)?;
        match self.problems.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// Missing ids are simply absent from the returned map.
    pub fn get_problems_batch(
        &self,
        problem_ids: &[String],
    ) -> Result<HashMap<String, Problem>, StoreError> {
        let mut found = HashMap::with_capacity(problem_ids.len());
        for pid in problem_ids {
            if found.contains_key(pid) {
                continue;
            }
            if let Some(problem) = self.get_problem(pid)? {
                found.insert(pid.clone(), problem);
            }
        }
        Ok(found)
    }
}
