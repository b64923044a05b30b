use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::MAX_CAS_RETRIES;
use crate::practice::scheduler::SchedulerParameters;
use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Learner {
    pub id: String,
    pub display_name: String,
    /// Personalized scheduling parameters; the configured defaults apply when absent.
    #[serde(default)]
    pub scheduler_parameters: Option<SchedulerParameters>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Store {
    pub fn create_learner(&self, learner: &Learner) -> Result<(), StoreError> {
        let key = keys::learner_key(&learner.id)?;
        let value = Self::serialize(learner)?;

        match self
            .learners
            .compare_and_swap(key.as_bytes(), None::<&[u8]>, Some(value))?
        {
            Ok(()) => Ok(()),
            Err(_) => Err(StoreError::Conflict {
                entity: "learner".to_string(),
                key,
            }),
        }
    }

    pub fn get_learner(&self, learner_id: &str) -> Result<Option<Learner>, StoreError> {
        let key = keys::learner_key(learner_id)?;
        match self.learners.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn learner_exists(&self, learner_id: &str) -> Result<bool, StoreError> {
        let key = keys::learner_key(learner_id)?;
        Ok(self.learners.contains_key(key.as_bytes())?)
    }

    /// Replace (or clear) the personalized parameters with a CAS loop.
    pub fn set_learner_parameters(
        &self,
        learner_id: &str,
        parameters: Option<SchedulerParameters>,
    ) -> Result<Learner, StoreError> {
        let key = keys::learner_key(learner_id)?;

        for _ in 0..MAX_CAS_RETRIES {
            let Some(current_raw) = self.learners.get(key.as_bytes())? else {
                return Err(StoreError::NotFound {
                    entity: "learner".to_string(),
                    key,
                });
            };
            let mut learner: Learner = Self::deserialize(&current_raw)?;
            learner.scheduler_parameters = parameters.clone();
            learner.updated_at = Utc::now();
            let next = Self::serialize(&learner)?;

            if self
                .learners
                .compare_and_swap(key.as_bytes(), Some(current_raw), Some(next))?
                .is_ok()
            {
                return Ok(learner);
            }
        }

        Err(StoreError::CasRetryExhausted {
            entity: "learner".to_string(),
            key,
            attempts: MAX_CAS_RETRIES,
        })
    }

    pub fn list_learner_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut ids = Vec::new();
        for item in self.learners.iter() {
            let (key, _) = item?;
            ids.push(String::from_utf8_lossy(&key).to_string());
        }
        Ok(ids)
    }
}
