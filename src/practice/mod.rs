pub mod config;
pub mod domains;
pub mod engine;
pub mod hybrid;
pub mod mixer;
pub mod profile;
pub mod queue;
pub mod scheduler;
pub mod types;

use thiserror::Error;

use crate::practice::scheduler::SchedulerError;
use crate::store::StoreError;

pub use engine::PracticeEngine;

#[derive(Debug, Error)]
pub enum PracticeError {
    #[error("rating must be between 1 and 4, got {0}")]
    InvalidRating(i64),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<SchedulerError> for PracticeError {
    fn from(value: SchedulerError) -> Self {
        match value {
            SchedulerError::InvalidRating(rating) => Self::InvalidRating(rating),
            SchedulerError::InvalidParameters(message) => Self::Validation(message),
        }
    }
}
