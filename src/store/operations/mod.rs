pub mod cache_entries;
pub mod cards;
pub mod learners;
pub mod practice_config;
pub mod problems;
pub mod review_events;
