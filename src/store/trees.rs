pub const LEARNERS: &str = "learners";
pub const PROBLEMS: &str = "problems";
pub const CARDS: &str = "cards";
pub const REVIEW_EVENTS: &str = "review_events";
pub const CACHE_ENTRIES: &str = "cache_entries";
pub const CONFIG_VERSIONS: &str = "config_versions";

// Secondary index trees
pub const CARD_DUE_INDEX: &str = "card_due_index";
