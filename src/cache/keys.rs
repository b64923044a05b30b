pub fn learner_prefix(learner_id: &str) -> String {
    format!("practice:learner:{}:", learner_id)
}

pub fn queue_key(learner_id: &str, generation: &str, limit: usize) -> String {
    format!(
        "practice:learner:{}:{}:queue:limit_{}",
        learner_id, generation, limit
    )
}

pub fn stats_key(learner_id: &str, generation: &str) -> String {
    format!("practice:learner:{}:{}:stats", learner_id, generation)
}

pub fn profile_key(learner_id: &str, generation: &str) -> String {
    format!("practice:learner:{}:{}:profile", learner_id, generation)
}

/// Every cached entry belonging to one learner.
pub fn learner_pattern(learner_id: &str) -> String {
    format!("practice:learner:{}:*", learner_id)
}

/// The part of a pattern before its first `*`.
pub fn literal_prefix(pattern: &str) -> &str {
    match pattern.find('*') {
        Some(index) => &pattern[..index],
        None => pattern,
    }
}

/// Glob match where `*` matches any run of characters (including none).
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let mut segments = pattern.split('*');
    let Some(first) = segments.next() else {
        return key.is_empty();
    };
    let Some(mut rest) = key.strip_prefix(first) else {
        return false;
    };

    let segments: Vec<&str> = segments.collect();
    let Some((last, middle)) = segments.split_last() else {
        // No `*` at all: exact match.
        return rest.is_empty();
    };

    for segment in middle {
        match rest.find(segment) {
            Some(index) => rest = &rest[index + segment.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn learner_pattern_matches_only_that_learner() {
        let pattern = learner_pattern("ada");
        assert!(glob_match(&pattern, &queue_key("ada", "g0", 20)));
        assert!(glob_match(&pattern, &profile_key("ada", "g1")));
        assert!(!glob_match(&pattern, &stats_key("adam", "g0")));
        assert_eq!(literal_prefix(&pattern), learner_prefix("ada"));
    }

    #[test]
    fn glob_handles_inner_and_missing_wildcards() {
        assert!(glob_match("a*c*e", "abcde"));
        assert!(!glob_match("a*c*e", "abde"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
        assert!(glob_match("*", "anything"));
    }
}
