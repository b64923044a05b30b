use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Problem tags as they appear in the catalogue, mapped onto skill domains.
const DEFAULT_TAG_DOMAINS: &[(&str, &str)] = &[
    ("array", "arrays"),
    ("linked-list", "linked_lists"),
    ("hash-table", "hash_tables"),
    ("string", "strings"),
    ("two-pointers", "two_pointers"),
    ("sliding-window", "sliding_window"),
    ("binary-search", "binary_search"),
    ("sorting", "sorting"),
    ("backtracking", "backtracking"),
    ("divide-and-conquer", "divide_conquer"),
    ("greedy", "greedy"),
    ("dynamic-programming", "dynamic_programming"),
    ("graph", "graph"),
    ("tree", "trees"),
    ("binary-tree", "binary_trees"),
    ("heap", "heaps"),
    ("priority-queue", "heaps"),
    ("stack", "stacks_queues"),
    ("queue", "stacks_queues"),
    ("bit-manipulation", "bit_manipulation"),
    ("math", "math"),
    ("prefix-sum", "prefix_sum"),
    ("union-find", "union_find"),
    ("monotonic-stack", "monotonic_stack"),
    ("trie", "tries"),
    ("geometry", "geometry"),
    ("matrix", "matrices"),
    ("design", "system_design"),
    ("simulation", "simulation"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainMap {
    mapping: HashMap<String, String>,
}

impl Default for DomainMap {
    fn default() -> Self {
        Self {
            mapping: DEFAULT_TAG_DOMAINS
                .iter()
                .map(|(tag, domain)| (tag.to_string(), domain.to_string()))
                .collect(),
        }
    }
}

fn canonical_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}

impl DomainMap {
    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    pub fn domain_for(&self, tag: &str) -> Option<&str> {
        self.mapping.get(&canonical_tag(tag)).map(String::as_str)
    }

    /// Known domains for a problem, sorted, at most `max_domains`. Unmapped tags are dropped.
    pub fn domains_for_tags(&self, tags: &[String], max_domains: usize) -> Vec<String> {
        let domains: BTreeSet<&str> = tags.iter().filter_map(|tag| self.domain_for(tag)).collect();
        domains
            .into_iter()
            .take(max_domains)
            .map(str::to_string)
            .collect()
    }

    /// Tags mapped to their domain where one is known, lowercased otherwise.
    pub fn normalize_tags(&self, tags: &[String]) -> HashSet<String> {
        tags.iter()
            .filter(|tag| !tag.trim().is_empty())
            .map(|tag| match self.domain_for(tag) {
                Some(domain) => domain.to_string(),
                None => canonical_tag(tag),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn problem_contributes_to_at_most_two_known_domains() {
        let map = DomainMap::default();
        let domains = map.domains_for_tags(
            &tags(&["Tree", "graph", "dynamic-programming", "made-up"]),
            2,
        );
        assert_eq!(domains, vec!["dynamic_programming".to_string(), "graph".to_string()]);
    }

    #[test]
    fn normalization_keeps_unknown_tags_lowercased() {
        let map = DomainMap::default();
        let normalized = map.normalize_tags(&tags(&["Heap", "priority-queue", "Quirky"]));
        assert!(normalized.contains("heaps"));
        assert!(normalized.contains("quirky"));
        assert_eq!(normalized.len(), 2);
    }
}
