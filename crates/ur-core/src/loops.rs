//! Redirect cycle detection
//!
//! Each rule is an edge `normalize(source) -> normalize(target)`. A
//! candidate rule creates a loop when walking the edges from its target
//! reaches a node that its own source would match again.
//!
//! Edges are followed in both prefix directions: a node continues along an
//! edge when the node starts with the edge's source (the navigation would
//! really fire that rule) or when the edge's source starts with the node.
//! The second direction over-approximates, so some rule sets that could
//! never loop in practice are still rejected.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::types::{is_shuffle_target, Rule};
use crate::url::normalize;

/// Whether adding `candidate_source -> candidate_target` to `existing`
/// forms a direct or transitive redirect cycle.
pub fn detect_loop(candidate_source: &str, candidate_target: &str, existing: &[Rule]) -> bool {
    find_loop_path(candidate_source, candidate_target, existing).is_some()
}

/// Like [`detect_loop`], returning the normalized nodes of the cycle,
/// starting with the candidate source and ending with the node that leads
/// back into it.
pub fn find_loop_path(
    candidate_source: &str,
    candidate_target: &str,
    existing: &[Rule],
) -> Option<Vec<String>> {
    if is_shuffle_target(candidate_target) {
        return None;
    }

    let source = normalize(candidate_source);
    let target = normalize(candidate_target);
    if source.is_empty() || target.is_empty() {
        return None;
    }

    // Self-loop, including a target below the source's path
    if target.starts_with(source.as_str()) {
        return Some(vec![source, target]);
    }

    let mut edges: Vec<(String, String)> = existing
        .iter()
        .filter(|rule| !rule.is_shuffle())
        .map(|rule| (rule.normalized_source(), normalize(&rule.target)))
        .filter(|(from, to)| !from.is_empty() && !to.is_empty())
        .collect();
    edges.push((source.clone(), target.clone()));

    let mut parents: HashMap<String, String> = HashMap::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue = VecDeque::new();
    visited.insert(target.clone());
    queue.push_back(target.clone());

    while let Some(node) = queue.pop_front() {
        if node.starts_with(source.as_str()) {
            return Some(reconstruct(&source, &target, &node, &parents));
        }

        for (from, to) in &edges {
            let follows = node.starts_with(from.as_str()) || from.starts_with(node.as_str());
            if follows && visited.insert(to.clone()) {
                parents.insert(to.clone(), node.clone());
                queue.push_back(to.clone());
            }
        }
    }

    None
}

fn reconstruct(source: &str, target: &str, end: &str, parents: &HashMap<String, String>) -> Vec<String> {
    let mut path = vec![end.to_string()];
    let mut current = end;
    while current != target {
        match parents.get(current) {
            Some(parent) => {
                path.push(parent.clone());
                current = parent;
            }
            None => break,
        }
    }
    path.push(source.to_string());
    path.reverse();
    path
}

/// Rules in `rules` that already sit on a cycle with the others.
///
/// Used to audit imported or legacy data that bypassed admission checks.
pub fn rules_in_loops(rules: &[Rule]) -> Vec<&Rule> {
    rules
        .iter()
        .enumerate()
        .filter(|(idx, rule)| {
            let others: Vec<Rule> = rules
                .iter()
                .enumerate()
                .filter(|(other_idx, _)| other_idx != idx)
                .map(|(_, other)| other.clone())
                .collect();
            detect_loop(&rule.source, &rule.target, &others)
        })
        .map(|(_, rule)| rule)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(pairs: &[(&str, &str)]) -> Vec<Rule> {
        pairs
            .iter()
            .enumerate()
            .map(|(i, (s, t))| Rule::new(i as i64 + 1, *s, *t))
            .collect()
    }

    #[test]
    fn test_self_loop() {
        assert!(detect_loop("a.com", "https://www.a.com", &[]));
        assert!(detect_loop("a.com", "a.com/focus", &[]));
        assert!(!detect_loop("a.com/videos", "a.com", &[]));
    }

    #[test]
    fn test_direct_cycle() {
        let existing = rules(&[("a.com", "b.com")]);
        assert!(detect_loop("b.com", "a.com", &existing));
        assert!(detect_loop("https://B.com", "http://www.a.com", &existing));
    }

    #[test]
    fn test_transitive_cycle() {
        let existing = rules(&[("a.com", "b.com"), ("b.com", "c.com")]);
        assert!(detect_loop("c.com", "a.com", &existing));
        assert!(!detect_loop("c.com", "d.com", &existing));
    }

    #[test]
    fn test_path_reported() {
        let existing = rules(&[("a.com", "b.com"), ("b.com", "c.com")]);
        let path = find_loop_path("c.com", "a.com", &existing).expect("loop");
        assert_eq!(path, vec!["c.com", "a.com", "b.com", "c.com"]);
    }

    #[test]
    fn test_sub_page_reaches_source() {
        let existing = rules(&[("a.com", "b.com/x/y")]);
        assert!(detect_loop("b.com/x", "a.com", &existing));
    }

    #[test]
    fn test_deeper_source_edge_is_followed() {
        // Landing on a.com never fires a.com/deep, but the edge is still taken
        let existing = rules(&[("a.com/deep", "x.com")]);
        assert!(detect_loop("x.com", "a.com", &existing));
        assert_eq!(
            find_loop_path("x.com", "a.com", &existing).expect("loop"),
            vec!["x.com", "a.com", "x.com"]
        );
        assert!(!detect_loop("x.com", "a.org", &existing));
    }

    #[test]
    fn test_shuffle_edges_ignored() {
        let existing = rules(&[("a.com", ":shuffle:")]);
        assert!(!detect_loop("b.com", "a.com", &existing));
        assert!(!detect_loop("a.com", ":shuffle:", &[]));
    }

    #[test]
    fn test_latent_cycle_terminates() {
        // Malformed data: x <-> y already loop
        let existing = rules(&[("x.com", "y.com"), ("y.com", "x.com"), ("a.com", "x.com")]);
        assert!(!detect_loop("q.com", "a.com", &existing));
    }

    #[test]
    fn test_rules_in_loops() {
        let stored = rules(&[("a.com", "b.com"), ("b.com", "a.com"), ("c.com", "d.com")]);
        let looping: Vec<i64> = rules_in_loops(&stored).iter().map(|r| r.id).collect();
        assert_eq!(looping, vec![1, 2]);
    }
}
