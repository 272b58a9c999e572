use std::collections::HashMap;

use crate::config::MatchPolicy;
use crate::model::MatchKind;

/// Insertion-ordered map of normalized source keys. Re-inserting a key
/// replaces its value but keeps its original position, so matching always
/// walks sources in the order they were first seen.
#[derive(Debug, Clone)]
pub struct SourceKeys<V> {
    entries: Vec<(String, V)>,
    index: HashMap<String, usize>,
}

impl<V> Default for SourceKeys<V> {
    fn default() -> Self {
        Self { entries: Vec::new(), index: HashMap::new() }
    }
}

impl<V> SourceKeys<V> {
    pub fn insert(&mut self, key: String, value: V) {
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1 = value,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn entry(&self, i: usize) -> (&str, &V) {
        let (k, v) = &self.entries[i];
        (k.as_str(), v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Find the source key a normalized stored name resolves to.
///
/// Exact match first, then the first key that is a prefix of the name or
/// has the name as a prefix, then the closest key by edit distance within
/// the policy threshold. Returns the key's position.
pub fn find_match<V>(norm_name: &str, keys: &SourceKeys<V>, policy: &MatchPolicy) -> Option<(usize, MatchKind)> {
    if norm_name.is_empty() {
        return None;
    }

    if let Some(i) = keys.position(norm_name) {
        return Some((i, MatchKind::Exact));
    }

    for (i, (key, _)) in keys.iter().enumerate() {
        if !key.is_empty() && (norm_name.starts_with(key) || key.starts_with(norm_name)) {
            return Some((i, MatchKind::Prefix));
        }
    }

    fuzzy_match(norm_name, keys, policy).map(|(i, distance)| (i, MatchKind::Fuzzy { distance }))
}

/// Closest key sharing the first character, within the length and distance
/// threshold. Ties keep the earlier key.
fn fuzzy_match<V>(norm_name: &str, keys: &SourceKeys<V>, policy: &MatchPolicy) -> Option<(usize, usize)> {
    let name_len = norm_name.chars().count();
    let threshold = policy.threshold(name_len);
    let first = norm_name.chars().next()?;

    let mut best: Option<(usize, usize)> = None;
    for (i, (key, _)) in keys.iter().enumerate() {
        if key.chars().next() != Some(first) {
            continue;
        }
        if key.chars().count().abs_diff(name_len) > threshold {
            continue;
        }
        let dist = strsim::levenshtein(norm_name, key);
        if dist <= threshold && best.map_or(true, |(_, d)| dist < d) {
            best = Some((i, dist));
        }
    }
    best
}
