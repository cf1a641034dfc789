//! # Query Matching
//!
//! Pure matching, grouping, and ranking for directory queries. Everything in
//! this module operates on plain values; the engine task feeds it candidates
//! from the history map and owns the resulting id table.
//!
//! ## Pipeline
//!
//! For a free-text query:
//!
//! 1. [`match_path`] checks every term of the query against a path and
//!    records the byte offsets of each occurrence.
//! 2. [`sort_group`] collapses large groups of siblings under their shared
//!    matched prefix, then ranks by component-boundary matches and recency.
//! 3. [`ResultIdTable`] hands out the short numeric ids shown next to each
//!    result, so a follow-up query for `3` can resolve back to a path.
//!
//! Matching is ASCII case-insensitive. Lowercasing ASCII never changes byte
//! positions, so offsets computed against the folded copy index the original
//! path directly and always land on character boundaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::history::DirUsage;

/// Query token that lists every known directory.
pub const QUERY_ALL: &str = "*";

/// Byte range of one term occurrence inside a path string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOffset {
    /// Byte position of the first matched character.
    pub start: usize,
    /// Length of the matched text in bytes.
    pub len: usize,
}

impl MatchOffset {
    /// Byte position one past the last matched character.
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// One entry of a query response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryMatch {
    /// Short id for follow-up numeric queries; `0` when the result list was
    /// not ranked (wildcard listings).
    pub id: u32,
    /// The matched directory record.
    pub usage: DirUsage,
    /// Where the query terms matched, for client-side highlighting. Empty
    /// for wildcard and numeric queries.
    pub offsets: Vec<MatchOffset>,
}

/// A matched history entry before ids are assigned.
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub usage: DirUsage,
    pub offsets: Vec<MatchOffset>,
}

/// Match every whitespace-delimited term of `pattern` against `path`.
///
/// Returns the offsets of all non-overlapping occurrences of every term, or
/// `None` unless each term occurs at least once. A pattern without any terms
/// matches nothing.
pub fn match_path(pattern: &str, path: &str) -> Option<Vec<MatchOffset>> {
    let terms: Vec<&str> = pattern.split_whitespace().collect();
    if terms.is_empty() {
        return None;
    }

    let haystack = path.to_ascii_lowercase();
    let mut offsets = Vec::new();
    for term in terms {
        let needle = term.to_ascii_lowercase();
        let mut from = 0;
        let mut found = false;
        while let Some(index) = haystack[from..].find(&needle) {
            offsets.push(MatchOffset {
                start: from + index,
                len: needle.len(),
            });
            from += index + needle.len();
            found = true;
        }
        if !found {
            return None;
        }
    }
    Some(offsets)
}

/// Count the distinct matched substrings that start a path component, i.e.
/// begin immediately after a `/`. Matches on component boundaries make a
/// result rank higher than incidental mid-segment hits.
pub fn component_prefix_matches(path: &str, offsets: &[MatchOffset]) -> usize {
    let bytes = path.as_bytes();
    let mut seen = HashSet::new();
    for offset in offsets {
        if offset.start == 0 || bytes.get(offset.start - 1) != Some(&b'/') {
            continue;
        }
        if let Some(text) = path.get(offset.start..offset.end()) {
            seen.insert(text);
        }
    }
    seen.len()
}

/// The leading part of `path` that contains every match offset, extended to
/// the end of the component holding the furthest match.
pub fn matched_prefix<'a>(path: &'a str, offsets: &[MatchOffset]) -> &'a str {
    let match_end = offsets
        .iter()
        .map(MatchOffset::end)
        .max()
        .unwrap_or(0)
        .min(path.len());
    match path[match_end..].find('/') {
        Some(sep) => &path[..match_end + sep],
        None => path,
    }
}

/// Collapse sibling-heavy groups and rank the survivors.
///
/// Candidates are grouped by their [`matched_prefix`]; a group of more than
/// two collapses into one synthetic entry for the shared prefix, carrying the
/// newest access time of its members and the first member's offsets. Ranking
/// is by [`component_prefix_matches`] descending, then access time
/// descending, then path for a stable overall order.
pub(crate) fn sort_group(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let prefixes: Vec<String> = candidates
        .iter()
        .map(|candidate| {
            let path = candidate.usage.path.to_str().unwrap_or_default();
            matched_prefix(path, &candidate.offsets).to_string()
        })
        .collect();

    let mut group_size: HashMap<&str, usize> = HashMap::new();
    let mut group_newest: HashMap<&str, DateTime<Utc>> = HashMap::new();
    for (prefix, candidate) in prefixes.iter().zip(&candidates) {
        *group_size.entry(prefix).or_insert(0) += 1;
        group_newest
            .entry(prefix)
            .and_modify(|newest| *newest = (*newest).max(candidate.usage.last_access))
            .or_insert(candidate.usage.last_access);
    }

    let mut grouped = Vec::with_capacity(candidates.len());
    let mut collapsed: HashSet<&str> = HashSet::new();
    for (index, candidate) in candidates.into_iter().enumerate() {
        let prefix = prefixes[index].as_str();
        if group_size[prefix] > 2 {
            // one synthetic entry per group, emitted at its first member
            if !collapsed.insert(prefix) {
                continue;
            }
            grouped.push(Candidate {
                usage: DirUsage {
                    path: PathBuf::from(prefix),
                    last_access: group_newest[prefix],
                },
                offsets: candidate.offsets,
            });
        } else {
            grouped.push(candidate);
        }
    }

    let mut scored: Vec<(usize, Candidate)> = grouped
        .into_iter()
        .map(|candidate| {
            let path = candidate.usage.path.to_str().unwrap_or_default();
            (component_prefix_matches(path, &candidate.offsets), candidate)
        })
        .collect();
    scored.sort_by(|(left_score, left), (right_score, right)| {
        right_score
            .cmp(left_score)
            .then_with(|| right.usage.last_access.cmp(&left.usage.last_access))
            .then_with(|| left.usage.path.cmp(&right.usage.path))
    });

    scored.into_iter().map(|(_, candidate)| candidate).collect()
}

/// Ids handed out with ranked query results.
///
/// Rebuilt from scratch by every ranked query, so ids always refer to the
/// most recent result list. Numeric queries resolve against the table as-is.
#[derive(Debug, Default)]
pub struct ResultIdTable {
    ids: HashMap<PathBuf, u32>,
}

impl ResultIdTable {
    /// Id for `path`, assigning the next free one on first sight.
    pub fn assign(&mut self, path: &Path) -> u32 {
        if let Some(&id) = self.ids.get(path) {
            return id;
        }
        let id = self.ids.len() as u32 + 1;
        self.ids.insert(path.to_path_buf(), id);
        id
    }

    /// Path a previously issued id refers to.
    pub fn resolve(&self, id: u32) -> Option<&Path> {
        self.ids
            .iter()
            .find_map(|(path, &existing)| (existing == id).then_some(path.as_path()))
    }

    /// Forget all assignments.
    pub fn reset(&mut self) {
        self.ids.clear();
    }
}
