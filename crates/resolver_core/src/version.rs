//! Numeric version ordering for registry nodes.

use std::cmp::Ordering;
use std::fmt;

/// A dot-separated version, compared segment by segment as integers.
///
/// Non-numeric segments parse as 0 and a missing trailing segment compares
/// as 0, so `1` == `1.0` and `1.10` > `1.9`.
#[derive(Debug, Clone, Eq)]
pub struct Version(Vec<u64>);

impl Version {
    pub fn parse(raw: &str) -> Self {
        Version(
            raw.trim()
                .split('.')
                .map(|seg| seg.trim().parse::<u64>().unwrap_or(0))
                .collect(),
        )
    }

    pub fn segments(&self) -> &[u64] {
        &self.0
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        for i in 0..len {
            let a = self.0.get(i).copied().unwrap_or(0);
            let b = other.0.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u64::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

/// Pick the candidate with the highest version.
///
/// Ties go to the candidate that appears last, matching store result order.
pub fn select_latest<T>(candidates: impl IntoIterator<Item = (Version, T)>) -> Option<T> {
    candidates
        .into_iter()
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, item)| item)
}
