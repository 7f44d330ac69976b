//! Snapshots: the unit of atomic cache replacement and of persistence.

use super::{BuildRecord, PullRequestRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A record with a stable identity across fetch cycles.
pub trait Identified {
    fn identity(&self) -> &str;
}

impl Identified for PullRequestRecord {
    fn identity(&self) -> &str {
        &self.html_url
    }
}

impl Identified for BuildRecord {
    fn identity(&self) -> &str {
        &self.url
    }
}

/// Ordered collection of records of one kind.
///
/// Serializes as a bare JSON array so the persisted file stays a plain list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot<T> {
    records: Vec<T>,
}

impl<T> Default for Snapshot<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
        }
    }
}

impl<T> Snapshot<T> {
    pub fn new(records: Vec<T>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.records.iter()
    }
}

impl<T: Identified> Snapshot<T> {
    /// Identity-keyed lookup table over the records.
    pub fn index(&self) -> HashMap<&str, &T> {
        self.records.iter().map(|r| (r.identity(), r)).collect()
    }
}

impl<T> From<Vec<T>> for Snapshot<T> {
    fn from(records: Vec<T>) -> Self {
        Self::new(records)
    }
}

impl<'a, T> IntoIterator for &'a Snapshot<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

pub type PullRequestSnapshot = Snapshot<PullRequestRecord>;
pub type BuildSnapshot = Snapshot<BuildRecord>;
