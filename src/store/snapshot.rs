// src/store/snapshot.rs

//! Parameter snapshots and drift detection.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Ordered mapping of parameter name to rendered value.
///
/// Only ever compared for equality against the snapshot of a later
/// invocation; key order is kept for readability of the persisted file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSnapshot(IndexMap<String, String>);

impl ParameterSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Field-by-field comparison against a newer snapshot.
    pub fn diff(&self, newer: &ParameterSnapshot) -> SnapshotDiff {
        let mut diff = SnapshotDiff::default();

        for (name, old) in &self.0 {
            match newer.0.get(name) {
                Some(new) if new != old => diff.changed.push(ParameterChange {
                    name: name.clone(),
                    old: old.clone(),
                    new: new.clone(),
                }),
                Some(_) => {}
                None => diff.removed.push(name.clone()),
            }
        }
        for name in newer.0.keys() {
            if !self.0.contains_key(name) {
                diff.added.push(name.clone());
            }
        }

        diff
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ParameterSnapshot {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterChange {
    pub name: String,
    pub old: String,
    pub new: String,
}

/// Differences between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    pub changed: Vec<ParameterChange>,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.added.is_empty() && self.removed.is_empty()
    }

    /// Names of every parameter that differs.
    pub fn names(&self) -> Vec<&str> {
        self.changed
            .iter()
            .map(|c| c.name.as_str())
            .chain(self.added.iter().map(String::as_str))
            .chain(self.removed.iter().map(String::as_str))
            .collect()
    }
}

/// Result of comparing the persisted snapshot with the current one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotCheck {
    /// No snapshot and no step records were persisted.
    FirstRun,
    /// Step records existed without a readable snapshot; they were
    /// discarded since they cannot be checked against any parameters.
    Unverified { discarded: usize },
    /// Parameters are identical; prior statuses are honoured.
    Unchanged,
    /// Parameters changed; every step record was invalidated.
    Drifted(SnapshotDiff),
}
