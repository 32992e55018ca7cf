use crate::domain::model::ArchiveEntry;
use crate::utils::error::{PackError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// How same-path entries from several inputs are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatesStrategy {
    /// Keep duplicates. Where only one can exist, the later one wins.
    Include,
    /// First one wins.
    Exclude,
    /// First one wins, and the collision is logged.
    Warn,
    /// A collision aborts the task.
    Fail,
}

impl FromStr for DuplicatesStrategy {
    type Err = PackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "include" => Ok(DuplicatesStrategy::Include),
            "exclude" => Ok(DuplicatesStrategy::Exclude),
            "warn" => Ok(DuplicatesStrategy::Warn),
            "fail" => Ok(DuplicatesStrategy::Fail),
            other => Err(PackError::InvalidConfigValueError {
                field: "duplicates_strategy".to_string(),
                value: other.to_string(),
                reason: "Valid strategies: include, exclude, warn, fail".to_string(),
            }),
        }
    }
}

impl fmt::Display for DuplicatesStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DuplicatesStrategy::Include => "include",
            DuplicatesStrategy::Exclude => "exclude",
            DuplicatesStrategy::Warn => "warn",
            DuplicatesStrategy::Fail => "fail",
        };
        f.write_str(name)
    }
}

/// What happened to an entry handed to [`EntrySet::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    Added,
    Replaced,
    Dropped,
}

/// Insertion-ordered entries, unique by name.
#[derive(Debug)]
pub struct EntrySet {
    strategy: DuplicatesStrategy,
    entries: Vec<ArchiveEntry>,
    index: HashMap<String, usize>,
    duplicates: usize,
}

impl EntrySet {
    pub fn new(strategy: DuplicatesStrategy) -> Self {
        Self {
            strategy,
            entries: Vec::new(),
            index: HashMap::new(),
            duplicates: 0,
        }
    }

    pub fn insert(&mut self, entry: ArchiveEntry) -> Result<Insertion> {
        let Some(&position) = self.index.get(&entry.name) else {
            self.index.insert(entry.name.clone(), self.entries.len());
            self.entries.push(entry);
            return Ok(Insertion::Added);
        };

        self.duplicates += 1;
        let existing = &self.entries[position];
        match self.strategy {
            DuplicatesStrategy::Exclude => {
                tracing::debug!(
                    "Skipping duplicate {} from {} (kept {})",
                    entry.name,
                    entry.origin,
                    existing.origin
                );
                Ok(Insertion::Dropped)
            }
            DuplicatesStrategy::Warn => {
                tracing::warn!(
                    "⚠️ Duplicate entry {}: keeping {}, dropping {}",
                    entry.name,
                    existing.origin,
                    entry.origin
                );
                Ok(Insertion::Dropped)
            }
            DuplicatesStrategy::Include => {
                tracing::debug!(
                    "Duplicate {} from {} replaces {}",
                    entry.name,
                    entry.origin,
                    existing.origin
                );
                self.entries[position] = entry;
                Ok(Insertion::Replaced)
            }
            DuplicatesStrategy::Fail => Err(PackError::DuplicateEntry {
                name: entry.name,
                first: existing.origin.clone(),
                second: entry.origin,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    pub fn into_entries(self) -> Vec<ArchiveEntry> {
        self.entries
    }
}
