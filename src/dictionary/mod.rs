//! Dictionary Cache: in-memory mirror of the term store
//!
//! # Design
//! - `Dictionary` preserves store iteration order; terms are applied to text
//!   in that order.
//! - Full refreshes are two-phase (`begin_refresh` before the async read,
//!   `complete_refresh` after). A refresh never overwrites a key that an
//!   incremental delta wrote after the refresh was started, and a refresh
//!   that finishes after a newer one is dropped. The cache therefore ends up
//!   at the most recent store state regardless of completion order.

pub mod store;

use std::collections::HashMap;

use indexmap::IndexMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DictError, Result};
use store::StorageChanges;

// =============================================================================
// Dictionary
// =============================================================================

/// Ordered Term → Definition mapping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dictionary {
    entries: IndexMap<String, String>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw store values, skipping empty terms and non-string definitions
    pub fn from_values(values: IndexMap<String, Value>) -> Self {
        let mut dictionary = Self::new();
        for (term, value) in values {
            match value {
                Value::String(definition) if !term.is_empty() => {
                    dictionary.entries.insert(term, definition);
                }
                _ => warn!("skipping malformed dictionary entry {:?}", term),
            }
        }
        dictionary
    }

    /// Insert or replace a definition, returning the previous one
    pub fn insert(&mut self, term: impl Into<String>, definition: impl Into<String>) -> Result<Option<String>> {
        let term = term.into();
        if term.is_empty() {
            return Err(DictError::EmptyTerm);
        }
        Ok(self.entries.insert(term, definition.into()))
    }

    pub fn remove(&mut self, term: &str) -> Option<String> {
        self.entries.shift_remove(term)
    }

    pub fn get(&self, term: &str) -> Option<&str> {
        self.entries.get(term).map(String::as_str)
    }

    pub fn contains(&self, term: &str) -> bool {
        self.entries.contains_key(term)
    }

    /// Terms in iteration order
    pub fn terms(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(t, d)| (t.as_str(), d.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Raw store representation
    pub fn to_values(&self) -> IndexMap<String, Value> {
        self.entries
            .iter()
            .map(|(t, d)| (t.clone(), Value::String(d.clone())))
            .collect()
    }
}

// =============================================================================
// DictionaryCache
// =============================================================================

/// Handle for one in-flight full refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RefreshTicket(pub u64);

/// Terms whose highlighting must change after a cache update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryDelta {
    /// Added terms and terms whose definition changed
    pub upserted: Vec<String>,
    pub removed: Vec<String>,
}

impl DictionaryDelta {
    pub fn is_empty(&self) -> bool {
        self.upserted.is_empty() && self.removed.is_empty()
    }
}

/// Page-wide dictionary mirror with last-write-wins refresh semantics
#[derive(Debug, Default)]
pub struct DictionaryCache {
    dictionary: Dictionary,
    /// Last sequence number handed out (tickets and deltas share it)
    seq: u64,
    /// Ticket of the newest refresh applied
    last_refresh: u64,
    /// Sequence of the latest delta write per key, removals included
    written: HashMap<String, u64>,
}

impl DictionaryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    pub fn terms(&self) -> Vec<String> {
        self.dictionary.terms()
    }

    pub fn definition(&self, term: &str) -> Option<&str> {
        self.dictionary.get(term)
    }

    /// Start a full reload; pass the ticket back with the store snapshot
    pub fn begin_refresh(&mut self) -> RefreshTicket {
        self.seq += 1;
        RefreshTicket(self.seq)
    }

    /// Apply a full store snapshot read under `ticket`.
    ///
    /// Returns `None` when a newer refresh already landed.
    pub fn complete_refresh(
        &mut self,
        ticket: RefreshTicket,
        values: IndexMap<String, Value>,
    ) -> Option<DictionaryDelta> {
        if ticket.0 <= self.last_refresh {
            debug!("dropping stale dictionary refresh #{}", ticket.0);
            return None;
        }

        let snapshot = Dictionary::from_values(values);
        let superseded = |written: &HashMap<String, u64>, term: &str| {
            written.get(term).is_some_and(|&seq| seq > ticket.0)
        };

        let mut delta = DictionaryDelta::default();
        for term in self.dictionary.terms() {
            if !snapshot.contains(&term) && !superseded(&self.written, &term) {
                self.dictionary.remove(&term);
                delta.removed.push(term);
            }
        }
        for (term, definition) in snapshot.iter() {
            if superseded(&self.written, term) || self.dictionary.get(term) == Some(definition) {
                continue;
            }
            self.dictionary.entries.insert(term.to_string(), definition.to_string());
            delta.upserted.push(term.to_string());
        }

        self.last_refresh = ticket.0;
        self.written.retain(|_, seq| *seq > ticket.0);
        Some(delta)
    }

    /// Patch the cache from a local-namespace change notification
    pub fn apply_delta(&mut self, changes: &StorageChanges) -> DictionaryDelta {
        let mut delta = DictionaryDelta::default();
        for (term, change) in changes {
            if term.is_empty() {
                continue;
            }
            self.seq += 1;
            self.written.insert(term.clone(), self.seq);

            let definition = match &change.new_value {
                Some(Value::String(definition)) => Some(definition.as_str()),
                Some(other) => {
                    warn!("non-string definition for {:?}: {}", term, other);
                    None
                }
                None => None,
            };

            match definition {
                Some(definition) if !definition.is_empty() => {
                    if self.dictionary.get(term) != Some(definition) {
                        self.dictionary.entries.insert(term.clone(), definition.to_string());
                        delta.upserted.push(term.clone());
                    }
                }
                _ => {
                    if self.dictionary.remove(term).is_some() {
                        delta.removed.push(term.clone());
                    }
                }
            }
        }
        delta
    }

    /// Empty the cache and invalidate in-flight refreshes
    pub fn clear(&mut self) {
        self.dictionary.clear();
        self.written.clear();
        self.last_refresh = self.seq;
    }
}
