//! External key-value store
//!
//! The extension keeps its state in two namespaces: a small synced one for
//! settings (allowlist, highlight style) and a larger local one holding the
//! dictionary. Every write produces a change notification of the form
//! `{ key: { oldValue, newValue } }`.

use std::collections::VecDeque;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;

/// Storage key of the site allowlist (sync namespace)
pub const ALLOWLIST_KEY: &str = "allowlist";

/// Storage key of the highlight style class (sync namespace)
pub const HIGHLIGHT_STYLE_KEY: &str = "highlightStyle";

/// Quota of the local namespace, in bytes
pub const LOCAL_QUOTA_BYTES: usize = 5_242_880;

/// Per-item quota of the sync namespace, in bytes
pub const SYNC_QUOTA_BYTES_PER_ITEM: usize = 8_192;

/// Storage area
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    /// Synced settings
    Sync,
    /// Local-only dictionary
    Local,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Sync => "sync",
            Namespace::Local => "local",
        }
    }

    /// Parse a browser area name; unknown areas (e.g. "managed") yield `None`
    pub fn from_area(area: &str) -> Option<Self> {
        match area {
            "sync" => Some(Namespace::Sync),
            "local" => Some(Namespace::Local),
            _ => None,
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Old and new value of one key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
}

/// One change notification, in key order
pub type StorageChanges = IndexMap<String, StorageChange>;

/// Key-value store contract the core depends on
pub trait KeyValueStore {
    /// Values for `keys`, or the whole namespace when `keys` is `None`
    fn get(&self, namespace: Namespace, keys: Option<&[&str]>) -> Result<IndexMap<String, Value>, StoreError>;

    fn set(&mut self, namespace: Namespace, entries: IndexMap<String, Value>) -> Result<(), StoreError>;

    fn remove(&mut self, namespace: Namespace, keys: &[String]) -> Result<(), StoreError>;

    fn clear(&mut self, namespace: Namespace) -> Result<(), StoreError>;

    /// Approximate bytes used by `keys` (whole namespace when `None`)
    fn bytes_in_use(&self, namespace: Namespace, keys: Option<&[&str]>) -> Result<usize, StoreError>;
}

// =============================================================================
// MemoryStore
// =============================================================================

/// In-memory store with quotas and a pending change-notification queue
#[derive(Debug, Clone)]
pub struct MemoryStore {
    sync: IndexMap<String, Value>,
    local: IndexMap<String, Value>,
    local_quota: usize,
    sync_item_quota: usize,
    available: bool,
    notifications: VecDeque<(Namespace, StorageChanges)>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            sync: IndexMap::new(),
            local: IndexMap::new(),
            local_quota: LOCAL_QUOTA_BYTES,
            sync_item_quota: SYNC_QUOTA_BYTES_PER_ITEM,
            available: true,
            notifications: VecDeque::new(),
        }
    }

    /// Override quotas (local total, sync per item)
    pub fn with_quotas(mut self, local: usize, sync_item: usize) -> Self {
        self.local_quota = local;
        self.sync_item_quota = sync_item;
        self
    }

    /// Simulate an unreachable store
    pub fn set_available(&mut self, available: bool) {
        self.available = available;
    }

    /// Drain change notifications in emission order
    pub fn take_notifications(&mut self) -> Vec<(Namespace, StorageChanges)> {
        self.notifications.drain(..).collect()
    }

    fn area(&self, namespace: Namespace) -> &IndexMap<String, Value> {
        match namespace {
            Namespace::Sync => &self.sync,
            Namespace::Local => &self.local,
        }
    }

    fn area_mut(&mut self, namespace: Namespace) -> &mut IndexMap<String, Value> {
        match namespace {
            Namespace::Sync => &mut self.sync,
            Namespace::Local => &mut self.local,
        }
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available {
            Ok(())
        } else {
            Err(StoreError::Unavailable("store is not reachable".into()))
        }
    }

    fn notify(&mut self, namespace: Namespace, changes: StorageChanges) {
        if !changes.is_empty() {
            self.notifications.push_back((namespace, changes));
        }
    }
}

/// Serialized size of one entry, the way browsers account quota
fn entry_bytes(key: &str, value: &Value) -> usize {
    key.len() + value.to_string().len()
}

impl KeyValueStore for MemoryStore {
    fn get(&self, namespace: Namespace, keys: Option<&[&str]>) -> Result<IndexMap<String, Value>, StoreError> {
        self.check_available()?;
        let area = self.area(namespace);
        Ok(match keys {
            None => area.clone(),
            Some(keys) => keys
                .iter()
                .filter_map(|k| area.get(*k).map(|v| (k.to_string(), v.clone())))
                .collect(),
        })
    }

    fn set(&mut self, namespace: Namespace, entries: IndexMap<String, Value>) -> Result<(), StoreError> {
        self.check_available()?;

        match namespace {
            Namespace::Sync => {
                for (key, value) in &entries {
                    let needed = entry_bytes(key, value);
                    if needed > self.sync_item_quota {
                        return Err(StoreError::QuotaExceeded {
                            namespace,
                            needed,
                            quota: self.sync_item_quota,
                        });
                    }
                }
            }
            Namespace::Local => {
                let needed: usize = self
                    .local
                    .iter()
                    .filter(|(k, _)| !entries.contains_key(*k))
                    .map(|(k, v)| entry_bytes(k, v))
                    .chain(entries.iter().map(|(k, v)| entry_bytes(k, v)))
                    .sum();
                if needed > self.local_quota {
                    return Err(StoreError::QuotaExceeded {
                        namespace,
                        needed,
                        quota: self.local_quota,
                    });
                }
            }
        }

        let mut changes = StorageChanges::new();
        let area = self.area_mut(namespace);
        for (key, value) in entries {
            let old_value = area.insert(key.clone(), value.clone());
            if old_value.as_ref() != Some(&value) {
                changes.insert(key, StorageChange { old_value, new_value: Some(value) });
            }
        }
        self.notify(namespace, changes);
        Ok(())
    }

    fn remove(&mut self, namespace: Namespace, keys: &[String]) -> Result<(), StoreError> {
        self.check_available()?;
        let mut changes = StorageChanges::new();
        let area = self.area_mut(namespace);
        for key in keys {
            if let Some(old_value) = area.shift_remove(key) {
                changes.insert(key.clone(), StorageChange { old_value: Some(old_value), new_value: None });
            }
        }
        self.notify(namespace, changes);
        Ok(())
    }

    fn clear(&mut self, namespace: Namespace) -> Result<(), StoreError> {
        self.check_available()?;
        let changes: StorageChanges = std::mem::take(self.area_mut(namespace))
            .into_iter()
            .map(|(key, old_value)| (key, StorageChange { old_value: Some(old_value), new_value: None }))
            .collect();
        self.notify(namespace, changes);
        Ok(())
    }

    fn bytes_in_use(&self, namespace: Namespace, keys: Option<&[&str]>) -> Result<usize, StoreError> {
        Ok(self
            .get(namespace, keys)?
            .iter()
            .map(|(k, v)| entry_bytes(k, v))
            .sum())
    }
}
