//! Settings page and popup operations
//!
//! User-edited JSON is validated before anything is written, so a rejected
//! edit leaves the store untouched. Every write can be reported back to the
//! user as a [`StatusMessage`].

use indexmap::IndexMap;
use log::error;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dictionary::store::{
    KeyValueStore, Namespace, ALLOWLIST_KEY, HIGHLIGHT_STYLE_KEY, LOCAL_QUOTA_BYTES, SYNC_QUOTA_BYTES_PER_ITEM,
};
use crate::error::{DictError, Result};
use crate::policy::eligible_hostname;

// =============================================================================
// Status messages
// =============================================================================

pub const MSG_SAVED: &str = "Saved successfully";
pub const MSG_INVALID_JSON: &str = "Invalid JSON detected";
pub const MSG_INVALID_ARRAY: &str = "Invalid array detected";
pub const MSG_FAILED: &str = "Something went wrong (check console)";

/// Feedback shown next to the button that triggered a write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMessage {
    pub text: String,
    pub is_error: bool,
}

impl StatusMessage {
    pub fn saved() -> Self {
        Self {
            text: MSG_SAVED.to_string(),
            is_error: false,
        }
    }

    pub fn error(text: &str) -> Self {
        Self {
            text: text.to_string(),
            is_error: true,
        }
    }

    /// Map the result of a user-initiated write; failures are logged
    pub fn from_result<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::saved(),
            Err(DictError::InvalidDictionary(_)) | Err(DictError::Json(_)) => Self::error(MSG_INVALID_JSON),
            Err(DictError::InvalidAllowlist(_)) => Self::error(MSG_INVALID_ARRAY),
            Err(e) => {
                error!("{}", e);
                Self::error(MSG_FAILED)
            }
        }
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Parse dictionary text: a JSON object whose values are all strings
pub fn parse_dictionary_json(text: &str) -> Result<IndexMap<String, Value>> {
    let value: Value = serde_json::from_str(text).map_err(|e| DictError::InvalidDictionary(e.to_string()))?;
    let Value::Object(map) = value else {
        return Err(DictError::InvalidDictionary("expected an object".into()));
    };
    if let Some((term, _)) = map.iter().find(|(_, v)| !v.is_string()) {
        return Err(DictError::InvalidDictionary(format!("definition of {:?} is not a string", term)));
    }
    Ok(map.into_iter().collect())
}

/// Parse allowlist text: a JSON array of strings
pub fn parse_allowlist_json(text: &str) -> Result<Vec<String>> {
    let value: Value = serde_json::from_str(text).map_err(|e| DictError::InvalidAllowlist(e.to_string()))?;
    let Value::Array(items) = value else {
        return Err(DictError::InvalidAllowlist("expected an array".into()));
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::String(host) => Ok(host),
            other => Err(DictError::InvalidAllowlist(format!("{} is not a string", other))),
        })
        .collect()
}

// =============================================================================
// Dictionary
// =============================================================================

/// Replace the stored dictionary with `entries`.
///
/// Keys missing from `entries` are removed first, then the rest is written.
pub fn import_dictionary<S>(store: &mut S, entries: IndexMap<String, Value>) -> Result<()>
where
    S: KeyValueStore + ?Sized,
{
    let existing = store.get(Namespace::Local, None)?;
    let removed: Vec<String> = existing.into_keys().filter(|k| !entries.contains_key(k)).collect();
    if !removed.is_empty() {
        store.remove(Namespace::Local, &removed)?;
    }
    store.set(Namespace::Local, entries)?;
    Ok(())
}

/// Validate and import dictionary text from the settings editor
pub fn save_dictionary_json<S>(store: &mut S, text: &str) -> Result<()>
where
    S: KeyValueStore + ?Sized,
{
    let entries = parse_dictionary_json(text)?;
    import_dictionary(store, entries)
}

pub fn clear_dictionary<S: KeyValueStore + ?Sized>(store: &mut S) -> Result<()> {
    Ok(store.clear(Namespace::Local)?)
}

/// Pretty-printed dictionary for the settings editor
pub fn dictionary_json<S: KeyValueStore + ?Sized>(store: &S) -> Result<String> {
    let entries = store.get(Namespace::Local, None)?;
    Ok(serde_json::to_string_pretty(&entries)?)
}

// =============================================================================
// Allowlist
// =============================================================================

/// Stored allowlist in stored order (empty when unset or malformed)
pub fn load_allowlist<S: KeyValueStore + ?Sized>(store: &S) -> Result<Vec<String>> {
    let values = store.get(Namespace::Sync, Some(&[ALLOWLIST_KEY]))?;
    Ok(values
        .get(ALLOWLIST_KEY)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default())
}

pub fn save_allowlist<S: KeyValueStore + ?Sized>(store: &mut S, hosts: &[String]) -> Result<()> {
    let mut entry = IndexMap::new();
    entry.insert(ALLOWLIST_KEY.to_string(), Value::from(hosts.to_vec()));
    Ok(store.set(Namespace::Sync, entry)?)
}

/// Validate and save allowlist text from the settings editor
pub fn save_allowlist_json<S: KeyValueStore + ?Sized>(store: &mut S, text: &str) -> Result<()> {
    let hosts = parse_allowlist_json(text)?;
    save_allowlist(store, &hosts)
}

pub fn clear_allowlist<S: KeyValueStore + ?Sized>(store: &mut S) -> Result<()> {
    save_allowlist(store, &[])
}

pub fn allowlist_json<S: KeyValueStore + ?Sized>(store: &S) -> Result<String> {
    Ok(serde_json::to_string_pretty(&load_allowlist(store)?)?)
}

/// Flip the page's hostname in the allowlist.
///
/// Returns the new enabled state, or `None` for a page that can never be
/// enabled (non-http scheme or bad URL).
pub fn toggle_site<S: KeyValueStore + ?Sized>(store: &mut S, url: &str) -> Result<Option<bool>> {
    let Some(hostname) = eligible_hostname(url) else {
        return Ok(None);
    };
    let mut hosts = load_allowlist(store)?;
    let enabled = if hosts.contains(&hostname) {
        hosts.retain(|h| h != &hostname);
        false
    } else {
        hosts.push(hostname);
        true
    };
    save_allowlist(store, &hosts)?;
    Ok(Some(enabled))
}

// =============================================================================
// Highlight style
// =============================================================================

pub fn highlight_style<S: KeyValueStore + ?Sized>(store: &S) -> Result<Option<String>> {
    let values = store.get(Namespace::Sync, Some(&[HIGHLIGHT_STYLE_KEY]))?;
    Ok(values.get(HIGHLIGHT_STYLE_KEY).and_then(Value::as_str).map(str::to_string))
}

pub fn set_highlight_style<S: KeyValueStore + ?Sized>(store: &mut S, style: &str) -> Result<()> {
    let mut entry = IndexMap::new();
    entry.insert(HIGHLIGHT_STYLE_KEY.to_string(), Value::String(style.to_string()));
    Ok(store.set(Namespace::Sync, entry)?)
}

// =============================================================================
// Quota
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaLevel {
    /// Below half
    Low,
    Medium,
    /// 90% or more
    High,
}

/// Storage consumption against a browser quota
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaUsage {
    pub bytes_in_use: usize,
    pub quota: usize,
}

impl QuotaUsage {
    /// Whole local namespace against its total quota
    pub fn dictionary<S: KeyValueStore + ?Sized>(store: &S) -> Result<Self> {
        Ok(Self {
            bytes_in_use: store.bytes_in_use(Namespace::Local, None)?,
            quota: LOCAL_QUOTA_BYTES,
        })
    }

    /// The allowlist item against the sync per-item quota
    pub fn allowlist<S: KeyValueStore + ?Sized>(store: &S) -> Result<Self> {
        Ok(Self {
            bytes_in_use: store.bytes_in_use(Namespace::Sync, Some(&[ALLOWLIST_KEY]))?,
            quota: SYNC_QUOTA_BYTES_PER_ITEM,
        })
    }

    pub fn ratio(&self) -> f64 {
        if self.quota == 0 {
            return 1.0;
        }
        self.bytes_in_use as f64 / self.quota as f64
    }

    pub fn level(&self) -> QuotaLevel {
        match self.ratio() {
            r if r < 0.5 => QuotaLevel::Low,
            r if r < 0.9 => QuotaLevel::Medium,
            _ => QuotaLevel::High,
        }
    }

    /// Percentage with two decimals, e.g. `"12.50%"`
    pub fn percent_text(&self) -> String {
        format!("{:.2}%", self.ratio() * 100.0)
    }
}
