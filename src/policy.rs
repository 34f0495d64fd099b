//! Enablement Policy: is highlighting active on this page?
//!
//! Highlighting runs only on http(s) pages whose hostname is allow-listed.
//! Any other scheme, or a missing/malformed URL, is permanently disabled.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// Set of hostnames where highlighting is active
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Allowlist(HashSet<String>);

impl Allowlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the stored allowlist value; anything but an array of strings is empty
    pub fn from_value(value: Option<&Value>) -> Self {
        let hosts = value
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();
        Self(hosts)
    }

    pub fn contains(&self, hostname: &str) -> bool {
        self.0.contains(hostname)
    }

    pub fn insert(&mut self, hostname: impl Into<String>) -> bool {
        self.0.insert(hostname.into())
    }

    pub fn remove(&mut self, hostname: &str) -> bool {
        self.0.remove(hostname)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Hostnames sorted for stable storage
    pub fn to_sorted_vec(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self.0.iter().cloned().collect();
        hosts.sort();
        hosts
    }
}

impl<S: Into<String>> FromIterator<S> for Allowlist {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Hostname of an http(s) URL; `None` for other schemes or bad input
pub fn eligible_hostname(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    match parsed.scheme() {
        "http" | "https" => parsed.host_str().map(str::to_string),
        _ => None,
    }
}

/// Result of re-evaluating the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Transition {
    Unchanged,
    /// false → true: run a full pass and start observing
    Enabled,
    /// true → false: revert everything and stop observing
    Disabled,
}

/// Tracks whether the current page is enabled
#[derive(Debug, Clone, Default)]
pub struct EnablementPolicy {
    hostname: Option<String>,
    enabled: bool,
}

impl EnablementPolicy {
    /// Policy for the page at `url` (initially disabled)
    pub fn for_url(url: Option<&str>) -> Self {
        Self {
            hostname: url.and_then(eligible_hostname),
            enabled: false,
        }
    }

    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    /// Whether this page can ever be enabled
    pub fn is_eligible(&self) -> bool {
        self.hostname.is_some()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_enabled_for(&self, allowlist: &Allowlist) -> bool {
        self.hostname.as_deref().is_some_and(|host| allowlist.contains(host))
    }

    /// Recompute against a new allowlist and report the edge, if any
    pub fn on_allowlist_changed(&mut self, allowlist: &Allowlist) -> Transition {
        let now = self.is_enabled_for(allowlist);
        let transition = match (self.enabled, now) {
            (false, true) => Transition::Enabled,
            (true, false) => Transition::Disabled,
            _ => Transition::Unchanged,
        };
        self.enabled = now;
        transition
    }

    /// Force the disabled state (page teardown)
    pub fn force_disable(&mut self) -> Transition {
        if std::mem::replace(&mut self.enabled, false) {
            Transition::Disabled
        } else {
            Transition::Unchanged
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_only_http_schemes_are_eligible() {
        assert_eq!(eligible_hostname("https://example.com/a?b"), Some("example.com".into()));
        assert_eq!(eligible_hostname("http://localhost:8080/"), Some("localhost".into()));
        assert_eq!(eligible_hostname("chrome://extensions"), None);
        assert_eq!(eligible_hostname("file:///tmp/x.html"), None);
        assert_eq!(eligible_hostname("not a url"), None);
    }

    #[test]
    fn test_transitions_fire_on_edges_only() {
        let mut policy = EnablementPolicy::for_url(Some("https://example.com/page"));
        let on: Allowlist = ["example.com"].into_iter().collect();
        let off = Allowlist::new();

        assert_eq!(policy.on_allowlist_changed(&off), Transition::Unchanged);
        assert_eq!(policy.on_allowlist_changed(&on), Transition::Enabled);
        assert_eq!(policy.on_allowlist_changed(&on), Transition::Unchanged);
        assert_eq!(policy.on_allowlist_changed(&off), Transition::Disabled);
        assert!(!policy.is_enabled());
    }

    #[test]
    fn test_ineligible_page_never_enables() {
        let mut policy = EnablementPolicy::for_url(Some("about:blank"));
        let everything: Allowlist = ["", "about", "blank"].into_iter().collect();
        assert!(!policy.is_eligible());
        assert_eq!(policy.on_allowlist_changed(&everything), Transition::Unchanged);

        let mut missing = EnablementPolicy::for_url(None);
        assert_eq!(missing.on_allowlist_changed(&everything), Transition::Unchanged);
    }

    #[test]
    fn test_allowlist_from_value_ignores_garbage() {
        let list = Allowlist::from_value(Some(&json!(["a.com", 3, "b.com"])));
        assert_eq!(list.to_sorted_vec(), vec!["a.com", "b.com"]);
        assert!(Allowlist::from_value(Some(&json!("a.com"))).is_empty());
        assert!(Allowlist::from_value(None).is_empty());
    }
}
