//! HighlightSession: page-lifetime context object
//!
//! Owns every piece of per-page state (dictionary cache, enablement,
//! highlight index, tooltips, mutation coordinator) and exposes one entry
//! point per host event. The host performs the asynchronous parts itself:
//! it reads the store when handed a [`RefreshTicket`] and arms a timer when
//! handed a [`TimerRequest`].
//!
//! # Event flow
//! ```text
//! initialize / storage change (sync) ──► EnablementPolicy
//!        │ Enabled                            │ Disabled
//!        ▼                                    ▼
//!   RefreshTicket ──► complete_refresh    disable_all + stop observing
//!                          │ first
//!                          ▼
//!                full pass + start observing
//!
//! page mutations ──► handle_mutations ──► TimerRequest ──► on_timer ──► scan roots
//! storage change (local) ──► apply_delta ──► remove_term / scan new terms
//! ```

use indexmap::IndexMap;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::HighlighterConfig;
use crate::dictionary::store::{Namespace, StorageChanges, ALLOWLIST_KEY, HIGHLIGHT_STYLE_KEY};
use crate::dictionary::{Dictionary, DictionaryCache, DictionaryDelta, RefreshTicket};
use crate::dom::{Document, MutationRecord, NodeId};
use crate::highlight::coordinator::{affected_roots, CoordinatorState, MutationCoordinator, TimerRequest, TimerToken};
use crate::highlight::index::HighlightIndex;
use crate::highlight::renderer::{RenderContext, Renderer, ScanStats};
use crate::highlight::reversal;
use crate::highlight::tooltip::TooltipManager;
use crate::policy::{Allowlist, EnablementPolicy, Transition};

/// Running counters for the lifetime of the page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    /// Whole-body passes after enabling
    pub full_passes: usize,
    /// Debounced mutation batches processed
    pub flushes: usize,
    /// Renderer invocations
    pub scans: usize,
    pub highlights_created: usize,
    pub highlights_removed: usize,
    /// Refresh results dropped because a newer one had landed
    pub stale_refreshes: usize,
}

impl SessionStats {
    fn record_scan(&mut self, scan: &ScanStats) {
        self.scans += 1;
        self.highlights_created += scan.highlights_created;
    }
}

pub struct HighlightSession<D: Document> {
    doc: D,
    config: HighlighterConfig,
    policy: EnablementPolicy,
    cache: DictionaryCache,
    index: HighlightIndex,
    tooltips: TooltipManager,
    coordinator: MutationCoordinator,
    /// Highlight style class from the sync namespace ("" when unset)
    style: String,
    /// Enabled, but the first dictionary load has not landed yet
    awaiting_first_pass: bool,
    stats: SessionStats,
}

impl<D: Document> HighlightSession<D> {
    /// Session for the page currently loaded in `doc` (starts disabled)
    pub fn new(doc: D, config: HighlighterConfig) -> Self {
        let policy = EnablementPolicy::for_url(doc.url().as_deref());
        if !policy.is_eligible() {
            debug!("page is not eligible for highlighting: {:?}", doc.url());
        }
        let coordinator = MutationCoordinator::new(config.debounce_ms);
        Self {
            doc,
            config,
            policy,
            cache: DictionaryCache::new(),
            index: HighlightIndex::new(),
            tooltips: TooltipManager::new(),
            coordinator,
            style: String::new(),
            awaiting_first_pass: false,
            stats: SessionStats::default(),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn document(&self) -> &D {
        &self.doc
    }

    /// Direct page access for the host; writes made here are page mutations
    pub fn document_mut(&mut self) -> &mut D {
        &mut self.doc
    }

    pub fn config(&self) -> &HighlighterConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.policy.is_enabled()
    }

    pub fn hostname(&self) -> Option<&str> {
        self.policy.hostname()
    }

    pub fn dictionary(&self) -> &Dictionary {
        self.cache.dictionary()
    }

    pub fn index(&self) -> &HighlightIndex {
        &self.index
    }

    pub fn tooltips(&self) -> &TooltipManager {
        &self.tooltips
    }

    pub fn coordinator_state(&self) -> CoordinatorState {
        self.coordinator.state()
    }

    pub fn highlight_style(&self) -> &str {
        &self.style
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    // =========================================================================
    // Enablement
    // =========================================================================

    /// Apply the sync namespace read at page load.
    ///
    /// Returns a ticket when the page turned out to be enabled; the host
    /// reads the local namespace and calls [`Self::complete_refresh`].
    pub fn initialize(&mut self, sync: &IndexMap<String, Value>) -> Option<RefreshTicket> {
        let style = sync.get(HIGHLIGHT_STYLE_KEY).and_then(Value::as_str).unwrap_or("");
        self.set_highlight_style(style);
        self.update_allowlist(&Allowlist::from_value(sync.get(ALLOWLIST_KEY)))
    }

    /// Re-evaluate enablement against a new allowlist
    pub fn update_allowlist(&mut self, allowlist: &Allowlist) -> Option<RefreshTicket> {
        match self.policy.on_allowlist_changed(allowlist) {
            Transition::Enabled => {
                info!("highlighting enabled for {}", self.policy.hostname().unwrap_or_default());
                self.awaiting_first_pass = true;
                Some(self.cache.begin_refresh())
            }
            Transition::Disabled => {
                info!("highlighting disabled for {}", self.policy.hostname().unwrap_or_default());
                self.disable();
                None
            }
            Transition::Unchanged => None,
        }
    }

    /// Ticket for a retry after a failed store read (only while enabled)
    pub fn request_refresh(&mut self) -> Option<RefreshTicket> {
        self.policy.is_enabled().then(|| self.cache.begin_refresh())
    }

    /// Deliver the full dictionary read for `ticket`.
    ///
    /// The first refresh after enabling highlights the whole body and starts
    /// observation; later ones only touch the terms that changed. Returns
    /// `None` when the result was discarded.
    pub fn complete_refresh(&mut self, ticket: RefreshTicket, values: IndexMap<String, Value>) -> Option<ScanStats> {
        if !self.policy.is_enabled() {
            debug!("refresh #{} arrived after disabling", ticket.0);
            return None;
        }
        let Some(delta) = self.cache.complete_refresh(ticket, values) else {
            self.stats.stale_refreshes += 1;
            return None;
        };

        if self.awaiting_first_pass {
            self.awaiting_first_pass = false;
            let scan = self.full_pass();
            self.coordinator.start(&mut self.doc);
            Some(scan)
        } else {
            Some(self.apply_dictionary_delta(&delta))
        }
    }

    // =========================================================================
    // Store notifications
    // =========================================================================

    /// Route a store change notification.
    ///
    /// Sync changes may flip enablement (and then yield a refresh ticket) or
    /// restyle highlights. Local changes patch the cache in place.
    pub fn apply_storage_changes(&mut self, namespace: Namespace, changes: &StorageChanges) -> Option<RefreshTicket> {
        match namespace {
            Namespace::Sync => {
                if let Some(change) = changes.get(HIGHLIGHT_STYLE_KEY) {
                    let style = change.new_value.as_ref().and_then(Value::as_str).unwrap_or("");
                    self.set_highlight_style(style);
                }
                let change = changes.get(ALLOWLIST_KEY)?;
                self.update_allowlist(&Allowlist::from_value(change.new_value.as_ref()))
            }
            Namespace::Local => {
                if !self.policy.is_enabled() {
                    return None;
                }
                let delta = self.cache.apply_delta(changes);
                // The pending first pass renders from the cache anyway
                if !self.awaiting_first_pass {
                    self.apply_dictionary_delta(&delta);
                }
                None
            }
        }
    }

    /// Switch the style class on every existing highlight
    pub fn set_highlight_style(&mut self, style: &str) {
        if self.style == style {
            return;
        }
        self.style = style.to_string();
        let class_name = self.config.highlight_class_name(&self.style);
        for node in self.index.nodes().collect::<Vec<_>>() {
            self.doc.set_class_name(node, &class_name);
        }
        debug!("highlight style set to {:?}", self.style);
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Feed one observer delivery; arm the returned timer (replacing any other)
    pub fn handle_mutations(&mut self, records: &[MutationRecord]) -> Option<TimerRequest> {
        self.coordinator.on_mutations(&mut self.doc, records)
    }

    /// Debounce timer fired; rescans the pending roots if `token` is current
    pub fn on_timer(&mut self, token: TimerToken) -> Option<ScanStats> {
        let pending = self.coordinator.on_timer(token)?;
        if !self.policy.is_enabled() {
            return None;
        }

        let terms = self.cache.terms();
        let mut doc = self.coordinator.suspend(&mut self.doc);
        for dead in self.index.prune(&*doc) {
            doc.unlisten_hover(dead);
            doc.forget(dead);
        }
        let roots = affected_roots(&mut *doc, pending);

        let mut cx = RenderContext {
            config: &self.config,
            dictionary: self.cache.dictionary(),
            index: &mut self.index,
            tooltips: &mut self.tooltips,
            style: &self.style,
        };
        let scan = Renderer::scan_roots(&mut *doc, &mut cx, &roots, &terms);
        for &root in &roots {
            doc.forget(root);
        }
        drop(doc);

        self.stats.flushes += 1;
        self.stats.record_scan(&scan);
        debug!("flushed {} roots, {} highlights", roots.len(), scan.highlights_created);
        Some(scan)
    }

    // =========================================================================
    // Hover
    // =========================================================================

    /// Show the tooltip for the highlight under the pointer
    pub fn pointer_enter(&mut self, node: NodeId) -> Option<NodeId> {
        let tooltip = self.show_tooltip(node);
        self.doc.release(node);
        tooltip
    }

    pub fn pointer_leave(&mut self, node: NodeId) {
        if let Some(tooltip) = self.term_of(node).and_then(|term| self.tooltips.tooltip_for(&term)) {
            self.tooltips.hide(&mut self.doc, tooltip);
        }
        self.doc.release(node);
    }

    fn show_tooltip(&mut self, node: NodeId) -> Option<NodeId> {
        if !self.policy.is_enabled() {
            return None;
        }
        let term = self.term_of(node)?;
        let definition = self.cache.definition(&term)?;

        let mut doc = self.coordinator.suspend(&mut self.doc);
        let tooltip = self.tooltips.get_or_create(&mut *doc, &self.config, &term, definition)?;
        let anchor = doc.bounding_rect(node);
        self.tooltips.show(&mut *doc, tooltip, anchor, self.config.tooltip_lift);
        Some(tooltip)
    }

    /// Term behind a highlight element; falls back to its text for
    /// highlights the index lost track of
    fn term_of(&self, node: NodeId) -> Option<String> {
        if let Some(term) = self.index.term_of(node) {
            return Some(term.to_string());
        }
        if self.doc.has_class(node, &self.config.highlight_class) {
            return Some(self.doc.text_content(node));
        }
        None
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Page is going away: revert everything and drop the tooltips
    pub fn teardown(&mut self) {
        if self.policy.force_disable() == Transition::Disabled {
            self.disable();
        }
        let removed = self.tooltips.remove_all(&mut self.doc);
        self.coordinator.stop(&mut self.doc);
        debug!("teardown removed {} tooltips", removed);
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn full_pass(&mut self) -> ScanStats {
        let Some(body) = self.doc.body() else {
            warn!("document has no body, skipping full pass");
            return ScanStats::default();
        };
        let terms = self.cache.terms();
        let mut doc = self.coordinator.suspend(&mut self.doc);
        let mut cx = RenderContext {
            config: &self.config,
            dictionary: self.cache.dictionary(),
            index: &mut self.index,
            tooltips: &mut self.tooltips,
            style: &self.style,
        };
        let scan = Renderer::scan(&mut *doc, &mut cx, body, &terms);
        drop(doc);

        self.stats.full_passes += 1;
        self.stats.record_scan(&scan);
        info!("full pass: {} highlights for {} terms", scan.highlights_created, terms.len());
        scan
    }

    fn apply_dictionary_delta(&mut self, delta: &DictionaryDelta) -> ScanStats {
        if delta.is_empty() {
            return ScanStats::default();
        }

        let mut doc = self.coordinator.suspend(&mut self.doc);
        for term in &delta.removed {
            let restored = reversal::remove_term(&mut *doc, &self.config, &mut self.index, term);
            self.stats.highlights_removed += restored.count;
            // Normalizing can merge pending text into restored text
            doc.add_pending(&restored.parents);
            if let Some(tooltip) = self.tooltips.tooltip_for(term) {
                self.tooltips.hide(&mut *doc, tooltip);
            }
        }
        for term in &delta.upserted {
            if let Some(definition) = self.cache.definition(term) {
                self.tooltips.update_definition(&mut *doc, term, definition);
            }
        }

        let mut scan = ScanStats::default();
        let body = doc.body().filter(|_| !delta.upserted.is_empty());
        if let Some(body) = body {
            let mut cx = RenderContext {
                config: &self.config,
                dictionary: self.cache.dictionary(),
                index: &mut self.index,
                tooltips: &mut self.tooltips,
                style: &self.style,
            };
            scan = Renderer::scan(&mut *doc, &mut cx, body, &delta.upserted);
            self.stats.record_scan(&scan);
        }
        drop(doc);

        debug!(
            "dictionary delta: +{} -{} terms, {} highlights",
            delta.upserted.len(),
            delta.removed.len(),
            scan.highlights_created
        );
        scan
    }

    /// Revert the page and forget the dictionary; observation stays off
    fn disable(&mut self) {
        self.awaiting_first_pass = false;
        let mut doc = self.coordinator.suspend(&mut self.doc);
        let removed = reversal::disable_all(&mut *doc, &self.config, &mut self.index);
        self.tooltips.hide_all(&mut *doc);
        doc.stay_disconnected();

        self.cache.clear();
        self.stats.highlights_removed += removed;
        info!("reverted {} highlights", removed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::VirtualDocument;
    use serde_json::json;

    fn sync(hosts: &[&str]) -> IndexMap<String, Value> {
        let mut values = IndexMap::new();
        values.insert(ALLOWLIST_KEY.to_string(), json!(hosts));
        values
    }

    #[test]
    fn test_ineligible_page_never_requests_refresh() {
        let doc = VirtualDocument::with_url("chrome://newtab");
        let mut session = HighlightSession::new(doc, HighlighterConfig::default());
        assert!(session.initialize(&sync(&["newtab"])).is_none());
        assert!(!session.is_enabled());
        assert!(session.request_refresh().is_none());
    }

    #[test]
    fn test_refresh_after_disable_is_dropped() {
        let doc = VirtualDocument::with_url("https://example.com/");
        let mut session = HighlightSession::new(doc, HighlighterConfig::default());
        let ticket = session.initialize(&sync(&["example.com"])).unwrap();
        session.update_allowlist(&Allowlist::new());

        let values: IndexMap<String, Value> = [("foo".to_string(), json!("bar"))].into_iter().collect();
        assert!(session.complete_refresh(ticket, values).is_none());
        assert!(session.dictionary().is_empty());
        assert_eq!(session.coordinator_state(), CoordinatorState::Idle);
    }

    #[test]
    fn test_style_from_initial_sync_values() {
        let doc = VirtualDocument::with_url("https://example.com/");
        let mut session = HighlightSession::new(doc, HighlighterConfig::default());
        let mut values = sync(&[]);
        values.insert(HIGHLIGHT_STYLE_KEY.to_string(), json!("underline"));
        session.initialize(&values);
        assert_eq!(session.highlight_style(), "underline");
    }
}
