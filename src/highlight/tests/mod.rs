//! Scenario tests for the highlighting engine, driven through
//! `VirtualDocument` and `HighlightSession`.

mod renderer_tests;
mod session_tests;

use indexmap::IndexMap;
use serde_json::{json, Value};

use crate::config::HighlighterConfig;
use crate::dictionary::store::ALLOWLIST_KEY;
use crate::dictionary::Dictionary;
use crate::dom::{Document, NodeId, NodeKind, Rect, VirtualDocument};
use crate::highlight::renderer::{RenderContext, Renderer, ScanStats};
use crate::highlight::{HighlightIndex, TooltipManager};
use crate::session::HighlightSession;

pub(super) const PAGE_URL: &str = "https://example.com/article";
pub(super) const HOST: &str = "example.com";

pub(super) fn values(pairs: &[(&str, &str)]) -> IndexMap<String, Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), json!(v))).collect()
}

pub(super) fn allowlist(hosts: &[&str]) -> IndexMap<String, Value> {
    let mut sync = IndexMap::new();
    sync.insert(ALLOWLIST_KEY.to_string(), json!(hosts));
    sync
}

/// Standalone renderer state for tests that bypass the session
pub(super) struct Harness {
    pub config: HighlighterConfig,
    pub dictionary: Dictionary,
    pub index: HighlightIndex,
    pub tooltips: TooltipManager,
    pub style: String,
}

impl Harness {
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        Self {
            config: HighlighterConfig::default(),
            dictionary: Dictionary::from_values(values(pairs)),
            index: HighlightIndex::new(),
            tooltips: TooltipManager::new(),
            style: String::new(),
        }
    }

    pub fn scan<D: Document>(&mut self, doc: &mut D, root: NodeId) -> ScanStats {
        let terms = self.dictionary.terms();
        let mut cx = RenderContext {
            config: &self.config,
            dictionary: &self.dictionary,
            index: &mut self.index,
            tooltips: &mut self.tooltips,
            style: &self.style,
        };
        Renderer::scan(doc, &mut cx, root, &terms)
    }
}

/// Enabled session on `PAGE_URL` with `pairs` loaded and the first pass done
pub(super) fn enabled_session<F>(pairs: &[(&str, &str)], build: F) -> HighlightSession<VirtualDocument>
where
    F: FnOnce(&mut VirtualDocument, NodeId),
{
    let mut doc = VirtualDocument::with_url(PAGE_URL);
    let body = doc.body().unwrap();
    build(&mut doc, body);

    let mut session = HighlightSession::new(doc, HighlighterConfig::default());
    let ticket = session.initialize(&allowlist(&[HOST])).unwrap();
    session.complete_refresh(ticket, values(pairs)).unwrap();
    session
}

/// Deliver pending records and fire the resulting timer at once
pub(super) fn settle(session: &mut HighlightSession<VirtualDocument>) -> Option<ScanStats> {
    let records = session.document_mut().take_records();
    let request = session.handle_mutations(&records)?;
    session.on_timer(request.token)
}

pub(super) fn highlights(doc: &VirtualDocument) -> Vec<NodeId> {
    doc.elements_by_class(&HighlighterConfig::default().highlight_class)
}

/// `VirtualDocument` that logs released handles and can refuse fragment swaps
pub(super) struct TrackingDocument {
    pub inner: VirtualDocument,
    pub refuse_replace: bool,
    pub released: Vec<NodeId>,
}

impl TrackingDocument {
    pub fn new(inner: VirtualDocument) -> Self {
        Self {
            inner,
            refuse_replace: false,
            released: Vec::new(),
        }
    }
}

impl Document for TrackingDocument {
    fn body(&self) -> Option<NodeId> {
        self.inner.body()
    }
    fn url(&self) -> Option<String> {
        self.inner.url()
    }
    fn kind(&self, node: NodeId) -> Option<NodeKind> {
        self.inner.kind(node)
    }
    fn node_name(&self, node: NodeId) -> String {
        self.inner.node_name(node)
    }
    fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.inner.has_class(node, class)
    }
    fn set_class_name(&mut self, node: NodeId, class_name: &str) {
        self.inner.set_class_name(node, class_name)
    }
    fn text_content(&self, node: NodeId) -> String {
        self.inner.text_content(node)
    }
    fn set_text_content(&mut self, node: NodeId, text: &str) {
        self.inner.set_text_content(node, text)
    }
    fn set_style(&mut self, node: NodeId, css: &str) {
        self.inner.set_style(node, css)
    }
    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.inner.children(node)
    }
    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.inner.parent(node)
    }
    fn is_connected(&self, node: NodeId) -> bool {
        self.inner.is_connected(node)
    }
    fn create_text(&mut self, text: &str) -> NodeId {
        self.inner.create_text(text)
    }
    fn create_element(&mut self, tag: &str) -> NodeId {
        self.inner.create_element(tag)
    }
    fn append_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        self.inner.append_child(parent, child)
    }
    fn replace_with(&mut self, old: NodeId, replacement: &[NodeId]) -> bool {
        !self.refuse_replace && self.inner.replace_with(old, replacement)
    }
    fn normalize(&mut self, node: NodeId) {
        self.inner.normalize(node)
    }
    fn bounding_rect(&self, node: NodeId) -> Rect {
        self.inner.bounding_rect(node)
    }
    fn scroll_offset(&self) -> (f64, f64) {
        self.inner.scroll_offset()
    }
    fn elements_by_class(&self, class: &str) -> Vec<NodeId> {
        self.inner.elements_by_class(class)
    }
    fn listen_hover(&mut self, node: NodeId) {
        self.inner.listen_hover(node)
    }
    fn unlisten_hover(&mut self, node: NodeId) {
        self.inner.unlisten_hover(node)
    }
    fn observe(&mut self) {
        self.inner.observe()
    }
    fn disconnect(&mut self) {
        self.inner.disconnect()
    }
    fn is_observing(&self) -> bool {
        self.inner.is_observing()
    }
    fn release(&mut self, node: NodeId) {
        self.released.push(node);
    }
}
