//! Host document abstraction
//!
//! The highlighting engine never touches a concrete DOM. It talks to a
//! [`Document`] through copyable [`NodeId`] handles, which lets the same
//! engine drive the live page (`web::WebDocument`, wasm32 only) and an
//! in-memory tree (`VirtualDocument`) used by native hosts and tests.
//!
//! Every operation tolerates stale handles: a node that disappeared from the
//! page yields `None`, `false` or an empty value instead of an error.

pub mod virtual_dom;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use virtual_dom::VirtualDocument;

use serde::{Deserialize, Serialize};

// =============================================================================
// Handles
// =============================================================================

/// Opaque handle to a node owned by a [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The node types the engine distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Element,
    Text,
    Comment,
    Other,
}

/// Bounding box in viewport coordinates (CSS pixels)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(top: f64, left: f64, width: f64, height: f64) -> Self {
        Self { top, left, width, height }
    }
}

/// One `childList` mutation observed under the document body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationRecord {
    pub target: Option<NodeId>,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

// =============================================================================
// Document trait
// =============================================================================

/// Operations the engine needs from a page document
pub trait Document {
    /// The page body, if the document has one
    fn body(&self) -> Option<NodeId>;

    /// Page URL, `None` when unavailable
    fn url(&self) -> Option<String>;

    /// Node type, `None` for unknown or released handles
    fn kind(&self, node: NodeId) -> Option<NodeKind>;

    /// Upper-case node name (`"P"`, `"#text"`, `"#comment"`)
    fn node_name(&self, node: NodeId) -> String;

    fn has_class(&self, node: NodeId, class: &str) -> bool;

    fn set_class_name(&mut self, node: NodeId, class_name: &str);

    /// Concatenated text of all descendant text nodes
    fn text_content(&self, node: NodeId) -> String;

    fn set_text_content(&mut self, node: NodeId, text: &str);

    /// Replace the inline style attribute
    fn set_style(&mut self, node: NodeId, css: &str);

    fn children(&self, node: NodeId) -> Vec<NodeId>;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Whether the node is reachable from the document root
    fn is_connected(&self, node: NodeId) -> bool;

    fn create_text(&mut self, text: &str) -> NodeId;

    fn create_element(&mut self, tag: &str) -> NodeId;

    fn append_child(&mut self, parent: NodeId, child: NodeId) -> bool;

    /// Swap `old` for `replacement` in one step (a fragment replace).
    ///
    /// Returns `false` and leaves the tree untouched when `old` has no parent.
    fn replace_with(&mut self, old: NodeId, replacement: &[NodeId]) -> bool;

    /// Merge adjacent text nodes and drop empty ones, recursively
    fn normalize(&mut self, node: NodeId);

    fn bounding_rect(&self, node: NodeId) -> Rect;

    /// Page scroll position as `(x, y)`
    fn scroll_offset(&self) -> (f64, f64);

    /// All connected elements carrying `class`, in document order
    fn elements_by_class(&self, class: &str) -> Vec<NodeId>;

    /// Attach the shared hover enter/leave handlers
    fn listen_hover(&mut self, node: NodeId);

    fn unlisten_hover(&mut self, node: NodeId);

    /// Start delivering `childList` mutations under the body
    fn observe(&mut self);

    /// Stop observing; undelivered records are dropped
    fn disconnect(&mut self);

    fn is_observing(&self) -> bool;

    /// Keep the handle valid across calls; each retain needs one [`Document::forget`]
    fn retain(&mut self, _node: NodeId) {}

    /// Hint that a transient handle is no longer needed (retained handles are kept)
    fn release(&mut self, _node: NodeId) {}

    /// Undo one retain; the handle is dropped once nothing retains it
    fn forget(&mut self, _node: NodeId) {}
}

/// Walk up from `node` (inclusive) looking for an ancestor matching `pred`.
///
/// Handles walked past are released; a match is returned unreleased.
pub fn find_ancestor<D, F>(doc: &mut D, node: NodeId, mut pred: F) -> Option<NodeId>
where
    D: Document + ?Sized,
    F: FnMut(&D, NodeId) -> bool,
{
    let mut current = Some(node);
    while let Some(id) = current {
        if pred(doc, id) {
            return Some(id);
        }
        current = doc.parent(id);
        doc.release(id);
    }
    None
}
