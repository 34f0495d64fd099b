//! VirtualDocument: in-memory page tree
//!
//! Arena-backed implementation of [`Document`]. Nodes are never freed, so a
//! handle to a removed node stays valid and simply reports
//! `is_connected() == false`, which mirrors how a detached DOM node behaves.
//!
//! Mutation records are only collected while observing, exactly like a
//! `MutationObserver`: anything written between `disconnect()` and
//! `observe()` is invisible to [`VirtualDocument::take_records`].

use super::{Document, MutationRecord, NodeId, NodeKind, Rect};

#[derive(Debug, Clone)]
enum NodeData {
    Document,
    Element {
        tag: String,
        class_name: String,
        style: String,
        hover: bool,
    },
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Slot {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    rect: Rect,
}

impl Slot {
    fn new(data: NodeData) -> Self {
        Self {
            data,
            parent: None,
            children: Vec::new(),
            rect: Rect::default(),
        }
    }
}

/// In-memory document with `<html><body>` already in place
#[derive(Debug, Clone)]
pub struct VirtualDocument {
    nodes: Vec<Slot>,
    root: NodeId,
    body: NodeId,
    url: Option<String>,
    scroll: (f64, f64),
    observing: bool,
    records: Vec<MutationRecord>,
}

impl Default for VirtualDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualDocument {
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: vec![Slot::new(NodeData::Document)],
            root: NodeId(0),
            body: NodeId(0),
            url: None,
            scroll: (0.0, 0.0),
            observing: false,
            records: Vec::new(),
        };
        let html = doc.create_element("html");
        doc.link(doc.root, html);
        let body = doc.create_element("body");
        doc.link(html, body);
        doc.body = body;
        doc
    }

    /// Document at the given page URL
    pub fn with_url(url: &str) -> Self {
        let mut doc = Self::new();
        doc.url = Some(url.to_string());
        doc
    }

    pub fn set_url(&mut self, url: Option<&str>) {
        self.url = url.map(str::to_string);
    }

    pub fn set_scroll(&mut self, x: f64, y: f64) {
        self.scroll = (x, y);
    }

    pub fn set_rect(&mut self, node: NodeId, rect: Rect) {
        if let Some(slot) = self.nodes.get_mut(node.index()) {
            slot.rect = rect;
        }
    }

    // =========================================================================
    // Builders
    // =========================================================================

    /// Create `<tag>` and append it to `parent`
    pub fn append_element(&mut self, parent: NodeId, tag: &str) -> NodeId {
        let id = self.create_element(tag);
        self.append_child(parent, id);
        id
    }

    /// Create `<tag class="...">` and append it to `parent`
    pub fn append_element_with_class(&mut self, parent: NodeId, tag: &str, class: &str) -> NodeId {
        let id = self.create_element(tag);
        self.set_class_name(id, class);
        self.append_child(parent, id);
        id
    }

    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        let id = self.create_text(text);
        self.append_child(parent, id);
        id
    }

    pub fn append_comment(&mut self, parent: NodeId, text: &str) -> NodeId {
        let id = self.alloc(NodeData::Comment(text.to_string()));
        self.append_child(parent, id);
        id
    }

    /// Detach a node from its parent
    pub fn remove(&mut self, node: NodeId) -> bool {
        match self.unlink(node) {
            Some(parent) => {
                self.record(parent, Vec::new(), vec![node]);
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Drain mutation records collected while observing
    pub fn take_records(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.records)
    }

    pub fn style(&self, node: NodeId) -> Option<&str> {
        match self.nodes.get(node.index()).map(|s| &s.data) {
            Some(NodeData::Element { style, .. }) => Some(style.as_str()),
            _ => None,
        }
    }

    pub fn class_name(&self, node: NodeId) -> Option<&str> {
        match self.nodes.get(node.index()).map(|s| &s.data) {
            Some(NodeData::Element { class_name, .. }) => Some(class_name.as_str()),
            _ => None,
        }
    }

    pub fn has_hover_listeners(&self, node: NodeId) -> bool {
        matches!(
            self.nodes.get(node.index()).map(|s| &s.data),
            Some(NodeData::Element { hover: true, .. })
        )
    }

    /// Number of elements (attached or not) with hover handlers installed
    pub fn hover_listener_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|s| matches!(s.data, NodeData::Element { hover: true, .. }))
            .count()
    }

    /// Serialize a subtree as simplified markup (class attribute only)
    pub fn markup(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_markup(node, &mut out);
        out
    }

    fn write_markup(&self, node: NodeId, out: &mut String) {
        let Some(slot) = self.nodes.get(node.index()) else { return };
        match &slot.data {
            NodeData::Text(text) => out.push_str(text),
            NodeData::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            NodeData::Document => {
                for &child in &slot.children {
                    self.write_markup(child, out);
                }
            }
            NodeData::Element { tag, class_name, .. } => {
                out.push('<');
                out.push_str(tag);
                if !class_name.is_empty() {
                    out.push_str(" class=\"");
                    out.push_str(class_name);
                    out.push('"');
                }
                out.push('>');
                for &child in &slot.children {
                    self.write_markup(child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn alloc(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Slot::new(data));
        id
    }

    fn link(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.index()].parent = Some(parent);
        self.nodes[parent.index()].children.push(child);
    }

    /// Remove `node` from its parent's child list, returning the old parent
    fn unlink(&mut self, node: NodeId) -> Option<NodeId> {
        let parent = self.nodes.get(node.index())?.parent?;
        self.nodes[parent.index()].children.retain(|&c| c != node);
        self.nodes[node.index()].parent = None;
        Some(parent)
    }

    fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes[id.index()].parent;
        }
        false
    }

    fn valid(&self, node: NodeId) -> bool {
        node.index() < self.nodes.len()
    }

    fn record(&mut self, target: NodeId, added: Vec<NodeId>, removed: Vec<NodeId>) {
        if !self.observing || !self.is_inclusive_ancestor(self.body, target) {
            return;
        }
        self.records.push(MutationRecord {
            target: Some(target),
            added,
            removed,
        });
    }
}

impl Document for VirtualDocument {
    fn body(&self) -> Option<NodeId> {
        Some(self.body)
    }

    fn url(&self) -> Option<String> {
        self.url.clone()
    }

    fn kind(&self, node: NodeId) -> Option<NodeKind> {
        self.nodes.get(node.index()).map(|slot| match slot.data {
            NodeData::Document => NodeKind::Document,
            NodeData::Element { .. } => NodeKind::Element,
            NodeData::Text(_) => NodeKind::Text,
            NodeData::Comment(_) => NodeKind::Comment,
        })
    }

    fn node_name(&self, node: NodeId) -> String {
        match self.nodes.get(node.index()).map(|s| &s.data) {
            Some(NodeData::Document) => "#document".to_string(),
            Some(NodeData::Element { tag, .. }) => tag.to_ascii_uppercase(),
            Some(NodeData::Text(_)) => "#text".to_string(),
            Some(NodeData::Comment(_)) => "#comment".to_string(),
            None => String::new(),
        }
    }

    fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.class_name(node)
            .map(|names| names.split_ascii_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    fn set_class_name(&mut self, node: NodeId, new_class: &str) {
        if let Some(NodeData::Element { class_name, .. }) =
            self.nodes.get_mut(node.index()).map(|s| &mut s.data)
        {
            *class_name = new_class.to_string();
        }
    }

    fn text_content(&self, node: NodeId) -> String {
        let Some(slot) = self.nodes.get(node.index()) else {
            return String::new();
        };
        match &slot.data {
            NodeData::Text(text) | NodeData::Comment(text) => return text.clone(),
            NodeData::Document => return String::new(),
            NodeData::Element { .. } => {}
        }

        let mut out = String::new();
        let mut stack: Vec<NodeId> = slot.children.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let child = &self.nodes[id.index()];
            match &child.data {
                NodeData::Text(text) => out.push_str(text),
                NodeData::Element { .. } => stack.extend(child.children.iter().rev().copied()),
                _ => {}
            }
        }
        out
    }

    fn set_text_content(&mut self, node: NodeId, text: &str) {
        if !self.valid(node) {
            return;
        }
        if let NodeData::Text(data) | NodeData::Comment(data) = &mut self.nodes[node.index()].data {
            *data = text.to_string();
            return;
        }

        let removed = std::mem::take(&mut self.nodes[node.index()].children);
        for &child in &removed {
            self.nodes[child.index()].parent = None;
        }
        let mut added = Vec::new();
        if !text.is_empty() {
            let id = self.create_text(text);
            self.link(node, id);
            added.push(id);
        }
        self.record(node, added, removed);
    }

    fn set_style(&mut self, node: NodeId, css: &str) {
        if let Some(NodeData::Element { style, .. }) =
            self.nodes.get_mut(node.index()).map(|s| &mut s.data)
        {
            *style = css.to_string();
        }
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(node.index())
            .map(|s| s.children.clone())
            .unwrap_or_default()
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.index())?.parent
    }

    fn is_connected(&self, node: NodeId) -> bool {
        self.valid(node) && self.is_inclusive_ancestor(self.root, node)
    }

    fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(NodeData::Text(text.to_string()))
    }

    fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(NodeData::Element {
            tag: tag.to_ascii_lowercase(),
            class_name: String::new(),
            style: String::new(),
            hover: false,
        })
    }

    fn append_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        if !self.valid(parent) || !self.valid(child) || self.is_inclusive_ancestor(child, parent) {
            return false;
        }
        if let Some(old_parent) = self.unlink(child) {
            self.record(old_parent, Vec::new(), vec![child]);
        }
        self.link(parent, child);
        self.record(parent, vec![child], Vec::new());
        true
    }

    fn replace_with(&mut self, old: NodeId, replacement: &[NodeId]) -> bool {
        let Some(parent) = self.parent(old) else {
            return false;
        };
        if replacement
            .iter()
            .any(|&r| !self.valid(r) || r == old || self.is_inclusive_ancestor(r, parent))
        {
            return false;
        }

        for &node in replacement {
            self.unlink(node);
        }
        let Some(position) = self.nodes[parent.index()].children.iter().position(|&c| c == old) else {
            return false;
        };
        self.nodes[parent.index()]
            .children
            .splice(position..=position, replacement.iter().copied());
        self.nodes[old.index()].parent = None;
        for &node in replacement {
            self.nodes[node.index()].parent = Some(parent);
        }
        self.record(parent, replacement.to_vec(), vec![old]);
        true
    }

    fn normalize(&mut self, node: NodeId) {
        if !self.valid(node) {
            return;
        }
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            let children = std::mem::take(&mut self.nodes[id.index()].children);
            let mut kept: Vec<NodeId> = Vec::with_capacity(children.len());
            let mut removed = Vec::new();

            for child in children {
                let merged = match &self.nodes[child.index()].data {
                    NodeData::Text(text) if text.is_empty() => true,
                    NodeData::Text(text) => match kept.last().copied() {
                        Some(prev) => {
                            let text = text.clone();
                            if let NodeData::Text(prev_text) = &mut self.nodes[prev.index()].data {
                                prev_text.push_str(&text);
                                true
                            } else {
                                false
                            }
                        }
                        None => false,
                    },
                    _ => false,
                };

                if merged {
                    self.nodes[child.index()].parent = None;
                    removed.push(child);
                } else {
                    if matches!(self.nodes[child.index()].data, NodeData::Element { .. }) {
                        stack.push(child);
                    }
                    kept.push(child);
                }
            }

            self.nodes[id.index()].children = kept;
            if !removed.is_empty() {
                self.record(id, Vec::new(), removed);
            }
        }
    }

    fn bounding_rect(&self, node: NodeId) -> Rect {
        self.nodes.get(node.index()).map(|s| s.rect).unwrap_or_default()
    }

    fn scroll_offset(&self) -> (f64, f64) {
        self.scroll
    }

    fn elements_by_class(&self, class: &str) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if self.has_class(id, class) {
                found.push(id);
            }
            stack.extend(self.nodes[id.index()].children.iter().rev().copied());
        }
        found
    }

    fn listen_hover(&mut self, node: NodeId) {
        if let Some(NodeData::Element { hover, .. }) =
            self.nodes.get_mut(node.index()).map(|s| &mut s.data)
        {
            *hover = true;
        }
    }

    fn unlisten_hover(&mut self, node: NodeId) {
        if let Some(NodeData::Element { hover, .. }) =
            self.nodes.get_mut(node.index()).map(|s| &mut s.data)
        {
            *hover = false;
        }
    }

    fn observe(&mut self) {
        self.observing = true;
    }

    fn disconnect(&mut self) {
        self.observing = false;
        self.records.clear();
    }

    fn is_observing(&self) -> bool {
        self.observing
    }
}

// =============================================================================
// Tests
// =============================================================================
