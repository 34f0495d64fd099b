//! Tooltip Manager: one floating definition element per term
//!
//! Tooltips are created lazily, appended to the body, and reused for every
//! highlight of their term. Creating one or changing its text is a DOM
//! mutation, so callers must hold the observation guard.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::HighlighterConfig;
use crate::dom::{Document, NodeId, Rect};

const HIDDEN_CSS: &str = "position: absolute; visibility: hidden;";

/// Absolute position of a tooltip centered above its anchor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TooltipPlacement {
    /// Page Y of the anchor's top edge
    pub top: f64,
    /// Page X of the anchor's horizontal center
    pub left: f64,
    /// Upward shift as a fraction of the tooltip's own height
    pub lift: f64,
}

impl TooltipPlacement {
    pub fn above(anchor: Rect, scroll: (f64, f64), lift: f64) -> Self {
        Self {
            top: anchor.top + scroll.1,
            left: anchor.left + scroll.0 + anchor.width / 2.0,
            lift,
        }
    }

    pub fn to_css(&self) -> String {
        format!(
            "position: absolute; visibility: visible; top: {}px; left: {}px; transform: translate(-50%, -{}%);",
            self.top,
            self.left,
            self.lift * 100.0
        )
    }
}

#[derive(Debug, Default)]
pub struct TooltipManager {
    tooltips: HashMap<String, NodeId>,
    visible: Option<NodeId>,
}

impl TooltipManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tooltip_for(&self, term: &str) -> Option<NodeId> {
        self.tooltips.get(term).copied()
    }

    pub fn len(&self) -> usize {
        self.tooltips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tooltips.is_empty()
    }

    pub fn visible(&self) -> Option<NodeId> {
        self.visible
    }

    /// Cached tooltip for `term`, created (hidden) on first use.
    ///
    /// A cached tooltip the page removed is recreated. Returns `None` only
    /// when the document has no body.
    pub fn get_or_create<D: Document + ?Sized>(
        &mut self,
        doc: &mut D,
        config: &HighlighterConfig,
        term: &str,
        definition: &str,
    ) -> Option<NodeId> {
        if let Some(&tooltip) = self.tooltips.get(term) {
            if doc.is_connected(tooltip) {
                if doc.text_content(tooltip) != definition {
                    doc.set_text_content(tooltip, definition);
                }
                return Some(tooltip);
            }
            doc.forget(tooltip);
            self.tooltips.remove(term);
        }

        let body = doc.body()?;
        let tooltip = doc.create_element("div");
        doc.set_class_name(tooltip, &config.tooltip_class);
        doc.set_style(tooltip, HIDDEN_CSS);
        doc.set_text_content(tooltip, definition);
        if !doc.append_child(body, tooltip) {
            doc.release(tooltip);
            return None;
        }
        doc.retain(tooltip);
        self.tooltips.insert(term.to_string(), tooltip);
        Some(tooltip)
    }

    /// Refresh the text of an existing tooltip after a definition change
    pub fn update_definition<D: Document + ?Sized>(&mut self, doc: &mut D, term: &str, definition: &str) {
        if let Some(&tooltip) = self.tooltips.get(term) {
            if doc.text_content(tooltip) != definition {
                doc.set_text_content(tooltip, definition);
            }
        }
    }

    /// Position `tooltip` above `anchor` and make it visible
    pub fn show<D: Document + ?Sized>(&mut self, doc: &mut D, tooltip: NodeId, anchor: Rect, lift: f64) {
        if let Some(previous) = self.visible.filter(|&v| v != tooltip) {
            doc.set_style(previous, HIDDEN_CSS);
        }
        let placement = TooltipPlacement::above(anchor, doc.scroll_offset(), lift);
        doc.set_style(tooltip, &placement.to_css());
        self.visible = Some(tooltip);
    }

    pub fn hide<D: Document + ?Sized>(&mut self, doc: &mut D, tooltip: NodeId) {
        doc.set_style(tooltip, HIDDEN_CSS);
        if self.visible == Some(tooltip) {
            self.visible = None;
        }
    }

    pub fn hide_all<D: Document + ?Sized>(&mut self, doc: &mut D) {
        if let Some(tooltip) = self.visible.take() {
            doc.set_style(tooltip, HIDDEN_CSS);
        }
    }

    /// Remove every tooltip from the page (teardown only)
    pub fn remove_all<D: Document + ?Sized>(&mut self, doc: &mut D) -> usize {
        self.visible = None;
        let mut removed = 0;
        for (_, tooltip) in self.tooltips.drain() {
            if doc.replace_with(tooltip, &[]) {
                removed += 1;
            }
            doc.forget(tooltip);
        }
        removed
    }
}
