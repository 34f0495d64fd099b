//! Reversal Engine: turns highlight elements back into plain text
//!
//! Each highlight is replaced by a text node holding the same text, then the
//! affected parents are normalized so the page is not left fragmented into
//! adjacent text siblings. Callers own the observation discipline: removing
//! a term runs under the suspension guard, disabling runs after the
//! coordinator has been stopped.

use std::collections::BTreeSet;

use crate::config::HighlighterConfig;
use crate::dom::{Document, NodeId};
use crate::highlight::index::HighlightIndex;

/// Result of reverting one term
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Restored {
    /// Highlight elements turned back into text
    pub count: usize,
    /// Connected parents that were normalized. Their handles are still held
    /// by the caller, which either queues them for a rescan or releases them.
    pub parents: Vec<NodeId>,
}

/// Revert every highlight of `term`; other terms are untouched.
///
/// Indexed elements are restored along with unindexed elements carrying the
/// marker class whose text is exactly `term` (copies made by the page).
pub fn remove_term<D: Document + ?Sized>(
    doc: &mut D,
    config: &HighlighterConfig,
    index: &mut HighlightIndex,
    term: &str,
) -> Restored {
    let mut nodes: BTreeSet<NodeId> = index.take_term(term).into_iter().collect();
    for node in doc.elements_by_class(&config.highlight_class) {
        if !nodes.contains(&node) && index.term_of(node).is_none() && doc.text_content(node) == term {
            nodes.insert(node);
        } else {
            doc.release(node);
        }
    }
    let nodes: Vec<NodeId> = nodes.into_iter().collect();
    restore(doc, &nodes)
}

/// Revert every highlight on the page.
///
/// Indexed elements are restored along with any stray element still carrying
/// the marker class (for instance one the page cloned).
pub fn disable_all<D: Document + ?Sized>(
    doc: &mut D,
    config: &HighlighterConfig,
    index: &mut HighlightIndex,
) -> usize {
    let mut nodes: BTreeSet<NodeId> = index.take_all().into_iter().collect();
    nodes.extend(doc.elements_by_class(&config.highlight_class));
    let nodes: Vec<NodeId> = nodes.into_iter().collect();
    let restored = restore(doc, &nodes);
    for parent in restored.parents {
        doc.release(parent);
    }
    restored.count
}

fn restore<D: Document + ?Sized>(doc: &mut D, nodes: &[NodeId]) -> Restored {
    let mut parents = BTreeSet::new();
    let mut count = 0;

    for &node in nodes {
        doc.unlisten_hover(node);
        let Some(parent) = doc.parent(node) else {
            doc.forget(node);
            continue;
        };
        let text = doc.text_content(node);
        let plain = doc.create_text(&text);
        if doc.replace_with(node, &[plain]) {
            parents.insert(parent);
            count += 1;
        } else if !parents.contains(&parent) {
            doc.release(parent);
        }
        doc.release(plain);
        doc.forget(node);
    }

    let mut normalized = Vec::with_capacity(parents.len());
    for parent in parents {
        if doc.is_connected(parent) {
            doc.normalize(parent);
            normalized.push(parent);
        } else {
            doc.release(parent);
        }
    }
    Restored {
        count,
        parents: normalized,
    }
}
