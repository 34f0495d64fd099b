//! HighlightIndex: Term → highlight elements
//!
//! Lets the reversal engine find a term's highlights without sweeping the
//! document, and lets hover handlers recover the term of an element.

use std::collections::{HashMap, HashSet};

use crate::dom::{Document, NodeId};

#[derive(Debug, Default)]
pub struct HighlightIndex {
    by_term: HashMap<String, HashSet<NodeId>>,
    by_node: HashMap<NodeId, String>,
}

impl HighlightIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, term: &str, node: NodeId) {
        self.by_term.entry(term.to_string()).or_default().insert(node);
        self.by_node.insert(node, term.to_string());
    }

    /// Term a highlight element was created for
    pub fn term_of(&self, node: NodeId) -> Option<&str> {
        self.by_node.get(&node).map(String::as_str)
    }

    pub fn count(&self, term: &str) -> usize {
        self.by_term.get(term).map(|s| s.len()).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.by_node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_node.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.by_node.keys().copied()
    }

    /// Remove and return every element of `term`, sorted by handle
    pub fn take_term(&mut self, term: &str) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self
            .by_term
            .remove(term)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();
        for node in &nodes {
            self.by_node.remove(node);
        }
        nodes.sort();
        nodes
    }

    /// Remove and return every indexed element, sorted by handle
    pub fn take_all(&mut self) -> Vec<NodeId> {
        self.by_term.clear();
        let mut nodes: Vec<NodeId> = self.by_node.drain().map(|(node, _)| node).collect();
        nodes.sort();
        nodes
    }

    /// Drop elements the page detached on its own; returns them
    pub fn prune<D: Document + ?Sized>(&mut self, doc: &D) -> Vec<NodeId> {
        let dead: Vec<NodeId> = self
            .by_node
            .keys()
            .copied()
            .filter(|&node| !doc.is_connected(node))
            .collect();
        for node in &dead {
            if let Some(term) = self.by_node.remove(node) {
                if let Some(set) = self.by_term.get_mut(&term) {
                    set.remove(node);
                    if set.is_empty() {
                        self.by_term.remove(&term);
                    }
                }
            }
        }
        dead
    }
}
