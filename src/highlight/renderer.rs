//! Highlight Renderer: rewrites matched text nodes into highlight elements
//!
//! # Algorithm
//! 1. Iterative pre-order walk (explicit stack) over elements under the root.
//! 2. A subtree is skipped when its node name is ignored, when it carries a
//!    marker or skip class, or when its text content contains no candidate
//!    term (Aho-Corasick pre-check).
//! 3. Only direct text children of a surviving element are split; element
//!    children go back on the stack.
//! 4. A matched text node is swapped for `[text, highlight, text, ...]` in a
//!    single fragment replace.
//!
//! Already-highlighted elements fail step 2, so scanning is idempotent.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::HighlighterConfig;
use crate::dictionary::Dictionary;
use crate::dom::{find_ancestor, Document, NodeId, NodeKind};
use crate::highlight::index::HighlightIndex;
use crate::highlight::matcher::{Segment, TermMatcher};
use crate::highlight::tooltip::TooltipManager;

/// Inline style applied to every highlight so page CSS does not leak in
const HIGHLIGHT_RESET_CSS: &str = "all: unset;";

/// Counters for one scan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStats {
    pub elements_visited: usize,
    pub subtrees_pruned: usize,
    pub text_nodes_replaced: usize,
    pub highlights_created: usize,
    pub elapsed_ms: f64,
}

/// Session state the renderer reads and extends
pub struct RenderContext<'a> {
    pub config: &'a HighlighterConfig,
    pub dictionary: &'a Dictionary,
    pub index: &'a mut HighlightIndex,
    pub tooltips: &'a mut TooltipManager,
    /// Extra class from the user's highlight style preference
    pub style: &'a str,
}

pub struct Renderer;

impl Renderer {
    /// Highlight every unhighlighted occurrence of `terms` under `root`.
    ///
    /// `root` may be an element or a text node. Nodes detached mid-walk are
    /// skipped. Must run with mutation observation suspended.
    pub fn scan<D, S>(doc: &mut D, cx: &mut RenderContext<'_>, root: NodeId, terms: &[S]) -> ScanStats
    where
        D: Document + ?Sized,
        S: AsRef<str>,
    {
        Self::scan_roots(doc, cx, &[root], terms)
    }

    /// One pass over several roots sharing a single matcher
    pub fn scan_roots<D, S>(doc: &mut D, cx: &mut RenderContext<'_>, roots: &[NodeId], terms: &[S]) -> ScanStats
    where
        D: Document + ?Sized,
        S: AsRef<str>,
    {
        let start = instant::Instant::now();
        let mut stats = ScanStats::default();

        let matcher = TermMatcher::new(terms.iter().map(|t| t.as_ref()));
        if matcher.is_empty() {
            return stats;
        }

        for &root in roots {
            // Roots come from mutation records and may sit inside an excluded subtree
            let config = cx.config;
            let excluded_ancestor = doc
                .parent(root)
                .and_then(|parent| find_ancestor(doc, parent, |d, n| is_excluded(d, config, n)));
            if let Some(ancestor) = excluded_ancestor {
                doc.release(ancestor);
                stats.subtrees_pruned += 1;
                continue;
            }

            match doc.kind(root) {
                Some(NodeKind::Text) => Self::handle_text(doc, cx, &matcher, root, &mut stats),
                Some(NodeKind::Element) => Self::walk(doc, cx, &matcher, root, &mut stats),
                _ => {}
            }
        }

        stats.elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        debug!(
            "scan of {} roots: {} visited, {} pruned, {} highlights in {:.2}ms",
            roots.len(),
            stats.elements_visited,
            stats.subtrees_pruned,
            stats.highlights_created,
            stats.elapsed_ms
        );
        stats
    }

    fn walk<D: Document + ?Sized>(
        doc: &mut D,
        cx: &mut RenderContext<'_>,
        matcher: &TermMatcher,
        root: NodeId,
        stats: &mut ScanStats,
    ) {
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if doc.kind(node) != Some(NodeKind::Element)
                || is_excluded(doc, cx.config, node)
                || !matcher.any_match(&doc.text_content(node))
            {
                stats.subtrees_pruned += 1;
                if node != root {
                    doc.release(node);
                }
                continue;
            }
            stats.elements_visited += 1;

            let children = doc.children(node);
            let mut elements = Vec::new();
            for child in children {
                match doc.kind(child) {
                    Some(NodeKind::Element) => elements.push(child),
                    Some(NodeKind::Text) => Self::handle_text(doc, cx, matcher, child, stats),
                    _ => doc.release(child),
                }
            }
            // Reverse so the stack pops children in document order
            stack.extend(elements.into_iter().rev());

            if node != root {
                doc.release(node);
            }
        }
    }

    fn handle_text<D: Document + ?Sized>(
        doc: &mut D,
        cx: &mut RenderContext<'_>,
        matcher: &TermMatcher,
        text_node: NodeId,
        stats: &mut ScanStats,
    ) {
        if doc.parent(text_node).is_none() {
            doc.release(text_node);
            return;
        }
        let text = doc.text_content(text_node);
        let Some(segments) = matcher.segment(&text) else {
            doc.release(text_node);
            return;
        };

        let class_name = cx.config.highlight_class_name(cx.style);
        let mut replacement = Vec::with_capacity(segments.len());
        let mut created = Vec::new();
        for segment in segments {
            match segment {
                Segment::Plain(run) => replacement.push(doc.create_text(run)),
                Segment::Term(i) => {
                    let term = &matcher.terms()[i];
                    let highlight = Self::create_highlight(doc, cx, &class_name, term);
                    replacement.push(highlight);
                    created.push((term.as_str(), highlight));
                }
            }
        }

        if !doc.replace_with(text_node, &replacement) {
            for node in replacement {
                doc.forget(node);
            }
            doc.release(text_node);
            return;
        }

        for &node in &replacement {
            doc.release(node);
        }
        stats.text_nodes_replaced += 1;
        stats.highlights_created += created.len();
        for (term, highlight) in created {
            cx.index.insert(term, highlight);
            if let Some(definition) = cx.dictionary.get(term) {
                cx.tooltips.get_or_create(doc, cx.config, term, definition);
            }
        }
        doc.forget(text_node);
    }

    fn create_highlight<D: Document + ?Sized>(
        doc: &mut D,
        cx: &RenderContext<'_>,
        class_name: &str,
        term: &str,
    ) -> NodeId {
        let highlight = doc.create_element(&cx.config.highlight_tag);
        doc.set_class_name(highlight, class_name);
        doc.set_style(highlight, HIGHLIGHT_RESET_CSS);
        doc.set_text_content(highlight, term);
        doc.listen_hover(highlight);
        doc.retain(highlight);
        highlight
    }
}

/// Node name, marker class or skip class rules out the subtree
pub(crate) fn is_excluded<D: Document + ?Sized>(doc: &D, config: &HighlighterConfig, node: NodeId) -> bool {
    config.is_ignored_tag(&doc.node_name(node))
        || doc.has_class(node, &config.highlight_class)
        || doc.has_class(node, &config.tooltip_class)
        || config.skip_classes.iter().any(|class| doc.has_class(node, class))
}
