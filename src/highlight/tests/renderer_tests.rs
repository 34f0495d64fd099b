//! Renderer contract tests: fragment replacement, exclusion, idempotence

use super::{highlights, Harness, TrackingDocument};
use crate::config::HIGHLIGHT_CLASS;
use crate::dom::{Document, VirtualDocument};

// ============================================================================
// Replacement
// ============================================================================

#[test]
fn test_single_term_in_paragraph() {
    let mut doc = VirtualDocument::new();
    let body = doc.body().unwrap();
    let p = doc.append_element(body, "p");
    doc.append_text(p, "I like foo very much");

    let mut h = Harness::new(&[("foo", "bar means nothing")]);
    let stats = h.scan(&mut doc, body);

    assert_eq!(stats.highlights_created, 1);
    assert_eq!(
        doc.markup(p),
        format!("<p>I like <abbr class=\"{}\">foo</abbr> very much</p>", HIGHLIGHT_CLASS)
    );
    let tooltip = h.tooltips.tooltip_for("foo").unwrap();
    assert_eq!(doc.text_content(tooltip), "bar means nothing");
    assert_eq!(doc.parent(tooltip), Some(body));
}

#[test]
fn test_two_occurrences_one_replacement() {
    let mut doc = VirtualDocument::new();
    let body = doc.body().unwrap();
    let p = doc.append_element(body, "p");
    doc.append_text(p, "foo and foo again");

    let mut h = Harness::new(&[("foo", "x")]);
    let stats = h.scan(&mut doc, body);

    assert_eq!(stats.text_nodes_replaced, 1);
    assert_eq!(stats.highlights_created, 2);
    assert_eq!(h.index.count("foo"), 2);
    assert_eq!(doc.text_content(p), "foo and foo again");
    // One tooltip per term, not per occurrence
    assert_eq!(h.tooltips.len(), 1);
}

#[test]
fn test_highlight_carries_reset_style_and_hover() {
    let mut doc = VirtualDocument::new();
    let body = doc.body().unwrap();
    doc.append_text(body, "foo");

    let mut h = Harness::new(&[("foo", "x")]);
    h.scan(&mut doc, body);

    let el = highlights(&doc)[0];
    assert_eq!(doc.node_name(el), "ABBR");
    assert_eq!(doc.style(el), Some("all: unset;"));
    assert!(doc.has_hover_listeners(el));
    assert_eq!(h.index.term_of(el), Some("foo"));
}

#[test]
fn test_style_preference_joins_class_list() {
    let mut doc = VirtualDocument::new();
    let body = doc.body().unwrap();
    doc.append_text(body, "foo");

    let mut h = Harness::new(&[("foo", "x")]);
    h.style = "underline".to_string();
    h.scan(&mut doc, body);

    let el = highlights(&doc)[0];
    assert_eq!(doc.class_name(el), Some("custom-dictionary-highlighted underline"));
}

#[test]
fn test_scan_text_node_root() {
    let mut doc = VirtualDocument::new();
    let body = doc.body().unwrap();
    let text = doc.append_text(body, "say foo");

    let mut h = Harness::new(&[("foo", "x")]);
    assert_eq!(h.scan(&mut doc, text).highlights_created, 1);
    assert!(!doc.is_connected(text));
}

#[test]
fn test_multibyte_text_preserved() {
    let mut doc = VirtualDocument::new();
    let body = doc.body().unwrap();
    let p = doc.append_element(body, "p");
    doc.append_text(p, "日本語のcaféと日本");

    let mut h = Harness::new(&[("日本", "Japan"), ("café", "coffee")]);
    let stats = h.scan(&mut doc, body);

    assert_eq!(stats.highlights_created, 3);
    assert_eq!(doc.text_content(p), "日本語のcaféと日本");
}

// ============================================================================
// Exclusion
// ============================================================================

#[test]
fn test_ignored_tags_are_never_entered() {
    let mut doc = VirtualDocument::new();
    let body = doc.body().unwrap();
    let script = doc.append_element(body, "script");
    doc.append_text(script, "var foo = 1;");
    let textarea = doc.append_element(body, "textarea");
    doc.append_text(textarea, "foo");
    doc.append_comment(body, "foo");
    let select = doc.append_element(body, "select");
    let option = doc.append_element(select, "option");
    doc.append_text(option, "foo");

    let mut h = Harness::new(&[("foo", "x")]);
    let stats = h.scan(&mut doc, body);

    assert_eq!(stats.highlights_created, 0);
    assert_eq!(doc.markup(script), "<script>var foo = 1;</script>");
    assert!(highlights(&doc).is_empty());
}

#[test]
fn test_skip_class_subtree_untouched() {
    let mut doc = VirtualDocument::new();
    let body = doc.body().unwrap();
    let pre = doc.append_element_with_class(body, "div", "code syntaxhighlighter-pre");
    doc.append_text(pre, "foo()");
    let p = doc.append_element(body, "p");
    doc.append_text(p, "foo");

    let mut h = Harness::new(&[("foo", "x")]);
    assert_eq!(h.scan(&mut doc, body).highlights_created, 1);
    assert_eq!(doc.markup(pre), "<div class=\"code syntaxhighlighter-pre\">foo()</div>");
}

#[test]
fn test_root_inside_excluded_ancestor_is_skipped() {
    let mut doc = VirtualDocument::new();
    let body = doc.body().unwrap();
    let textarea = doc.append_element(body, "textarea");
    let inner = doc.append_element(textarea, "span");
    doc.append_text(inner, "foo");

    let mut h = Harness::new(&[("foo", "x")]);
    let stats = h.scan(&mut doc, inner);
    assert_eq!(stats.highlights_created, 0);
    assert_eq!(stats.subtrees_pruned, 1);
}

#[test]
fn test_precheck_prunes_unrelated_subtrees() {
    let mut doc = VirtualDocument::new();
    let body = doc.body().unwrap();
    for _ in 0..10 {
        let div = doc.append_element(body, "div");
        let p = doc.append_element(div, "p");
        doc.append_text(p, "nothing to see");
    }
    let hit = doc.append_element(body, "p");
    doc.append_text(hit, "foo");

    let mut h = Harness::new(&[("foo", "x")]);
    let stats = h.scan(&mut doc, body);
    // body and the matching <p>; the ten <div>s are cut at the top
    assert_eq!(stats.elements_visited, 2);
    assert_eq!(stats.subtrees_pruned, 10);
}

#[test]
fn test_deep_document_does_not_recurse() {
    let mut doc = VirtualDocument::new();
    let body = doc.body().unwrap();
    let mut parent = body;
    for _ in 0..2_000 {
        parent = doc.append_element(parent, "div");
    }
    doc.append_text(parent, "foo at the bottom");

    let mut h = Harness::new(&[("foo", "x")]);
    assert_eq!(h.scan(&mut doc, body).highlights_created, 1);
}

#[test]
fn test_empty_dictionary_is_noop() {
    let mut doc = VirtualDocument::new();
    let body = doc.body().unwrap();
    doc.append_text(body, "foo");

    let mut h = Harness::new(&[]);
    let stats = h.scan(&mut doc, body);
    assert_eq!(stats.elements_visited, 0);
    assert_eq!(doc.markup(body), "<body>foo</body>");
}

// ============================================================================
// Idempotence and overlap
// ============================================================================

#[test]
fn test_second_scan_changes_nothing() {
    let mut doc = VirtualDocument::new();
    let body = doc.body().unwrap();
    let p = doc.append_element(body, "p");
    doc.append_text(p, "foo, bar and foo");

    let mut h = Harness::new(&[("foo", "1"), ("bar", "2")]);
    h.scan(&mut doc, body);
    let once = doc.markup(body);

    doc.observe();
    let again = h.scan(&mut doc, body);
    assert_eq!(again.highlights_created, 0);
    assert_eq!(doc.markup(body), once);
    assert!(doc.take_records().is_empty());
    assert_eq!(highlights(&doc).len(), 3);
}

#[test]
fn test_highlight_text_is_not_rescanned_for_later_terms() {
    let mut doc = VirtualDocument::new();
    let body = doc.body().unwrap();
    let p = doc.append_element(body, "p");
    doc.append_text(p, "foobar");

    let mut h = Harness::new(&[("foobar", "1")]);
    h.scan(&mut doc, body);
    h.dictionary.insert("foo", "2").unwrap();
    let stats = h.scan(&mut doc, body);

    assert_eq!(stats.highlights_created, 0);
    assert_eq!(highlights(&doc).len(), 1);
    assert_eq!(h.index.count("foo"), 0);
}

#[test]
fn test_overlap_earlier_term_claims_span() {
    let mut doc = VirtualDocument::new();
    let body = doc.body().unwrap();
    let p = doc.append_element(body, "p");
    doc.append_text(p, "foobar foo");

    let mut h = Harness::new(&[("foobar", "1"), ("foo", "2")]);
    h.scan(&mut doc, body);

    assert_eq!(h.index.count("foobar"), 1);
    assert_eq!(h.index.count("foo"), 1);
    assert_eq!(doc.text_content(p), "foobar foo");
}

// ============================================================================
// Handle hygiene
// ============================================================================

#[test]
fn test_failed_swap_releases_text_handle() {
    let mut inner = VirtualDocument::new();
    let body = inner.body().unwrap();
    let p = inner.append_element(body, "p");
    let text = inner.append_text(p, "foo");
    let mut doc = TrackingDocument::new(inner);
    doc.refuse_replace = true;

    let mut h = Harness::new(&[("foo", "x")]);
    let stats = h.scan(&mut doc, body);

    assert_eq!(stats.highlights_created, 0);
    assert!(doc.released.contains(&text));
    assert!(highlights(&doc.inner).is_empty());
    assert_eq!(doc.inner.markup(p), "<p>foo</p>");
}

#[test]
fn test_ancestor_check_releases_walked_handles() {
    let mut inner = VirtualDocument::new();
    let body = inner.body().unwrap();
    let section = inner.append_element(body, "section");
    let p = inner.append_element(section, "p");
    inner.append_text(p, "foo");
    let mut doc = TrackingDocument::new(inner);

    let mut h = Harness::new(&[("foo", "x")]);
    let stats = h.scan(&mut doc, p);

    assert_eq!(stats.highlights_created, 1);
    assert!(doc.released.contains(&section));
    assert!(doc.released.contains(&body));
}
