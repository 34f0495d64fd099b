//! End-to-end session scenarios: enablement, store changes, hover, teardown

use serde_json::json;

use super::{allowlist, enabled_session, highlights, settle, values, HOST, PAGE_URL};
use crate::config::HighlighterConfig;
use crate::dictionary::store::{Namespace, StorageChange, StorageChanges, ALLOWLIST_KEY, HIGHLIGHT_STYLE_KEY};
use crate::dom::{Document, Rect, VirtualDocument};
use crate::highlight::CoordinatorState;
use crate::policy::Allowlist;
use crate::session::HighlightSession;

fn changes(pairs: &[(&str, Option<&str>)]) -> StorageChanges {
    pairs
        .iter()
        .map(|(key, new_value)| {
            let change = StorageChange {
                old_value: None,
                new_value: new_value.map(|v| json!(v)),
            };
            (key.to_string(), change)
        })
        .collect()
}

fn two_terms_page(doc: &mut VirtualDocument, body: crate::dom::NodeId) {
    let p = doc.append_element(body, "p");
    doc.append_text(p, "I like foo very much");
    let q = doc.append_element(body, "p");
    doc.append_text(q, "bar is here and foo too");
}

// ============================================================================
// Enablement
// ============================================================================

#[test]
fn test_enable_runs_full_pass_and_observes() {
    let session = enabled_session(&[("foo", "bar means nothing")], |doc, body| {
        let p = doc.append_element(body, "p");
        doc.append_text(p, "I like foo very much");
    });

    assert!(session.is_enabled());
    assert_eq!(session.hostname(), Some(HOST));
    assert_eq!(session.stats().full_passes, 1);
    assert_eq!(session.coordinator_state(), CoordinatorState::Observing);
    assert!(session.document().is_observing());

    let el = highlights(session.document())[0];
    assert_eq!(session.document().text_content(el), "foo");
    let tooltip = session.tooltips().tooltip_for("foo").unwrap();
    assert_eq!(session.document().text_content(tooltip), "bar means nothing");
}

#[test]
fn test_toggle_off_reverts_everything() {
    let mut session = enabled_session(&[("foo", "1"), ("bar", "2")], two_terms_page);
    let body = session.document().body().unwrap();
    let paragraphs = session.document().children(body);
    assert_eq!(highlights(session.document()).len(), 3);

    session.update_allowlist(&Allowlist::new());

    let doc = session.document();
    assert!(highlights(doc).is_empty());
    assert_eq!(doc.markup(paragraphs[0]), "<p>I like foo very much</p>");
    assert_eq!(doc.children(paragraphs[1]).len(), 1);
    assert!(session.dictionary().is_empty());
    assert!(session.index().is_empty());
    assert!(!doc.is_observing());
    assert_eq!(session.coordinator_state(), CoordinatorState::Idle);
    assert_eq!(session.stats().highlights_removed, 3);
}

#[test]
fn test_allowlist_change_notification_enables() {
    let doc = VirtualDocument::with_url(PAGE_URL);
    let mut session = HighlightSession::new(doc, HighlighterConfig::default());
    assert!(session.initialize(&allowlist(&[])).is_none());

    let mut sync = StorageChanges::new();
    sync.insert(
        ALLOWLIST_KEY.to_string(),
        StorageChange {
            old_value: Some(json!([])),
            new_value: Some(json!([HOST])),
        },
    );
    let ticket = session.apply_storage_changes(Namespace::Sync, &sync).unwrap();
    assert!(session.is_enabled());

    // Re-delivering the same allowlist is not a transition
    assert!(session.apply_storage_changes(Namespace::Sync, &sync).is_none());
    assert!(session.complete_refresh(ticket, values(&[("foo", "x")])).is_some());
}

#[test]
fn test_reenable_after_disable_highlights_again() {
    let mut session = enabled_session(&[("foo", "x")], |doc, body| {
        doc.append_text(body, "foo");
    });
    session.update_allowlist(&Allowlist::new());
    assert!(highlights(session.document()).is_empty());

    let on: Allowlist = [HOST].into_iter().collect();
    let ticket = session.update_allowlist(&on).unwrap();
    session.complete_refresh(ticket, values(&[("foo", "x")])).unwrap();

    assert_eq!(highlights(session.document()).len(), 1);
    assert_eq!(session.stats().full_passes, 2);
    assert!(session.document().is_observing());
}

// ============================================================================
// Dictionary changes
// ============================================================================

#[test]
fn test_removed_term_reverts_only_its_highlights() {
    let mut session = enabled_session(&[("foo", "1"), ("bar", "2")], two_terms_page);

    session.apply_storage_changes(Namespace::Local, &changes(&[("foo", None)]));

    let doc = session.document();
    let remaining = highlights(doc);
    assert_eq!(remaining.len(), 1);
    assert_eq!(doc.text_content(remaining[0]), "bar");
    assert_eq!(session.index().count("foo"), 0);
    assert!(!session.dictionary().contains("foo"));
    assert!(doc.is_observing());
    assert!(session.document_mut().take_records().is_empty());
}

#[test]
fn test_added_term_is_highlighted_without_full_pass() {
    let mut session = enabled_session(&[("foo", "1")], two_terms_page);
    assert_eq!(session.index().count("bar"), 0);

    session.apply_storage_changes(Namespace::Local, &changes(&[("bar", Some("2"))]));

    assert_eq!(session.index().count("bar"), 1);
    assert_eq!(session.index().count("foo"), 2);
    assert_eq!(session.stats().full_passes, 1);
    let tooltip = session.tooltips().tooltip_for("bar").unwrap();
    assert_eq!(session.document().text_content(tooltip), "2");
}

#[test]
fn test_changed_definition_updates_tooltip_in_place() {
    let mut session = enabled_session(&[("foo", "old")], two_terms_page);
    let tooltip = session.tooltips().tooltip_for("foo").unwrap();

    session.apply_storage_changes(Namespace::Local, &changes(&[("foo", Some("new"))]));

    assert_eq!(session.tooltips().tooltip_for("foo"), Some(tooltip));
    assert_eq!(session.document().text_content(tooltip), "new");
    assert_eq!(session.index().count("foo"), 2);
}

#[test]
fn test_local_changes_ignored_while_disabled() {
    let doc = VirtualDocument::with_url(PAGE_URL);
    let mut session = HighlightSession::new(doc, HighlighterConfig::default());
    let body = session.document().body().unwrap();
    session.document_mut().append_text(body, "foo");

    session.apply_storage_changes(Namespace::Local, &changes(&[("foo", Some("x"))]));
    assert!(session.dictionary().is_empty());
    assert!(highlights(session.document()).is_empty());
}

#[test]
fn test_stale_refresh_is_discarded() {
    let mut session = enabled_session(&[("foo", "1")], |_, _| {});
    let older = session.request_refresh().unwrap();
    let newer = session.request_refresh().unwrap();

    assert!(session.complete_refresh(newer, values(&[("foo", "2")])).is_some());
    assert!(session.complete_refresh(older, values(&[("foo", "1")])).is_none());
    assert_eq!(session.dictionary().get("foo"), Some("2"));
    assert_eq!(session.stats().stale_refreshes, 1);
}

#[test]
fn test_delta_during_refresh_wins() {
    let mut session = enabled_session(&[("foo", "1")], |_, _| {});
    let ticket = session.request_refresh().unwrap();
    session.apply_storage_changes(Namespace::Local, &changes(&[("foo", Some("2")), ("bar", Some("3"))]));

    // Snapshot read before the delta landed
    session.complete_refresh(ticket, values(&[("foo", "1")])).unwrap();
    assert_eq!(session.dictionary().get("foo"), Some("2"));
    assert_eq!(session.dictionary().get("bar"), Some("3"));
}

#[test]
fn test_delta_before_first_pass_is_rendered_by_it() {
    let mut doc = VirtualDocument::with_url(PAGE_URL);
    let body = doc.body().unwrap();
    doc.append_text(body, "foo and bar");
    let mut session = HighlightSession::new(doc, HighlighterConfig::default());

    let ticket = session.initialize(&allowlist(&[HOST])).unwrap();
    session.apply_storage_changes(Namespace::Local, &changes(&[("bar", Some("2"))]));
    assert!(highlights(session.document()).is_empty());

    session.complete_refresh(ticket, values(&[("foo", "1")])).unwrap();
    assert_eq!(session.index().count("foo"), 1);
    assert_eq!(session.index().count("bar"), 1);
}

// ============================================================================
// Style
// ============================================================================

#[test]
fn test_style_change_restyles_existing_highlights() {
    let mut session = enabled_session(&[("foo", "1")], two_terms_page);

    let mut sync = StorageChanges::new();
    sync.insert(
        HIGHLIGHT_STYLE_KEY.to_string(),
        StorageChange {
            old_value: None,
            new_value: Some(json!("dotted")),
        },
    );
    assert!(session.apply_storage_changes(Namespace::Sync, &sync).is_none());

    for el in highlights(session.document()) {
        assert_eq!(
            session.document().class_name(el),
            Some("custom-dictionary-highlighted dotted")
        );
    }

    // New highlights pick the style up too
    let body = session.document().body().unwrap();
    session.document_mut().append_text(body, "foo");
    settle(&mut session).unwrap();
    let all = highlights(session.document());
    assert_eq!(all.len(), 3);
    assert!(all.iter().all(|&el| session.document().has_class(el, "dotted")));
}

// ============================================================================
// Hover
// ============================================================================

#[test]
fn test_hover_shows_and_hides_tooltip() {
    let mut session = enabled_session(&[("foo", "a definition")], |doc, body| {
        doc.append_text(body, "foo");
        doc.set_scroll(10.0, 200.0);
    });
    let el = highlights(session.document())[0];
    session.document_mut().set_rect(el, Rect::new(40.0, 100.0, 20.0, 12.0));

    let tooltip = session.pointer_enter(el).unwrap();
    assert_eq!(session.tooltips().visible(), Some(tooltip));
    let style = session.document().style(tooltip).unwrap().to_string();
    assert!(style.contains("top: 240px"));
    assert!(style.contains("left: 120px"));

    session.pointer_leave(el);
    assert_eq!(session.tooltips().visible(), None);
    assert!(session.document().style(tooltip).unwrap().contains("hidden"));
}

#[test]
fn test_hover_on_unindexed_highlight_falls_back_to_text() {
    let mut session = enabled_session(&[("foo", "x")], |doc, body| {
        doc.append_text(body, "foo");
    });
    let body = session.document().body().unwrap();
    let class = HighlighterConfig::default().highlight_class;
    let stray = session.document_mut().append_element_with_class(body, "abbr", &class);
    session.document_mut().append_text(stray, "foo");

    let tooltip = session.pointer_enter(stray).unwrap();
    assert_eq!(session.tooltips().tooltip_for("foo"), Some(tooltip));
}

#[test]
fn test_hover_ignored_when_disabled_or_not_a_highlight() {
    let mut session = enabled_session(&[("foo", "x")], |doc, body| {
        doc.append_element(body, "p");
    });
    let body = session.document().body().unwrap();
    let p = session.document().children(body)[0];
    assert!(session.pointer_enter(p).is_none());

    session.update_allowlist(&Allowlist::new());
    assert!(session.pointer_enter(p).is_none());
}

// ============================================================================
// Teardown and pruning
// ============================================================================

#[test]
fn test_teardown_leaves_no_trace() {
    let mut session = enabled_session(&[("foo", "1"), ("bar", "2")], two_terms_page);
    session.teardown();

    let doc = session.document();
    let config = HighlighterConfig::default();
    assert!(highlights(doc).is_empty());
    assert!(doc.elements_by_class(&config.tooltip_class).is_empty());
    assert_eq!(doc.hover_listener_count(), 0);
    assert!(!doc.is_observing());
    assert!(!session.is_enabled());
}

#[test]
fn test_flush_prunes_highlights_removed_by_page() {
    let mut session = enabled_session(&[("foo", "1")], two_terms_page);
    let body = session.document().body().unwrap();
    let first = session.document().children(body)[0];
    assert_eq!(session.index().count("foo"), 2);

    session.document_mut().remove(first);
    let p = session.document_mut().append_element(body, "p");
    session.document_mut().append_text(p, "plain");
    settle(&mut session).unwrap();

    assert_eq!(session.index().count("foo"), 1);
    assert_eq!(session.document().hover_listener_count(), 1);
}

#[test]
fn test_refresh_for_unlisted_site_never_touches_page() {
    let mut doc = VirtualDocument::with_url("https://other.org/");
    let body = doc.body().unwrap();
    doc.append_text(body, "foo");
    let mut session = HighlightSession::new(doc, HighlighterConfig::default());

    assert!(session.initialize(&allowlist(&[HOST])).is_none());
    assert!(session.request_refresh().is_none());
    let empty = StorageChanges::new();
    assert!(session.apply_storage_changes(Namespace::Local, &empty).is_none());
    assert_eq!(session.document().markup(body), "<body>foo</body>");
}
