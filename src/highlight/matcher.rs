//! TermMatcher: literal substring matching of dictionary terms
//!
//! An Aho-Corasick automaton answers "does this text contain any term?" in a
//! single pass; it is the pre-check that prunes whole subtrees before the
//! per-node walk. Splitting a text node is done term by term in dictionary
//! order, so a span claimed by an earlier term is never re-split by a later
//! one.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use log::warn;

/// Piece of a text node after splitting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Plain(&'a str),
    /// Index into [`TermMatcher::terms`]
    Term(usize),
}

/// Candidate terms for one scan
#[derive(Debug, Clone)]
pub struct TermMatcher {
    terms: Vec<String>,
    automaton: Option<AhoCorasick>,
}

impl TermMatcher {
    /// Build a matcher; empty and duplicate terms are dropped, order is kept
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique: Vec<String> = Vec::new();
        for term in terms {
            let term = term.as_ref();
            if !term.is_empty() && !unique.iter().any(|t| t == term) {
                unique.push(term.to_string());
            }
        }

        let automaton = if unique.is_empty() {
            None
        } else {
            AhoCorasickBuilder::new()
                .match_kind(MatchKind::Standard)
                .build(&unique)
                .map_err(|e| warn!("falling back to naive term search: {}", e))
                .ok()
        };

        Self { terms: unique, automaton }
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Whether `haystack` contains at least one term
    pub fn any_match(&self, haystack: &str) -> bool {
        match &self.automaton {
            Some(automaton) => automaton.is_match(haystack),
            None => self.terms.iter().any(|t| haystack.contains(t.as_str())),
        }
    }

    /// Split `text` into plain runs and term occurrences.
    ///
    /// Returns `None` when no term occurs. Empty plain runs are omitted, so
    /// concatenating the segments always reproduces `text`.
    pub fn segment<'a>(&self, text: &'a str) -> Option<Vec<Segment<'a>>> {
        if !self.any_match(text) {
            return None;
        }

        let mut segments = vec![Segment::Plain(text)];
        for (index, term) in self.terms.iter().enumerate() {
            if !text.contains(term.as_str()) {
                continue;
            }
            let mut next = Vec::with_capacity(segments.len());
            for segment in segments {
                match segment {
                    Segment::Plain(run) if run.contains(term.as_str()) => {
                        for (i, part) in run.split(term.as_str()).enumerate() {
                            if i > 0 {
                                next.push(Segment::Term(index));
                            }
                            if !part.is_empty() {
                                next.push(Segment::Plain(part));
                            }
                        }
                    }
                    other => next.push(other),
                }
            }
            segments = next;
        }

        segments
            .iter()
            .any(|s| matches!(s, Segment::Term(_)))
            .then_some(segments)
    }
}
