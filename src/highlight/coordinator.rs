//! Mutation Coordinator: debounced, self-suppressing page observation
//!
//! # State machine
//! `Idle → Observing → Debouncing → (timer) → Observing`, plus `Suspended`
//! while the engine itself is writing to the page.
//!
//! The host owns the actual timer. Every mutation batch re-arms it by
//! returning a fresh [`TimerRequest`]; a firing whose token is no longer
//! current is ignored, which is how resets and cancellation work.
//!
//! Self-inflicted writes are never observed: all of them go through a
//! [`Suspended`] guard that disconnects the observer on creation and
//! reconnects it on drop, including early returns.

use std::collections::HashSet;
use std::ops::{Deref, DerefMut};

use indexmap::IndexSet;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::dom::{Document, MutationRecord, NodeId};

/// Identifies one arming of the debounce timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimerToken(pub u64);

/// Ask the host to fire `token` after `delay_ms`, replacing any earlier timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerRequest {
    pub token: TimerToken,
    pub delay_ms: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// Not observing
    Idle,
    Observing,
    /// Mutations pending, timer armed with this token
    Debouncing(TimerToken),
    /// Engine is writing; observer disconnected
    Suspended,
}

#[derive(Debug)]
pub struct MutationCoordinator {
    state: CoordinatorState,
    pending: IndexSet<NodeId>,
    delay_ms: u32,
    next_token: u64,
}

impl MutationCoordinator {
    pub fn new(delay_ms: u32) -> Self {
        Self {
            state: CoordinatorState::Idle,
            pending: IndexSet::new(),
            delay_ms,
            next_token: 0,
        }
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state != CoordinatorState::Idle
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Begin observing (no-op unless idle)
    pub fn start<D: Document + ?Sized>(&mut self, doc: &mut D) {
        if self.state == CoordinatorState::Idle {
            doc.observe();
            self.state = CoordinatorState::Observing;
        }
    }

    /// Stop observing and abandon any pending rescan
    pub fn stop<D: Document + ?Sized>(&mut self, doc: &mut D) {
        doc.disconnect();
        self.drop_pending(doc);
        self.state = CoordinatorState::Idle;
    }

    /// Accumulate a batch of records and re-arm the timer.
    ///
    /// Pending nodes are retained until the flush hands them over. Returns
    /// `None` when not observing (late delivery after a disconnect).
    pub fn on_mutations<D: Document + ?Sized>(
        &mut self,
        doc: &mut D,
        records: &[MutationRecord],
    ) -> Option<TimerRequest> {
        match self.state {
            CoordinatorState::Observing | CoordinatorState::Debouncing(_) => {}
            CoordinatorState::Idle | CoordinatorState::Suspended => {
                debug!("ignoring {} mutation records while {:?}", records.len(), self.state);
                for record in records {
                    record.added.iter().for_each(|&node| doc.release(node));
                }
                return None;
            }
        }

        for record in records {
            for &node in &record.added {
                if self.pending.insert(node) {
                    doc.retain(node);
                } else {
                    doc.release(node);
                }
            }
        }
        self.next_token += 1;
        let token = TimerToken(self.next_token);
        self.state = CoordinatorState::Debouncing(token);
        Some(TimerRequest {
            token,
            delay_ms: self.delay_ms,
        })
    }

    /// Timer fired: hand over the pending nodes if `token` is still current
    pub fn on_timer(&mut self, token: TimerToken) -> Option<Vec<NodeId>> {
        if self.state != CoordinatorState::Debouncing(token) {
            debug!("stale debounce timer {:?}", token);
            return None;
        }
        self.state = CoordinatorState::Observing;
        Some(self.pending.drain(..).collect())
    }

    fn drop_pending<D: Document + ?Sized>(&mut self, doc: &mut D) {
        for node in self.pending.drain(..) {
            doc.forget(node);
        }
    }

    /// Disconnect for the lifetime of the returned guard
    pub fn suspend<'a, D: Document + ?Sized>(&'a mut self, doc: &'a mut D) -> Suspended<'a, D> {
        let resume_to = self.state;
        if resume_to != CoordinatorState::Idle {
            doc.disconnect();
            self.state = CoordinatorState::Suspended;
        }
        Suspended {
            doc,
            coordinator: self,
            resume_to,
            teardown: false,
        }
    }
}

// =============================================================================
// Suspension guard
// =============================================================================

/// Scoped "observation off" window; derefs to the document being written
pub struct Suspended<'a, D: Document + ?Sized> {
    doc: &'a mut D,
    coordinator: &'a mut MutationCoordinator,
    resume_to: CoordinatorState,
    teardown: bool,
}

impl<D: Document + ?Sized> Suspended<'_, D> {
    /// End the window without reconnecting (page is being disabled)
    pub fn stay_disconnected(mut self) {
        self.teardown = true;
    }

    /// Fold `nodes` into the armed rescan, retaining them.
    ///
    /// Used when the engine's own writes merged pending nodes away. Without
    /// an armed timer the handles are just released.
    pub fn add_pending(&mut self, nodes: &[NodeId]) {
        let armed = matches!(self.resume_to, CoordinatorState::Debouncing(_));
        for &node in nodes {
            if armed && self.coordinator.pending.insert(node) {
                self.doc.retain(node);
            } else {
                self.doc.release(node);
            }
        }
    }
}

impl<D: Document + ?Sized> Deref for Suspended<'_, D> {
    type Target = D;

    fn deref(&self) -> &D {
        self.doc
    }
}

impl<D: Document + ?Sized> DerefMut for Suspended<'_, D> {
    fn deref_mut(&mut self) -> &mut D {
        self.doc
    }
}

impl<D: Document + ?Sized> Drop for Suspended<'_, D> {
    fn drop(&mut self) {
        if self.teardown {
            self.coordinator.drop_pending(&mut *self.doc);
            self.coordinator.state = CoordinatorState::Idle;
            return;
        }
        if self.resume_to != CoordinatorState::Idle {
            self.doc.observe();
        }
        self.coordinator.state = self.resume_to;
    }
}

/// Minimal set of roots to rescan for a batch of added nodes.
///
/// The body collapses everything to a single full rescan. Otherwise nodes
/// that were detached again before the timer fired are dropped, as are nodes
/// already covered by another pending ancestor. Dropped nodes are forgotten;
/// the caller forgets the returned roots once it is done with them.
pub fn affected_roots<D: Document + ?Sized>(doc: &mut D, pending: Vec<NodeId>) -> Vec<NodeId> {
    let body = doc.body();
    if let Some(body) = body.filter(|b| pending.contains(b)) {
        for node in pending.into_iter().filter(|&n| n != body) {
            doc.forget(node);
        }
        return vec![body];
    }

    let (connected, detached): (Vec<NodeId>, Vec<NodeId>) =
        pending.into_iter().partition(|&n| doc.is_connected(n));
    for node in detached {
        doc.forget(node);
    }

    let set: HashSet<NodeId> = connected.iter().copied().collect();
    let mut roots = Vec::with_capacity(connected.len());
    for node in connected {
        let mut ancestor = doc.parent(node);
        let mut covered = false;
        while let Some(a) = ancestor {
            if set.contains(&a) {
                covered = true;
                break;
            }
            ancestor = doc.parent(a);
        }
        if covered {
            doc.forget(node);
        } else {
            roots.push(node);
        }
    }
    roots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::VirtualDocument;

    fn added(nodes: &[NodeId]) -> MutationRecord {
        MutationRecord {
            target: None,
            added: nodes.to_vec(),
            removed: vec![],
        }
    }

    #[test]
    fn test_idle_coordinator_ignores_mutations() {
        let mut doc = VirtualDocument::new();
        let mut coordinator = MutationCoordinator::new(300);
        assert!(coordinator.on_mutations(&mut doc, &[added(&[NodeId(5)])]).is_none());
        assert_eq!(coordinator.pending_len(), 0);
    }

    #[test]
    fn test_each_batch_rearms_and_only_last_token_fires() {
        let mut doc = VirtualDocument::new();
        let mut coordinator = MutationCoordinator::new(300);
        coordinator.start(&mut doc);

        let first = coordinator.on_mutations(&mut doc, &[added(&[NodeId(10)])]).unwrap();
        let second = coordinator.on_mutations(&mut doc, &[added(&[NodeId(11)])]).unwrap();
        assert_ne!(first.token, second.token);
        assert_eq!(second.delay_ms, 300);

        assert!(coordinator.on_timer(first.token).is_none());
        assert_eq!(coordinator.on_timer(second.token), Some(vec![NodeId(10), NodeId(11)]));
        assert_eq!(coordinator.state(), CoordinatorState::Observing);
        assert!(coordinator.on_timer(second.token).is_none());
    }

    #[test]
    fn test_stop_cancels_pending_timer() {
        let mut doc = VirtualDocument::new();
        let mut coordinator = MutationCoordinator::new(300);
        coordinator.start(&mut doc);
        let request = coordinator.on_mutations(&mut doc, &[added(&[NodeId(10)])]).unwrap();

        coordinator.stop(&mut doc);
        assert!(coordinator.on_timer(request.token).is_none());
        assert!(!doc.is_observing());
        assert_eq!(coordinator.pending_len(), 0);
    }

    #[test]
    fn test_guard_disconnects_and_restores_state() {
        let mut doc = VirtualDocument::new();
        let body = doc.body().unwrap();
        let mut coordinator = MutationCoordinator::new(300);
        coordinator.start(&mut doc);
        let request = coordinator.on_mutations(&mut doc, &[added(&[body])]).unwrap();

        {
            let mut guard = coordinator.suspend(&mut doc);
            assert!(!guard.is_observing());
            guard.append_element(body, "p");
        }
        assert!(doc.is_observing());
        assert!(doc.take_records().is_empty());
        // The armed timer survives a suspension window
        assert_eq!(coordinator.on_timer(request.token), Some(vec![body]));
    }

    #[test]
    fn test_guard_on_idle_coordinator_stays_idle() {
        let mut doc = VirtualDocument::new();
        let mut coordinator = MutationCoordinator::new(300);
        drop(coordinator.suspend(&mut doc));
        assert!(!doc.is_observing());
        assert_eq!(coordinator.state(), CoordinatorState::Idle);
    }

    #[test]
    fn test_stay_disconnected_ends_idle() {
        let mut doc = VirtualDocument::new();
        let mut coordinator = MutationCoordinator::new(300);
        coordinator.start(&mut doc);
        coordinator.on_mutations(&mut doc, &[added(&[NodeId(4)])]);

        coordinator.suspend(&mut doc).stay_disconnected();
        assert!(!doc.is_observing());
        assert_eq!(coordinator.state(), CoordinatorState::Idle);
        assert_eq!(coordinator.pending_len(), 0);
    }

    #[test]
    fn test_affected_roots_collapse_to_body() {
        let mut doc = VirtualDocument::new();
        let body = doc.body().unwrap();
        let p = doc.append_element(body, "p");
        assert_eq!(affected_roots(&mut doc, vec![p, body]), vec![body]);
    }

    #[test]
    fn test_affected_roots_drop_detached_and_covered() {
        let mut doc = VirtualDocument::new();
        let body = doc.body().unwrap();
        let outer = doc.append_element(body, "div");
        let inner = doc.append_element(outer, "p");
        let text = doc.append_text(inner, "x");
        let gone = doc.append_element(body, "div");
        let other = doc.append_element(body, "section");
        doc.remove(gone);

        let roots = affected_roots(&mut doc, vec![text, gone, outer, other, inner]);
        assert_eq!(roots, vec![outer, other]);
    }
}
