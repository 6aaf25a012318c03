#![forbid(unsafe_code)]

//! Type-ahead buffering of key events across asynchronous focus changes.
//!
//! # Design
//!
//! A focus request installs a [`TypeAheadMarker`] stamped with the time of
//! the event that caused the request. Key events newer than the oldest
//! marker are held back until the focus change the marker waits for has
//! happened, so keystrokes typed right after a click or a Tab land in the
//! component that receives focus instead of the one losing it.
//!
//! The buffer also tracks outstanding focus requests. When none remain the
//! markers are stale and may be dropped wholesale.
//!
//! ## Invariants
//!
//! 1. Markers are ordered by `after` (ties keep insertion order).
//! 2. Held events are in arrival order, and every held event is newer than
//!    the oldest marker at the time it was held.
//! 3. Removing markers never reorders held events; discarding a component
//!    drops exactly the held events stamped inside the discarded markers'
//!    time spans.

use std::collections::VecDeque;

use ftk_core::component::ComponentId;
use ftk_core::event::{Event, Timestamp};
use tracing::trace;

/// Key events stamped after `after` wait for `until_focused` to gain focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeAheadMarker {
    pub after: Timestamp,
    pub until_focused: ComponentId,
}

/// Pending markers, held key events, and outstanding focus requests.
#[derive(Debug, Default)]
pub struct TypeAheadBuffer {
    markers: VecDeque<TypeAheadMarker>,
    events: VecDeque<Event>,
    requests: Vec<ComponentId>,
}

impl TypeAheadBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn markers(&self) -> Vec<TypeAheadMarker> {
        self.markers.iter().copied().collect()
    }

    #[must_use]
    pub fn held_len(&self) -> usize {
        self.events.len()
    }

    /// Timestamps of held events, oldest first.
    #[must_use]
    pub fn held_times(&self) -> Vec<Timestamp> {
        self.events.iter().map(Event::when).collect()
    }

    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.len()
    }

    /// Time of the oldest marker.
    #[must_use]
    pub fn first_marker_time(&self) -> Option<Timestamp> {
        self.markers.front().map(|m| m.after)
    }

    /// Install a marker after the last one stamped at or before `after`, and
    /// register a focus request for `until_focused`.
    pub fn enqueue(&mut self, after: Timestamp, until_focused: ComponentId) {
        let pos = self
            .markers
            .iter()
            .rposition(|m| m.after <= after)
            .map_or(0, |i| i + 1);
        self.markers.insert(
            pos,
            TypeAheadMarker {
                after,
                until_focused,
            },
        );
        self.requests.push(until_focused);
        trace!(after, target = %until_focused, pos, "type-ahead marker added");
    }

    /// Remove one marker for `until_focused`: with `None` (or a negative
    /// time) the oldest one for that component, otherwise the exact pair.
    /// Also retires one outstanding request for it.
    pub fn dequeue(&mut self, after: Option<Timestamp>, until_focused: ComponentId) -> bool {
        let pos = match after.filter(|t| *t >= 0) {
            None => self.markers.iter().position(|m| m.until_focused == until_focused),
            Some(after) => self
                .markers
                .iter()
                .rposition(|m| m.until_focused == until_focused && m.after == after),
        };
        self.complete_request(until_focused);
        match pos {
            Some(pos) => {
                self.markers.remove(pos);
                trace!(?after, target = %until_focused, "type-ahead marker removed");
                true
            }
            None => false,
        }
    }

    /// Retire the oldest outstanding request for `target`.
    pub fn complete_request(&mut self, target: ComponentId) -> bool {
        match self.requests.iter().position(|r| *r == target) {
            Some(pos) => {
                self.requests.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Forget every outstanding request.
    pub fn clear_requests(&mut self) {
        self.requests.clear();
    }

    pub fn clear_markers(&mut self) {
        self.markers.clear();
    }

    /// Drop every marker whose target satisfies `matches`, along with the
    /// held events stamped inside each run of dropped markers. Requests for
    /// matching targets are retired too. Returns how many markers went.
    pub fn discard(&mut self, matches: impl Fn(ComponentId) -> bool) -> usize {
        let mut removed = 0;
        let mut start: Option<Timestamp> = None;
        let mut kept = VecDeque::with_capacity(self.markers.len());
        for marker in std::mem::take(&mut self.markers) {
            if matches(marker.until_focused) {
                removed += 1;
                if start.is_none() {
                    start = Some(marker.after);
                }
            } else {
                if let Some(s) = start.take() {
                    self.purge(s, Some(marker.after));
                }
                kept.push_back(marker);
            }
        }
        self.markers = kept;
        if let Some(s) = start {
            self.purge(s, None);
        }
        self.requests.retain(|r| !matches(*r));
        if removed > 0 {
            trace!(removed, "type-ahead markers discarded");
        }
        removed
    }

    /// Drop held events with `start < when <= end` (no `end`: to the tail).
    fn purge(&mut self, start: Timestamp, end: Option<Timestamp>) {
        let before = self.events.len();
        self.events
            .retain(|e| !(e.when() > start && end.is_none_or(|end| e.when() <= end)));
        trace!(start, ?end, purged = before - self.events.len(), "held key events purged");
    }

    /// A FOCUS_GAINED for `target` was accepted: drop its oldest marker and
    /// any markers for it that immediately follow, retiring one request per
    /// dropped marker (at least one).
    pub fn focus_gained(&mut self, target: ComponentId) -> usize {
        let removed = match self.markers.iter().position(|m| m.until_focused == target) {
            Some(first) => {
                let mut end = first;
                while end < self.markers.len() && self.markers[end].until_focused == target {
                    end += 1;
                }
                self.markers.drain(first..end);
                end - first
            }
            None => 0,
        };
        for _ in 0..removed.max(1) {
            self.complete_request(target);
        }
        removed
    }

    /// Hold `event` if it is newer than the oldest marker, otherwise hand it
    /// back for immediate dispatch.
    pub fn hold_or_release(&mut self, event: Event) -> Option<Event> {
        match self.first_marker_time() {
            Some(first) if event.when() > first => {
                trace!(when = event.when(), first, "key event held");
                self.events.push_back(event);
                None
            }
            _ => Some(event),
        }
    }

    /// Next held event that may now be dispatched: one no newer than the
    /// oldest marker, or any once no markers remain.
    pub fn pop_approved(&mut self) -> Option<Event> {
        let first = self.events.front()?;
        if self.first_marker_time().is_none_or(|t| first.when() <= t) {
            self.events.pop_front()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ftk_core::event::{EventId, KeyData};
    use ftk_core::keystroke::{KeyCode, Modifiers};

    fn c(n: u64) -> ComponentId {
        ComponentId::new(n)
    }

    fn key(when: Timestamp) -> Event {
        Event::key(
            EventId::KeyPressed,
            c(99),
            when,
            KeyData::new(KeyCode::Char('x'), Some('x'), Modifiers::empty()),
        )
    }

    fn after_times(buf: &TypeAheadBuffer) -> Vec<(Timestamp, u64)> {
        buf.markers()
            .into_iter()
            .map(|m| (m.after, m.until_focused.get()))
            .collect()
    }

    #[test]
    fn enqueue_keeps_time_order_and_insertion_ties() {
        let mut buf = TypeAheadBuffer::new();
        buf.enqueue(20, c(1));
        buf.enqueue(10, c(2));
        buf.enqueue(20, c(3));
        buf.enqueue(5, c(4));
        assert_eq!(after_times(&buf), vec![(5, 4), (10, 2), (20, 1), (20, 3)]);
        assert_eq!(buf.request_count(), 4);
    }

    #[test]
    fn markers_partition_key_events() {
        let mut buf = TypeAheadBuffer::new();
        buf.enqueue(100, c(1));
        assert!(buf.hold_or_release(key(90)).is_some());
        assert!(buf.hold_or_release(key(100)).is_some());
        assert!(buf.hold_or_release(key(101)).is_none());
        assert!(buf.hold_or_release(key(150)).is_none());
        assert!(buf.pop_approved().is_none());

        assert_eq!(buf.focus_gained(c(1)), 1);
        assert_eq!(buf.pop_approved().map(|e| e.when()), Some(101));
        assert_eq!(buf.pop_approved().map(|e| e.when()), Some(150));
        assert!(buf.pop_approved().is_none());
    }

    #[test]
    fn focus_gained_takes_consecutive_markers_only() {
        let mut buf = TypeAheadBuffer::new();
        buf.enqueue(1, c(1));
        buf.enqueue(2, c(1));
        buf.enqueue(3, c(2));
        buf.enqueue(4, c(1));
        assert_eq!(buf.focus_gained(c(1)), 2);
        assert_eq!(after_times(&buf), vec![(3, 2), (4, 1)]);
        assert_eq!(buf.focus_gained(c(7)), 0);
    }

    #[test]
    fn dequeue_any_versus_exact() {
        let mut buf = TypeAheadBuffer::new();
        buf.enqueue(1, c(1));
        buf.enqueue(2, c(1));
        assert!(buf.dequeue(Some(2), c(1)));
        assert_eq!(after_times(&buf), vec![(1, 1)]);
        assert!(!buf.dequeue(Some(5), c(1)));
        assert!(buf.dequeue(Some(-1), c(1)));
        assert!(buf.markers().is_empty());
        assert_eq!(buf.request_count(), 0);
    }

    #[test]
    fn discard_purges_only_spanned_events() {
        let mut buf = TypeAheadBuffer::new();
        buf.enqueue(10, c(1));
        buf.enqueue(20, c(2));
        buf.enqueue(30, c(1));
        for t in [15, 25, 35] {
            assert!(buf.hold_or_release(key(t)).is_none());
        }
        assert_eq!(buf.discard(|t| t == c(1)), 2);
        // (10, 20] and (30, end) are purged; 25 survives.
        assert_eq!(buf.held_times(), vec![25]);
        assert_eq!(after_times(&buf), vec![(20, 2)]);
        assert_eq!(buf.request_count(), 1);
    }

    #[test]
    fn discard_with_no_match_is_noop() {
        let mut buf = TypeAheadBuffer::new();
        buf.enqueue(10, c(1));
        assert!(buf.hold_or_release(key(11)).is_none());
        assert_eq!(buf.discard(|t| t == c(5)), 0);
        assert_eq!(buf.held_len(), 1);
        assert_eq!(buf.markers().len(), 1);
    }
}
