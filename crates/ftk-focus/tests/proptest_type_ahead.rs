//! Property-based invariant tests for the type-ahead buffer.
//!
//! 1. Markers stay ordered by time whatever order requests arrive in.
//! 2. A key event is released immediately iff no marker is older than it.
//! 3. Once every marker has been satisfied, held events come out in
//!    arrival order and none are lost.
//! 4. Discarding keeps the relative order of surviving held events and
//!    never touches events stamped before the first discarded marker.
//! 5. Discarding removes every marker for the discarded targets and no
//!    other.

use ftk_core::component::ComponentId;
use ftk_core::event::{Event, EventId, KeyData, Timestamp};
use ftk_core::keystroke::{KeyCode, Modifiers};
use ftk_focus::TypeAheadBuffer;
use proptest::prelude::*;

// ── Helpers ───────────────────────────────────────────────────────────

fn key(when: Timestamp) -> Event {
    Event::key(
        EventId::KeyPressed,
        ComponentId::new(0),
        when,
        KeyData::new(KeyCode::Char('k'), Some('k'), Modifiers::empty()),
    )
}

fn arb_requests() -> impl Strategy<Value = Vec<(Timestamp, u64)>> {
    prop::collection::vec((0i64..1_000, 1u64..6), 1..12)
}

fn arb_key_times() -> impl Strategy<Value = Vec<Timestamp>> {
    prop::collection::vec(0i64..1_200, 0..24)
}

fn is_sorted(times: &[Timestamp]) -> bool {
    times.windows(2).all(|w| w[0] <= w[1])
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Marker ordering
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn markers_sorted_by_time(requests in arb_requests()) {
        let mut buf = TypeAheadBuffer::new();
        for (t, c) in &requests {
            buf.enqueue(*t, ComponentId::new(*c));
        }
        let times: Vec<_> = buf.markers().iter().map(|m| m.after).collect();
        prop_assert!(is_sorted(&times), "unsorted markers {:?}", times);
        prop_assert_eq!(buf.request_count(), requests.len());
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2–3. Partition and release
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn release_partition_and_order(requests in arb_requests(), keys in arb_key_times()) {
        let mut buf = TypeAheadBuffer::new();
        for (t, c) in &requests {
            buf.enqueue(*t, ComponentId::new(*c));
        }
        let first = buf.first_marker_time().unwrap_or(Timestamp::MAX);
        let mut held = Vec::new();
        for t in &keys {
            let released = buf.hold_or_release(key(*t)).is_some();
            prop_assert_eq!(released, *t <= first, "key at {} vs marker {}", t, first);
            if !released {
                held.push(*t);
            }
        }

        while let Some(marker) = buf.markers().first().copied() {
            prop_assert!(buf.focus_gained(marker.until_focused) >= 1);
        }
        let mut out = Vec::new();
        while let Some(e) = buf.pop_approved() {
            out.push(e.when());
        }
        prop_assert_eq!(out, held);
        prop_assert_eq!(buf.request_count(), 0);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4–5. Discard
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn discard_preserves_order_and_prefix(
        requests in arb_requests(),
        keys in arb_key_times(),
        victim in 1u64..6,
    ) {
        let mut buf = TypeAheadBuffer::new();
        for (t, c) in &requests {
            buf.enqueue(*t, ComponentId::new(*c));
        }
        for t in &keys {
            let _ = buf.hold_or_release(key(*t));
        }
        let before = buf.held_times();
        let victim = ComponentId::new(victim);
        let first_victim = buf
            .markers()
            .iter()
            .find(|m| m.until_focused == victim)
            .map(|m| m.after);
        let expected_markers: Vec<_> = buf
            .markers()
            .into_iter()
            .filter(|m| m.until_focused != victim)
            .collect();

        buf.discard(|c| c == victim);
        let after = buf.held_times();

        let mut it = before.iter();
        for t in &after {
            prop_assert!(it.any(|b| b == t), "order broken: {:?} -> {:?}", before, after);
        }
        if let Some(cut) = first_victim {
            let kept_prefix = before.iter().filter(|t| **t <= cut).count();
            let now_prefix = after.iter().filter(|t| **t <= cut).count();
            prop_assert_eq!(kept_prefix, now_prefix);
        } else {
            prop_assert_eq!(&before, &after);
        }
        prop_assert_eq!(buf.markers(), expected_markers);
    }
}
