#![forbid(unsafe_code)]

//! Event coalescing policies.
//!
//! The queue asks the *source* of a newly posted event whether it can be
//! merged into an already queued event with the same id. The source decides;
//! [`default_coalesce`] is what a component gets when it does not override.

use crate::component::ComponentId;
use crate::event::{Event, Payload};

/// Merge policy looked up by event source.
pub trait Coalescer: Send + Sync {
    /// Merge `new` into `existing`, or `None` to keep both.
    ///
    /// Only called when both events share an id and a source. Returning
    /// `None` for an unknown source makes that source non-coalescable.
    ///
    /// Runs with the queue lock held. Posts made from here are deferred
    /// until the lock is released; other queue calls block.
    fn coalesce(&self, source: ComponentId, existing: &Event, new: &Event) -> Option<Event>;
}

/// Treats every component source as coalescable with [`default_coalesce`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCoalescer;

impl Coalescer for DefaultCoalescer {
    fn coalesce(&self, _source: ComponentId, existing: &Event, new: &Event) -> Option<Event> {
        default_coalesce(existing, new)
    }
}

/// Built-in merge rules.
///
/// - Mouse motion: the newer event replaces the older one.
/// - Paint / update: one request covering the union of both regions, keeping
///   the older timestamp.
/// - Everything else is left alone.
#[must_use]
pub fn default_coalesce(existing: &Event, new: &Event) -> Option<Event> {
    if existing.id() != new.id() || existing.source() != new.source() {
        return None;
    }
    let id = new.id();
    if id.is_mouse_motion() {
        let data = *new.mouse_data()?;
        return Some(Event::new(id, new.source(), new.when(), Payload::Mouse(data)).with_flags(new.flags()));
    }
    if id.is_paint() {
        let area = existing.paint_area()?.union(&new.paint_area()?);
        return Some(
            Event::new(id, existing.source(), existing.when(), Payload::Paint { area })
                .with_flags(existing.flags()),
        );
    }
    None
}
