#![forbid(unsafe_code)]

//! Core: geometry, events, key strokes, and the component registry.
//!
//! # Role in ftk
//! `ftk-core` holds the vocabulary every other crate speaks. The runtime
//! (`ftk-runtime`) queues and dispatches [`event::Event`] values, the focus
//! manager (`ftk-focus`) walks the [`component::ComponentTree`], and the
//! layout engine (`ftk-layout`) works in [`geometry`] units.
//!
//! # Primary responsibilities
//! - **Event**: tagged event records, payloads, and self-dispatching events.
//! - **Coalescing**: default merge rules for mouse motion and paint requests.
//! - **ComponentTree**: ids, hierarchy, focus flags, traversal keys, peers.
//! - **KeyStroke**: comparable key actions for traversal key sets.

pub mod coalesce;
pub mod component;
pub mod event;
pub mod geometry;
pub mod keystroke;
pub mod logging;

// Re-export tracing macros at crate root for ergonomic use.
#[cfg(feature = "tracing")]
pub use logging::{
    debug, debug_span, error, error_span, info, info_span, trace, trace_span, warn, warn_span,
};

pub use component::{ComponentId, ContextId};
pub use event::{Event, EventId, Timestamp};
