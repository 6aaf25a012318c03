#![forbid(unsafe_code)]

//! Keyboard focus management for ftk.
//!
//! # Role in ftk
//! `ftk-focus` keeps one synchronous, queryable focus model (focus owner,
//! permanent focus owner, focused window, active window) consistent with the
//! asynchronous focus notifications the native layer posts into each
//! context's event queue.
//!
//! # Primary responsibilities
//! - **FocusState**: the global slots, vetoable and post-change listeners.
//! - **FocusCoordinator**: the per-context state machine, restore logic,
//!   type-ahead buffering, key dispatch chains, traversal keys.
//! - **FocusSystem**: focus requests, traversal, and component removal
//!   across contexts.
//! - **Policies**: container-order traversal with per-root overrides.
//!
//! # How it fits in the system
//! [`FocusSystem::attach`] installs a [`FocusDispatcher`] on a context's
//! queue, so every event dispatched there passes through the coordinator
//! before it reaches components.

pub mod config;
pub mod coordinator;
pub mod dispatcher;
pub mod keys;
pub mod policy;
pub mod state;
pub mod system;
pub mod type_ahead;

pub use config::FocusConfig;
pub use coordinator::FocusCoordinator;
pub use dispatcher::FocusDispatcher;
pub use keys::{KeyEventDispatcher, KeyEventPostProcessor};
pub use policy::{ContainerOrderPolicy, FocusTraversalPolicy, PolicyRegistry};
pub use state::{FocusListener, FocusSlot, FocusSnapshot, FocusState};
pub use system::FocusSystem;
pub use type_ahead::{TypeAheadBuffer, TypeAheadMarker};
