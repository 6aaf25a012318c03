#![forbid(unsafe_code)]

//! ftk: the core of a windowing toolkit.
//!
//! # Role
//! This crate ties the workspace together: [`Toolkit`] builds a component
//! tree, GUI contexts with priority event queues, and the keyboard focus
//! manager that reconciles asynchronous native focus notifications with a
//! synchronous focus model.
//!
//! # Example
//!
//! ```
//! use ftk::{ComponentSpec, DispatchMode, Event, EventId, Toolkit, now_millis};
//!
//! let kit = Toolkit::builder().with_dispatch_mode(DispatchMode::Manual).build();
//! let ctx = kit.create_context();
//! let frame = kit.tree().insert(ComponentSpec::frame(ctx.id()));
//! let field = kit.tree().insert(ComponentSpec::leaf(frame));
//!
//! kit.post_event(Event::window(EventId::WindowGainedFocus, frame, None, now_millis()));
//! kit.flush(&ctx).unwrap();
//! assert_eq!(kit.focus().state().focus_owner(), Some(field));
//! ```

pub mod toolkit;

pub use toolkit::{Toolkit, ToolkitBuilder};

pub use ftk_core::component::{
    ComponentId, ComponentKind, ComponentPeer, ComponentSpec, ComponentTree, ContextId,
    TraversalHint, TraversalKind,
};
pub use ftk_core::event::{Event, EventId, KeyData, Timestamp, now_millis};
pub use ftk_core::geometry::{Insets, Point, Rect, Size};
pub use ftk_core::keystroke::{KeyCode, KeyStroke, Modifiers};
pub use ftk_core::logging;

pub use ftk_focus::{
    ContainerOrderPolicy, FocusConfig, FocusCoordinator, FocusListener, FocusSlot, FocusSnapshot,
    FocusState, FocusSystem, FocusTraversalPolicy, KeyEventDispatcher, KeyEventPostProcessor,
    PolicyRegistry,
};
pub use ftk_layout::{
    Anchor, Fill, GridBagConstraints, GridBagLayout, LayoutChild, LayoutError, LayoutItem,
    RELATIVE, REMAINDER,
};
pub use ftk_runtime::{
    AppContext, ContextRegistry, DispatchMode, EventQueue, InvokeError, QueueError, RuntimeConfig,
    send_message,
};

/// Crates re-exported whole for less common items.
pub use ftk_focus as focus;
pub use ftk_layout as layout;
pub use ftk_runtime as runtime;
