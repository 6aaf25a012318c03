#![forbid(unsafe_code)]

//! Canonical event type consumed by queues, dispatchers, and the focus
//! manager.
//!
//! # Design
//!
//! An [`Event`] is a tagged record: an [`EventId`] naming the kind, an
//! optional source component, a millisecond timestamp, a consumed flag, lane
//! hints, and a kind-specific [`Payload`]. Events that carry their own
//! behaviour (invocations, synchronous sends) hold a boxed [`ActiveEvent`]
//! and are therefore not `Clone`.
//!
//! ## Invariants
//! 1. Once [`Event::consume`] has been called the event is never handed to
//!    default processing again; listeners may still have observed it.
//! 2. `id` never changes after construction. Retargeting only changes
//!    `source` (and, for focus events, the opposite component).

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use bitflags::bitflags;

use crate::component::ComponentId;
use crate::geometry::{Point, Rect};
use crate::keystroke::{KeyCode, Modifiers};

/// Event time in milliseconds since the Unix epoch.
pub type Timestamp = i64;

/// Current wall-clock time as an event timestamp.
#[must_use]
pub fn now_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Timestamp)
        .unwrap_or_default()
}

/// Event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventId {
    FocusGained,
    FocusLost,
    WindowOpened,
    WindowClosing,
    WindowClosed,
    WindowActivated,
    WindowDeactivated,
    WindowGainedFocus,
    WindowLostFocus,
    KeyPressed,
    KeyReleased,
    KeyTyped,
    MousePressed,
    MouseReleased,
    MouseClicked,
    MouseMoved,
    MouseDragged,
    MouseEntered,
    MouseExited,
    Paint,
    Update,
    /// A runnable posted through the queue.
    Invocation,
    /// A synchronous cross-context send (or its wake-up notice).
    Sent,
    /// A runnable posted on behalf of the native layer; lane chosen by flags.
    Peer,
    /// Application-defined component event.
    Component(u32),
}

impl EventId {
    #[inline]
    #[must_use]
    pub const fn is_key(self) -> bool {
        matches!(self, Self::KeyPressed | Self::KeyReleased | Self::KeyTyped)
    }

    #[inline]
    #[must_use]
    pub const fn is_mouse(self) -> bool {
        matches!(
            self,
            Self::MousePressed
                | Self::MouseReleased
                | Self::MouseClicked
                | Self::MouseMoved
                | Self::MouseDragged
                | Self::MouseEntered
                | Self::MouseExited
        )
    }

    /// Keyboard or mouse input.
    #[inline]
    #[must_use]
    pub const fn is_input(self) -> bool {
        self.is_key() || self.is_mouse()
    }

    #[inline]
    #[must_use]
    pub const fn is_focus(self) -> bool {
        matches!(self, Self::FocusGained | Self::FocusLost)
    }

    /// Window events that the focus manager owns.
    #[inline]
    #[must_use]
    pub const fn is_window_focus(self) -> bool {
        matches!(
            self,
            Self::WindowActivated
                | Self::WindowDeactivated
                | Self::WindowGainedFocus
                | Self::WindowLostFocus
        )
    }

    #[inline]
    #[must_use]
    pub const fn is_window(self) -> bool {
        self.is_window_focus()
            || matches!(
                self,
                Self::WindowOpened | Self::WindowClosing | Self::WindowClosed
            )
    }

    #[inline]
    #[must_use]
    pub const fn is_paint(self) -> bool {
        matches!(self, Self::Paint | Self::Update)
    }

    /// Mouse motion that may be merged with an earlier motion event.
    #[inline]
    #[must_use]
    pub const fn is_mouse_motion(self) -> bool {
        matches!(self, Self::MouseMoved | Self::MouseDragged)
    }
}

bitflags! {
    /// Lane hints carried by an event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EventFlags: u8 {
        /// Route to the high-priority lane.
        const HIGH_PRIORITY = 0b01;
        /// Route to the low-priority lane.
        const LOW_PRIORITY  = 0b10;
    }
}

/// Key event data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyData {
    pub key_code: KeyCode,
    pub key_char: Option<char>,
    pub modifiers: Modifiers,
}

impl KeyData {
    #[must_use]
    pub const fn new(key_code: KeyCode, key_char: Option<char>, modifiers: Modifiers) -> Self {
        Self {
            key_code,
            key_char,
            modifiers,
        }
    }
}

/// Mouse event data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MouseData {
    pub position: Point,
    pub button: u8,
    pub click_count: u32,
    pub modifiers: Modifiers,
}

/// Behaviour attached to self-dispatching events.
///
/// The dispatcher passed in is the one of the context running the event, so
/// an active event that wraps another event can deliver it the same way the
/// dispatch loop would.
pub trait ActiveEvent: Send {
    fn dispatch(self: Box<Self>, dispatcher: &dyn EventDispatcher);
}

/// Routes a dequeued event to its target.
pub trait EventDispatcher: Send + Sync {
    fn dispatch_event(&self, event: Event);

    /// Deliver an event carried by a synchronous send. Dispatchers that track
    /// nested sends override this.
    fn dispatch_sent(&self, event: Event) {
        self.dispatch_event(event);
    }
}

/// Kind-specific event data.
pub enum Payload {
    None,
    Key(KeyData),
    Mouse(MouseData),
    Focus {
        opposite: Option<ComponentId>,
        temporary: bool,
    },
    Window {
        opposite: Option<ComponentId>,
    },
    Paint {
        area: Rect,
    },
    /// Taken (left as `None`) when the event is dispatched.
    Active(Option<Box<dyn ActiveEvent>>),
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Key(k) => f.debug_tuple("Key").field(k).finish(),
            Self::Mouse(m) => f.debug_tuple("Mouse").field(m).finish(),
            Self::Focus {
                opposite,
                temporary,
            } => f
                .debug_struct("Focus")
                .field("opposite", opposite)
                .field("temporary", temporary)
                .finish(),
            Self::Window { opposite } => f
                .debug_struct("Window")
                .field("opposite", opposite)
                .finish(),
            Self::Paint { area } => f.debug_struct("Paint").field("area", area).finish(),
            Self::Active(a) => write!(f, "Active({})", if a.is_some() { "..." } else { "taken" }),
        }
    }
}

/// A queued or dispatched event.
#[derive(Debug)]
pub struct Event {
    id: EventId,
    source: Option<ComponentId>,
    when: Timestamp,
    consumed: bool,
    flags: EventFlags,
    payload: Payload,
}

impl Event {
    /// Create an event from its parts.
    #[must_use]
    pub fn new(id: EventId, source: Option<ComponentId>, when: Timestamp, payload: Payload) -> Self {
        Self {
            id,
            source,
            when,
            consumed: false,
            flags: EventFlags::empty(),
            payload,
        }
    }

    /// Key pressed/released/typed event.
    #[must_use]
    pub fn key(id: EventId, source: ComponentId, when: Timestamp, data: KeyData) -> Self {
        debug_assert!(id.is_key());
        Self::new(id, Some(source), when, Payload::Key(data))
    }

    #[must_use]
    pub fn mouse(id: EventId, source: ComponentId, when: Timestamp, data: MouseData) -> Self {
        debug_assert!(id.is_mouse());
        Self::new(id, Some(source), when, Payload::Mouse(data))
    }

    #[must_use]
    pub fn focus_gained(
        source: ComponentId,
        opposite: Option<ComponentId>,
        temporary: bool,
        when: Timestamp,
    ) -> Self {
        Self::new(
            EventId::FocusGained,
            Some(source),
            when,
            Payload::Focus {
                opposite,
                temporary,
            },
        )
    }

    #[must_use]
    pub fn focus_lost(
        source: ComponentId,
        opposite: Option<ComponentId>,
        temporary: bool,
        when: Timestamp,
    ) -> Self {
        Self::new(
            EventId::FocusLost,
            Some(source),
            when,
            Payload::Focus {
                opposite,
                temporary,
            },
        )
    }

    /// Window event; `opposite` is the other window involved, if any.
    #[must_use]
    pub fn window(
        id: EventId,
        window: ComponentId,
        opposite: Option<ComponentId>,
        when: Timestamp,
    ) -> Self {
        debug_assert!(id.is_window());
        Self::new(id, Some(window), when, Payload::Window { opposite })
    }

    /// Paint or update request for `area` of `source`.
    #[must_use]
    pub fn paint(id: EventId, source: ComponentId, area: Rect, when: Timestamp) -> Self {
        debug_assert!(id.is_paint());
        Self::new(id, Some(source), when, Payload::Paint { area })
    }

    /// Self-dispatching event.
    #[must_use]
    pub fn active(id: EventId, when: Timestamp, action: Box<dyn ActiveEvent>) -> Self {
        Self::new(id, None, when, Payload::Active(Some(action)))
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> EventId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn source(&self) -> Option<ComponentId> {
        self.source
    }

    /// Retarget the event.
    pub fn set_source(&mut self, source: Option<ComponentId>) {
        self.source = source;
    }

    #[inline]
    #[must_use]
    pub fn when(&self) -> Timestamp {
        self.when
    }

    #[inline]
    #[must_use]
    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    /// Mark the event as handled. Irreversible.
    pub fn consume(&mut self) {
        self.consumed = true;
    }

    #[inline]
    #[must_use]
    pub fn flags(&self) -> EventFlags {
        self.flags
    }

    #[must_use]
    pub fn with_flags(mut self, flags: EventFlags) -> Self {
        self.flags = flags;
        self
    }

    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut Payload {
        &mut self.payload
    }

    /// Whether this event carries its own dispatch behaviour.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self.payload, Payload::Active(_))
    }

    /// Remove the active behaviour, leaving the event inert.
    pub fn take_active(&mut self) -> Option<Box<dyn ActiveEvent>> {
        match &mut self.payload {
            Payload::Active(slot) => slot.take(),
            _ => None,
        }
    }

    #[must_use]
    pub fn key_data(&self) -> Option<&KeyData> {
        match &self.payload {
            Payload::Key(k) => Some(k),
            _ => None,
        }
    }

    #[must_use]
    pub fn mouse_data(&self) -> Option<&MouseData> {
        match &self.payload {
            Payload::Mouse(m) => Some(m),
            _ => None,
        }
    }

    /// The other component (focus events) or window (window events).
    #[must_use]
    pub fn opposite(&self) -> Option<ComponentId> {
        match &self.payload {
            Payload::Focus { opposite, .. } | Payload::Window { opposite } => *opposite,
            _ => None,
        }
    }

    /// Replace the opposite component or window.
    pub fn set_opposite(&mut self, value: Option<ComponentId>) {
        match &mut self.payload {
            Payload::Focus { opposite, .. } | Payload::Window { opposite } => *opposite = value,
            _ => {}
        }
    }

    /// Temporary focus change flag; false for non-focus events.
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        matches!(self.payload, Payload::Focus { temporary: true, .. })
    }

    #[must_use]
    pub fn paint_area(&self) -> Option<Rect> {
        match &self.payload {
            Payload::Paint { area } => Some(*area),
            _ => None,
        }
    }
}
