#![forbid(unsafe_code)]

//! Key event routing: type-ahead, dispatcher chains, traversal keys.
//!
//! A key event reaching the coordinator is first checked against the
//! type-ahead markers. Once released it is retargeted to the focus owner
//! (or the focused window), offered to the installed
//! [`KeyEventDispatcher`]s, delivered to the owner, offered to the
//! [`KeyEventPostProcessor`]s, and finally handed to the native peer.

use std::sync::atomic::Ordering;
use std::sync::{Arc, PoisonError};

use ftk_core::component::{ComponentId, TraversalHint, TraversalKind};
use ftk_core::event::{Event, EventId, Timestamp};
use ftk_core::keystroke::KeyStroke;
use tracing::{debug, trace};

use crate::coordinator::FocusCoordinator;

/// Gets the first look at every key event after retargeting.
pub trait KeyEventDispatcher: Send + Sync {
    /// Return true to claim the event; nothing else sees it then.
    fn dispatch_key_event(&self, event: &mut Event) -> bool;
}

/// Sees every key event after the focus owner handled it.
pub trait KeyEventPostProcessor: Send + Sync {
    /// Return true to stop the remaining post-processors and the default
    /// container hook.
    fn post_process_key_event(&self, event: &mut Event) -> bool;
}

impl FocusCoordinator {
    // ═════════════════════════════════════════════════════════════════════
    // Chains
    // ═════════════════════════════════════════════════════════════════════

    pub fn add_key_event_dispatcher(&self, dispatcher: Arc<dyn KeyEventDispatcher>) {
        self.key_dispatchers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(dispatcher);
    }

    pub fn remove_key_event_dispatcher(&self, dispatcher: &Arc<dyn KeyEventDispatcher>) -> bool {
        let mut chain = self.key_dispatchers.write().unwrap_or_else(PoisonError::into_inner);
        let before = chain.len();
        chain.retain(|d| !Arc::ptr_eq(d, dispatcher));
        chain.len() != before
    }

    pub fn add_key_event_post_processor(&self, processor: Arc<dyn KeyEventPostProcessor>) {
        self.post_processors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(processor);
    }

    pub fn remove_key_event_post_processor(
        &self,
        processor: &Arc<dyn KeyEventPostProcessor>,
    ) -> bool {
        let mut chain = self.post_processors.write().unwrap_or_else(PoisonError::into_inner);
        let before = chain.len();
        chain.retain(|p| !Arc::ptr_eq(p, processor));
        chain.len() != before
    }

    // ═════════════════════════════════════════════════════════════════════
    // Type-ahead
    // ═════════════════════════════════════════════════════════════════════

    /// Hold key events stamped after `after` until `until_focused` gains
    /// focus.
    pub fn enqueue_key_events(&self, after: Timestamp, until_focused: ComponentId) {
        self.lock_type_ahead().enqueue(after, until_focused);
    }

    /// Give up on one pending focus change to `until_focused`. `None` (or a
    /// negative time) removes its oldest marker. Events it held are released
    /// by the next pump.
    pub fn dequeue_key_events(&self, after: Option<Timestamp>, until_focused: ComponentId) {
        self.lock_type_ahead().dequeue(after, until_focused);
    }

    /// Drop every marker targeting `component` or anything inside it (up to
    /// its window), with the key events held on their behalf.
    pub fn discard_key_events(&self, component: ComponentId) {
        let tree = self.tree();
        let removed = self
            .lock_type_ahead()
            .discard(|target| tree.is_within_window_subtree(target, component));
        if removed > 0 {
            debug!(component = %component, removed, "type-ahead discarded");
        }
    }

    /// Dispatch every held key event that no marker holds back any more.
    pub fn pump_approved_key_events(&self) {
        if self.system().config().clear_markers_when_idle {
            let mut buf = self.lock_type_ahead();
            if buf.request_count() == 0 && buf.first_marker_time().is_some() {
                trace!("no focus request outstanding; clearing markers");
                buf.clear_markers();
            }
        }
        loop {
            let next = self.lock_type_ahead().pop_approved();
            let Some(event) = next else {
                break;
            };
            self.pre_dispatch_key_event(event);
        }
    }

    /// Gatekeeper between the state machine and delivery: holds key events
    /// behind markers and releases them once focus arrived.
    pub(crate) fn type_ahead_assertions(&self, target: Option<ComponentId>, event: Event) {
        self.pump_approved_key_events();
        let id = event.id();
        if id.is_key() {
            let released = self.lock_type_ahead().hold_or_release(event);
            if let Some(event) = released {
                self.pre_dispatch_key_event(event);
            }
            return;
        }
        let Some(target) = target else {
            return;
        };
        if id == EventId::FocusGained {
            let removed = self.lock_type_ahead().focus_gained(target);
            trace!(target = %target, removed, "markers satisfied");
            self.redispatch(target, event);
            self.pump_approved_key_events();
        } else {
            self.redispatch(target, event);
        }
    }

    // ═════════════════════════════════════════════════════════════════════
    // Key delivery
    // ═════════════════════════════════════════════════════════════════════

    /// Retarget a released key event to the focus owner (or the focused
    /// window) of this context and run the dispatcher chain.
    pub fn pre_dispatch_key_event(&self, mut event: Event) {
        let (tree, state) = (self.tree(), self.state());
        let here = self.context().id();
        let in_context = |c: &ComponentId| tree.context_of(*c) == Some(here);
        let target = state
            .focus_owner()
            .filter(in_context)
            .or_else(|| state.focused_window().filter(in_context));
        let Some(target) = target else {
            debug!(id = ?event.id(), when = event.when(), "key event dropped: nothing focused");
            return;
        };
        event.set_source(Some(target));

        let dispatchers = self
            .key_dispatchers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for dispatcher in &dispatchers {
            if dispatcher.dispatch_key_event(&mut event) {
                trace!(id = ?event.id(), "key event claimed by dispatcher");
                return;
            }
        }
        self.dispatch_key_event(&mut event);
    }

    /// Default key dispatch: deliver to the focus owner, run the
    /// post-processors, then native handling. Always claims the event.
    pub fn dispatch_key_event(&self, event: &mut Event) -> bool {
        let (tree, state) = (self.tree(), self.state());
        if let Some(owner) = state.focus_owner()
            && tree.is_showing(owner)
            && tree.is_focusable(owner)
            && tree.is_enabled(owner)
            && !event.is_consumed()
            && let Some(target) = event.source()
            && tree.is_enabled(target)
        {
            self.process_key_event(target, event);
            if !event.is_consumed() {
                tree.deliver(target, event);
            }
        }

        let processors = self
            .post_processors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let stopped = processors.iter().any(|p| p.post_process_key_event(event));
        if !stopped {
            self.post_process_key_event(event);
        }

        if let Some(source) = event.source() {
            let peer = tree
                .peer(source)
                .filter(|p| !p.is_lightweight())
                .or_else(|| tree.native_container(source).and_then(|n| tree.peer(n)));
            if let Some(peer) = peer {
                peer.handle_event(event);
            }
        }
        true
    }

    /// Offer an unconsumed key event to the containers above its source, up
    /// to the window, until one consumes it.
    pub fn post_process_key_event(&self, event: &mut Event) -> bool {
        let tree = self.tree();
        let mut cur = event.source().and_then(|s| tree.enclosing_container(s));
        while let Some(container) = cur {
            if event.is_consumed() {
                break;
            }
            if let Some(peer) = tree.peer(container) {
                peer.post_process_key_event(event);
            }
            if tree.is_window(container) {
                break;
            }
            cur = tree.parent(container);
        }
        true
    }

    /// Traversal key handling for `focused`: moves focus and consumes the
    /// event when it matches one of the component's traversal key sets.
    pub fn process_key_event(&self, focused: ComponentId, event: &mut Event) {
        let tree = self.tree();
        let pressed = event.id() == EventId::KeyPressed;
        if event.id() == EventId::KeyTyped {
            if self.consume_next_key_typed.swap(false, Ordering::SeqCst) {
                event.consume();
            }
            return;
        }
        if !tree.traversal_keys_enabled(focused) || event.is_consumed() {
            return;
        }

        if let Some(peer) = tree.peer(focused) {
            let hint = peer.traversal_hint(event);
            let system = self.system();
            match hint {
                TraversalHint::Ignore => {}
                TraversalHint::Consume => {
                    event.consume();
                    return;
                }
                TraversalHint::FocusNext | TraversalHint::FocusPrevious => {
                    if pressed {
                        if hint == TraversalHint::FocusNext {
                            system.focus_next_component(focused);
                        } else {
                            system.focus_previous_component(focused);
                        }
                    }
                    event.consume();
                    self.consume_next_key_typed.store(pressed, Ordering::SeqCst);
                    return;
                }
            }
        }

        let Some(data) = event.key_data().copied() else {
            return;
        };
        let stroke = KeyStroke::for_key(&data, event.id() == EventId::KeyReleased, false);
        let opposite = stroke.opposite();
        for kind in TraversalKind::ALL {
            if kind == TraversalKind::DownCycle && !tree.is_focus_cycle_root(focused) {
                break;
            }
            let keys = self.traversal_keys(focused, kind);
            let hit = keys.contains(&stroke);
            if !hit && !keys.contains(&opposite) {
                continue;
            }
            if hit {
                debug!(component = %focused, ?kind, "traversal key");
                let system = self.system();
                match kind {
                    TraversalKind::Forward => system.focus_next_component(focused),
                    TraversalKind::Backward => system.focus_previous_component(focused),
                    TraversalKind::UpCycle => system.up_focus_cycle(focused),
                    TraversalKind::DownCycle => system.down_focus_cycle(focused),
                }
            }
            event.consume();
            self.consume_next_key_typed.store(pressed, Ordering::SeqCst);
            return;
        }
    }

    fn traversal_keys(
        &self,
        component: ComponentId,
        kind: TraversalKind,
    ) -> std::collections::HashSet<KeyStroke> {
        self.tree()
            .traversal_keys(component, kind)
            .unwrap_or_else(|| self.system().config().traversal_keys(kind).clone())
    }
}
