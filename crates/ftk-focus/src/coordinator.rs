#![forbid(unsafe_code)]

//! The focus state machine of one context.
//!
//! # Design
//!
//! The native layer reports focus changes asynchronously and out of order.
//! [`FocusCoordinator::dispatch_event`] reconciles each report with the
//! synchronous model in [`FocusState`]: before applying a change it
//! synthesizes the events the model expects to have seen first (the old
//! owner's FOCUS_LOST before a FOCUS_GAINED, the window's
//! WINDOW_GAINED_FOCUS before focusing a component inside it, and so on) and
//! delivers them synchronously with [`ftk_runtime::send_message`], in
//! whichever context owns their target.
//!
//! ## Invariants
//!
//! 1. Every slot write is read back. A write that did not stick (a listener
//!    vetoed it) aborts the transition and runs a restore.
//! 2. Restores try a fixed candidate order and stop at the first focus
//!    request that is accepted; the last resort clears the focus owner.
//! 3. While a synthesized event is being handled (`in_send_message > 0`)
//!    a newly focused window does not request its initial component; the
//!    focus change that caused the synthesis is already on its way.
//! 4. No lock is held while events are delivered or sent, so handlers may
//!    re-enter the coordinator.
//!
//! ## Failure Modes
//!
//! - A send into a disposed context fails; the sender treats the target's
//!   state as gone and clears the slots that referred to it.
//! - The coordinator and its [`FocusSystem`] reference each other until
//!   the context is disposed through [`FocusSystem::dispose_context`] or
//!   [`FocusSystem::shutdown`].

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use ftk_core::component::{ComponentId, ComponentTree};
use ftk_core::event::{Event, EventId};
use ftk_runtime::{AppContext, send_message};
use tracing::{debug, trace};

use crate::keys::{KeyEventDispatcher, KeyEventPostProcessor};
use crate::state::FocusState;
use crate::system::FocusSystem;
use crate::type_ahead::{TypeAheadBuffer, TypeAheadMarker};

/// Opposites reported by the last FOCUS_LOST / WINDOW_LOST_FOCUS, used to
/// fill in the opposite of the matching gain.
#[derive(Debug, Default, Clone, Copy)]
struct Opposites {
    component: Option<ComponentId>,
    window: Option<ComponentId>,
}

/// Decrements the send depth when a synthesized event has been handled.
pub(crate) struct SendScope<'a>(&'a AtomicUsize);

impl Drop for SendScope<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Per-context focus manager.
pub struct FocusCoordinator {
    system: Arc<FocusSystem>,
    context: Arc<AppContext>,
    in_send_message: AtomicUsize,
    pub(crate) consume_next_key_typed: AtomicBool,
    opposites: Mutex<Opposites>,
    type_ahead: Mutex<TypeAheadBuffer>,
    pub(crate) key_dispatchers: RwLock<Vec<Arc<dyn KeyEventDispatcher>>>,
    pub(crate) post_processors: RwLock<Vec<Arc<dyn KeyEventPostProcessor>>>,
}

impl std::fmt::Debug for FocusCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FocusCoordinator")
            .field("context", &self.context.id())
            .field("in_send_message", &self.in_send_message())
            .field("type_ahead", &*self.lock_type_ahead())
            .finish_non_exhaustive()
    }
}

impl FocusCoordinator {
    pub(crate) fn new(system: Arc<FocusSystem>, context: Arc<AppContext>) -> Self {
        Self {
            system,
            context,
            in_send_message: AtomicUsize::new(0),
            consume_next_key_typed: AtomicBool::new(false),
            opposites: Mutex::new(Opposites::default()),
            type_ahead: Mutex::new(TypeAheadBuffer::new()),
            key_dispatchers: RwLock::new(Vec::new()),
            post_processors: RwLock::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn context(&self) -> &Arc<AppContext> {
        &self.context
    }

    #[must_use]
    pub fn system(&self) -> &Arc<FocusSystem> {
        &self.system
    }

    pub(crate) fn tree(&self) -> &ComponentTree {
        self.system.tree()
    }

    pub(crate) fn state(&self) -> &FocusState {
        self.system.state()
    }

    pub(crate) fn lock_type_ahead(&self) -> MutexGuard<'_, TypeAheadBuffer> {
        self.type_ahead.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_opposites(&self) -> MutexGuard<'_, Opposites> {
        self.opposites.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Depth of synthesized events currently being handled.
    #[must_use]
    pub fn in_send_message(&self) -> usize {
        self.in_send_message.load(Ordering::SeqCst)
    }

    pub(crate) fn enter_send(&self) -> SendScope<'_> {
        self.in_send_message.fetch_add(1, Ordering::SeqCst);
        SendScope(&self.in_send_message)
    }

    /// Component that really lost focus in the last FOCUS_LOST that named an
    /// opposite.
    #[must_use]
    pub fn real_opposite_component(&self) -> Option<ComponentId> {
        self.lock_opposites().component
    }

    /// Window that really lost focus in the last WINDOW_LOST_FOCUS that named
    /// an opposite.
    #[must_use]
    pub fn real_opposite_window(&self) -> Option<ComponentId> {
        self.lock_opposites().window
    }

    #[must_use]
    pub fn type_ahead_markers(&self) -> Vec<TypeAheadMarker> {
        self.lock_type_ahead().markers()
    }

    /// Key events currently held back.
    #[must_use]
    pub fn held_key_events(&self) -> usize {
        self.lock_type_ahead().held_len()
    }

    /// Outstanding focus requests targeting this context.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.lock_type_ahead().request_count()
    }

    pub(crate) fn clear_requests(&self) {
        self.lock_type_ahead().clear_requests();
    }

    // ═════════════════════════════════════════════════════════════════════
    // Dispatch
    // ═════════════════════════════════════════════════════════════════════

    /// Full dispatch: the focus manager first, then ordinary delivery to the
    /// source component for anything it does not handle.
    pub fn dispatch(&self, event: Event) {
        if let Some(event) = self.dispatch_event(event) {
            self.deliver(event);
        }
    }

    /// Run `event` through the focus state machine. Returns the event back
    /// when it is not the focus manager's business.
    pub fn dispatch_event(&self, event: Event) -> Option<Event> {
        trace!(
            context = %self.context.id(),
            id = ?event.id(),
            source = ?event.source(),
            opposite = ?event.opposite(),
            when = event.when(),
            "focus dispatch"
        );
        match event.id() {
            EventId::WindowGainedFocus => self.window_gained_focus(event),
            EventId::WindowActivated => self.window_activated(event),
            EventId::FocusGained => self.focus_gained(event),
            EventId::FocusLost => self.focus_lost(event),
            EventId::WindowDeactivated => self.window_deactivated(event),
            EventId::WindowLostFocus => self.window_lost_focus(event),
            id if id.is_key() => self.type_ahead_assertions(None, event),
            _ => return Some(event),
        }
        None
    }

    /// Ordinary delivery to the event's source: listeners, then the peer.
    fn deliver(&self, event: Event) {
        match event.source() {
            Some(target) => self.redispatch(target, event),
            None => trace!(id = ?event.id(), "sourceless event ignored"),
        }
    }

    /// Deliver a focus-manager-approved event to `target`, bypassing the
    /// state machine.
    pub(crate) fn redispatch(&self, target: ComponentId, mut event: Event) {
        let tree = self.tree();
        tree.deliver(target, &mut event);
        if !event.id().is_key()
            && let Some(peer) = tree.peer(target)
        {
            peer.handle_event(&event);
        }
    }

    /// Synchronously deliver `event` in the context that owns `target`.
    fn send(&self, target: ComponentId, event: Event) -> bool {
        let Some(target_ctx) = self.system.contexts().for_component(self.tree(), target) else {
            debug!(target = %target, id = ?event.id(), "send target has no live context");
            return false;
        };
        let delivered = send_message(&self.context, &target_ctx, event);
        if !delivered {
            debug!(target = %target, context = %target_ctx.id(), "synthesized event not delivered");
        }
        delivered
    }

    // ═════════════════════════════════════════════════════════════════════
    // Transitions
    // ═════════════════════════════════════════════════════════════════════

    fn window_gained_focus(&self, mut event: Event) {
        let Some(new_focused) = event.source() else {
            return;
        };
        let (tree, state) = (self.tree(), self.state());
        let old_focused = state.focused_window();
        if old_focused == Some(new_focused) {
            return;
        }
        let when = event.when();

        if let Some(old) = old_focused {
            let lost = Event::window(EventId::WindowLostFocus, old, Some(new_focused), when);
            if !self.send(old, lost) {
                state.set_focus_owner(tree, None);
                state.set_focused_window(tree, None);
            }
        }

        let new_active = tree.owning_frame_or_dialog(new_focused);
        let current_active = state.active_window();
        if let Some(active) = new_active
            && Some(active) != current_active
        {
            let activated = Event::window(EventId::WindowActivated, active, current_active, when);
            self.send(active, activated);
            if state.active_window() != Some(active) {
                debug!(window = %new_focused, "activation rejected; restoring");
                self.restore_focus_after_window(&event);
                return;
            }
        }

        state.set_focused_window(tree, Some(new_focused));
        if state.focused_window() != Some(new_focused) {
            debug!(window = %new_focused, "focused window rejected; restoring");
            self.restore_focus_after_window(&event);
            return;
        }

        if self.in_send_message() == 0 {
            let to_focus = tree.most_recent_focus_owner(new_focused).or_else(|| {
                tree.is_focusable_window(new_focused)
                    .then(|| self.system.initial_component(new_focused))
                    .flatten()
            });
            let temp_lost = tree.set_temporary_lost_component(new_focused, None);
            if let Some(lost) = temp_lost {
                self.system.request_focus_in_window(lost);
            }
            if let Some(c) = to_focus
                && Some(c) != temp_lost
            {
                self.system.request_focus_in_window(c);
            }
        }

        let real_opposite = self.real_opposite_window();
        if real_opposite != event.opposite() {
            event.set_opposite(real_opposite);
        }
        self.type_ahead_assertions(Some(new_focused), event);
    }

    fn window_activated(&self, event: Event) {
        let Some(new_active) = event.source() else {
            return;
        };
        let state = self.state();
        let old_active = state.active_window();
        if old_active == Some(new_active) {
            return;
        }
        if let Some(old) = old_active {
            let deactivated =
                Event::window(EventId::WindowDeactivated, old, Some(new_active), event.when());
            if !self.send(old, deactivated) {
                state.set_active_window(None);
            }
            if state.active_window().is_some() {
                debug!(window = %new_active, "old active window kept; activation dropped");
                return;
            }
        }
        state.set_active_window(Some(new_active));
        if state.active_window() != Some(new_active) {
            debug!(window = %new_active, "active window rejected");
            return;
        }
        self.type_ahead_assertions(Some(new_active), event);
    }

    fn focus_gained(&self, mut event: Event) {
        let Some(new_owner) = event.source() else {
            return;
        };
        let (tree, state) = (self.tree(), self.state());
        let old_owner = state.focus_owner();
        if old_owner == Some(new_owner) {
            self.lock_type_ahead().complete_request(new_owner);
            return;
        }
        let temporary = event.is_temporary();
        let when = event.when();

        if let Some(old) = old_owner {
            let lost = Event::focus_lost(old, Some(new_owner), temporary, when);
            if !self.send(old, lost) {
                state.set_focus_owner(tree, None);
                if !temporary {
                    state.set_permanent_focus_owner(tree, None);
                }
            }
        }

        let new_window = tree.window_of(new_owner);
        let current_focused = state.focused_window();
        if let Some(window) = new_window
            && Some(window) != current_focused
        {
            let gained = Event::window(EventId::WindowGainedFocus, window, current_focused, when);
            self.send(window, gained);
            if state.focused_window() != Some(window) {
                debug!(component = %new_owner, window = %window, "window did not take focus");
                self.dequeue_key_events(None, new_owner);
                return;
            }
        }

        state.set_focus_owner(tree, Some(new_owner));
        if state.focus_owner() != Some(new_owner) {
            debug!(component = %new_owner, "focus owner rejected; restoring");
            self.dequeue_key_events(None, new_owner);
            self.restore_focus_after_component(&event, new_window);
            return;
        }

        if !temporary {
            state.set_permanent_focus_owner(tree, Some(new_owner));
            if state.permanent_focus_owner() != Some(new_owner) {
                debug!(component = %new_owner, "permanent focus owner rejected; restoring");
                self.dequeue_key_events(None, new_owner);
                self.restore_focus_after_component(&event, new_window);
                return;
            }
        }

        let real_opposite = self.real_opposite_component();
        if real_opposite.is_some() && real_opposite != event.opposite() {
            event.set_opposite(real_opposite);
        }
        debug!(component = %new_owner, temporary, "focus gained");
        self.type_ahead_assertions(Some(new_owner), event);
    }

    fn focus_lost(&self, mut event: Event) {
        let (tree, state) = (self.tree(), self.state());
        let Some(current) = state.focus_owner() else {
            return;
        };
        if event.opposite() == Some(current) {
            return;
        }

        state.set_focus_owner(tree, None);
        if state.focus_owner().is_some() {
            debug!(component = %current, "focus owner kept; restoring");
            self.restore_focus_to_component(current, true);
            return;
        }

        if event.is_temporary() {
            if let Some(window) = tree.window_of(current) {
                tree.set_temporary_lost_component(window, Some(current));
            }
        } else {
            state.set_permanent_focus_owner(tree, None);
            if state.permanent_focus_owner().is_some() {
                debug!(component = %current, "permanent focus owner kept; restoring");
                self.restore_focus_to_component(current, true);
                return;
            }
        }

        event.set_source(Some(current));
        self.lock_opposites().component = event.opposite().map(|_| current);
        debug!(component = %current, temporary = event.is_temporary(), "focus lost");
        self.type_ahead_assertions(Some(current), event);
    }

    fn window_deactivated(&self, mut event: Event) {
        let state = self.state();
        let Some(current) = state.active_window() else {
            return;
        };
        state.set_active_window(None);
        if state.active_window().is_some() {
            debug!(window = %current, "deactivation rejected");
            return;
        }
        event.set_source(Some(current));
        self.type_ahead_assertions(Some(current), event);
    }

    fn window_lost_focus(&self, mut event: Event) {
        let (tree, state) = (self.tree(), self.state());
        let Some(current_focused) = state.focused_window() else {
            return;
        };
        let losing = event.source();
        let active = state.active_window();
        let opposite = event.opposite();
        // Native echo of a focus change the model already made.
        if self.in_send_message() == 0 && losing == active && opposite == Some(current_focused) {
            trace!(window = %current_focused, "redundant window focus loss ignored");
            return;
        }

        if let Some(owner) = state.focus_owner() {
            let opposite_component = opposite
                .and_then(|w| {
                    tree.temporary_lost_component(w)
                        .or_else(|| self.system.window_most_recent_focus_owner(w))
                })
                .or(opposite);
            let lost = Event::focus_lost(owner, opposite_component, true, event.when());
            self.send(owner, lost);
        }

        state.set_focused_window(tree, None);
        if state.focused_window().is_some() {
            debug!(window = %current_focused, "focused window kept; restoring");
            self.restore_focus_to_window(current_focused, None, true);
            return;
        }

        event.set_source(Some(current_focused));
        self.lock_opposites().window = opposite.map(|_| current_focused);
        let when = event.when();
        debug!(window = %current_focused, ?opposite, "window lost focus");
        self.type_ahead_assertions(Some(current_focused), event);

        if opposite.is_none() {
            if let Some(active) = active {
                let deactivated = Event::window(EventId::WindowDeactivated, active, None, when);
                self.send(active, deactivated);
            }
            if state.active_window().is_some() {
                self.restore_focus_to_window(current_focused, None, true);
            }
        }
    }

    // ═════════════════════════════════════════════════════════════════════
    // Restore
    // ═════════════════════════════════════════════════════════════════════

    /// After a rejected FOCUS_GAINED: the window's most recent owner (other
    /// than the rejected component), the component that really lost focus,
    /// the event's opposite, then clear.
    fn restore_focus_after_component(&self, event: &Event, new_window: Option<ComponentId>) {
        let vetoed = event.source();
        let real_opposite = self.real_opposite_component();
        let restored = new_window.is_some_and(|w| self.restore_focus_to_window(w, vetoed, false))
            || real_opposite.is_some_and(|c| self.restore_focus_to_component(c, false))
            || event
                .opposite()
                .is_some_and(|c| self.restore_focus_to_component(c, false));
        if !restored {
            debug!("no restore candidate accepted; clearing focus owner");
            self.system.clear_global_focus_owner();
        }
    }

    /// After a rejected window transition: the window that really lost
    /// focus, the event's opposite window, then clear.
    fn restore_focus_after_window(&self, event: &Event) {
        let real_opposite = self.real_opposite_window();
        let restored = real_opposite.is_some_and(|w| self.restore_focus_to_window(w, None, false))
            || event
                .opposite()
                .is_some_and(|w| self.restore_focus_to_window(w, None, false));
        if !restored {
            debug!("no window restore candidate accepted; clearing focus owner");
            self.system.clear_global_focus_owner();
        }
    }

    fn restore_focus_to_window(
        &self,
        window: ComponentId,
        vetoed: Option<ComponentId>,
        clear_on_failure: bool,
    ) -> bool {
        let candidate = self.tree().most_recent_focus_owner(window);
        if let Some(c) = candidate
            && Some(c) != vetoed
            && self.restore_focus_to_component(c, false)
        {
            return true;
        }
        if clear_on_failure {
            self.system.clear_global_focus_owner();
            return true;
        }
        false
    }

    fn restore_focus_to_component(&self, component: ComponentId, clear_on_failure: bool) -> bool {
        let tree = self.tree();
        if tree.is_showing(component)
            && tree.is_focusable(component)
            && self.system.request_focus(component, false)
        {
            trace!(component = %component, "focus restored");
            return true;
        }
        if self.system.transfer_focus(component, true) {
            trace!(from = %component, "focus restored to next component");
            return true;
        }
        if clear_on_failure {
            self.system.clear_global_focus_owner();
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FocusConfig;
    use crate::policy::{FocusTraversalPolicy, PolicyRegistry};
    use crate::state::{FocusListener, FocusSlot};
    use ftk_core::component::{ComponentPeer, ComponentSpec};
    use ftk_core::event::{KeyData, Timestamp, now_millis};
    use ftk_core::keystroke::{KeyCode, Modifiers};
    use ftk_runtime::{ContextRegistry, DispatchMode};
    use std::collections::HashSet;

    type Delivery = (EventId, Option<ComponentId>, Option<char>);

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Delivery>>);

    impl ComponentPeer for Recorder {
        fn dispatch_event(&self, event: &mut Event) {
            let ch = event.key_data().and_then(|k| k.key_char);
            self.0.lock().unwrap().push((event.id(), event.source(), ch));
        }
    }

    impl Recorder {
        fn keys(&self) -> Vec<(char, ComponentId)> {
            self.0
                .lock()
                .unwrap()
                .iter()
                .filter(|(id, _, _)| id.is_key())
                .filter_map(|(_, src, ch)| Some(((*ch)?, (*src)?)))
                .collect()
        }

        fn count(&self, id: EventId, source: ComponentId) -> usize {
            self.0
                .lock()
                .unwrap()
                .iter()
                .filter(|(i, s, _)| *i == id && *s == Some(source))
                .count()
        }
    }

    struct Nowhere;

    impl FocusTraversalPolicy for Nowhere {
        fn component_after(
            &self,
            _: &ComponentTree,
            _: &PolicyRegistry,
            _: ComponentId,
            _: ComponentId,
        ) -> Option<ComponentId> {
            None
        }
        fn component_before(
            &self,
            _: &ComponentTree,
            _: &PolicyRegistry,
            _: ComponentId,
            _: ComponentId,
        ) -> Option<ComponentId> {
            None
        }
        fn first_component(
            &self,
            _: &ComponentTree,
            _: &PolicyRegistry,
            _: ComponentId,
        ) -> Option<ComponentId> {
            None
        }
        fn last_component(
            &self,
            _: &ComponentTree,
            _: &PolicyRegistry,
            _: ComponentId,
        ) -> Option<ComponentId> {
            None
        }
    }

    #[derive(Default)]
    struct VetoOwner(Mutex<HashSet<ComponentId>>);

    impl FocusListener for VetoOwner {
        fn vetoable_change(
            &self,
            slot: FocusSlot,
            _old: Option<ComponentId>,
            new: Option<ComponentId>,
        ) -> bool {
            !(slot == FocusSlot::FocusOwner
                && new.is_some_and(|c| self.0.lock().unwrap().contains(&c)))
        }
    }

    struct Harness {
        system: Arc<FocusSystem>,
        context: Arc<AppContext>,
        coordinator: Arc<FocusCoordinator>,
        tree: Arc<ComponentTree>,
        peer: Arc<Recorder>,
    }

    impl Harness {
        fn new(policies: PolicyRegistry) -> Self {
            let tree = Arc::new(ComponentTree::new());
            let contexts = Arc::new(ContextRegistry::default());
            let context = contexts.create();
            let system = FocusSystem::with_parts(
                Arc::clone(&tree),
                contexts,
                Arc::new(FocusState::new()),
                policies,
                FocusConfig::default(),
            );
            let coordinator = system.attach_with(&context, DispatchMode::Manual);
            Self {
                system,
                context,
                coordinator,
                tree,
                peer: Arc::new(Recorder::default()),
            }
        }

        fn frame(&self) -> ComponentId {
            self.tree
                .insert(ComponentSpec::frame(self.context.id()).with_peer(self.peer.clone()))
        }

        fn leaf(&self, parent: ComponentId) -> ComponentId {
            self.tree
                .insert(ComponentSpec::leaf(parent).with_peer(self.peer.clone()))
        }

        fn post(&self, event: Event) {
            self.context.post_event(event);
        }

        fn pump(&self) -> usize {
            let queue = self.context.event_queue();
            let dispatcher = queue.dispatcher().expect("dispatcher attached");
            queue.dispatch_pending(dispatcher.as_ref())
        }

        fn focus_window(&self, window: ComponentId) {
            self.post(Event::window(EventId::WindowGainedFocus, window, None, now_millis()));
            self.pump();
        }

        fn owner(&self) -> Option<ComponentId> {
            self.system.state().focus_owner()
        }
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            self.system.shutdown();
        }
    }

    fn typed(ch: char, when: Timestamp) -> Event {
        Event::key(
            EventId::KeyPressed,
            ComponentId::new(0),
            when,
            KeyData::new(KeyCode::Char(ch), Some(ch), Modifiers::empty()),
        )
    }

    fn tab(id: EventId, source: ComponentId) -> Event {
        let data = match id {
            EventId::KeyTyped => KeyData::new(KeyCode::Undefined, Some('\t'), Modifiers::empty()),
            _ => KeyData::new(KeyCode::Tab, None, Modifiers::empty()),
        };
        Event::key(id, source, now_millis(), data)
    }

    #[test]
    fn window_gain_activates_and_focuses_initial_component() {
        let h = Harness::new(PolicyRegistry::default());
        let frame = h.frame();
        let a = h.leaf(frame);
        let _b = h.leaf(frame);
        h.focus_window(frame);

        let snap = h.system.state().snapshot();
        assert_eq!(snap.active_window, Some(frame));
        assert_eq!(snap.focused_window, Some(frame));
        assert_eq!(snap.focus_owner, Some(a));
        assert_eq!(snap.permanent_focus_owner, Some(a));
        assert_eq!(h.peer.count(EventId::WindowActivated, frame), 1);
        assert_eq!(h.peer.count(EventId::WindowGainedFocus, frame), 1);
        assert_eq!(h.peer.count(EventId::FocusGained, a), 1);
        assert!(h.coordinator.type_ahead_markers().is_empty());
        assert_eq!(h.coordinator.request_count(), 0);
    }

    #[test]
    fn focus_gain_synthesizes_window_gain_without_initial_request() {
        let h = Harness::new(PolicyRegistry::default());
        let frame = h.frame();
        let first = h.leaf(frame);
        let second = h.leaf(frame);
        h.post(Event::focus_gained(second, None, false, now_millis()));
        h.pump();

        assert_eq!(h.owner(), Some(second));
        assert_eq!(h.system.state().focused_window(), Some(frame));
        assert_eq!(h.peer.count(EventId::FocusGained, first), 0);
        assert_eq!(h.coordinator.in_send_message(), 0);
    }

    #[test]
    fn focus_move_sends_loss_to_old_owner_first() {
        let h = Harness::new(PolicyRegistry::default());
        let frame = h.frame();
        let a = h.leaf(frame);
        let b = h.leaf(frame);
        h.focus_window(frame);
        assert!(h.system.request_focus(b, false));
        h.pump();

        assert_eq!(h.owner(), Some(b));
        let log = h.peer.0.lock().unwrap().clone();
        let lost = log
            .iter()
            .position(|(id, src, _)| *id == EventId::FocusLost && *src == Some(a));
        let gained = log
            .iter()
            .position(|(id, src, _)| *id == EventId::FocusGained && *src == Some(b));
        assert!(lost.is_some() && lost < gained, "{log:?}");
        assert_eq!(h.coordinator.real_opposite_component(), Some(a));
    }

    #[test]
    fn keys_typed_during_focus_change_follow_the_new_owner() {
        let h = Harness::new(PolicyRegistry::default());
        let frame = h.frame();
        let a = h.leaf(frame);
        let b = h.leaf(frame);
        h.focus_window(frame);
        assert_eq!(h.owner(), Some(a));

        let t = now_millis();
        h.coordinator.enqueue_key_events(t, b);
        h.post(typed('1', t - 10));
        h.post(typed('2', t + 10));
        h.post(Event::focus_gained(b, Some(a), false, t));
        h.post(typed('3', t + 20));
        h.pump();

        assert_eq!(h.peer.keys(), vec![('1', a), ('2', b), ('3', b)]);
        assert_eq!(h.coordinator.held_key_events(), 0);
        assert!(h.coordinator.type_ahead_markers().is_empty());
    }

    #[test]
    fn discard_cascades_to_descendants() {
        let h = Harness::new(PolicyRegistry::default());
        let frame = h.frame();
        let panel = h.tree.insert(ComponentSpec::container(frame));
        let x = h.leaf(panel);
        let y = h.leaf(panel);
        let z = h.leaf(frame);
        h.coordinator.enqueue_key_events(10, x);
        h.coordinator.enqueue_key_events(20, z);
        h.coordinator.enqueue_key_events(30, y);
        for (ch, t) in [('a', 15), ('b', 25), ('c', 35)] {
            h.post(typed(ch, t));
        }
        h.pump();
        assert_eq!(h.coordinator.held_key_events(), 3);

        h.coordinator.discard_key_events(panel);
        let markers = h.coordinator.type_ahead_markers();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].until_focused, z);
        assert_eq!(h.coordinator.held_key_events(), 1);
        assert_eq!(h.coordinator.request_count(), 1);
    }

    #[test]
    fn tab_moves_focus_and_swallows_its_companions() {
        let h = Harness::new(PolicyRegistry::default());
        let frame = h.frame();
        let a = h.leaf(frame);
        let b = h.leaf(frame);
        h.focus_window(frame);

        h.post(tab(EventId::KeyPressed, a));
        h.post(tab(EventId::KeyTyped, a));
        h.post(tab(EventId::KeyReleased, a));
        h.pump();

        assert_eq!(h.owner(), Some(b));
        assert!(h.peer.keys().is_empty());
        let log = h.peer.0.lock().unwrap().clone();
        assert!(!log.iter().any(|(id, _, _)| id.is_key()), "{log:?}");
    }

    #[test]
    fn traversal_keys_disabled_delivers_tab() {
        let h = Harness::new(PolicyRegistry::default());
        let frame = h.frame();
        let a = h.leaf(frame);
        let _b = h.leaf(frame);
        h.focus_window(frame);
        h.tree.set_traversal_keys_enabled(a, false);
        h.post(tab(EventId::KeyPressed, a));
        h.pump();
        assert_eq!(h.owner(), Some(a));
        assert_eq!(h.peer.count(EventId::KeyPressed, a), 1);
    }

    #[test]
    fn window_loss_without_opposite_deactivates_and_remembers_owner() {
        let h = Harness::new(PolicyRegistry::default());
        let frame = h.frame();
        let a = h.leaf(frame);
        h.focus_window(frame);

        h.post(Event::window(EventId::WindowLostFocus, frame, None, now_millis()));
        h.pump();
        let snap = h.system.state().snapshot();
        assert_eq!(snap.focus_owner, None);
        assert_eq!(snap.focused_window, None);
        assert_eq!(snap.active_window, None);
        assert_eq!(snap.permanent_focus_owner, Some(a));
        assert_eq!(h.tree.temporary_lost_component(frame), Some(a));

        h.focus_window(frame);
        assert_eq!(h.owner(), Some(a));
        assert_eq!(h.tree.temporary_lost_component(frame), None);
    }

    #[test]
    fn dispatcher_chain_claims_and_post_processors_see_rest() {
        struct Claim;
        impl KeyEventDispatcher for Claim {
            fn dispatch_key_event(&self, event: &mut Event) -> bool {
                event.key_data().and_then(|k| k.key_char) == Some('q')
            }
        }
        #[derive(Default)]
        struct Seen(Mutex<Vec<char>>);
        impl KeyEventPostProcessor for Seen {
            fn post_process_key_event(&self, event: &mut Event) -> bool {
                if let Some(ch) = event.key_data().and_then(|k| k.key_char) {
                    self.0.lock().unwrap().push(ch);
                }
                false
            }
        }

        let h = Harness::new(PolicyRegistry::default());
        let frame = h.frame();
        let a = h.leaf(frame);
        h.focus_window(frame);
        let seen = Arc::new(Seen::default());
        h.coordinator.add_key_event_dispatcher(Arc::new(Claim));
        h.coordinator.add_key_event_post_processor(seen.clone());
        h.post(typed('q', now_millis()));
        h.post(typed('w', now_millis()));
        h.pump();
        assert_eq!(h.peer.keys(), vec![('w', a)]);
        assert_eq!(*seen.0.lock().unwrap(), vec!['w']);
    }

    // ── Restore order ───────────────────────────────────────────────────

    struct RestoreFixture {
        h: Harness,
        a: ComponentId,
        b: ComponentId,
        c: ComponentId,
        d: ComponentId,
        frame: ComponentId,
    }

    /// `a` owns focus, `b` is vetoed, `c` is the frame's most recent owner,
    /// and traversal never finds a fallback.
    fn restore_fixture() -> RestoreFixture {
        let h = Harness::new(PolicyRegistry::new(Arc::new(Nowhere)));
        let frame = h.frame();
        let a = h.leaf(frame);
        let b = h.leaf(frame);
        let c = h.leaf(frame);
        let d = h.leaf(frame);
        h.focus_window(frame);
        assert!(h.system.request_focus(a, false));
        h.pump();
        assert_eq!(h.owner(), Some(a));
        let veto = Arc::new(VetoOwner::default());
        veto.0.lock().unwrap().insert(b);
        h.system.state().add_listener(veto);
        h.tree.set_most_recent_focus_owner(frame, Some(c));
        RestoreFixture { h, a, b, c, d, frame }
    }

    fn gain_vetoed(f: &RestoreFixture) {
        f.h.post(Event::focus_gained(f.b, Some(f.d), false, now_millis()));
        f.h.pump();
    }

    #[test]
    fn restore_prefers_window_most_recent_owner() {
        let f = restore_fixture();
        gain_vetoed(&f);
        assert_eq!(f.h.owner(), Some(f.c));
    }

    #[test]
    fn restore_falls_back_to_real_opposite() {
        let f = restore_fixture();
        f.h.tree.set_focusable(f.c, false);
        gain_vetoed(&f);
        assert_eq!(f.h.owner(), Some(f.a));
    }

    #[test]
    fn restore_falls_back_to_event_opposite() {
        let f = restore_fixture();
        f.h.tree.set_focusable(f.c, false);
        f.h.tree.set_focusable(f.a, false);
        gain_vetoed(&f);
        assert_eq!(f.h.owner(), Some(f.d));
    }

    #[test]
    fn restore_clears_when_nothing_accepts() {
        let f = restore_fixture();
        for c in [f.a, f.c, f.d] {
            f.h.tree.set_focusable(c, false);
        }
        gain_vetoed(&f);
        assert_eq!(f.h.owner(), None);
        assert_eq!(f.h.system.state().focused_window(), Some(f.frame));
        assert_eq!(f.h.coordinator.request_count(), 0);
    }
}
