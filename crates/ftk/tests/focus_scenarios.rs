//! End-to-end focus scenarios on live dispatch threads: window switches
//! across contexts, type-ahead around a focus change, keyboard traversal,
//! component removal, and clearing the focus owner.

use std::sync::{Arc, Mutex};

use ftk::{
    AppContext, ComponentId, ComponentPeer, ComponentSpec, Event, EventId, KeyCode, KeyData,
    Modifiers, Timestamp, Toolkit, now_millis,
};
use tracing::{Level, info};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(Level::DEBUG)
        .try_init();
}

// ── Helpers ─────────────────────────────────────────────────────────────

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
    fn count(&self, id: EventId, source: ComponentId) -> usize {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|(i, s, _)| *i == id && *s == Some(source))
            .count()
    }

    fn keys(&self) -> Vec<(char, ComponentId)> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _, _)| id.is_key())
            .filter_map(|(_, src, ch)| Some(((*ch)?, (*src)?)))
            .collect()
    }
}

struct Scene {
    kit: Toolkit,
    peer: Arc<Recorder>,
}

impl Scene {
    fn new() -> Self {
        init_tracing();
        Self {
            kit: Toolkit::default(),
            peer: Arc::new(Recorder::default()),
        }
    }

    fn frame(&self, ctx: &AppContext) -> ComponentId {
        self.kit
            .tree()
            .insert(ComponentSpec::frame(ctx.id()).with_peer(self.peer.clone()))
    }

    fn container(&self, parent: ComponentId) -> ComponentId {
        self.kit
            .tree()
            .insert(ComponentSpec::container(parent).with_peer(self.peer.clone()))
    }

    fn leaf(&self, parent: ComponentId) -> ComponentId {
        self.kit
            .tree()
            .insert(ComponentSpec::leaf(parent).with_peer(self.peer.clone()))
    }

    fn focus_window(&self, window: ComponentId) {
        assert!(self.kit.post_event(Event::window(
            EventId::WindowGainedFocus,
            window,
            None,
            now_millis()
        )));
        self.kit.flush_all().unwrap();
    }

    fn owner(&self) -> Option<ComponentId> {
        self.kit.focus().state().focus_owner()
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

// ═════════════════════════════════════════════════════════════════════════
// Window switches
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn switching_windows_across_contexts() {
    let s = Scene::new();
    let (ctx_a, ctx_b) = (s.kit.create_context(), s.kit.create_context());
    let w1 = s.frame(&ctx_a);
    let c1 = s.leaf(w1);
    let w2 = s.frame(&ctx_b);
    let c2 = s.leaf(w2);

    s.focus_window(w1);
    assert_eq!(s.owner(), Some(c1));

    info!("focus moves to a window owned by another context");
    s.focus_window(w2);
    let state = s.kit.focus().state().snapshot();
    assert_eq!(state.focused_window, Some(w2));
    assert_eq!(state.active_window, Some(w2));
    assert_eq!(state.focus_owner, Some(c2));
    assert_eq!(state.permanent_focus_owner, Some(c2));

    assert_eq!(s.peer.count(EventId::WindowLostFocus, w1), 1);
    assert_eq!(s.peer.count(EventId::WindowDeactivated, w1), 1);
    assert_eq!(s.peer.count(EventId::FocusLost, c1), 1);
    assert_eq!(s.peer.count(EventId::FocusGained, c2), 1);
    assert_eq!(s.kit.tree().temporary_lost_component(w1), Some(c1));

    info!("and back: the temporarily lost component regains focus");
    s.focus_window(w1);
    assert_eq!(s.owner(), Some(c1));
    assert_eq!(s.kit.tree().temporary_lost_component(w1), None);
    assert_eq!(s.peer.count(EventId::FocusLost, c2), 1);
}

#[test]
fn losing_window_in_disposed_context_is_cleared_locally() {
    let s = Scene::new();
    let (ctx_a, ctx_b) = (s.kit.create_context(), s.kit.create_context());
    let w1 = s.frame(&ctx_a);
    let _c1 = s.leaf(w1);
    let w2 = s.frame(&ctx_b);
    let c2 = s.leaf(w2);

    s.focus_window(w1);
    assert!(s.kit.dispose_context(ctx_a.id()));

    s.focus_window(w2);
    assert_eq!(s.kit.focus().state().focused_window(), Some(w2));
    assert_eq!(s.kit.focus().state().active_window(), Some(w2));
    assert_eq!(s.owner(), Some(c2));
    assert_eq!(s.peer.count(EventId::WindowLostFocus, w1), 0);
}

// ═════════════════════════════════════════════════════════════════════════
// Type-ahead
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn keys_after_a_pending_focus_change_wait_for_the_new_owner() {
    let s = Scene::new();
    let ctx = s.kit.create_context();
    let frame = s.frame(&ctx);
    let a = s.leaf(frame);
    let b = s.leaf(frame);
    s.focus_window(frame);
    assert_eq!(s.owner(), Some(a));

    let coordinator = s.kit.coordinator(ctx.id()).unwrap();
    coordinator.enqueue_key_events(100, b);
    for (ch, when) in [('1', 50), ('2', 120), ('3', 150)] {
        ctx.post_event(typed(ch, when));
    }
    s.kit.flush_all().unwrap();
    assert_eq!(s.peer.keys(), vec![('1', a)]);
    assert_eq!(coordinator.held_key_events(), 2);

    s.kit.post_event(Event::focus_gained(b, Some(a), false, 100));
    s.kit.flush_all().unwrap();
    assert_eq!(s.owner(), Some(b));
    assert_eq!(s.peer.keys(), vec![('1', a), ('2', b), ('3', b)]);
    assert_eq!(coordinator.held_key_events(), 0);
    assert!(coordinator.type_ahead_markers().is_empty());
}

#[test]
fn tab_traverses_on_the_dispatch_thread() {
    let s = Scene::new();
    let ctx = s.kit.create_context();
    let frame = s.frame(&ctx);
    let a = s.leaf(frame);
    let b = s.leaf(frame);
    s.focus_window(frame);

    let tab = KeyData::new(KeyCode::Tab, None, Modifiers::empty());
    ctx.post_event(Event::key(EventId::KeyPressed, a, now_millis(), tab));
    s.kit.flush_all().unwrap();
    assert_eq!(s.owner(), Some(b));
    assert!(s.peer.keys().is_empty());
}

// ═════════════════════════════════════════════════════════════════════════
// Removal and clearing
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn removing_the_focused_subtree_clears_owner_slots() {
    let s = Scene::new();
    let ctx = s.kit.create_context();
    let frame = s.frame(&ctx);
    let panel = s.container(frame);
    let field = s.leaf(panel);
    s.focus_window(frame);
    assert_eq!(s.owner(), Some(field));

    let removed = s.kit.remove_component(panel);
    assert_eq!(removed.len(), 2);
    assert!(!s.kit.tree().contains(field));
    let state = s.kit.focus().state().snapshot();
    assert_eq!(state.focus_owner, None);
    assert_eq!(state.permanent_focus_owner, None);
    assert_eq!(state.focused_window, Some(frame));
}

#[test]
fn clearing_the_global_owner_keeps_the_window_focused() {
    let s = Scene::new();
    let ctx = s.kit.create_context();
    let frame = s.frame(&ctx);
    let field = s.leaf(frame);
    s.focus_window(frame);

    s.kit.focus().clear_global_focus_owner();
    s.kit.flush_all().unwrap();
    let state = s.kit.focus().state().snapshot();
    assert_eq!(state.focus_owner, None);
    assert_eq!(state.permanent_focus_owner, None);
    assert_eq!(state.focused_window, Some(frame));
    assert_eq!(s.peer.count(EventId::FocusLost, field), 1);
}
