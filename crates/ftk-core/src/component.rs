#![forbid(unsafe_code)]

//! Component registry: identity, hierarchy, focus-relevant flags, and peers.
//!
//! Components are plain records in a [`ComponentTree`] arena keyed by
//! [`ComponentId`]. Behaviour is attached through the [`ComponentPeer`]
//! capability trait instead of a type hierarchy, so a "button" and a "text
//! field" differ only in the peer they register.
//!
//! # Invariants
//!
//! 1. Ids are unique and never reused within a tree.
//! 2. `parent`/`children` links are kept symmetric; removing a component
//!    removes its whole subtree.
//! 3. A top-level window's `parent` is its *owner* window (or `None`). Walks
//!    that must stop at a window boundary check [`ComponentKind::is_window`].
//! 4. Peer callbacks are never invoked while the tree lock is held.
//!
//! # Failure Modes
//!
//! Lookups of unknown ids return `None`/`false` rather than panicking: the
//! focus manager routinely races with component removal.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::coalesce::{Coalescer, default_coalesce};
use crate::event::Event;
use crate::keystroke::KeyStroke;

/// Unique identifier for a registered component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u64);

impl ComponentId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of a GUI context (one event queue, one dispatch thread).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ContextId(u32);

impl ContextId {
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx{}", self.0)
    }
}

/// Structural role of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    /// Decorated top-level window.
    Frame,
    /// Top-level window that may be modal.
    Dialog,
    /// Undecorated window, usually owned by a frame or dialog.
    Window,
    Container,
    Leaf,
}

impl ComponentKind {
    #[inline]
    #[must_use]
    pub const fn is_window(self) -> bool {
        matches!(self, Self::Frame | Self::Dialog | Self::Window)
    }

    #[inline]
    #[must_use]
    pub const fn is_container(self) -> bool {
        !matches!(self, Self::Leaf)
    }

    /// Windows that can become the active window.
    #[inline]
    #[must_use]
    pub const fn is_frame_or_dialog(self) -> bool {
        matches!(self, Self::Frame | Self::Dialog)
    }
}

/// The four per-component traversal key sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraversalKind {
    Forward,
    Backward,
    UpCycle,
    DownCycle,
}

impl TraversalKind {
    pub const ALL: [TraversalKind; 4] = [
        TraversalKind::Forward,
        TraversalKind::Backward,
        TraversalKind::UpCycle,
        TraversalKind::DownCycle,
    ];

    const fn index(self) -> usize {
        match self {
            Self::Forward => 0,
            Self::Backward => 1,
            Self::UpCycle => 2,
            Self::DownCycle => 3,
        }
    }
}

/// Native classification of a key event with respect to focus traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraversalHint {
    #[default]
    Ignore,
    Consume,
    FocusNext,
    FocusPrevious,
}

/// Behaviour a component exposes to the runtime.
///
/// Everything has a default so test peers only implement what they observe.
pub trait ComponentPeer: Send + Sync {
    /// Deliver an event to the component's listeners.
    fn dispatch_event(&self, _event: &mut Event) {}

    /// Merge a newly posted event into a queued one with the same id.
    /// Runs under the queue lock; see [`Coalescer::coalesce`].
    fn coalesce_events(&self, existing: &Event, new: &Event) -> Option<Event> {
        default_coalesce(existing, new)
    }

    /// Native processing after listeners have run.
    fn handle_event(&self, _event: &Event) {}

    /// Container hook for unconsumed key events (menu shortcuts and the like).
    fn post_process_key_event(&self, _event: &mut Event) {}

    /// Native opinion on whether a key event moves focus.
    fn traversal_hint(&self, _event: &Event) -> TraversalHint {
        TraversalHint::Ignore
    }

    /// Lightweight peers have no native window; native work goes to the
    /// nearest heavyweight ancestor.
    fn is_lightweight(&self) -> bool {
        false
    }
}

/// Construction parameters for [`ComponentTree::insert`].
#[derive(Clone)]
pub struct ComponentSpec {
    kind: ComponentKind,
    parent: Option<ComponentId>,
    context: ContextId,
    visible: bool,
    focusable: bool,
    enabled: bool,
    focusable_window: bool,
    focus_cycle_root: bool,
    traversal_keys_enabled: bool,
    peer: Option<Arc<dyn ComponentPeer>>,
}

impl fmt::Debug for ComponentSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentSpec")
            .field("kind", &self.kind)
            .field("parent", &self.parent)
            .field("context", &self.context)
            .field("has_peer", &self.peer.is_some())
            .finish_non_exhaustive()
    }
}

impl ComponentSpec {
    #[must_use]
    pub fn new(kind: ComponentKind) -> Self {
        Self {
            kind,
            parent: None,
            context: ContextId::default(),
            visible: true,
            focusable: !matches!(kind, ComponentKind::Container),
            enabled: true,
            focusable_window: true,
            focus_cycle_root: kind.is_window(),
            traversal_keys_enabled: true,
            peer: None,
        }
    }

    /// Top-level frame in `context`.
    #[must_use]
    pub fn frame(context: ContextId) -> Self {
        Self::new(ComponentKind::Frame).in_context(context)
    }

    /// Dialog owned by `owner` (context inherited).
    #[must_use]
    pub fn dialog(owner: ComponentId) -> Self {
        Self::new(ComponentKind::Dialog).with_parent(owner)
    }

    /// Plain window owned by `owner` (context inherited).
    #[must_use]
    pub fn window(owner: ComponentId) -> Self {
        Self::new(ComponentKind::Window).with_parent(owner)
    }

    #[must_use]
    pub fn container(parent: ComponentId) -> Self {
        Self::new(ComponentKind::Container).with_parent(parent)
    }

    #[must_use]
    pub fn leaf(parent: ComponentId) -> Self {
        Self::new(ComponentKind::Leaf).with_parent(parent)
    }

    #[must_use]
    pub fn with_parent(mut self, parent: ComponentId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Only honoured for parentless components; children inherit.
    #[must_use]
    pub fn in_context(mut self, context: ContextId) -> Self {
        self.context = context;
        self
    }

    #[must_use]
    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    #[must_use]
    pub fn with_focusable(mut self, focusable: bool) -> Self {
        self.focusable = focusable;
        self
    }

    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_focusable_window(mut self, focusable: bool) -> Self {
        self.focusable_window = focusable;
        self
    }

    #[must_use]
    pub fn with_focus_cycle_root(mut self, root: bool) -> Self {
        self.focus_cycle_root = root;
        self
    }

    #[must_use]
    pub fn with_traversal_keys_enabled(mut self, enabled: bool) -> Self {
        self.traversal_keys_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_peer(mut self, peer: Arc<dyn ComponentPeer>) -> Self {
        self.peer = Some(peer);
        self
    }
}

struct Node {
    kind: ComponentKind,
    parent: Option<ComponentId>,
    children: Vec<ComponentId>,
    context: ContextId,
    visible: bool,
    focusable: bool,
    enabled: bool,
    focusable_window: bool,
    focus_cycle_root: bool,
    traversal_keys_enabled: bool,
    traversal_keys: [Option<HashSet<KeyStroke>>; 4],
    peer: Option<Arc<dyn ComponentPeer>>,
    temporary_lost: Option<ComponentId>,
    most_recent_focus_owner: Option<ComponentId>,
}

/// Arena of components shared by every context.
#[derive(Default)]
pub struct ComponentTree {
    nodes: RwLock<HashMap<ComponentId, Node>>,
    next_id: AtomicU64,
}

impl fmt::Debug for ComponentTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentTree")
            .field("len", &self.read().len())
            .finish()
    }
}

impl ComponentTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ComponentId, Node>> {
        self.nodes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ComponentId, Node>> {
        self.nodes.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a component and return its id.
    ///
    /// A spec naming an unknown parent is inserted parentless.
    pub fn insert(&self, spec: ComponentSpec) -> ComponentId {
        let id = ComponentId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let mut nodes = self.write();
        let parent = spec.parent.filter(|p| nodes.contains_key(p));
        let context = parent
            .and_then(|p| nodes.get(&p))
            .map_or(spec.context, |p| p.context);
        if let Some(p) = parent.and_then(|p| nodes.get_mut(&p)) {
            p.children.push(id);
        }
        nodes.insert(
            id,
            Node {
                kind: spec.kind,
                parent,
                children: Vec::new(),
                context,
                visible: spec.visible,
                focusable: spec.focusable,
                enabled: spec.enabled,
                focusable_window: spec.focusable_window,
                focus_cycle_root: spec.focus_cycle_root || spec.kind.is_window(),
                traversal_keys_enabled: spec.traversal_keys_enabled,
                traversal_keys: Default::default(),
                peer: spec.peer,
                temporary_lost: None,
                most_recent_focus_owner: None,
            },
        );
        id
    }

    /// Remove `id` and its subtree. Returns removed ids, root first.
    pub fn remove(&self, id: ComponentId) -> Vec<ComponentId> {
        let mut nodes = self.write();
        let Some(parent) = nodes.get(&id).map(|n| n.parent) else {
            return Vec::new();
        };
        if let Some(p) = parent.and_then(|p| nodes.get_mut(&p)) {
            p.children.retain(|c| *c != id);
        }
        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = nodes.remove(&next) {
                stack.extend(node.children.iter().rev());
                removed.push(next);
            }
        }
        for node in nodes.values_mut() {
            if node.temporary_lost.is_some_and(|c| removed.contains(&c)) {
                node.temporary_lost = None;
            }
            if node.most_recent_focus_owner.is_some_and(|c| removed.contains(&c)) {
                node.most_recent_focus_owner = None;
            }
        }
        removed
    }

    #[must_use]
    pub fn contains(&self, id: ComponentId) -> bool {
        self.read().contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    #[must_use]
    pub fn kind(&self, id: ComponentId) -> Option<ComponentKind> {
        self.read().get(&id).map(|n| n.kind)
    }

    #[must_use]
    pub fn is_window(&self, id: ComponentId) -> bool {
        self.kind(id).is_some_and(ComponentKind::is_window)
    }

    #[must_use]
    pub fn parent(&self, id: ComponentId) -> Option<ComponentId> {
        self.read().get(&id).and_then(|n| n.parent)
    }

    /// Children in insertion (container) order.
    #[must_use]
    pub fn children(&self, id: ComponentId) -> Vec<ComponentId> {
        self.read()
            .get(&id)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn context_of(&self, id: ComponentId) -> Option<ContextId> {
        self.read().get(&id).map(|n| n.context)
    }

    /// Top-level windows, in id order.
    #[must_use]
    pub fn windows(&self) -> Vec<ComponentId> {
        let mut out: Vec<_> = self
            .read()
            .iter()
            .filter(|(_, n)| n.kind.is_window())
            .map(|(id, _)| *id)
            .collect();
        out.sort();
        out
    }

    /// The window containing `id` (itself if it is a window).
    #[must_use]
    pub fn window_of(&self, id: ComponentId) -> Option<ComponentId> {
        let nodes = self.read();
        let mut cur = Some(id);
        while let Some(c) = cur {
            let node = nodes.get(&c)?;
            if node.kind.is_window() {
                return Some(c);
            }
            cur = node.parent;
        }
        None
    }

    /// Nearest frame or dialog at or above `window` along the owner chain.
    #[must_use]
    pub fn owning_frame_or_dialog(&self, window: ComponentId) -> Option<ComponentId> {
        let nodes = self.read();
        let mut cur = Some(window);
        while let Some(c) = cur {
            let node = nodes.get(&c)?;
            if node.kind.is_frame_or_dialog() {
                return Some(c);
            }
            cur = node.parent;
        }
        None
    }

    /// `id == ancestor` or `ancestor` is above `id`, crossing window owners.
    #[must_use]
    pub fn is_descendant_of(&self, id: ComponentId, ancestor: ComponentId) -> bool {
        let nodes = self.read();
        let mut cur = Some(id);
        while let Some(c) = cur {
            if c == ancestor {
                return true;
            }
            cur = nodes.get(&c).and_then(|n| n.parent);
        }
        false
    }

    /// Like [`Self::is_descendant_of`] but the walk stops at the first window.
    #[must_use]
    pub fn is_within_window_subtree(&self, id: ComponentId, ancestor: ComponentId) -> bool {
        let nodes = self.read();
        let mut cur = Some(id);
        while let Some(c) = cur {
            if c == ancestor {
                return true;
            }
            let Some(node) = nodes.get(&c) else {
                return false;
            };
            if node.kind.is_window() {
                return false;
            }
            cur = node.parent;
        }
        false
    }

    /// Visible, with every ancestor up to and including its window visible.
    #[must_use]
    pub fn is_showing(&self, id: ComponentId) -> bool {
        let nodes = self.read();
        let mut cur = Some(id);
        while let Some(c) = cur {
            let Some(node) = nodes.get(&c) else {
                return false;
            };
            if !node.visible {
                return false;
            }
            if node.kind.is_window() {
                return true;
            }
            cur = node.parent;
        }
        false
    }

    #[must_use]
    pub fn is_visible(&self, id: ComponentId) -> bool {
        self.read().get(&id).is_some_and(|n| n.visible)
    }

    #[must_use]
    pub fn is_focusable(&self, id: ComponentId) -> bool {
        self.read().get(&id).is_some_and(|n| n.focusable)
    }

    #[must_use]
    pub fn is_enabled(&self, id: ComponentId) -> bool {
        self.read().get(&id).is_some_and(|n| n.enabled)
    }

    /// A window that may become the focused window: flagged focusable and
    /// visible. A plain window additionally needs a showing frame or dialog
    /// among its owners.
    #[must_use]
    pub fn is_focusable_window(&self, id: ComponentId) -> bool {
        let (kind, owner) = {
            let nodes = self.read();
            match nodes.get(&id) {
                Some(n) if n.kind.is_window() && n.focusable_window && n.visible => {
                    (n.kind, n.parent)
                }
                _ => return false,
            }
        };
        if kind.is_frame_or_dialog() {
            return true;
        }
        owner
            .and_then(|o| self.owning_frame_or_dialog(o))
            .is_some_and(|f| self.is_showing(f))
    }

    /// `id` belongs to the traversal cycle rooted at `root`: either it is that
    /// root or its nearest cycle root ancestor is.
    #[must_use]
    pub fn is_in_focus_cycle(&self, id: ComponentId, root: ComponentId) -> bool {
        (id == root && self.is_focus_cycle_root(id)) || self.focus_cycle_root_ancestor(id) == Some(root)
    }

    /// Windows are always cycle roots.
    #[must_use]
    pub fn is_focus_cycle_root(&self, id: ComponentId) -> bool {
        self.read()
            .get(&id)
            .is_some_and(|n| n.kind.is_window() || n.focus_cycle_root)
    }

    /// Nearest cycle root strictly above `id`, stopping at its window.
    /// Windows have none.
    #[must_use]
    pub fn focus_cycle_root_ancestor(&self, id: ComponentId) -> Option<ComponentId> {
        let nodes = self.read();
        let node = nodes.get(&id)?;
        if node.kind.is_window() {
            return None;
        }
        let mut cur = node.parent;
        while let Some(c) = cur {
            let n = nodes.get(&c)?;
            if n.kind.is_window() || n.focus_cycle_root {
                return Some(c);
            }
            cur = n.parent;
        }
        None
    }

    #[must_use]
    pub fn traversal_keys_enabled(&self, id: ComponentId) -> bool {
        self.read().get(&id).is_some_and(|n| n.traversal_keys_enabled)
    }

    /// Traversal keys set on `id` or inherited from the nearest ancestor that
    /// sets them (stopping after its window). `None` means "use defaults".
    #[must_use]
    pub fn traversal_keys(&self, id: ComponentId, kind: TraversalKind) -> Option<HashSet<KeyStroke>> {
        let nodes = self.read();
        let mut cur = Some(id);
        while let Some(c) = cur {
            let node = nodes.get(&c)?;
            if let Some(keys) = &node.traversal_keys[kind.index()] {
                return Some(keys.clone());
            }
            if node.kind.is_window() {
                return None;
            }
            cur = node.parent;
        }
        None
    }

    pub fn set_traversal_keys(
        &self,
        id: ComponentId,
        kind: TraversalKind,
        keys: Option<HashSet<KeyStroke>>,
    ) {
        if let Some(node) = self.write().get_mut(&id) {
            node.traversal_keys[kind.index()] = keys;
        }
    }

    pub fn set_visible(&self, id: ComponentId, visible: bool) {
        if let Some(node) = self.write().get_mut(&id) {
            node.visible = visible;
        }
    }

    pub fn set_focusable(&self, id: ComponentId, focusable: bool) {
        if let Some(node) = self.write().get_mut(&id) {
            node.focusable = focusable;
        }
    }

    pub fn set_enabled(&self, id: ComponentId, enabled: bool) {
        if let Some(node) = self.write().get_mut(&id) {
            node.enabled = enabled;
        }
    }

    pub fn set_focusable_window(&self, id: ComponentId, focusable: bool) {
        if let Some(node) = self.write().get_mut(&id) {
            node.focusable_window = focusable;
        }
    }

    pub fn set_focus_cycle_root(&self, id: ComponentId, root: bool) {
        if let Some(node) = self.write().get_mut(&id) {
            node.focus_cycle_root = root;
        }
    }

    pub fn set_traversal_keys_enabled(&self, id: ComponentId, enabled: bool) {
        if let Some(node) = self.write().get_mut(&id) {
            node.traversal_keys_enabled = enabled;
        }
    }

    #[must_use]
    pub fn peer(&self, id: ComponentId) -> Option<Arc<dyn ComponentPeer>> {
        self.read().get(&id).and_then(|n| n.peer.clone())
    }

    pub fn set_peer(&self, id: ComponentId, peer: Option<Arc<dyn ComponentPeer>>) {
        if let Some(node) = self.write().get_mut(&id) {
            node.peer = peer;
        }
    }

    /// Nearest component at or above `id` with a heavyweight peer.
    #[must_use]
    pub fn native_container(&self, id: ComponentId) -> Option<ComponentId> {
        let nodes = self.read();
        let mut cur = Some(id);
        while let Some(c) = cur {
            let node = nodes.get(&c)?;
            if node.peer.as_ref().is_some_and(|p| !p.is_lightweight()) {
                return Some(c);
            }
            cur = node.parent;
        }
        None
    }

    /// `id` itself if it is a container, else its parent.
    #[must_use]
    pub fn enclosing_container(&self, id: ComponentId) -> Option<ComponentId> {
        let nodes = self.read();
        let node = nodes.get(&id)?;
        if node.kind.is_container() {
            Some(id)
        } else {
            node.parent
        }
    }

    /// Component that lost focus temporarily when `window` was deactivated.
    #[must_use]
    pub fn temporary_lost_component(&self, window: ComponentId) -> Option<ComponentId> {
        self.read().get(&window).and_then(|n| n.temporary_lost)
    }

    /// Set the window's temporarily lost component, returning the old value.
    pub fn set_temporary_lost_component(
        &self,
        window: ComponentId,
        component: Option<ComponentId>,
    ) -> Option<ComponentId> {
        let mut nodes = self.write();
        let node = nodes.get_mut(&window)?;
        std::mem::replace(&mut node.temporary_lost, component)
    }

    /// Last component that owned (or requested) focus inside `window`.
    #[must_use]
    pub fn most_recent_focus_owner(&self, window: ComponentId) -> Option<ComponentId> {
        self.read().get(&window).and_then(|n| n.most_recent_focus_owner)
    }

    pub fn set_most_recent_focus_owner(&self, window: ComponentId, component: Option<ComponentId>) {
        if let Some(node) = self.write().get_mut(&window) {
            node.most_recent_focus_owner = component;
        }
    }

    /// Hand `event` to the component's peer, if any.
    pub fn deliver(&self, id: ComponentId, event: &mut Event) -> bool {
        match self.peer(id) {
            Some(peer) => {
                peer.dispatch_event(event);
                true
            }
            None => false,
        }
    }
}

impl Coalescer for ComponentTree {
    fn coalesce(&self, source: ComponentId, existing: &Event, new: &Event) -> Option<Event> {
        if !self.contains(source) {
            return None;
        }
        match self.peer(source) {
            Some(peer) => peer.coalesce_events(existing, new),
            None => default_coalesce(existing, new),
        }
    }
}
