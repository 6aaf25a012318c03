#![forbid(unsafe_code)]

//! Shared focus machinery and the operations that cross contexts.
//!
//! [`FocusSystem`] owns what every context's coordinator shares: the
//! component tree, the context registry, the global [`FocusState`], the
//! traversal policies, and the configuration. Focus requests and traversal
//! live here because their target may belong to any context; each request is
//! routed to the coordinator of the target's context.

use std::sync::{Arc, PoisonError, RwLock};

use ftk_core::component::{ComponentId, ComponentTree, ContextId};
use ftk_core::event::Event;
use ftk_runtime::{AppContext, ContextRegistry, DispatchMode};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::config::FocusConfig;
use crate::coordinator::FocusCoordinator;
use crate::dispatcher::FocusDispatcher;
use crate::policy::PolicyRegistry;
use crate::state::FocusState;

/// Focus state, policies, and the coordinator of every attached context.
pub struct FocusSystem {
    tree: Arc<ComponentTree>,
    contexts: Arc<ContextRegistry>,
    state: Arc<FocusState>,
    policies: PolicyRegistry,
    config: FocusConfig,
    coordinators: RwLock<FxHashMap<ContextId, Arc<FocusCoordinator>>>,
}

impl std::fmt::Debug for FocusSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FocusSystem")
            .field("state", &self.state.snapshot())
            .field("contexts", &self.attached())
            .finish_non_exhaustive()
    }
}

impl FocusSystem {
    #[must_use]
    pub fn new(
        tree: Arc<ComponentTree>,
        contexts: Arc<ContextRegistry>,
        config: FocusConfig,
    ) -> Arc<Self> {
        Self::with_parts(
            tree,
            contexts,
            Arc::new(FocusState::new()),
            PolicyRegistry::default(),
            config,
        )
    }

    #[must_use]
    pub fn with_parts(
        tree: Arc<ComponentTree>,
        contexts: Arc<ContextRegistry>,
        state: Arc<FocusState>,
        policies: PolicyRegistry,
        config: FocusConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            tree,
            contexts,
            state,
            policies,
            config,
            coordinators: RwLock::new(FxHashMap::default()),
        })
    }

    #[must_use]
    pub fn tree(&self) -> &ComponentTree {
        &self.tree
    }

    #[must_use]
    pub fn contexts(&self) -> &Arc<ContextRegistry> {
        &self.contexts
    }

    #[must_use]
    pub fn state(&self) -> &FocusState {
        &self.state
    }

    #[must_use]
    pub fn policies(&self) -> &PolicyRegistry {
        &self.policies
    }

    #[must_use]
    pub fn config(&self) -> &FocusConfig {
        &self.config
    }

    // ═════════════════════════════════════════════════════════════════════
    // Contexts
    // ═════════════════════════════════════════════════════════════════════

    /// Create a coordinator for `context` and install its dispatcher, with a
    /// dispatch thread started on demand.
    pub fn attach(self: &Arc<Self>, context: &Arc<AppContext>) -> Arc<FocusCoordinator> {
        self.attach_with(context, DispatchMode::Thread)
    }

    /// [`Self::attach`] with an explicit dispatch mode.
    pub fn attach_with(
        self: &Arc<Self>,
        context: &Arc<AppContext>,
        mode: DispatchMode,
    ) -> Arc<FocusCoordinator> {
        let coordinator = Arc::new(FocusCoordinator::new(Arc::clone(self), Arc::clone(context)));
        context.event_queue().install_dispatcher(
            Arc::new(FocusDispatcher::new(Arc::clone(&coordinator))),
            mode,
        );
        self.coordinators
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(context.id(), Arc::clone(&coordinator));
        debug!(context = %context.id(), ?mode, "focus coordinator attached");
        coordinator
    }

    #[must_use]
    pub fn coordinator(&self, context: ContextId) -> Option<Arc<FocusCoordinator>> {
        self.coordinators
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&context)
            .cloned()
    }

    /// Coordinator of the context `component` belongs to.
    #[must_use]
    pub fn coordinator_for(&self, component: ComponentId) -> Option<Arc<FocusCoordinator>> {
        self.tree.context_of(component).and_then(|c| self.coordinator(c))
    }

    fn attached(&self) -> Vec<ContextId> {
        let mut ids: Vec<_> = self
            .coordinators
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        ids.sort();
        ids
    }

    fn all_coordinators(&self) -> Vec<Arc<FocusCoordinator>> {
        self.coordinators
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Detach the coordinator and dispose the context.
    pub fn dispose_context(&self, context: ContextId) -> bool {
        self.coordinators
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&context);
        self.contexts.dispose(context)
    }

    /// Detach every coordinator and dispose every context.
    pub fn shutdown(&self) {
        self.coordinators
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.contexts.dispose_all();
    }

    // ═════════════════════════════════════════════════════════════════════
    // Requests
    // ═════════════════════════════════════════════════════════════════════

    /// Ask for `component` to become the focus owner, focusing its window if
    /// needed. Returns false if the request is refused outright; true means
    /// a FOCUS_GAINED is on its way (or `component` already owns focus).
    pub fn request_focus(&self, component: ComponentId, temporary: bool) -> bool {
        self.request_focus_helper(component, temporary, true)
    }

    /// Like [`Self::request_focus`] but only within the focused window. For
    /// an unfocused window the component is remembered as the window's most
    /// recent focus owner and focused when the window gains focus.
    pub fn request_focus_in_window(&self, component: ComponentId) -> bool {
        self.request_focus_helper(component, false, false)
    }

    fn request_focus_helper(
        &self,
        component: ComponentId,
        temporary: bool,
        window_change_allowed: bool,
    ) -> bool {
        let tree = &*self.tree;
        if !(tree.is_showing(component) && tree.is_focusable(component) && tree.is_enabled(component))
        {
            trace!(component = %component, "focus request refused: not focusable now");
            return false;
        }
        let Some(window) = tree.window_of(component) else {
            return false;
        };
        if window != component {
            tree.set_most_recent_focus_owner(window, Some(component));
        }
        if !tree.is_focusable_window(window) {
            trace!(component = %component, window = %window, "focus request refused: window");
            return false;
        }
        if !window_change_allowed && self.state.focused_window() != Some(window) {
            trace!(component = %component, "in-window request deferred until window focus");
            return false;
        }
        let Some(coordinator) = self.coordinator_for(component) else {
            debug!(component = %component, "focus request for unattached context");
            return false;
        };
        let owner = self.state.focus_owner();
        if owner == Some(component) && coordinator.request_count() == 0 {
            return true;
        }
        let context = coordinator.context();
        let time = context.event_queue().most_recent_event_time();
        coordinator.enqueue_key_events(time, component);
        context.post_event(Event::focus_gained(component, owner, temporary, time));
        debug!(component = %component, temporary, when = time, "focus requested");
        true
    }

    /// Remove focus from the current owner without giving it to anyone.
    /// Pending requests are dropped.
    pub fn clear_global_focus_owner(&self) {
        for coordinator in self.all_coordinators() {
            coordinator.clear_requests();
        }
        let Some(owner) = self.state.focus_owner() else {
            return;
        };
        match self.contexts.for_component(&self.tree, owner) {
            Some(context) => {
                let when = context.event_queue().most_recent_event_time();
                context.post_event(Event::focus_lost(owner, None, false, when));
                debug!(component = %owner, "clearing focus owner");
            }
            None => {
                self.state.set_focus_owner(&self.tree, None);
                self.state.set_permanent_focus_owner(&self.tree, None);
            }
        }
    }

    // ═════════════════════════════════════════════════════════════════════
    // Traversal
    // ═════════════════════════════════════════════════════════════════════

    /// Component focused when `window` first gains focus.
    #[must_use]
    pub fn initial_component(&self, window: ComponentId) -> Option<ComponentId> {
        self.policies
            .policy_for(&self.tree, window)
            .initial_component(&self.tree, &self.policies, window)
    }

    /// The component `window` would hand focus to right now.
    #[must_use]
    pub fn window_most_recent_focus_owner(&self, window: ComponentId) -> Option<ComponentId> {
        if self.state.focused_window() == Some(window) {
            return self.state.focus_owner();
        }
        self.tree.most_recent_focus_owner(window).or_else(|| {
            self.tree
                .is_focusable_window(window)
                .then(|| self.initial_component(window))
                .flatten()
        })
    }

    /// Nearest cycle root above `component` that could itself take focus,
    /// with the child of it that leads to `component`.
    fn traversal_root(&self, component: ComponentId) -> Option<(ComponentId, ComponentId)> {
        let tree = &*self.tree;
        let mut from = component;
        let mut root = tree.focus_cycle_root_ancestor(component);
        while let Some(r) = root {
            if tree.is_showing(r) && tree.is_focusable(r) && tree.is_enabled(r) {
                return Some((r, from));
            }
            from = r;
            root = tree.focus_cycle_root_ancestor(r);
        }
        None
    }

    /// Request focus for the component after (or before) `component` in its
    /// cycle, falling back to the cycle's default component.
    pub fn transfer_focus(&self, component: ComponentId, forward: bool) -> bool {
        let Some((root, from)) = self.traversal_root(component) else {
            return false;
        };
        let policy = self.policies.policy_for(&self.tree, root);
        let next = if forward {
            policy.component_after(&self.tree, &self.policies, root, from)
        } else {
            policy.component_before(&self.tree, &self.policies, root, from)
        }
        .or_else(|| policy.default_component(&self.tree, &self.policies, root));
        trace!(from = %component, to = ?next, forward, "transfer focus");
        next.is_some_and(|c| self.request_focus(c, false))
    }

    pub fn focus_next_component(&self, component: ComponentId) {
        self.transfer_focus(component, true);
    }

    pub fn focus_previous_component(&self, component: ComponentId) {
        self.transfer_focus(component, false);
    }

    /// Move focus to the cycle root above `component` and make the cycle
    /// enclosing it current. At window level, focus the window's default
    /// component instead.
    pub fn up_focus_cycle(&self, component: ComponentId) {
        let tree = &*self.tree;
        match self.traversal_root(component).map(|(root, _)| root) {
            Some(root) if !tree.is_window(root) => {
                let outer = tree.focus_cycle_root_ancestor(root).unwrap_or(root);
                self.state.set_current_focus_cycle_root(Some(outer));
                self.request_focus(root, false);
            }
            _ => {
                let Some(window) = tree.window_of(component) else {
                    return;
                };
                let policy = self.policies.policy_for(tree, window);
                if let Some(target) = policy.default_component(tree, &self.policies, window) {
                    self.state.set_current_focus_cycle_root(Some(window));
                    self.request_focus(target, false);
                }
            }
        }
    }

    /// Enter the cycle rooted at `container`, focusing its default component.
    pub fn down_focus_cycle(&self, container: ComponentId) {
        let tree = &*self.tree;
        if !tree.is_focus_cycle_root(container) {
            return;
        }
        self.state.set_current_focus_cycle_root(Some(container));
        let policy = self.policies.policy_for(tree, container);
        if let Some(target) = policy.default_component(tree, &self.policies, container) {
            self.request_focus(target, false);
        }
    }

    // ═════════════════════════════════════════════════════════════════════
    // Removal
    // ═════════════════════════════════════════════════════════════════════

    /// Remove `component` and its subtree: discard type-ahead for it, purge
    /// its queued events, and drop focus slots that referred into it.
    pub fn remove_component(&self, component: ComponentId) -> Vec<ComponentId> {
        for coordinator in self.all_coordinators() {
            coordinator.discard_key_events(component);
        }
        let context = self.contexts.for_component(&self.tree, component);
        let removed = self.tree.remove(component);
        if let Some(context) = context {
            let queue = context.event_queue();
            let purged: usize = removed.iter().map(|id| queue.remove_source_events(*id)).sum();
            trace!(component = %component, purged, "queued events purged");
        }
        let snapshot = self.state.snapshot();
        let gone = |slot: Option<ComponentId>| slot.is_some_and(|c| removed.contains(&c));
        if gone(snapshot.focus_owner) {
            self.state.set_focus_owner(&self.tree, None);
        }
        if gone(snapshot.permanent_focus_owner) {
            self.state.set_permanent_focus_owner(&self.tree, None);
        }
        if gone(snapshot.focused_window) {
            self.state.set_focused_window(&self.tree, None);
        }
        if gone(snapshot.active_window) {
            self.state.set_active_window(None);
        }
        if gone(snapshot.current_focus_cycle_root) {
            self.state.set_current_focus_cycle_root(None);
        }
        debug!(component = %component, removed = removed.len(), "component removed");
        removed
    }
}
