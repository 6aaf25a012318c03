#![forbid(unsafe_code)]

//! Focus traversal policies.
//!
//! A policy answers "what comes after / before this component" inside one
//! focus cycle. [`ContainerOrderPolicy`] walks the cycle root's subtree in
//! container order; nested cycle roots are a single stop whose insides are
//! reached through the root's own policy.

use std::sync::{Arc, PoisonError, RwLock};

use ftk_core::component::{ComponentId, ComponentTree};
use rustc_hash::FxHashMap;

/// Traversal order inside a focus cycle.
pub trait FocusTraversalPolicy: Send + Sync {
    /// Next component after `current` in `root`'s cycle, wrapping around.
    fn component_after(
        &self,
        tree: &ComponentTree,
        policies: &PolicyRegistry,
        root: ComponentId,
        current: ComponentId,
    ) -> Option<ComponentId>;

    /// Previous component before `current`, wrapping around.
    fn component_before(
        &self,
        tree: &ComponentTree,
        policies: &PolicyRegistry,
        root: ComponentId,
        current: ComponentId,
    ) -> Option<ComponentId>;

    fn first_component(
        &self,
        tree: &ComponentTree,
        policies: &PolicyRegistry,
        root: ComponentId,
    ) -> Option<ComponentId>;

    fn last_component(
        &self,
        tree: &ComponentTree,
        policies: &PolicyRegistry,
        root: ComponentId,
    ) -> Option<ComponentId>;

    /// Component that receives focus when traversal enters `root`.
    fn default_component(
        &self,
        tree: &ComponentTree,
        policies: &PolicyRegistry,
        root: ComponentId,
    ) -> Option<ComponentId> {
        self.first_component(tree, policies, root)
    }

    /// Component focused when `window` is shown for the first time.
    fn initial_component(
        &self,
        tree: &ComponentTree,
        policies: &PolicyRegistry,
        window: ComponentId,
    ) -> Option<ComponentId> {
        self.default_component(tree, policies, window)
    }
}

/// Per-root policy overrides over a shared default.
pub struct PolicyRegistry {
    default: Arc<dyn FocusTraversalPolicy>,
    overrides: RwLock<FxHashMap<ComponentId, Arc<dyn FocusTraversalPolicy>>>,
}

impl std::fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let overrides = self.overrides.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("PolicyRegistry")
            .field("overrides", &overrides.len())
            .finish_non_exhaustive()
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new(Arc::new(ContainerOrderPolicy::default()))
    }
}

impl PolicyRegistry {
    #[must_use]
    pub fn new(default: Arc<dyn FocusTraversalPolicy>) -> Self {
        Self {
            default,
            overrides: RwLock::new(FxHashMap::default()),
        }
    }

    #[must_use]
    pub fn default_policy(&self) -> Arc<dyn FocusTraversalPolicy> {
        Arc::clone(&self.default)
    }

    /// Install (or with `None`, remove) the policy for `root`.
    pub fn set_policy(&self, root: ComponentId, policy: Option<Arc<dyn FocusTraversalPolicy>>) {
        let mut overrides = self.overrides.write().unwrap_or_else(PoisonError::into_inner);
        match policy {
            Some(p) => overrides.insert(root, p),
            None => overrides.remove(&root),
        };
    }

    /// Policy governing `root`: its own, else the nearest enclosing cycle
    /// root's, else the default.
    #[must_use]
    pub fn policy_for(&self, tree: &ComponentTree, root: ComponentId) -> Arc<dyn FocusTraversalPolicy> {
        let overrides = self.overrides.read().unwrap_or_else(PoisonError::into_inner);
        let mut cur = Some(root);
        while let Some(c) = cur {
            if let Some(p) = overrides.get(&c) {
                return Arc::clone(p);
            }
            cur = tree.focus_cycle_root_ancestor(c);
        }
        Arc::clone(&self.default)
    }
}

/// Container-order traversal.
#[derive(Debug, Clone)]
pub struct ContainerOrderPolicy {
    /// Entering a nested cycle root moves straight to its default component.
    pub implicit_down_cycle: bool,
}

impl Default for ContainerOrderPolicy {
    fn default() -> Self {
        Self {
            implicit_down_cycle: true,
        }
    }
}

impl ContainerOrderPolicy {
    /// Focusable right now: not a window, showing, focusable, and enabled
    /// along with every ancestor up to its window.
    #[must_use]
    pub fn accept(tree: &ComponentTree, c: ComponentId) -> bool {
        if tree.is_window(c) || !tree.is_showing(c) || !tree.is_focusable(c) {
            return false;
        }
        let mut cur = Some(c);
        while let Some(id) = cur {
            if !tree.is_enabled(id) {
                return false;
            }
            if tree.is_window(id) {
                break;
            }
            cur = tree.parent(id);
        }
        true
    }

    /// Stops of `root`'s cycle in container order. Owned windows are skipped
    /// and nested cycle roots are not descended into.
    fn stops(tree: &ComponentTree, root: ComponentId) -> Vec<ComponentId> {
        let mut out = Vec::new();
        let mut stack: Vec<ComponentId> = tree.children(root).into_iter().rev().collect();
        while let Some(c) = stack.pop() {
            if tree.is_window(c) {
                continue;
            }
            out.push(c);
            if !tree.is_focus_cycle_root(c) {
                stack.extend(tree.children(c).into_iter().rev());
            }
        }
        out
    }

    /// The stop that stands for `current` in `root`'s cycle.
    fn stop_for(tree: &ComponentTree, root: ComponentId, current: ComponentId) -> Option<ComponentId> {
        let mut cur = current;
        loop {
            match tree.focus_cycle_root_ancestor(cur) {
                Some(r) if r == root => return Some(cur),
                Some(r) => cur = r,
                None => return None,
            }
        }
    }

    fn resolve_forward(
        &self,
        tree: &ComponentTree,
        policies: &PolicyRegistry,
        stop: ComponentId,
    ) -> Option<ComponentId> {
        if self.implicit_down_cycle && tree.is_focus_cycle_root(stop) {
            let nested = policies.policy_for(tree, stop);
            if let Some(d) = nested.default_component(tree, policies, stop) {
                return Some(d);
            }
        }
        Self::accept(tree, stop).then_some(stop)
    }

    fn resolve_backward(
        &self,
        tree: &ComponentTree,
        policies: &PolicyRegistry,
        stop: ComponentId,
    ) -> Option<ComponentId> {
        if Self::accept(tree, stop) {
            return Some(stop);
        }
        if self.implicit_down_cycle && tree.is_focus_cycle_root(stop) {
            return policies
                .policy_for(tree, stop)
                .last_component(tree, policies, stop);
        }
        None
    }
}

impl FocusTraversalPolicy for ContainerOrderPolicy {
    fn component_after(
        &self,
        tree: &ComponentTree,
        policies: &PolicyRegistry,
        root: ComponentId,
        current: ComponentId,
    ) -> Option<ComponentId> {
        let stops = Self::stops(tree, root);
        let start = Self::stop_for(tree, root, current)
            .and_then(|s| stops.iter().position(|c| *c == s))
            .map_or(0, |i| i + 1);
        stops[start.min(stops.len())..]
            .iter()
            .find_map(|s| self.resolve_forward(tree, policies, *s))
            .or_else(|| self.first_component(tree, policies, root))
    }

    fn component_before(
        &self,
        tree: &ComponentTree,
        policies: &PolicyRegistry,
        root: ComponentId,
        current: ComponentId,
    ) -> Option<ComponentId> {
        let stops = Self::stops(tree, root);
        let end = Self::stop_for(tree, root, current)
            .and_then(|s| stops.iter().position(|c| *c == s))
            .unwrap_or(stops.len());
        stops[..end]
            .iter()
            .rev()
            .find_map(|s| self.resolve_backward(tree, policies, *s))
            .or_else(|| self.last_component(tree, policies, root))
    }

    fn first_component(
        &self,
        tree: &ComponentTree,
        policies: &PolicyRegistry,
        root: ComponentId,
    ) -> Option<ComponentId> {
        Self::stops(tree, root)
            .into_iter()
            .find_map(|s| self.resolve_forward(tree, policies, s))
    }

    fn last_component(
        &self,
        tree: &ComponentTree,
        policies: &PolicyRegistry,
        root: ComponentId,
    ) -> Option<ComponentId> {
        Self::stops(tree, root)
            .into_iter()
            .rev()
            .find_map(|s| self.resolve_backward(tree, policies, s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ftk_core::component::{ComponentSpec, ContextId};

    struct Form {
        tree: ComponentTree,
        frame: ComponentId,
        a: ComponentId,
        group: ComponentId,
        b: ComponentId,
        c: ComponentId,
        d: ComponentId,
    }

    /// frame { a, group(cycle root) { b, c }, d, popup { x } }
    fn form() -> Form {
        let tree = ComponentTree::new();
        let frame = tree.insert(ComponentSpec::frame(ContextId::new(0)));
        let a = tree.insert(ComponentSpec::leaf(frame));
        let group = tree.insert(ComponentSpec::container(frame).with_focus_cycle_root(true));
        let b = tree.insert(ComponentSpec::leaf(group));
        let c = tree.insert(ComponentSpec::leaf(group));
        let d = tree.insert(ComponentSpec::leaf(frame));
        let popup = tree.insert(ComponentSpec::window(frame));
        tree.insert(ComponentSpec::leaf(popup));
        Form {
            tree,
            frame,
            a,
            group,
            b,
            c,
            d,
        }
    }

    #[test]
    fn forward_walk_dives_into_nested_cycle() {
        let f = form();
        let reg = PolicyRegistry::default();
        let p = reg.policy_for(&f.tree, f.frame);
        assert_eq!(p.first_component(&f.tree, &reg, f.frame), Some(f.a));
        assert_eq!(p.component_after(&f.tree, &reg, f.frame, f.a), Some(f.b));
        // Inside the nested cycle, the outer cycle sees the group as one stop.
        assert_eq!(p.component_after(&f.tree, &reg, f.frame, f.b), Some(f.d));
        assert_eq!(p.component_after(&f.tree, &reg, f.frame, f.d), Some(f.a));
        assert_eq!(p.component_after(&f.tree, &reg, f.group, f.b), Some(f.c));
        assert_eq!(p.component_after(&f.tree, &reg, f.group, f.c), Some(f.b));
    }

    #[test]
    fn backward_walk_and_last() {
        let f = form();
        let reg = PolicyRegistry::default();
        let p = reg.policy_for(&f.tree, f.frame);
        assert_eq!(p.last_component(&f.tree, &reg, f.frame), Some(f.d));
        assert_eq!(p.component_before(&f.tree, &reg, f.frame, f.d), Some(f.c));
        assert_eq!(p.component_before(&f.tree, &reg, f.frame, f.a), Some(f.d));
    }

    #[test]
    fn skips_unfocusable_hidden_and_disabled() {
        let f = form();
        let reg = PolicyRegistry::default();
        let p = reg.policy_for(&f.tree, f.frame);
        f.tree.set_focusable(f.a, false);
        f.tree.set_enabled(f.group, false);
        assert_eq!(p.first_component(&f.tree, &reg, f.frame), Some(f.d));
        f.tree.set_visible(f.d, false);
        assert_eq!(p.first_component(&f.tree, &reg, f.frame), None);
    }

    #[test]
    fn overrides_are_inherited_by_nested_roots() {
        struct Nothing;
        impl FocusTraversalPolicy for Nothing {
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
        let f = form();
        let reg = PolicyRegistry::default();
        reg.set_policy(f.frame, Some(Arc::new(Nothing)));
        let nested = reg.policy_for(&f.tree, f.group);
        assert_eq!(nested.first_component(&f.tree, &reg, f.group), None);
        reg.set_policy(f.frame, None);
        let nested = reg.policy_for(&f.tree, f.group);
        assert_eq!(nested.first_component(&f.tree, &reg, f.group), Some(f.b));
    }
}
