#![forbid(unsafe_code)]

//! Wiring of a component tree, its contexts, and the focus manager.
//!
//! A [`Toolkit`] owns one [`ComponentTree`], one [`ContextRegistry`] that
//! coalesces through the tree's peers, and one [`FocusSystem`]. Every
//! context it creates gets a focus coordinator installed as its queue's
//! dispatcher.
//!
//! ## Failure Modes
//!
//! - [`Toolkit::flush`] from a dispatch thread cannot wait for that thread
//!   and reports [`InvokeError::FromDispatchThread`].
//! - Dropping the toolkit shuts the focus system down: coordinators are
//!   detached and every context is disposed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ftk_core::component::{ComponentId, ComponentTree, ContextId};
use ftk_core::event::Event;
use ftk_focus::{FocusConfig, FocusCoordinator, FocusSystem, FocusTraversalPolicy, PolicyRegistry};
use ftk_runtime::{AppContext, ContextRegistry, DispatchMode, InvokeError, RuntimeConfig};
use tracing::{debug, warn};

/// Flush rounds before giving up on a context that keeps posting to itself.
const MAX_FLUSH_ROUNDS: usize = 1024;

/// Builder for [`Toolkit`].
#[derive(Default)]
pub struct ToolkitBuilder {
    runtime: RuntimeConfig,
    focus: FocusConfig,
    policy: Option<Arc<dyn FocusTraversalPolicy>>,
    mode: DispatchMode,
}

impl std::fmt::Debug for ToolkitBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolkitBuilder")
            .field("runtime", &self.runtime)
            .field("focus", &self.focus)
            .field("custom_policy", &self.policy.is_some())
            .field("mode", &self.mode)
            .finish()
    }
}

impl ToolkitBuilder {
    /// Runtime and focus settings from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            runtime: RuntimeConfig::from_env(),
            focus: FocusConfig::from_env(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_runtime_config(mut self, config: RuntimeConfig) -> Self {
        self.runtime = config;
        self
    }

    #[must_use]
    pub fn with_focus_config(mut self, config: FocusConfig) -> Self {
        self.focus = config;
        self
    }

    /// Default traversal policy for every focus cycle root without its own.
    #[must_use]
    pub fn with_traversal_policy(mut self, policy: Arc<dyn FocusTraversalPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// [`DispatchMode::Manual`] leaves dispatching to [`Toolkit::flush`].
    #[must_use]
    pub fn with_dispatch_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn build(self) -> Toolkit {
        let tree = Arc::new(ComponentTree::new());
        let contexts = Arc::new(ContextRegistry::new(self.runtime, tree.clone()));
        let policies = self.policy.map_or_else(PolicyRegistry::default, PolicyRegistry::new);
        let focus = FocusSystem::with_parts(
            Arc::clone(&tree),
            Arc::clone(&contexts),
            Arc::default(),
            policies,
            self.focus,
        );
        Toolkit {
            tree,
            contexts,
            focus,
            mode: self.mode,
        }
    }
}

/// A component tree with its contexts and focus manager.
#[derive(Debug)]
pub struct Toolkit {
    tree: Arc<ComponentTree>,
    contexts: Arc<ContextRegistry>,
    focus: Arc<FocusSystem>,
    mode: DispatchMode,
}

impl Default for Toolkit {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Toolkit {
    #[must_use]
    pub fn builder() -> ToolkitBuilder {
        ToolkitBuilder::default()
    }

    #[must_use]
    pub fn tree(&self) -> &Arc<ComponentTree> {
        &self.tree
    }

    #[must_use]
    pub fn contexts(&self) -> &Arc<ContextRegistry> {
        &self.contexts
    }

    #[must_use]
    pub fn focus(&self) -> &Arc<FocusSystem> {
        &self.focus
    }

    #[must_use]
    pub fn dispatch_mode(&self) -> DispatchMode {
        self.mode
    }

    /// Create a context with a focus coordinator attached.
    pub fn create_context(&self) -> Arc<AppContext> {
        let context = self.contexts.create();
        self.focus.attach_with(&context, self.mode);
        context
    }

    #[must_use]
    pub fn coordinator(&self, context: ContextId) -> Option<Arc<FocusCoordinator>> {
        self.focus.coordinator(context)
    }

    /// Post `event` to the context of its source component. Returns false
    /// when the source is unknown or has no live context.
    pub fn post_event(&self, event: Event) -> bool {
        let Some(context) = event
            .source()
            .and_then(|s| self.contexts.for_component(&self.tree, s))
        else {
            debug!(id = ?event.id(), source = ?event.source(), "event has no context");
            return false;
        };
        context.event_queue().try_post_event(event).is_ok()
    }

    /// Remove `component` and its subtree everywhere: tree, type-ahead,
    /// queued events, focus slots.
    pub fn remove_component(&self, component: ComponentId) -> Vec<ComponentId> {
        self.focus.remove_component(component)
    }

    pub fn dispose_context(&self, context: ContextId) -> bool {
        self.focus.dispose_context(context)
    }

    // ═════════════════════════════════════════════════════════════════════
    // Flushing
    // ═════════════════════════════════════════════════════════════════════

    /// Dispatch until `context` has nothing queued. Returns whether it had
    /// any work.
    pub fn flush(&self, context: &AppContext) -> Result<bool, InvokeError> {
        let queue = context.event_queue();
        match self.mode {
            DispatchMode::Manual => {
                let Some(dispatcher) = queue.dispatcher() else {
                    return Ok(false);
                };
                Ok(queue.dispatch_pending(dispatcher.as_ref()) > 0)
            }
            DispatchMode::Thread => {
                let mut busy = false;
                for _ in 0..MAX_FLUSH_ROUNDS {
                    // Checked on the dispatch thread itself, so no event is
                    // half-dispatched when the queue reads empty.
                    let idle = Arc::new(AtomicBool::new(false));
                    let (flag, target) = (Arc::clone(&idle), Arc::clone(queue));
                    let was_empty = queue.is_empty();
                    queue.invoke_and_wait(move || flag.store(target.is_empty(), Ordering::SeqCst))?;
                    if was_empty && idle.load(Ordering::SeqCst) {
                        return Ok(busy);
                    }
                    busy = true;
                }
                warn!(context = %context.id(), "flush gave up: queue never drained");
                Ok(busy)
            }
        }
    }

    /// Flush every context until a full pass finds all of them idle.
    pub fn flush_all(&self) -> Result<(), InvokeError> {
        let mut quiet_passes = 0;
        for _ in 0..MAX_FLUSH_ROUNDS {
            let mut busy = false;
            for id in self.contexts.ids() {
                if let Some(context) = self.contexts.get(id) {
                    busy |= self.flush(&context)?;
                }
            }
            // Two quiet passes: a context flushed early in a pass may have
            // been posted to by one flushed later.
            quiet_passes = if busy { 0 } else { quiet_passes + 1 };
            if quiet_passes == 2 {
                return Ok(());
            }
        }
        warn!("flush_all gave up: contexts never went idle");
        Ok(())
    }

    /// Detach every coordinator and dispose every context.
    pub fn shutdown(&self) {
        self.focus.shutdown();
    }
}

impl Drop for Toolkit {
    fn drop(&mut self) {
        self.focus.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ftk_core::component::ComponentSpec;
    use ftk_core::event::{EventId, now_millis};

    fn manual() -> Toolkit {
        Toolkit::builder()
            .with_dispatch_mode(DispatchMode::Manual)
            .build()
    }

    #[test]
    fn contexts_get_coordinators() {
        let kit = manual();
        let ctx = kit.create_context();
        assert!(kit.coordinator(ctx.id()).is_some());
        assert!(ctx.event_queue().dispatcher().is_some());
    }

    #[test]
    fn post_routes_by_source_context() {
        let kit = manual();
        let a = kit.create_context();
        let b = kit.create_context();
        let fb = kit.tree().insert(ComponentSpec::frame(b.id()));
        assert!(kit.post_event(Event::window(EventId::WindowGainedFocus, fb, None, now_millis())));
        assert!(a.event_queue().is_empty());
        assert_eq!(b.event_queue().len(), 1);
        assert!(kit.flush(&b).unwrap());
        assert_eq!(kit.focus().state().focused_window(), Some(fb));
        assert!(!kit.flush(&b).unwrap());
    }

    #[test]
    fn post_without_context_is_refused() {
        let kit = manual();
        let stray = Event::focus_gained(ComponentId::new(999), None, false, now_millis());
        assert!(!kit.post_event(stray));
    }

    #[test]
    fn dispose_detaches() {
        let kit = manual();
        let ctx = kit.create_context();
        assert!(kit.dispose_context(ctx.id()));
        assert!(kit.coordinator(ctx.id()).is_none());
        assert!(ctx.is_disposed());
    }
}
