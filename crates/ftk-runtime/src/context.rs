#![forbid(unsafe_code)]

//! GUI contexts: one event queue stack and dispatch thread each.
//!
//! A [`ContextRegistry`] hands out [`ContextId`]s and owns the contexts.
//! Disposing a context refuses further posts, drops everything queued, stops
//! its dispatch thread, and releases every synchronous send still waiting on
//! it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use ftk_core::coalesce::{Coalescer, DefaultCoalescer};
use ftk_core::component::{ComponentId, ComponentTree, ContextId};
use ftk_core::event::{Event, EventDispatcher};
use tracing::debug;

use crate::config::RuntimeConfig;
use crate::queue::EventQueue;
use crate::sent::SentState;

/// A GUI context.
pub struct AppContext {
    id: ContextId,
    queue: Arc<EventQueue>,
    config: RuntimeConfig,
    disposed: AtomicBool,
    pending_sends: Mutex<Vec<Weak<SentState>>>,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("id", &self.id)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

impl AppContext {
    #[must_use]
    pub fn new(id: ContextId, config: RuntimeConfig, coalescer: Arc<dyn Coalescer>) -> Arc<Self> {
        let thread_name = format!("{}-{}", config.thread_name_prefix, id.get());
        let queue = EventQueue::with_parts(config.clone(), coalescer, thread_name);
        Arc::new(Self {
            id,
            queue,
            config,
            disposed: AtomicBool::new(false),
            pending_sends: Mutex::new(Vec::new()),
        })
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// The base queue. Posts are forwarded to whatever is pushed on top.
    #[must_use]
    pub fn event_queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn post_event(&self, event: Event) {
        self.queue.post_event(event);
    }

    /// Install the dispatcher; the dispatch thread starts on the next post.
    pub fn set_dispatcher(&self, dispatcher: Arc<dyn EventDispatcher>) {
        self.queue.set_dispatcher(dispatcher);
    }

    #[must_use]
    pub fn is_dispatch_thread(&self) -> bool {
        self.queue.is_dispatch_thread()
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn register_send(&self, state: &Arc<SentState>) {
        let mut pending = self
            .pending_sends
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        pending.retain(|w| w.upgrade().is_some_and(|s| s.is_pending()));
        pending.push(Arc::downgrade(state));
    }

    /// Tear the context down. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let pending: Vec<_> = self
            .pending_sends
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .filter_map(|w| w.upgrade())
            .collect();
        let released = pending.iter().filter(|s| s.abandon()).count();
        debug!(context = %self.id, released, "context disposed");
        self.queue.dispose();
    }
}

/// Owner of every live context.
pub struct ContextRegistry {
    contexts: RwLock<HashMap<ContextId, Arc<AppContext>>>,
    next_id: AtomicU32,
    config: RuntimeConfig,
    coalescer: Arc<dyn Coalescer>,
}

impl Default for ContextRegistry {
    fn default() -> Self {
        Self::new(RuntimeConfig::default(), Arc::new(DefaultCoalescer))
    }
}

impl std::fmt::Debug for ContextRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextRegistry")
            .field("contexts", &self.ids())
            .finish_non_exhaustive()
    }
}

impl ContextRegistry {
    /// Every context created by this registry shares `config` and
    /// `coalescer`.
    #[must_use]
    pub fn new(config: RuntimeConfig, coalescer: Arc<dyn Coalescer>) -> Self {
        Self {
            contexts: RwLock::new(HashMap::new()),
            next_id: AtomicU32::new(0),
            config,
            coalescer,
        }
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Create and register a new context.
    pub fn create(&self) -> Arc<AppContext> {
        let id = ContextId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let context = AppContext::new(id, self.config.clone(), Arc::clone(&self.coalescer));
        self.contexts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::clone(&context));
        debug!(context = %id, "context created");
        context
    }

    #[must_use]
    pub fn get(&self, id: ContextId) -> Option<Arc<AppContext>> {
        self.contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Context a component was created in.
    #[must_use]
    pub fn for_component(&self, tree: &ComponentTree, component: ComponentId) -> Option<Arc<AppContext>> {
        tree.context_of(component).and_then(|id| self.get(id))
    }

    /// Registered context ids, ascending.
    #[must_use]
    pub fn ids(&self) -> Vec<ContextId> {
        let mut ids: Vec<_> = self
            .contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        ids.sort();
        ids
    }

    /// Dispose and unregister a context.
    pub fn dispose(&self, id: ContextId) -> bool {
        let removed = self
            .contexts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        match removed {
            Some(context) => {
                context.dispose();
                true
            }
            None => false,
        }
    }

    pub fn dispose_all(&self) {
        let all: Vec<_> = self
            .contexts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, c)| c)
            .collect();
        for context in all {
            context.dispose();
        }
    }
}
