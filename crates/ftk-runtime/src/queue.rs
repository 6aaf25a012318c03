#![forbid(unsafe_code)]

//! Priority event queue with coalescing and stack push/pop.
//!
//! # Design
//!
//! Three FIFO lanes (high, normal, low). Retrieval always drains the highest
//! non-empty lane first. Posting picks a lane from the event's flags and
//! kind, then tries to merge the event into a queued one with the same id
//! and source before appending.
//!
//! Queues form a stack: [`EventQueue::push`] makes another queue the top and
//! migrates every pending event into it; posts to any queue in the stack are
//! forwarded to the top; [`EventQueue::pop`] migrates events back down.
//!
//! ## Invariants
//!
//! 1. Within a lane retrieval order is post order, except that a merged event
//!    occupies the slot of the event it replaced.
//! 2. Across lanes: high before normal before low, checked at each retrieval.
//! 3. Migration (push/pop) preserves retrieval order.
//! 4. Lock order: a queue is always locked before the queue pushed on top of
//!    it. Forwarding a post holds the lower lock while taking the upper one.
//! 5. The stack is never circular; pushing a queue that is already the top
//!    is a no-op.
//! 6. The coalescer runs with the queue lock held. A post made from inside
//!    a coalescer is deferred on that thread and applied once the outer post
//!    or migration has released its locks.
//!
//! ## Failure Modes
//!
//! - `pop` with no previous queue returns [`QueueError::EmptyStack`].
//! - A blocked retrieval returns [`QueueError::Interrupted`] after
//!   [`EventQueue::interrupt`], and [`QueueError::Disposed`] once disposed.
//! - Migration never blocks, so it cannot be interrupted half-way.
//! - A running dispatch thread keeps its queue alive until it is stopped or
//!   the queue is disposed.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use ftk_core::coalesce::{Coalescer, DefaultCoalescer};
use ftk_core::component::ComponentId;
use ftk_core::event::{
    ActiveEvent, Event, EventDispatcher, EventFlags, EventId, Timestamp, now_millis,
};
use tracing::{debug, trace, warn};

use crate::config::RuntimeConfig;
use crate::dispatch::DispatchThread;
use crate::error::{InvokeError, QueueError};

const NUM_LANES: usize = 3;

thread_local! {
    static IN_COALESCER: Cell<bool> = const { Cell::new(false) };
    static DEFERRED_POSTS: RefCell<Vec<(Arc<EventQueue>, Event)>> = const { RefCell::new(Vec::new()) };
}

/// Marks the current thread as running a coalescer until dropped.
struct CoalescerScope {
    outer: bool,
}

impl CoalescerScope {
    fn enter() -> Self {
        Self {
            outer: IN_COALESCER.with(|flag| flag.replace(true)),
        }
    }
}

impl Drop for CoalescerScope {
    fn drop(&mut self) {
        IN_COALESCER.with(|flag| flag.set(self.outer));
    }
}

/// Apply posts deferred by coalescers on this thread. Must be called with
/// no queue lock held.
fn flush_deferred_posts() {
    loop {
        let batch = DEFERRED_POSTS.with(|d| std::mem::take(&mut *d.borrow_mut()));
        if batch.is_empty() {
            return;
        }
        for (queue, event) in batch {
            queue.post_event(event);
        }
    }
}

/// Priority lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    High,
    Normal,
    Low,
}

impl Lane {
    /// Retrieval order.
    pub const ALL: [Lane; NUM_LANES] = [Lane::High, Lane::Normal, Lane::Low];

    /// Lane an event is posted to.
    #[must_use]
    pub fn for_event(event: &Event) -> Self {
        let flags = event.flags();
        if flags.contains(EventFlags::HIGH_PRIORITY) {
            Self::High
        } else if flags.contains(EventFlags::LOW_PRIORITY) || event.id().is_paint() {
            Self::Low
        } else {
            Self::Normal
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::High => 0,
            Self::Normal => 1,
            Self::Low => 2,
        }
    }
}

/// How a queue's dispatcher is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// A dispatch thread starts on the first post.
    #[default]
    Thread,
    /// No thread; the owner calls [`EventQueue::dispatch_pending`].
    Manual,
}

/// Read-only view of a queued event returned by the peek operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedEvent {
    pub id: EventId,
    pub source: Option<ComponentId>,
    pub when: Timestamp,
    pub lane: Lane,
}

struct QueueInner {
    lanes: [VecDeque<Event>; NUM_LANES],
    next: Option<Arc<EventQueue>>,
    previous: Option<Weak<EventQueue>>,
    interrupted: bool,
    disposed: bool,
    dispatcher: Option<Arc<dyn EventDispatcher>>,
    mode: DispatchMode,
    dispatch_thread: Option<Arc<DispatchThread>>,
    most_recent_event_time: Timestamp,
    current_event: Option<EventId>,
}

impl QueueInner {
    fn len(&self) -> usize {
        self.lanes.iter().map(VecDeque::len).sum()
    }

    fn take_first(&mut self, pred: &mut dyn FnMut(&Event) -> bool) -> Option<Event> {
        for lane in Lane::ALL {
            let items = &mut self.lanes[lane.index()];
            if let Some(pos) = items.iter().position(|e| pred(e)) {
                return items.remove(pos);
            }
        }
        None
    }

    fn peek_first(&self, pred: impl Fn(&Event) -> bool) -> Option<QueuedEvent> {
        Lane::ALL.into_iter().find_map(|lane| {
            self.lanes[lane.index()]
                .iter()
                .find(|e| pred(e))
                .map(|e| QueuedEvent {
                    id: e.id(),
                    source: e.source(),
                    when: e.when(),
                    lane,
                })
        })
    }

    fn drain_all(&mut self) -> Vec<Event> {
        let mut out = Vec::with_capacity(self.len());
        for lane in Lane::ALL {
            out.extend(self.lanes[lane.index()].drain(..));
        }
        out
    }
}

/// A stackable priority event queue.
pub struct EventQueue {
    this: Weak<EventQueue>,
    thread_name: String,
    config: RuntimeConfig,
    coalescer: Arc<dyn Coalescer>,
    inner: Mutex<QueueInner>,
    available: Condvar,
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("EventQueue")
            .field("thread_name", &self.thread_name)
            .field("len", &inner.len())
            .field("pushed", &inner.next.is_some())
            .field("disposed", &inner.disposed)
            .finish_non_exhaustive()
    }
}

impl EventQueue {
    /// Queue with default configuration that coalesces by the built-in rules.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_parts(
            RuntimeConfig::default(),
            Arc::new(DefaultCoalescer),
            crate::config::DEFAULT_THREAD_NAME_PREFIX,
        )
    }

    /// Queue with an explicit configuration, coalescing policy, and dispatch
    /// thread name.
    #[must_use]
    pub fn with_parts(
        config: RuntimeConfig,
        coalescer: Arc<dyn Coalescer>,
        thread_name: impl Into<String>,
    ) -> Arc<Self> {
        let thread_name = thread_name.into();
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            thread_name,
            config,
            coalescer,
            inner: Mutex::new(QueueInner {
                lanes: Default::default(),
                next: None,
                previous: None,
                interrupted: false,
                disposed: false,
                dispatcher: None,
                mode: DispatchMode::Thread,
                dispatch_thread: None,
                most_recent_event_time: now_millis(),
                current_event: None,
            }),
            available: Condvar::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Run `f` against the top of the stack this queue belongs to.
    fn with_top<R>(&self, f: impl FnOnce(&EventQueue) -> R) -> R {
        let next = self.lock().next.clone();
        match next {
            Some(next) => next.with_top(f),
            None => f(self),
        }
    }

    /// The queue currently accepting posts for this stack.
    #[must_use]
    pub fn top(&self) -> Option<Arc<EventQueue>> {
        self.with_top(|q| q.this.upgrade())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Posting
    // ═══════════════════════════════════════════════════════════════════

    /// Post an event, logging and dropping it if the queue is disposed.
    pub fn post_event(&self, event: Event) {
        if let Err(err) = self.try_post_event(event) {
            debug!(%err, "event dropped");
        }
    }

    /// Post an event to the top of the stack.
    ///
    /// Called from inside a [`Coalescer`], the post is deferred until the
    /// queue lock held around that coalescer is released, and `Ok` is
    /// returned without checking for disposal.
    pub fn try_post_event(&self, event: Event) -> Result<(), QueueError> {
        if IN_COALESCER.with(Cell::get) {
            match self.this.upgrade() {
                Some(queue) => {
                    trace!(id = ?event.id(), "post from coalescer deferred");
                    DEFERRED_POSTS.with(|d| d.borrow_mut().push((queue, event)));
                }
                None => debug!(id = ?event.id(), "event dropped, queue released"),
            }
            return Ok(());
        }
        let result = self.post_to_top(event);
        flush_deferred_posts();
        result
    }

    fn post_to_top(&self, event: Event) -> Result<(), QueueError> {
        let mut inner = self.lock();
        if inner.disposed {
            return Err(QueueError::Disposed);
        }
        if let Some(next) = inner.next.clone() {
            return next.post_to_top(event);
        }
        self.post_locked(&mut inner, event);
        self.ensure_dispatch_thread(&mut inner);
        Ok(())
    }

    fn post_locked(&self, inner: &mut QueueInner, event: Event) {
        let lane = Lane::for_event(&event);
        let id = event.id();
        let items = &mut inner.lanes[lane.index()];

        if self.config.coalescing
            && !items.is_empty()
            && let Some(source) = event.source()
        {
            let mut start = 0;
            if id.is_mouse_motion() {
                // Only merge with motion after the last different mouse event.
                for (i, queued) in items.iter().enumerate() {
                    if queued.id().is_mouse() && queued.id() != id {
                        start = i;
                    }
                }
            }
            for i in start..items.len() {
                let queued = &items[i];
                if queued.source() != Some(source) || queued.id() != id {
                    continue;
                }
                let merged = {
                    let _scope = CoalescerScope::enter();
                    self.coalescer.coalesce(source, queued, &event)
                };
                if let Some(merged) = merged {
                    trace!(?id, %source, ?lane, slot = i, "event coalesced");
                    items[i] = merged;
                    return;
                }
            }
        }

        trace!(?id, source = ?event.source(), when = event.when(), ?lane, "event posted");
        items.push_back(event);
        self.available.notify_all();
    }

    // ═══════════════════════════════════════════════════════════════════
    // Retrieval
    // ═══════════════════════════════════════════════════════════════════

    /// Block until an event is available and remove it.
    pub fn get_next_event(&self) -> Result<Event, QueueError> {
        self.next_event_until(&mut |_| true, &mut || false)
    }

    /// Block until an event with `id` is queued and remove the first one.
    pub fn get_next_event_matching(&self, id: EventId) -> Result<Event, QueueError> {
        self.next_event_until(&mut |e| e.id() == id, &mut || false)
    }

    /// Blocking retrieval that also gives up with `Interrupted` once `abort`
    /// returns true. `abort` is evaluated under the queue lock after every
    /// wake-up.
    pub(crate) fn next_event_until(
        &self,
        pred: &mut dyn FnMut(&Event) -> bool,
        abort: &mut dyn FnMut() -> bool,
    ) -> Result<Event, QueueError> {
        let mut inner = self.lock();
        loop {
            if inner.interrupted {
                inner.interrupted = false;
                return Err(QueueError::Interrupted);
            }
            if inner.disposed {
                return Err(QueueError::Disposed);
            }
            if abort() {
                return Err(QueueError::Interrupted);
            }
            if let Some(event) = inner.take_first(pred) {
                return Ok(event);
            }
            inner = self
                .available
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Remove the next event without blocking.
    pub fn poll_event(&self) -> Option<Event> {
        self.lock().take_first(&mut |_| true)
    }

    /// Remove the next event, waiting at most `timeout`.
    pub fn poll_event_timeout(&self, timeout: Duration) -> Option<Event> {
        let mut inner = self.lock();
        if let Some(event) = inner.take_first(&mut |_| true) {
            return Some(event);
        }
        let (mut inner, _) = self
            .available
            .wait_timeout_while(inner, timeout, |i| i.len() == 0 && !i.disposed)
            .unwrap_or_else(PoisonError::into_inner);
        inner.take_first(&mut |_| true)
    }

    /// The event [`Self::get_next_event`] would return.
    #[must_use]
    pub fn peek_event(&self) -> Option<QueuedEvent> {
        self.lock().peek_first(|_| true)
    }

    /// The first queued event with `id`, scanning lanes by priority.
    #[must_use]
    pub fn peek_event_matching(&self, id: EventId) -> Option<QueuedEvent> {
        self.lock().peek_first(|e| e.id() == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of events queued in `lane`.
    #[must_use]
    pub fn lane_len(&self, lane: Lane) -> usize {
        self.lock().lanes[lane.index()].len()
    }

    /// Drop every queued event whose source is `source`. Returns how many
    /// were removed.
    pub fn remove_source_events(&self, source: ComponentId) -> usize {
        let removed: Vec<Event> = {
            let mut inner = self.lock();
            let mut removed = Vec::new();
            for items in &mut inner.lanes {
                let mut kept = VecDeque::with_capacity(items.len());
                for event in items.drain(..) {
                    if event.source() == Some(source) {
                        removed.push(event);
                    } else {
                        kept.push_back(event);
                    }
                }
                *items = kept;
            }
            removed
        };
        if !removed.is_empty() {
            debug!(%source, count = removed.len(), "removed source events");
        }
        removed.len()
    }

    /// Wake a blocked retrieval with [`QueueError::Interrupted`]. If nothing
    /// is blocked, the next retrieval returns it instead.
    pub fn interrupt(&self) {
        self.lock().interrupted = true;
        self.available.notify_all();
    }

    /// Make blocked retrievals re-evaluate their abort conditions.
    pub fn wake(&self) {
        let _guard = self.lock();
        self.available.notify_all();
    }

    // ═══════════════════════════════════════════════════════════════════
    // Stack
    // ═══════════════════════════════════════════════════════════════════

    /// Make `new_queue` the top of this stack, moving every pending event
    /// into it in retrieval order.
    ///
    /// The superseded top stops its dispatch thread after the current event
    /// and hands its dispatcher to `new_queue` if that has none.
    pub fn push(&self, new_queue: Arc<EventQueue>) {
        let stale = self.with_top(|top| {
            if std::ptr::eq(top, Arc::as_ptr(&new_queue)) {
                return Ok(None);
            }
            let mut top_inner = top.lock();
            if top_inner.next.is_some() {
                return Err(());
            }
            if top_inner.disposed {
                return Ok(None);
            }
            let mut new_inner = new_queue.lock();
            let mut moved = 0usize;
            while let Some(event) = top_inner.take_first(&mut |_| true) {
                new_queue.post_locked(&mut new_inner, event);
                moved += 1;
            }
            new_inner.previous = Some(top.this.clone());
            if new_inner.dispatcher.is_none() {
                new_inner.dispatcher = top_inner.dispatcher.clone();
                new_inner.mode = top_inner.mode;
            }
            top_inner.next = Some(Arc::clone(&new_queue));
            let stale = top_inner.dispatch_thread.take();
            if new_inner.len() > 0 {
                new_queue.ensure_dispatch_thread(&mut new_inner);
            }
            debug!(moved, "event queue pushed");
            Ok(stale)
        });
        flush_deferred_posts();
        match stale {
            Ok(Some(thread)) => thread.stop_later(),
            Ok(None) => {}
            // The top changed under us; retry against the new top.
            Err(()) => self.push(new_queue),
        }
    }

    /// Pop the top of this stack, moving its pending events back to the
    /// previous queue and stopping its dispatch thread.
    pub fn pop(&self) -> Result<(), QueueError> {
        let top = self.top().ok_or(QueueError::EmptyStack)?;
        let previous = top
            .lock()
            .previous
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(QueueError::EmptyStack)?;

        let stale = {
            let mut prev_inner = previous.lock();
            let mut inner = top.lock();
            let still_linked = prev_inner
                .next
                .as_ref()
                .is_some_and(|n| Arc::ptr_eq(n, &top));
            if !still_linked || inner.next.is_some() {
                drop(inner);
                drop(prev_inner);
                return self.pop();
            }
            prev_inner.next = None;
            let mut moved = 0usize;
            while let Some(event) = inner.take_first(&mut |_| true) {
                previous.post_locked(&mut prev_inner, event);
                moved += 1;
            }
            inner.previous = None;
            let dispatcher = inner.dispatcher.take();
            if prev_inner.dispatcher.is_none() {
                prev_inner.dispatcher = dispatcher;
                prev_inner.mode = inner.mode;
            }
            if prev_inner.len() > 0 {
                previous.ensure_dispatch_thread(&mut prev_inner);
            }
            debug!(moved, "event queue popped");
            inner.dispatch_thread.take()
        };
        flush_deferred_posts();
        if let Some(thread) = stale {
            thread.stop();
        }
        Ok(())
    }

    /// Whether another queue has been pushed on top of this one.
    #[must_use]
    pub fn is_pushed_over(&self) -> bool {
        self.lock().next.is_some()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Dispatching
    // ═══════════════════════════════════════════════════════════════════

    /// Install the dispatcher used by this stack's dispatch threads. A
    /// thread starts as soon as there is something to dispatch.
    pub fn set_dispatcher(&self, dispatcher: Arc<dyn EventDispatcher>) {
        self.install_dispatcher(dispatcher, DispatchMode::Thread);
    }

    /// Install the dispatcher with an explicit [`DispatchMode`].
    pub fn install_dispatcher(&self, dispatcher: Arc<dyn EventDispatcher>, mode: DispatchMode) {
        self.with_top(|top| {
            let mut inner = top.lock();
            inner.dispatcher = Some(dispatcher);
            inner.mode = mode;
            if inner.len() > 0 {
                top.ensure_dispatch_thread(&mut inner);
            }
        });
    }

    #[must_use]
    pub fn dispatcher(&self) -> Option<Arc<dyn EventDispatcher>> {
        self.with_top(|top| top.lock().dispatcher.clone())
    }

    /// The running dispatch thread of the top queue.
    #[must_use]
    pub fn dispatch_thread(&self) -> Option<Arc<DispatchThread>> {
        self.with_top(|top| top.lock().dispatch_thread.clone())
    }

    fn ensure_dispatch_thread(&self, inner: &mut QueueInner) {
        if inner.disposed
            || inner.mode == DispatchMode::Manual
            || inner.next.is_some()
            || inner.dispatch_thread.is_some()
        {
            return;
        }
        let Some(dispatcher) = inner.dispatcher.clone() else {
            return;
        };
        let Some(queue) = self.this.upgrade() else {
            return;
        };
        match DispatchThread::spawn(queue, dispatcher, self.thread_name.clone()) {
            Ok(thread) => inner.dispatch_thread = Some(thread),
            Err(err) => warn!(%err, thread = %self.thread_name, "failed to start dispatch thread"),
        }
    }

    /// Called by a dispatch thread as it exits.
    pub(crate) fn detach_dispatch_thread(&self, thread: &DispatchThread) {
        let mut inner = self.lock();
        let ours = inner
            .dispatch_thread
            .as_ref()
            .is_some_and(|t| std::ptr::eq(Arc::as_ptr(t), thread));
        if ours {
            inner.dispatch_thread = None;
            if inner.len() > 0 {
                self.ensure_dispatch_thread(&mut inner);
            }
        }
    }

    /// Dispatch `event` with `dispatcher`: active events run themselves,
    /// everything else goes to the dispatcher.
    pub fn dispatch_event(&self, mut event: Event, dispatcher: &dyn EventDispatcher) {
        {
            let mut inner = self.lock();
            let id = event.id();
            inner.current_event = Some(id);
            if id.is_input() || id == EventId::Invocation {
                inner.most_recent_event_time = inner.most_recent_event_time.max(event.when());
            }
        }
        match event.take_active() {
            Some(action) => action.dispatch(dispatcher),
            None => dispatcher.dispatch_event(event),
        }
    }

    /// Dispatch everything currently queued, including events posted while
    /// dispatching, on the calling thread. Returns how many were dispatched.
    pub fn dispatch_pending(&self, dispatcher: &dyn EventDispatcher) -> usize {
        let mut count = 0;
        while let Some(event) = self.with_top(EventQueue::poll_event) {
            self.with_top(|top| top.dispatch_event(event, dispatcher));
            count += 1;
        }
        count
    }

    /// Whether the calling thread is the dispatch thread of the top queue.
    #[must_use]
    pub fn is_dispatch_thread(&self) -> bool {
        self.with_top(|top| {
            top.lock()
                .dispatch_thread
                .as_ref()
                .is_some_and(|t| t.is_current())
        })
    }

    /// Timestamp of the most recent input or invocation event dispatched on
    /// the top queue's dispatch thread. Other threads get the current time.
    #[must_use]
    pub fn most_recent_event_time(&self) -> Timestamp {
        self.with_top(|top| {
            let inner = top.lock();
            let on_thread = inner
                .dispatch_thread
                .as_ref()
                .is_some_and(|t| t.is_current());
            if on_thread {
                inner.most_recent_event_time
            } else {
                now_millis()
            }
        })
    }

    /// Id of the event most recently handed to [`Self::dispatch_event`].
    #[must_use]
    pub fn current_event_id(&self) -> Option<EventId> {
        self.with_top(|top| top.lock().current_event)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Invocations
    // ═══════════════════════════════════════════════════════════════════

    /// Run `f` on the dispatch thread after the events already queued.
    pub fn invoke_later<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.post_event(Invocation::event(Box::new(f), None, self.this.clone()));
    }

    /// Run `f` on the dispatch thread and wait until it has finished.
    pub fn invoke_and_wait<F>(&self, f: F) -> Result<(), InvokeError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_dispatch_thread() {
            return Err(InvokeError::FromDispatchThread);
        }
        let completion = Arc::new(Completion::default());
        let event = Invocation::event(Box::new(f), Some(Arc::clone(&completion)), self.this.clone());
        self.try_post_event(event)?;
        completion.wait(self.config.send_poll_interval, || self.is_disposed())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Disposal
    // ═══════════════════════════════════════════════════════════════════

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.lock().disposed
    }

    /// Drop all pending events, stop the dispatch thread, and refuse further
    /// posts. Queues pushed above this one are disposed too.
    pub fn dispose(&self) {
        let (dropped, next, thread) = {
            let mut inner = self.lock();
            if inner.disposed {
                return;
            }
            inner.disposed = true;
            inner.dispatcher = None;
            let dropped = inner.drain_all();
            self.available.notify_all();
            (dropped, inner.next.clone(), inner.dispatch_thread.take())
        };
        debug!(dropped = dropped.len(), "event queue disposed");
        // Dropping undelivered events releases anyone waiting on them; that
        // may post to other queues, so it happens outside the lock.
        drop(dropped);
        if let Some(next) = next {
            next.dispose();
        }
        if let Some(thread) = thread {
            thread.stop();
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Invocation events
// ═══════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct Completion {
    result: Mutex<Option<Result<(), InvokeError>>>,
    done: Condvar,
}

impl Completion {
    fn complete(&self, result: Result<(), InvokeError>) {
        let mut slot = self.result.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(result);
        }
        self.done.notify_all();
    }

    fn wait(&self, slice: Duration, disposed: impl Fn() -> bool) -> Result<(), InvokeError> {
        let mut slot = self.result.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(result) = slot.take() {
                return result;
            }
            if disposed() {
                return Err(InvokeError::Disposed);
            }
            slot = self
                .done
                .wait_timeout(slot, slice)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

type Runnable = Box<dyn FnOnce() + Send>;

struct Invocation {
    action: Option<Runnable>,
    completion: Option<Arc<Completion>>,
    queue: Weak<EventQueue>,
}

impl Invocation {
    fn event(action: Runnable, completion: Option<Arc<Completion>>, queue: Weak<EventQueue>) -> Event {
        Event::active(
            EventId::Invocation,
            now_millis(),
            Box::new(Self {
                action: Some(action),
                completion,
                queue,
            }),
        )
    }
}

impl ActiveEvent for Invocation {
    fn dispatch(mut self: Box<Self>, _dispatcher: &dyn EventDispatcher) {
        let Some(action) = self.action.take() else {
            return;
        };
        match self.completion.take() {
            Some(completion) => {
                let result =
                    panic::catch_unwind(AssertUnwindSafe(action)).map_err(|_| InvokeError::Panicked);
                completion.complete(result);
            }
            None => action(),
        }
    }
}

impl Drop for Invocation {
    fn drop(&mut self) {
        if let Some(completion) = self.completion.take() {
            let disposed = self.queue.upgrade().is_none_or(|q| q.is_disposed());
            completion.complete(Err(if disposed {
                InvokeError::Disposed
            } else {
                InvokeError::Interrupted
            }));
        }
    }
}
