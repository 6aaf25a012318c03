#![forbid(unsafe_code)]

//! Dispatch threads and nested event pumping.
//!
//! Each queue that has a dispatcher gets one named worker thread, started
//! lazily on the first post. The thread loop is itself a pump: "retrieve,
//! filter, dispatch" while a condition holds. Code running on the thread can
//! start a nested pump with its own condition, which is how modal dialogs
//! and synchronous sends wait without freezing the context.
//!
//! # Invariants
//!
//! 1. A pump re-evaluates its condition after every event and whenever the
//!    queue is woken, so a condition flipping while the queue is empty only
//!    needs [`EventQueue::wake`] (or any post) to be noticed.
//! 2. A panic inside dispatch is logged and the loop continues.
//! 3. Events rejected by a pump filter are consumed and dropped.

use std::any::Any;
use std::cell::RefCell;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

use ftk_core::component::{ComponentId, ComponentTree};
use ftk_core::event::{Event, EventDispatcher, EventId};
use tracing::{debug, error, trace};

use crate::error::QueueError;
use crate::queue::EventQueue;

thread_local! {
    static CURRENT: RefCell<Option<Arc<DispatchThread>>> = const { RefCell::new(None) };
}

/// Worker thread draining one [`EventQueue`].
pub struct DispatchThread {
    name: String,
    queue: Arc<EventQueue>,
    dispatcher: Arc<dyn EventDispatcher>,
    stopping: AtomicBool,
    thread_id: OnceLock<ThreadId>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for DispatchThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchThread")
            .field("name", &self.name)
            .field("stopping", &self.is_stopping())
            .finish_non_exhaustive()
    }
}

impl DispatchThread {
    pub(crate) fn spawn(
        queue: Arc<EventQueue>,
        dispatcher: Arc<dyn EventDispatcher>,
        name: String,
    ) -> io::Result<Arc<Self>> {
        let this = Arc::new(Self {
            name: name.clone(),
            queue,
            dispatcher,
            stopping: AtomicBool::new(false),
            thread_id: OnceLock::new(),
            handle: Mutex::new(None),
        });
        let runner = Arc::clone(&this);
        let handle = thread::Builder::new().name(name).spawn(move || runner.run())?;
        let _ = this.thread_id.set(handle.thread().id());
        *this.handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(this)
    }

    /// The dispatch thread the caller is running on, if any.
    #[must_use]
    pub fn current() -> Option<Arc<DispatchThread>> {
        CURRENT.with(|c| c.borrow().clone())
    }

    fn run(self: Arc<Self>) {
        let _ = self.thread_id.set(thread::current().id());
        CURRENT.with(|c| *c.borrow_mut() = Some(Arc::clone(&self)));
        debug!(thread = %self.name, "dispatch thread started");

        self.pump_events(|| true);

        CURRENT.with(|c| c.borrow_mut().take());
        self.queue.detach_dispatch_thread(&self);
        debug!(thread = %self.name, "dispatch thread stopped");
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The queue this thread drains.
    #[must_use]
    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Arc<dyn EventDispatcher> {
        &self.dispatcher
    }

    #[must_use]
    pub fn is_current(&self) -> bool {
        self.thread_id
            .get()
            .is_some_and(|id| *id == thread::current().id())
    }

    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    /// Ask the thread to exit after the event it is dispatching.
    pub fn stop_later(&self) {
        self.stopping.store(true, Ordering::Release);
        self.queue.wake();
    }

    /// Ask the thread to exit and, unless called from the thread itself,
    /// wait for it.
    pub fn stop(&self) {
        self.stop_later();
        if self.is_current() {
            return;
        }
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            error!(thread = %self.name, "dispatch thread panicked while stopping");
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Pumping
    // ═══════════════════════════════════════════════════════════════════

    /// Dispatch events while `cond` holds.
    pub fn pump_events(&self, cond: impl FnMut() -> bool) {
        self.pump(None, &mut |_| true, cond);
    }

    /// Dispatch only events with `id` while `cond` holds; others stay queued.
    pub fn pump_events_matching(&self, id: EventId, cond: impl FnMut() -> bool) {
        self.pump(Some(id), &mut |_| true, cond);
    }

    /// Dispatch events accepted by `filter` while `cond` holds. Rejected
    /// events are consumed and dropped.
    pub fn pump_events_filtered(
        &self,
        mut filter: impl FnMut(&Event) -> bool,
        cond: impl FnMut() -> bool,
    ) {
        self.pump(None, &mut filter, cond);
    }

    /// Modal pump: while `cond` holds, input aimed outside `modal`'s
    /// hierarchy (including windows it owns) is discarded.
    pub fn pump_events_for_hierarchy(
        &self,
        tree: &ComponentTree,
        modal: ComponentId,
        cond: impl FnMut() -> bool,
    ) {
        self.pump(None, &mut |e| accepts_for_hierarchy(tree, modal, e), cond);
    }

    fn pump(
        &self,
        id: Option<EventId>,
        filter: &mut dyn FnMut(&Event) -> bool,
        mut cond: impl FnMut() -> bool,
    ) {
        while !self.is_stopping() && cond() {
            if !self.pump_one(id, filter, &mut cond) {
                break;
            }
        }
    }

    /// Retrieve and dispatch one event. Returns false when the queue is gone.
    fn pump_one(
        &self,
        id: Option<EventId>,
        filter: &mut dyn FnMut(&Event) -> bool,
        cond: &mut dyn FnMut() -> bool,
    ) -> bool {
        let next = self.queue.next_event_until(
            &mut |e| id.is_none_or(|id| e.id() == id),
            &mut || self.is_stopping() || !cond(),
        );
        let mut event = match next {
            Ok(event) => event,
            Err(QueueError::Interrupted) => return true,
            Err(QueueError::Disposed | QueueError::EmptyStack) => return false,
        };
        if !filter(&event) {
            trace!(id = ?event.id(), source = ?event.source(), "event filtered out");
            event.consume();
            return true;
        }
        let queue = &self.queue;
        let dispatcher = self.dispatcher.as_ref();
        if let Err(payload) =
            panic::catch_unwind(AssertUnwindSafe(|| queue.dispatch_event(event, dispatcher)))
        {
            error!(
                thread = %self.name,
                panic = panic_message(payload.as_ref()),
                "event dispatch panicked"
            );
        }
        true
    }
}

/// Input events must target the modal component's hierarchy.
fn accepts_for_hierarchy(tree: &ComponentTree, modal: ComponentId, event: &Event) -> bool {
    let id = event.id();
    if !id.is_input() {
        return true;
    }
    match event.source() {
        Some(source) => tree.is_descendant_of(source, modal),
        None => true,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ftk_core::component::{ComponentSpec, ContextId};
    use ftk_core::event::{MouseData, Payload};
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Duration;

    struct Forward(mpsc::Sender<(EventId, Option<ComponentId>)>);

    impl EventDispatcher for Forward {
        fn dispatch_event(&self, event: Event) {
            let _ = self.0.send((event.id(), event.source()));
        }
    }

    #[test]
    fn thread_starts_lazily_and_dispatches() {
        let (tx, rx) = mpsc::channel();
        let q = EventQueue::new();
        q.set_dispatcher(Arc::new(Forward(tx)));
        assert!(q.dispatch_thread().is_none());
        q.post_event(Event::new(EventId::Component(1), None, 0, Payload::None));
        let got = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(got.0, EventId::Component(1));
        assert!(q.dispatch_thread().is_some());
        q.dispose();
        assert!(q.dispatch_thread().is_none());
    }

    #[test]
    fn panicking_dispatch_keeps_thread_alive() {
        struct Flaky(AtomicUsize, mpsc::Sender<usize>);
        impl EventDispatcher for Flaky {
            fn dispatch_event(&self, _event: Event) {
                let n = self.0.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    panic!("first event fails");
                }
                let _ = self.1.send(n);
            }
        }
        let (tx, rx) = mpsc::channel();
        let q = EventQueue::new();
        q.set_dispatcher(Arc::new(Flaky(AtomicUsize::new(0), tx)));
        q.post_event(Event::new(EventId::Component(1), None, 0, Payload::None));
        q.post_event(Event::new(EventId::Component(2), None, 0, Payload::None));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);
        q.dispose();
    }

    #[test]
    fn nested_pump_runs_until_condition_clears() {
        let (tx, rx) = mpsc::channel();
        let q = EventQueue::new();
        q.set_dispatcher(Arc::new(Forward(tx)));
        let done = Arc::new(AtomicBool::new(false));
        let observed = Arc::new(AtomicBool::new(false));
        {
            let done = Arc::clone(&done);
            let observed = Arc::clone(&observed);
            q.invoke_later(move || {
                let Some(thread) = DispatchThread::current() else {
                    return;
                };
                thread.pump_events(|| !done.load(Ordering::SeqCst));
                observed.store(true, Ordering::SeqCst);
            });
        }
        q.post_event(Event::new(EventId::Component(7), None, 0, Payload::None));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap().0, EventId::Component(7));
        assert!(!observed.load(Ordering::SeqCst));
        done.store(true, Ordering::SeqCst);
        q.wake();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !observed.load(Ordering::SeqCst) && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(observed.load(Ordering::SeqCst));
        q.dispose();
    }

    #[test]
    fn hierarchy_filter_drops_outside_input() {
        let tree = ComponentTree::new();
        let frame = tree.insert(ComponentSpec::frame(ContextId::new(0)));
        let outside = tree.insert(ComponentSpec::leaf(frame));
        let dialog = tree.insert(ComponentSpec::dialog(frame));
        let inside = tree.insert(ComponentSpec::leaf(dialog));

        let click = |src| Event::mouse(EventId::MousePressed, src, 0, MouseData::default());
        assert!(!accepts_for_hierarchy(&tree, dialog, &click(outside)));
        assert!(accepts_for_hierarchy(&tree, dialog, &click(inside)));
        let paint = Event::paint(EventId::Paint, outside, Default::default(), 0);
        assert!(accepts_for_hierarchy(&tree, dialog, &paint));
    }

    #[test]
    fn panic_message_extracts_text() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("bad"));
        assert_eq!(panic_message(payload.as_ref()), "bad");
        let payload: Box<dyn Any + Send> = Box::new(5u8);
        assert_eq!(panic_message(payload.as_ref()), "<non-string panic>");
    }
}
