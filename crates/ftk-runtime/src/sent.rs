#![forbid(unsafe_code)]

//! Synchronous cross-context sends.
//!
//! [`send_message`] delivers an event in another context and blocks until it
//! was dispatched there. The event travels inside a [`SentEvent`], an active
//! event that dispatches its payload with the receiving context's dispatcher
//! and then signals the sender.
//!
//! # Design
//!
//! - Same context: dispatched immediately on the calling thread.
//! - Caller on a dispatch thread: the caller pumps its own queue, running
//!   only sent events, until the send completes. Two contexts sending to
//!   each other therefore cannot deadlock.
//! - Any other caller waits on a condition variable in slices of
//!   [`RuntimeConfig::send_poll_interval`].
//!
//! Completion posts an empty `Sent` event to the sender's queue so a pumping
//! sender wakes up and re-checks. Disposal of the target completes every
//! outstanding send as "not dispatched"; a `SentEvent` dropped undelivered
//! does the same. A pumping sender whose dispatch thread starts stopping
//! gives up and abandons the send, so the target skips the event when it
//! reaches it. A send the target is already dispatching at that moment
//! still runs to completion but reports false.
//!
//! [`RuntimeConfig::send_poll_interval`]: crate::RuntimeConfig::send_poll_interval

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use ftk_core::event::{ActiveEvent, Event, EventDispatcher, EventId, Payload, now_millis};
use tracing::{debug, trace};

use crate::context::AppContext;
use crate::dispatch::DispatchThread;
use crate::queue::EventQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SentStatus {
    Pending,
    Dispatching,
    Dispatched,
    Abandoned,
}

/// Completion state shared by a [`SentEvent`] and its sender.
pub(crate) struct SentState {
    status: Mutex<SentStatus>,
    finished: Condvar,
    notify: Option<Weak<EventQueue>>,
}

impl SentState {
    fn new(notify: Option<&Arc<EventQueue>>) -> Self {
        Self {
            status: Mutex::new(SentStatus::Pending),
            finished: Condvar::new(),
            notify: notify.map(Arc::downgrade),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SentStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_pending(&self) -> bool {
        *self.lock() == SentStatus::Pending
    }

    fn is_finished(&self) -> bool {
        matches!(*self.lock(), SentStatus::Dispatched | SentStatus::Abandoned)
    }

    /// Claim the event for dispatch. False if it was already abandoned.
    fn begin(&self) -> bool {
        let mut status = self.lock();
        if *status != SentStatus::Pending {
            return false;
        }
        *status = SentStatus::Dispatching;
        true
    }

    fn was_dispatched(&self) -> bool {
        *self.lock() == SentStatus::Dispatched
    }

    /// Move to `outcome` if the current status passes `from`.
    fn finish(&self, from: impl Fn(SentStatus) -> bool, outcome: SentStatus) -> bool {
        {
            let mut status = self.lock();
            if !from(*status) {
                return false;
            }
            *status = outcome;
            self.finished.notify_all();
        }
        if let Some(queue) = self.notify.as_ref().and_then(Weak::upgrade) {
            queue.post_event(Event::new(EventId::Sent, None, now_millis(), Payload::None));
        }
        true
    }

    /// Complete as not dispatched, unless dispatch already began.
    pub(crate) fn abandon(&self) -> bool {
        self.finish(|s| s == SentStatus::Pending, SentStatus::Abandoned)
    }

    fn wait(&self, slice: Duration, target_disposed: impl Fn() -> bool) {
        let mut status = self.lock();
        while matches!(*status, SentStatus::Pending | SentStatus::Dispatching) && !target_disposed() {
            status = self
                .finished
                .wait_timeout(status, slice)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

/// Active event carrying a synchronously sent event.
pub struct SentEvent {
    nested: Option<Event>,
    state: Arc<SentState>,
}

impl std::fmt::Debug for SentEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentEvent")
            .field("nested", &self.nested.as_ref().map(Event::id))
            .field("pending", &self.state.is_pending())
            .finish()
    }
}

impl SentEvent {
    fn new(nested: Event, notify: Option<&Arc<EventQueue>>) -> Self {
        Self {
            nested: Some(nested),
            state: Arc::new(SentState::new(notify)),
        }
    }

    fn into_event(self) -> Event {
        let when = self.nested.as_ref().map_or_else(now_millis, Event::when);
        Event::active(EventId::Sent, when, Box::new(self))
    }
}

impl ActiveEvent for SentEvent {
    fn dispatch(mut self: Box<Self>, dispatcher: &dyn EventDispatcher) {
        if !self.state.begin() {
            trace!("sent event skipped, sender gave up");
            return;
        }
        let result = match self.nested.take() {
            Some(nested) => {
                trace!(id = ?nested.id(), source = ?nested.source(), "dispatching sent event");
                panic::catch_unwind(AssertUnwindSafe(|| dispatcher.dispatch_sent(nested)))
            }
            None => Ok(()),
        };
        self.state.finish(
            |s| matches!(s, SentStatus::Pending | SentStatus::Dispatching),
            SentStatus::Dispatched,
        );
        if let Err(payload) = result {
            panic::resume_unwind(payload);
        }
    }
}

impl Drop for SentEvent {
    fn drop(&mut self) {
        if self.state.abandon() {
            debug!("sent event dropped before dispatch");
        }
    }
}

/// Deliver `event` in `target` and wait for it to be dispatched.
///
/// Returns true iff the event was dispatched; false if `target` was or
/// became disposed first, if the calling dispatch thread started stopping
/// first, or if `from` has no dispatcher for a same-context send.
pub fn send_message(from: &AppContext, target: &AppContext, event: Event) -> bool {
    if from.id() == target.id() {
        let Some(dispatcher) = from.event_queue().dispatcher() else {
            debug!(context = %from.id(), "same-context send without a dispatcher");
            return false;
        };
        let sent = Box::new(SentEvent::new(event, None));
        let state = Arc::clone(&sent.state);
        sent.dispatch(dispatcher.as_ref());
        return state.was_dispatched();
    }

    if target.is_disposed() {
        return false;
    }

    let pumping = DispatchThread::current();
    let notify = pumping
        .as_ref()
        .map_or_else(|| Arc::clone(from.event_queue()), |t| Arc::clone(t.queue()));
    let sent = SentEvent::new(event, Some(&notify));
    let state = Arc::clone(&sent.state);
    target.register_send(&state);
    if let Err(err) = target.event_queue().try_post_event(sent.into_event()) {
        debug!(%err, target = %target.id(), "send to disposed context");
        return false;
    }
    trace!(from = %from.id(), target = %target.id(), "waiting for sent event");

    match pumping {
        Some(thread) => thread.pump_events_matching(EventId::Sent, || {
            !state.is_finished() && !target.is_disposed()
        }),
        None => state.wait(from.config().send_poll_interval, || target.is_disposed()),
    }
    if state.abandon() {
        debug!(target = %target.id(), "sender stopped waiting, send abandoned");
    }
    state.was_dispatched()
}
