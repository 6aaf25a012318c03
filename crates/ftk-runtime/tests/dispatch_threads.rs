//! Multi-threaded dispatch scenarios: contexts sending to each other, queue
//! stacks with live dispatch threads, and disposal while work is in flight.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

use ftk_core::component::ComponentId;
use ftk_core::event::{Event, EventDispatcher, EventId, Payload};
use ftk_runtime::{AppContext, ContextRegistry, EventQueue, InvokeError, send_message};
use tracing::{Level, info};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(Level::DEBUG)
        .try_init();
}

const TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Default)]
struct Log(Mutex<Vec<EventId>>);

impl EventDispatcher for Log {
    fn dispatch_event(&self, event: Event) {
        if event.id() != EventId::Sent {
            self.0.lock().unwrap().push(event.id());
        }
    }
}

fn custom(tag: u32) -> Event {
    Event::new(EventId::Component(tag), Some(ComponentId::new(1)), 0, Payload::None)
}

#[test]
fn mutual_sends_between_dispatch_threads_do_not_deadlock() {
    init_tracing();
    info!("two contexts send to each other from their dispatch threads");
    let registry = Arc::new(ContextRegistry::default());
    let a = registry.create();
    let b = registry.create();
    a.set_dispatcher(Arc::new(Log::default()));
    b.set_dispatcher(Arc::new(Log::default()));

    let (tx, rx) = mpsc::channel();
    let spawn_send = |from: &Arc<AppContext>, to: &Arc<AppContext>, tx: mpsc::Sender<bool>| {
        let (from2, to2) = (Arc::clone(from), Arc::clone(to));
        from.event_queue().invoke_later(move || {
            let _ = tx.send(send_message(&from2, &to2, custom(1)));
        });
    };
    spawn_send(&a, &b, tx.clone());
    spawn_send(&b, &a, tx);

    assert!(rx.recv_timeout(TIMEOUT).unwrap());
    assert!(rx.recv_timeout(TIMEOUT).unwrap());
    registry.dispose_all();
}

#[test]
fn pushed_queue_takes_over_dispatching() {
    init_tracing();
    let log = Arc::new(Log::default());
    let base = EventQueue::new();
    base.set_dispatcher(log.clone());
    base.invoke_and_wait(|| {}).unwrap();
    let first = base.dispatch_thread().expect("base thread running");

    let pushed = EventQueue::new();
    base.push(pushed.clone());
    base.post_event(custom(2));
    base.invoke_and_wait(|| {}).unwrap();
    let second = pushed.dispatch_thread().expect("pushed thread running");
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(first.is_stopping());

    base.pop().unwrap();
    assert!(second.is_stopping());
    base.post_event(custom(3));
    base.invoke_and_wait(|| {}).unwrap();
    assert_eq!(
        *log.0.lock().unwrap(),
        vec![EventId::Component(2), EventId::Component(3)]
    );
    base.dispose();
}

#[test]
fn invoke_and_wait_from_dispatch_thread_is_refused() {
    init_tracing();
    let q = EventQueue::new();
    q.set_dispatcher(Arc::new(Log::default()));
    let inner = Arc::new(Mutex::new(None));
    {
        let (q2, inner) = (Arc::clone(&q), Arc::clone(&inner));
        q.invoke_and_wait(move || {
            *inner.lock().unwrap() = Some(q2.invoke_and_wait(|| {}));
        })
        .unwrap();
    }
    assert_eq!(
        *inner.lock().unwrap(),
        Some(Err(InvokeError::FromDispatchThread))
    );
    q.dispose();
}

#[test]
fn invocations_run_in_post_order() {
    init_tracing();
    let q = EventQueue::new();
    q.set_dispatcher(Arc::new(Log::default()));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let counter = Arc::new(AtomicUsize::new(0));
    for i in 0..50 {
        let (seen, counter) = (Arc::clone(&seen), Arc::clone(&counter));
        q.invoke_later(move || {
            seen.lock().unwrap().push(i);
            counter.fetch_add(1, Ordering::SeqCst);
        });
    }
    q.invoke_and_wait(|| {}).unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 50);
    assert_eq!(*seen.lock().unwrap(), (0..50).collect::<Vec<_>>());
    q.dispose();
}
