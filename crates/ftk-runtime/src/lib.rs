#![forbid(unsafe_code)]

//! Runtime: event queues, dispatch threads, contexts, and synchronous sends.
//!
//! # Role in ftk
//! `ftk-runtime` moves [`ftk_core::Event`] values from producers (native
//! input translation, programmatic posts, the focus manager) to the one
//! thread per context that dispatches them.
//!
//! # Primary responsibilities
//! - **EventQueue**: three priority lanes, coalescing, stack push/pop,
//!   blocking and filtered retrieval, invocations.
//! - **DispatchThread**: lazily started worker per queue; nested pumping for
//!   modal loops and synchronous sends.
//! - **AppContext / ContextRegistry**: context identity and disposal.
//! - **send_message**: deliver an event in another context and wait for it.

pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod queue;
pub mod sent;

pub use config::RuntimeConfig;
pub use context::{AppContext, ContextRegistry};
pub use dispatch::DispatchThread;
pub use error::{InvokeError, QueueError};
pub use queue::{DispatchMode, EventQueue, Lane, QueuedEvent};
pub use sent::{SentEvent, send_message};
