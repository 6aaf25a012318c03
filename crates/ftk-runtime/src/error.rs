#![forbid(unsafe_code)]

//! Runtime error types.

use std::fmt;

/// Failures of queue operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// `pop` on a queue that was never pushed.
    EmptyStack,
    /// A blocking retrieval was woken by [`crate::EventQueue::interrupt`].
    Interrupted,
    /// The queue belongs to a disposed context.
    Disposed,
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyStack => write!(f, "event queue stack underflow: no previous queue"),
            Self::Interrupted => write!(f, "blocking event retrieval interrupted"),
            Self::Disposed => write!(f, "event queue disposed"),
        }
    }
}

impl std::error::Error for QueueError {}

/// Failures of [`crate::EventQueue::invoke_and_wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeError {
    /// Called on the dispatch thread that would have to run the invocation.
    FromDispatchThread,
    /// The queue was disposed before the invocation ran.
    Disposed,
    /// The invocation was discarded without running.
    Interrupted,
    /// The invocation panicked.
    Panicked,
}

impl fmt::Display for InvokeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FromDispatchThread => {
                write!(f, "cannot wait for an invocation from the dispatch thread")
            }
            Self::Disposed => write!(f, "event queue disposed before invocation ran"),
            Self::Interrupted => write!(f, "invocation discarded before it ran"),
            Self::Panicked => write!(f, "invocation panicked"),
        }
    }
}

impl std::error::Error for InvokeError {}

impl From<QueueError> for InvokeError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Disposed => Self::Disposed,
            QueueError::EmptyStack | QueueError::Interrupted => Self::Interrupted,
        }
    }
}
