#![forbid(unsafe_code)]

//! Queue-facing adapter that feeds a context's events to its coordinator.

use std::sync::Arc;

use ftk_core::event::{Event, EventDispatcher};

use crate::coordinator::FocusCoordinator;

/// [`EventDispatcher`] installed on a context's queue by
/// [`FocusSystem::attach`](crate::FocusSystem::attach).
#[derive(Debug, Clone)]
pub struct FocusDispatcher {
    coordinator: Arc<FocusCoordinator>,
}

impl FocusDispatcher {
    #[must_use]
    pub fn new(coordinator: Arc<FocusCoordinator>) -> Self {
        Self { coordinator }
    }

    #[must_use]
    pub fn coordinator(&self) -> &Arc<FocusCoordinator> {
        &self.coordinator
    }
}

impl EventDispatcher for FocusDispatcher {
    fn dispatch_event(&self, event: Event) {
        self.coordinator.dispatch(event);
    }

    /// Synthesized events count towards the coordinator's send depth while
    /// they are handled.
    fn dispatch_sent(&self, event: Event) {
        let _scope = self.coordinator.enter_send();
        self.coordinator.dispatch(event);
    }
}
