#![forbid(unsafe_code)]

//! Process-wide focus slots.
//!
//! # Design
//!
//! [`FocusState`] holds the focus owner, permanent focus owner, focused
//! window, active window, and current focus-cycle root. Every write goes
//! through the vetoable listeners first; a vetoed write leaves the slot
//! unchanged. Callers that need to know whether a write stuck read the slot
//! back afterwards (the state machine does this after every assignment).
//!
//! ## Invariants
//!
//! 1. The focus owner and permanent focus owner are focusable components
//!    (or `None`). The focused window is a focusable window (or `None`).
//! 2. Listeners run without the slot lock held, so a listener may read the
//!    state or even write another slot.
//! 3. Post-change listeners only see writes that were actually applied.
//! 4. A write is compare-and-set against the value the vetoes approved. If
//!    another thread changed the slot while the vetoes ran, the vetoes run
//!    again against the new value, so every `(old, new)` pair a listener
//!    sees is a transition that really happened.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use ftk_core::component::{ComponentId, ComponentTree};
use tracing::{debug, trace};

/// One of the global focus slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FocusSlot {
    FocusOwner,
    PermanentFocusOwner,
    FocusedWindow,
    ActiveWindow,
    CurrentFocusCycleRoot,
}

/// Observer of focus slot writes.
pub trait FocusListener: Send + Sync {
    /// Called before a write. Returning false vetoes it.
    fn vetoable_change(
        &self,
        _slot: FocusSlot,
        _old: Option<ComponentId>,
        _new: Option<ComponentId>,
    ) -> bool {
        true
    }

    /// Called after a write was applied.
    fn focus_changed(&self, _slot: FocusSlot, _old: Option<ComponentId>, _new: Option<ComponentId>) {}
}

/// Copy of every slot at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FocusSnapshot {
    pub focus_owner: Option<ComponentId>,
    pub permanent_focus_owner: Option<ComponentId>,
    pub focused_window: Option<ComponentId>,
    pub active_window: Option<ComponentId>,
    pub current_focus_cycle_root: Option<ComponentId>,
}

impl FocusSnapshot {
    fn slot_mut(&mut self, slot: FocusSlot) -> &mut Option<ComponentId> {
        match slot {
            FocusSlot::FocusOwner => &mut self.focus_owner,
            FocusSlot::PermanentFocusOwner => &mut self.permanent_focus_owner,
            FocusSlot::FocusedWindow => &mut self.focused_window,
            FocusSlot::ActiveWindow => &mut self.active_window,
            FocusSlot::CurrentFocusCycleRoot => &mut self.current_focus_cycle_root,
        }
    }

    #[must_use]
    pub fn get(&self, slot: FocusSlot) -> Option<ComponentId> {
        match slot {
            FocusSlot::FocusOwner => self.focus_owner,
            FocusSlot::PermanentFocusOwner => self.permanent_focus_owner,
            FocusSlot::FocusedWindow => self.focused_window,
            FocusSlot::ActiveWindow => self.active_window,
            FocusSlot::CurrentFocusCycleRoot => self.current_focus_cycle_root,
        }
    }
}

/// The global focus slots and their listeners.
#[derive(Default)]
pub struct FocusState {
    slots: Mutex<FocusSnapshot>,
    listeners: RwLock<Vec<Arc<dyn FocusListener>>>,
}

impl fmt::Debug for FocusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FocusState")
            .field("slots", &*self.lock())
            .finish_non_exhaustive()
    }
}

impl FocusState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FocusSnapshot> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn snapshot(&self) -> FocusSnapshot {
        *self.lock()
    }

    #[must_use]
    pub fn focus_owner(&self) -> Option<ComponentId> {
        self.lock().focus_owner
    }

    #[must_use]
    pub fn permanent_focus_owner(&self) -> Option<ComponentId> {
        self.lock().permanent_focus_owner
    }

    #[must_use]
    pub fn focused_window(&self) -> Option<ComponentId> {
        self.lock().focused_window
    }

    #[must_use]
    pub fn active_window(&self) -> Option<ComponentId> {
        self.lock().active_window
    }

    #[must_use]
    pub fn current_focus_cycle_root(&self) -> Option<ComponentId> {
        self.lock().current_focus_cycle_root
    }

    pub fn add_listener(&self, listener: Arc<dyn FocusListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Remove a listener previously added. Returns false if it was not found.
    pub fn remove_listener(&self, listener: &Arc<dyn FocusListener>) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    fn listeners(&self) -> Vec<Arc<dyn FocusListener>> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Veto check, write, notify. Returns whether the slot now holds `new`.
    fn set_slot(&self, slot: FocusSlot, new: Option<ComponentId>) -> bool {
        loop {
            let old = self.lock().get(slot);
            if old == new {
                return true;
            }
            let listeners = self.listeners();
            if let Some(pos) = listeners
                .iter()
                .position(|l| !l.vetoable_change(slot, old, new))
            {
                debug!(?slot, ?old, ?new, listener = pos, "focus change vetoed");
                return false;
            }
            {
                let mut slots = self.lock();
                if slots.get(slot) != old {
                    trace!(?slot, ?old, ?new, "focus slot raced, re-running vetoes");
                    continue;
                }
                *slots.slot_mut(slot) = new;
            }
            trace!(?slot, ?old, ?new, "focus slot changed");
            for listener in &listeners {
                listener.focus_changed(slot, old, new);
            }
            return true;
        }
    }

    /// Set the focus owner. A non-focusable component is refused. Moving
    /// into another focus cycle also moves the current cycle root.
    pub fn set_focus_owner(&self, tree: &ComponentTree, owner: Option<ComponentId>) {
        if let Some(c) = owner
            && !tree.is_focusable(c)
        {
            debug!(component = %c, "focus owner refused: not focusable");
            return;
        }
        if !self.set_slot(FocusSlot::FocusOwner, owner) {
            return;
        }
        let Some(c) = owner else {
            return;
        };
        let in_current_cycle = self
            .current_focus_cycle_root()
            .is_some_and(|root| tree.is_in_focus_cycle(c, root));
        if !in_current_cycle {
            let root = tree
                .focus_cycle_root_ancestor(c)
                .or_else(|| tree.is_window(c).then_some(c));
            if let Some(root) = root {
                self.set_current_focus_cycle_root(Some(root));
            }
        }
    }

    /// Set the permanent focus owner and record it as its window's most
    /// recent focus owner.
    pub fn set_permanent_focus_owner(&self, tree: &ComponentTree, owner: Option<ComponentId>) {
        if let Some(c) = owner
            && !tree.is_focusable(c)
        {
            debug!(component = %c, "permanent focus owner refused: not focusable");
            return;
        }
        if self.set_slot(FocusSlot::PermanentFocusOwner, owner)
            && let Some(c) = owner
            && let Some(window) = tree.window_of(c)
        {
            tree.set_most_recent_focus_owner(window, Some(c));
        }
    }

    /// Set the focused window. A window that cannot take focus is refused.
    pub fn set_focused_window(&self, tree: &ComponentTree, window: Option<ComponentId>) {
        if let Some(w) = window
            && !tree.is_focusable_window(w)
        {
            debug!(window = %w, "focused window refused: not focusable");
            return;
        }
        self.set_slot(FocusSlot::FocusedWindow, window);
    }

    pub fn set_active_window(&self, window: Option<ComponentId>) {
        self.set_slot(FocusSlot::ActiveWindow, window);
    }

    pub fn set_current_focus_cycle_root(&self, root: Option<ComponentId>) {
        self.set_slot(FocusSlot::CurrentFocusCycleRoot, root);
    }
}
