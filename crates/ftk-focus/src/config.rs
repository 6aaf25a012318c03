#![forbid(unsafe_code)]

//! Focus manager configuration.

use std::collections::HashSet;

use ftk_core::component::TraversalKind;
use ftk_core::keystroke::{KeyCode, KeyStroke, Modifiers};

/// Default traversal keys and type-ahead housekeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusConfig {
    forward: HashSet<KeyStroke>,
    backward: HashSet<KeyStroke>,
    up_cycle: HashSet<KeyStroke>,
    down_cycle: HashSet<KeyStroke>,
    /// Drop every type-ahead marker once no focus request is outstanding.
    pub clear_markers_when_idle: bool,
}

impl Default for FocusConfig {
    fn default() -> Self {
        let tab = |mods| KeyStroke::pressed(KeyCode::Tab, mods);
        Self {
            forward: [tab(Modifiers::empty()), tab(Modifiers::CTRL)].into(),
            backward: [tab(Modifiers::SHIFT), tab(Modifiers::CTRL | Modifiers::SHIFT)].into(),
            up_cycle: HashSet::new(),
            down_cycle: HashSet::new(),
            clear_markers_when_idle: true,
        }
    }
}

impl FocusConfig {
    /// Defaults overridden by `FTK_FOCUS_CLEAR_MARKERS`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// [`Self::from_env`] with a custom environment lookup.
    #[must_use]
    pub fn from_env_with<F>(get_env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(value) = get_env("FTK_FOCUS_CLEAR_MARKERS") {
            match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => config.clear_markers_when_idle = true,
                "0" | "false" | "no" | "off" => config.clear_markers_when_idle = false,
                _ => {}
            }
        }
        config
    }

    /// Default key set for `kind`, used where no component overrides it.
    #[must_use]
    pub fn traversal_keys(&self, kind: TraversalKind) -> &HashSet<KeyStroke> {
        match kind {
            TraversalKind::Forward => &self.forward,
            TraversalKind::Backward => &self.backward,
            TraversalKind::UpCycle => &self.up_cycle,
            TraversalKind::DownCycle => &self.down_cycle,
        }
    }

    #[must_use]
    pub fn with_traversal_keys(
        mut self,
        kind: TraversalKind,
        keys: impl IntoIterator<Item = KeyStroke>,
    ) -> Self {
        let keys = keys.into_iter().collect();
        match kind {
            TraversalKind::Forward => self.forward = keys,
            TraversalKind::Backward => self.backward = keys,
            TraversalKind::UpCycle => self.up_cycle = keys,
            TraversalKind::DownCycle => self.down_cycle = keys,
        }
        self
    }

    #[must_use]
    pub fn with_clear_markers_when_idle(mut self, enabled: bool) -> Self {
        self.clear_markers_when_idle = enabled;
        self
    }
}
