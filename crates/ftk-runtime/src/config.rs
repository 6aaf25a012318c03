#![forbid(unsafe_code)]

//! Runtime configuration.

use std::time::Duration;

/// Default wait slice for cross-context sends and `invoke_and_wait`.
pub const DEFAULT_SEND_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default dispatch thread name prefix.
pub const DEFAULT_THREAD_NAME_PREFIX: &str = "ftk-dispatch";

/// Configuration shared by a context's queues and dispatch threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Upper bound on a single blocking wait while a synchronous send or
    /// invocation is outstanding. Disposal is signalled explicitly; this only
    /// bounds how long a missed signal can go unnoticed.
    pub send_poll_interval: Duration,
    /// Dispatch threads are named `{prefix}-{context}`.
    pub thread_name_prefix: String,
    /// Merge compatible events when posting.
    pub coalescing: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            send_poll_interval: DEFAULT_SEND_POLL_INTERVAL,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_owned(),
            coalescing: true,
        }
    }
}

#[inline]
fn env_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl RuntimeConfig {
    /// Defaults overridden by `FTK_SEND_POLL_MS` and `FTK_COALESCE`.
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
        if let Some(ms) = get_env("FTK_SEND_POLL_MS").and_then(|v| v.trim().parse::<u64>().ok())
            && ms > 0
        {
            config.send_poll_interval = Duration::from_millis(ms);
        }
        if let Some(flag) = get_env("FTK_COALESCE").as_deref().and_then(env_flag) {
            config.coalescing = flag;
        }
        config
    }

    #[must_use]
    pub fn with_send_poll_interval(mut self, interval: Duration) -> Self {
        self.send_poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn with_coalescing(mut self, enabled: bool) -> Self {
        self.coalescing = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides() {
        let config = RuntimeConfig::from_env_with(|k| match k {
            "FTK_SEND_POLL_MS" => Some("250".into()),
            "FTK_COALESCE" => Some("off".into()),
            _ => None,
        });
        assert_eq!(config.send_poll_interval, Duration::from_millis(250));
        assert!(!config.coalescing);
    }

    #[test]
    fn bad_values_keep_defaults() {
        let config = RuntimeConfig::from_env_with(|k| match k {
            "FTK_SEND_POLL_MS" => Some("0".into()),
            "FTK_COALESCE" => Some("maybe".into()),
            _ => None,
        });
        assert_eq!(config, RuntimeConfig::default());
    }
}
