#![forbid(unsafe_code)]

//! Logging facade.
//!
//! With the `tracing` feature the usual macros are re-exported here so
//! downstream crates can write `ftk_core::logging::debug!` without naming
//! `tracing` themselves. With `tracing-json` a JSON subscriber can be
//! installed for production runs.
//!
//! Filter directives come from `FTK_LOG`, falling back to `RUST_LOG`, then
//! to `warn`.

#[cfg(feature = "tracing")]
pub use tracing::{
    debug, debug_span, error, error_span, info, info_span, trace, trace_span, warn, warn_span,
};

/// Environment variable consulted first for filter directives.
pub const LOG_ENV: &str = "FTK_LOG";

/// Directive used when neither `FTK_LOG` nor `RUST_LOG` is set.
pub const DEFAULT_DIRECTIVE: &str = "warn";

/// Resolve filter directives with a custom environment lookup.
#[must_use]
pub fn filter_directives_from<F>(get_env: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    get_env(LOG_ENV)
        .or_else(|| get_env("RUST_LOG"))
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_DIRECTIVE.to_owned())
}

/// Filter directives from the process environment.
#[must_use]
pub fn filter_directives() -> String {
    filter_directives_from(|key| std::env::var(key).ok())
}

/// Install a global JSON subscriber writing to stderr.
///
/// Returns `false` if a global subscriber was already set.
#[cfg(feature = "tracing-json")]
pub fn init_subscriber() -> bool {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_new(filter_directives()).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ftk_log_wins_over_rust_log() {
        let got = filter_directives_from(|k| match k {
            "FTK_LOG" => Some("ftk_focus=trace".into()),
            "RUST_LOG" => Some("info".into()),
            _ => None,
        });
        assert_eq!(got, "ftk_focus=trace");
    }

    #[test]
    fn blank_falls_through() {
        let got = filter_directives_from(|k| match k {
            "FTK_LOG" => Some("  ".into()),
            _ => None,
        });
        assert_eq!(got, DEFAULT_DIRECTIVE);
    }
}
