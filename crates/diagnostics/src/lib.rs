//! Logging for the directory table workspace
//!
//! Every crate logs through these macros so one environment variable controls
//! the whole process.
//!
//! Usage:
//! - Set DIRTABLE_LOG=off (default) - no logs
//! - Set DIRTABLE_LOG=info - lifecycle events (create, drop, commit drains)
//! - Set DIRTABLE_LOG=debug - per-file and per-connection detail
//! - Set DIRTABLE_LOG=warn - only the warnings the storage layer raises

use std::sync::Once;

// Re-export emit so macros can use it
pub use emit;

/// Environment variable that selects the minimum level
pub const LOG_ENV: &str = "DIRTABLE_LOG";

static INIT: Once = Once::new();

/// Parse a level name. `None` means logging is off; unknown names are `Err`.
pub fn parse_level(value: &str) -> Result<Option<emit::Level>, String> {
    match value.to_ascii_lowercase().as_str() {
        "off" | "" => Ok(None),
        "debug" => Ok(Some(emit::Level::Debug)),
        "info" => Ok(Some(emit::Level::Info)),
        "warn" | "warning" => Ok(Some(emit::Level::Warn)),
        "error" => Ok(Some(emit::Level::Error)),
        other => Err(other.to_string()),
    }
}

/// Initialize diagnostics based on the DIRTABLE_LOG environment variable
///
/// Safe to call any number of times; only the first call installs a sink.
pub fn init_diagnostics() {
    INIT.call_once(|| {
        let value = std::env::var(LOG_ENV).unwrap_or_else(|_| "off".to_string());

        let (level, unknown) = match parse_level(&value) {
            Ok(None) => return,
            Ok(Some(level)) => (level, None),
            Err(unknown) => (emit::Level::Info, Some(unknown)),
        };

        let rt = emit::setup()
            .emit_to(emit_term::stderr())
            .emit_when(emit::level::min_filter(level))
            .init();

        if let Some(unknown) = unknown {
            emit::warn!("Unknown {var} value {unknown}, using info", var: LOG_ENV, unknown: unknown);
        }

        // The sink lives for the rest of the process.
        std::mem::forget(rt);
    });
}

/// Lifecycle events: tables created, storage dropped, transactions finished
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::emit::info!($($arg)*)
    };
}

/// Per-operation detail: opens, cache hits, pending entries
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::emit::debug!($($arg)*)
    };
}

/// Conditions that do not change the outcome but need an operator's eye.
/// Drain-time unlink failures and handle leaks are reported here.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::emit::warn!($($arg)*)
    };
}

/// Failures that abort the current command
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::emit::error!($($arg)*)
    };
}

/// Re-export the init function for convenience
pub use init_diagnostics as init;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_safe_to_call_multiple_times() {
        init_diagnostics();
        init_diagnostics();
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("off").unwrap(), None);
        assert_eq!(parse_level("DEBUG").unwrap(), Some(emit::Level::Debug));
        assert_eq!(parse_level("warning").unwrap(), Some(emit::Level::Warn));
        assert_eq!(parse_level("loud").unwrap_err(), "loud");
    }

    #[test]
    fn test_macros_compile() {
        log_info!("Test message");
        log_debug!("Debug message with {value}", value: 42);
        log_warn!("Warning message");
        log_error!("Error message");
    }
}
