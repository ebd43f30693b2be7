//! Native log levels and log hooks.

use std::fmt;
use std::sync::Arc;

/// Severity attached to every native log line. Lower is more severe.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
}

impl LogLevel {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            1 => Some(LogLevel::Error),
            2 => Some(LogLevel::Warn),
            3 => Some(LogLevel::Info),
            4 => Some(LogLevel::Debug),
            _ => None,
        }
    }

    pub fn as_raw(self) -> i32 {
        self as i32
    }

    /// Whether a line at `self` passes a hook registered with `min_level`.
    pub fn passes(self, min_level: LogLevel) -> bool {
        self <= min_level
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        })
    }
}

/// Receives native log lines. May be invoked from inside any dispatch.
pub type LogHook = Arc<dyn Fn(LogLevel, &str) + Send + Sync>;

pub fn format_line(level: LogLevel, message: &str) -> String {
    format!("[{level}] {message}")
}

/// Prints `[LEVEL] message` to stderr. Installed on every new session.
pub fn default_log_hook() -> LogHook {
    Arc::new(|level: LogLevel, message: &str| eprintln!("{}", format_line(level, message)))
}

/// Forwards native log lines into `tracing` under the `gamesdk::native` target.
pub fn tracing_log_hook() -> LogHook {
    Arc::new(|level: LogLevel, message: &str| match level {
        LogLevel::Error => tracing::error!(target: "gamesdk::native", "{message}"),
        LogLevel::Warn => tracing::warn!(target: "gamesdk::native", "{message}"),
        LogLevel::Info => tracing::info!(target: "gamesdk::native", "{message}"),
        LogLevel::Debug => tracing::debug!(target: "gamesdk::native", "{message}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_line() {
        assert_eq!(format_line(LogLevel::Debug, "hello"), "[DEBUG] hello");
        assert_eq!(format_line(LogLevel::Error, "boom"), "[ERROR] boom");
    }

    #[test]
    fn test_level_filtering() {
        assert!(LogLevel::Error.passes(LogLevel::Debug));
        assert!(LogLevel::Warn.passes(LogLevel::Warn));
        assert!(!LogLevel::Debug.passes(LogLevel::Info));
    }

    #[test]
    fn test_raw_levels() {
        assert_eq!(LogLevel::from_raw(3), Some(LogLevel::Info));
        assert_eq!(LogLevel::from_raw(0), None);
        assert_eq!(LogLevel::Warn.as_raw(), 2);
    }
}
