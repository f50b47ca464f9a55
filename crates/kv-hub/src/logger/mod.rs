//! In-memory structured logger.
//!
//! Every call is recorded and handed to the configured callback. Mirroring to
//! the console goes through `tracing` and is the only part gated by the
//! enabled flag and the level filter.

mod format;

pub use format::format_message;

use crate::config::HubConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Severity tag of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Error,
    Info,
    Log,
    Warn,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Error => "error",
            LogLevel::Info => "info",
            LogLevel::Log => "log",
            LogLevel::Warn => "warn",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded log call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    /// Arguments formatted into one line.
    pub message: String,
    /// The arguments as passed.
    pub args: Vec<Value>,
}

/// Callback invoked with every recorded entry.
pub type LogCallback = Arc<dyn Fn(&LogEntry) + Send + Sync>;

/// Logger behavior, replaced wholesale by [`Logger::setup`].
#[derive(Clone)]
pub struct LoggerConfig {
    /// Whether entries are mirrored to the console.
    pub enabled: bool,
    /// Levels that are mirrored; `None` lets every level through.
    pub levels: Option<HashSet<LogLevel>>,
    pub callback: Option<LogCallback>,
}

impl LoggerConfig {
    /// Record only; nothing is mirrored.
    pub fn silent() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_levels(mut self, levels: impl IntoIterator<Item = LogLevel>) -> Self {
        self.levels = Some(levels.into_iter().collect());
        self
    }

    pub fn with_callback(mut self, callback: impl Fn(&LogEntry) + Send + Sync + 'static) -> Self {
        self.callback = Some(Arc::new(callback));
        self
    }

    fn mirrors(&self, level: LogLevel) -> bool {
        self.enabled && self.levels.as_ref().map_or(true, |levels| levels.contains(&level))
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            levels: None,
            callback: None,
        }
    }
}

impl fmt::Debug for LoggerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggerConfig")
            .field("enabled", &self.enabled)
            .field("levels", &self.levels)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// Logger with in-memory history, optional console output and callback.
///
/// The history is append-only and lives as long as the logger.
#[derive(Debug, Default)]
pub struct Logger {
    config: RwLock<LoggerConfig>,
    entries: RwLock<Vec<LogEntry>>,
}

impl Logger {
    pub fn new(config: LoggerConfig) -> Self {
        Self {
            config: RwLock::new(config),
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Replace the enabled flag, level filter and callback.
    pub fn setup(&self, config: LoggerConfig) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
    }

    pub fn debug<I, V>(&self, args: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.record(LogLevel::Debug, args);
    }

    pub fn error<I, V>(&self, args: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.record(LogLevel::Error, args);
    }

    pub fn info<I, V>(&self, args: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.record(LogLevel::Info, args);
    }

    pub fn log<I, V>(&self, args: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.record(LogLevel::Log, args);
    }

    pub fn warn<I, V>(&self, args: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.record(LogLevel::Warn, args);
    }

    /// Format, store, notify, then mirror if the filters allow it.
    pub fn record<I, V>(&self, level: LogLevel, args: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let args: Vec<Value> = args.into_iter().map(Into::into).collect();
        let entry = LogEntry {
            level,
            message: format_message(&args),
            args,
        };

        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());

        // Callback runs without any lock held so it may log again.
        let (callback, mirror) = {
            let config = self.config.read().unwrap_or_else(PoisonError::into_inner);
            (config.callback.clone(), config.mirrors(level))
        };
        if let Some(callback) = callback {
            callback(&entry);
        }
        if mirror {
            emit(&entry);
        }
    }

    /// Snapshot of every entry recorded so far, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn emit(entry: &LogEntry) {
    let message = entry.message.as_str();
    match entry.level {
        LogLevel::Debug => tracing::debug!(target: HubConfig::LOG_TARGET, "{}", message),
        LogLevel::Info | LogLevel::Log => tracing::info!(target: HubConfig::LOG_TARGET, "{}", message),
        LogLevel::Warn => tracing::warn!(target: HubConfig::LOG_TARGET, "{}", message),
        LogLevel::Error => tracing::error!(target: HubConfig::LOG_TARGET, "{}", message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_every_call_is_recorded() {
        let logger = Logger::new(LoggerConfig::silent());
        logger.debug(["a"]);
        logger.error(["b"]);
        logger.info(["c"]);
        logger.log(["d"]);
        logger.warn(["e"]);

        let levels: Vec<LogLevel> = logger.entries().iter().map(|e| e.level).collect();
        assert_eq!(
            levels,
            vec![
                LogLevel::Debug,
                LogLevel::Error,
                LogLevel::Info,
                LogLevel::Log,
                LogLevel::Warn
            ]
        );
    }

    #[test]
    fn test_level_filter_does_not_gate_recording() {
        let logger = Logger::new(LoggerConfig::default().with_levels([LogLevel::Error]));
        logger.info(["kept anyway"]);
        assert_eq!(logger.len(), 1);
        assert_eq!(logger.entries()[0].message, "kept anyway");
    }

    #[test]
    fn test_entry_keeps_original_args() {
        let logger = Logger::new(LoggerConfig::silent());
        logger.warn([json!("%s joined"), json!("x"), json!(3)]);

        let entry = &logger.entries()[0];
        assert_eq!(entry.message, "x joined 3");
        assert_eq!(entry.args, vec![json!("%s joined"), json!("x"), json!(3)]);
    }

    #[test]
    fn test_callback_runs_even_when_disabled() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let logger = Logger::new(
            LoggerConfig::silent()
                .with_levels([LogLevel::Debug])
                .with_callback(move |entry| sink.lock().unwrap().push(entry.message.clone())),
        );

        logger.error(["one"]);
        logger.info(["two"]);

        assert_eq!(*seen.lock().unwrap(), vec!["one", "two"]);
    }

    #[test]
    fn test_setup_replaces_configuration() {
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        let logger = Logger::new(
            LoggerConfig::default().with_callback(move |_| *counter.lock().unwrap() += 1),
        );
        logger.info(["first"]);

        logger.setup(LoggerConfig::silent());
        logger.info(["second"]);

        assert_eq!(*calls.lock().unwrap(), 1);
        assert_eq!(logger.len(), 2);
    }

    #[test]
    fn test_callback_may_log_again() {
        let logger = Arc::new(Logger::new(LoggerConfig::silent()));
        let inner = Arc::downgrade(&logger);
        logger.setup(LoggerConfig::silent().with_callback(move |entry| {
            if entry.level == LogLevel::Warn {
                if let Some(logger) = inner.upgrade() {
                    logger.debug(["echo"]);
                }
            }
        }));

        logger.warn(["outer"]);
        assert_eq!(logger.len(), 2);
    }

    #[test]
    fn test_mirror_filter() {
        let config = LoggerConfig::default().with_levels([LogLevel::Warn]);
        assert!(config.mirrors(LogLevel::Warn));
        assert!(!config.mirrors(LogLevel::Info));
        assert!(LoggerConfig::default().mirrors(LogLevel::Debug));
        assert!(!LoggerConfig::silent().mirrors(LogLevel::Error));
    }

    #[test]
    fn test_level_serializes_lowercase() {
        let entry = LogEntry {
            level: LogLevel::Warn,
            message: "m".to_string(),
            args: vec![json!("m")],
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["level"], "warn");
    }
}
