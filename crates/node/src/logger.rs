//! Routes the node core's log records into `tracing`.
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};

/// Severity of a node core log record. `Gossip` is the chattiest, below `Trace`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Peer-to-peer gossip traffic.
    Gossip,
    /// Very detailed tracing.
    Trace,
    /// Debugging detail.
    Debug,
    /// Informational.
    Info,
    /// Something unexpected that was handled.
    Warn,
    /// Something failed.
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Gossip => "gossip",
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

/// A single log record from the node core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Severity.
    pub level: LogLevel,

    /// The node core module the record originates from.
    pub module: String,

    /// The formatted message.
    pub message: String,
}

impl LogRecord {
    /// Creates a record.
    pub fn new(level: LogLevel, module: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            module: module.into(),
            message: message.into(),
        }
    }
}

/// Settings of the [`EventLogger`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerSettings {
    /// Whether gossip records are forwarded.
    #[serde(default)]
    pub log_gossip: bool,
}

/// Leveled sink for node core log records. Never blocks and never fails.
///
/// Records are emitted under the `node_core` target so they can be filtered independently, e.g.
/// `RUST_LOG=node_core=warn`.
#[derive(Debug, Clone, Default)]
pub struct EventLogger {
    settings: LoggerSettings,
}

impl EventLogger {
    /// Creates a logger.
    pub const fn new(settings: LoggerSettings) -> Self {
        Self { settings }
    }

    /// Whether a record of `level` would be forwarded.
    pub const fn enabled(&self, level: LogLevel) -> bool {
        !matches!(level, LogLevel::Gossip) || self.settings.log_gossip
    }

    /// Forwards `record` to `tracing`, unless it is suppressed.
    pub fn log(&self, record: &LogRecord) {
        if !self.enabled(record.level) {
            return;
        }

        let module = record.module.as_str();
        let message = record.message.as_str();
        match record.level {
            LogLevel::Gossip => trace!(target: "node_core", %module, gossip = true, "{message}"),
            LogLevel::Trace => trace!(target: "node_core", %module, "{message}"),
            LogLevel::Debug => debug!(target: "node_core", %module, "{message}"),
            LogLevel::Info => info!(target: "node_core", %module, "{message}"),
            LogLevel::Warn => warn!(target: "node_core", %module, "{message}"),
            LogLevel::Error => error!(target: "node_core", %module, "{message}"),
        }
    }
}
