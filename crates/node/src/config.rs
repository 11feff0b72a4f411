//! Configuration of the node integration layer.
use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    broadcaster::BroadcastConfig, filter::DEFAULT_MAINTAINED_RANGE,
    listener::DEFAULT_REORG_WINDOW, logger::LoggerSettings, persist::PersistConfig,
    tracker::DEFAULT_EVENT_QUEUE_CAPACITY,
};

/// Default interval between two polls of the chain source.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// The knobs of the node integration layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Directory the node core's artifacts are persisted in.
    pub datadir: PathBuf,

    /// Number of connected blocks retained for unwinding reorgs.
    #[serde(default = "default_reorg_window")]
    pub reorg_window: usize,

    /// Number of connected blocks searched for spends of newly watched outputs.
    #[serde(default = "default_maintained_range")]
    pub maintained_range: usize,

    /// Interval between two polls of the chain source.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: Duration,

    /// Capacity of the event queue.
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,

    /// Broadcast retry policy.
    #[serde(default)]
    pub broadcast: BroadcastConfig,

    /// Manager write retry policy.
    #[serde(default)]
    pub persist: PersistConfig,

    /// Node core log settings.
    #[serde(default)]
    pub logger: LoggerSettings,
}

const fn default_reorg_window() -> usize {
    DEFAULT_REORG_WINDOW
}

const fn default_maintained_range() -> usize {
    DEFAULT_MAINTAINED_RANGE
}

const fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

const fn default_event_queue_capacity() -> usize {
    DEFAULT_EVENT_QUEUE_CAPACITY
}

impl NodeConfig {
    /// A config with every default, persisting into `datadir`.
    pub fn new(datadir: impl Into<PathBuf>) -> Self {
        Self {
            datadir: datadir.into(),
            reorg_window: DEFAULT_REORG_WINDOW,
            maintained_range: DEFAULT_MAINTAINED_RANGE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
            broadcast: BroadcastConfig::default(),
            persist: PersistConfig::default(),
            logger: LoggerSettings::default(),
        }
    }

    /// Sets the poll interval.
    pub fn with_poll_interval(self, poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            ..self
        }
    }

    /// Directory the artifacts are stored in.
    pub fn artifacts_dir(&self) -> PathBuf {
        self.datadir.join("node")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serde_toml() {
        let config = r#"
            datadir = ".data"
            reorg_window = 10
            poll_interval = { secs = 2, nanos = 0 }

            [broadcast]
            max_attempts = 4
            base_delay = { secs = 1, nanos = 0 }
            max_delay = { secs = 30, nanos = 0 }

            [persist]
            max_retry_count = 5
            backoff_period = { secs = 0, nanos = 250000000 }

            [logger]
            log_gossip = true
        "#;

        let config = toml::from_str::<NodeConfig>(config);
        assert!(config.is_ok(), "must be able to deserialize config from toml");

        let config = config.unwrap();
        assert_eq!(config.reorg_window, 10);
        assert_eq!(config.maintained_range, DEFAULT_MAINTAINED_RANGE);
        assert_eq!(config.broadcast.max_attempts, 4);
        assert_eq!(config.persist.max_retry_count(), 5);
        assert!(config.logger.log_gossip);
    }
}
