//! # `swapline-node`
//!
//! The integration layer between the Lightning node core and the outside world. It keeps the node
//! core's view of the chain in step with a [`ChainSource`](swapline_chain::ChainSource), submits
//! the transactions the node core produces, persists its recoverable state and delivers the events
//! it emits.
//!
//! The node core itself is opaque and reached only through the traits in [`core`].

pub mod broadcaster;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod filter;
pub mod listener;
pub mod logger;
pub mod persist;
pub mod subscription;
pub mod sync;
pub mod tracker;

pub use broadcaster::{BroadcastConfig, BroadcastFailure, TransactionBroadcaster};
pub use config::NodeConfig;
pub use context::NodeContext;
pub use events::{NodeEvent, PendingEventRecord};
pub use filter::{ChainFilter, WatchedOutput};
pub use listener::ChainSyncListener;
pub use logger::{EventLogger, LogLevel, LogRecord, LoggerSettings};
pub use persist::{ArtifactStore, FsArtifactStore, PersistConfig, PersistedArtifact, StatePersister};
pub use sync::ChainSyncWorker;
pub use tracker::{EventHandler, EventTracker};
