//! Durable storage of the node core's recoverable state.
//!
//! The node core hands out three artifacts: the channel manager, the network graph and the
//! scorer. Only the manager is critical. Losing a manager write means channel state may be lost,
//! so [`StatePersister`] treats an unrecoverable manager write as fatal for further channel
//! updates. The other two are caches that can be rebuilt.

pub mod config;
pub mod persister;
pub mod store;

pub use config::PersistConfig;
pub use persister::StatePersister;
pub use store::{ArtifactStore, FsArtifactStore, InMemoryArtifactStore, PersistedArtifact};
