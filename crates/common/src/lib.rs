//! Crate includes reusable utils shared by the swapline services.
//! Such as initializing the tracing framework and retrying fallible async calls.

pub mod logging;
pub mod retry;

// Re-export tracing crate for convenience.
pub use tracing;
