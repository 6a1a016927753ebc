//! Offline asset cache
//!
//! Assets needed for offline operation are kept in named, versioned
//! generations. A generation is populated in full from a fixed manifest,
//! becomes current on activation, and is only ever removed as a whole when a
//! later generation activates. There is no per-entry eviction and no TTL.

mod manager;
mod store;

pub use manager::{ActivationReport, AssetCacheManager, CleanupError, GenerationSummary, InstallError};
pub use store::{CacheStorage, GenerationRecord, GenerationState, StorageError, StoredResponse};
