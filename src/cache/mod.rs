//! Result caching
//!
//! - Deterministic fingerprints over tool name and parameters
//! - Pluggable backing store with expiry
//! - Single-flight coordination of concurrent identical steps

pub mod fingerprint;
pub mod result_cache;
pub mod store;

pub use fingerprint::{to_canonical_json, Fingerprint};
pub use result_cache::{Claim, FlightLeader, ResultCache, DEFAULT_TTL};
pub use store::{CacheEntry, CacheStore, MemoryStore};
