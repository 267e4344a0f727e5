//! Storage Subsystem
//!
//! The typed key/value engine and its persistence:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        KvEngine                          │
//! │                   (Mutex, one holder)                    │
//! │  ┌────────────────────────────────────────────────────┐  │
//! │  │                    HashTable                       │  │
//! │  │   buckets ──> entry chains (FNV-1a % buckets)      │  │
//! │  │   ┌──────────────────────────────────────────┐     │  │
//! │  │   │   Arena: key + payload bytes, bump-      │     │  │
//! │  │   │   allocated, reclaimed only in bulk      │     │  │
//! │  │   └──────────────────────────────────────────┘     │  │
//! │  └────────────────────────────────────────────────────┘  │
//! │            ▲                          │                  │
//! │       snapshot::load            snapshot::save           │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! - [`arena`]: block bump allocator behind every stored byte string
//! - [`value`]: the six value kinds, owned and borrowed forms
//! - [`table`]: the chained hash table and the storage error set
//! - [`snapshot`]: versioned big-endian file round-trip
//! - [`engine`]: the mutex facade the server actually talks to

pub mod arena;
pub mod engine;
pub mod snapshot;
pub mod table;
pub mod value;

// Re-export commonly used types for convenience
pub use engine::{EngineConfig, EngineStats, KvEngine};
pub use table::{HashTable, StoreError};
pub use value::{TypeTag, Value, ValueRef, MAX_STRING_SIZE};
