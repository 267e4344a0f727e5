//! # ferrokv: an in-memory typed key/value store with a TCP front end
//!
//! ferrokv keeps a typed key/value table in memory, snapshots it to a
//! single binary file on demand, and serves a line-oriented command
//! protocol with RESP-shaped replies over TCP.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                             ferrokv                                │
//! │                                                                    │
//! │  ┌──────────┐   ┌───────────────┐   ┌──────────┐   ┌───────────┐   │
//! │  │ Listener │──>│  Connection   │──>│ Dispatch │──>│ Command   │   │
//! │  │ (tokio)  │   │ task + buffers│   │  table   │   │ handlers  │   │
//! │  └──────────┘   └──────┬────────┘   └──────────┘   └─────┬─────┘   │
//! │                        │ replies                         │         │
//! │                 ┌──────┴────────┐                 ┌──────┴──────┐  │
//! │                 │ Reply encoder │                 │  KvEngine   │  │
//! │                 └───────────────┘                 │ (Mutex)     │  │
//! │  ┌──────────┐                                     │  HashTable  │  │
//! │  │  Reaper  │── idle sweep ──> connection registry│  + Arena    │  │
//! │  └──────────┘                                     └──────┬──────┘  │
//! │                                                          │         │
//! │                                                   snapshot file    │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Value model
//!
//! Values are a tagged union of null, string, int64, double, bool, and
//! binary. Keys are arbitrary byte strings up to 1 MiB. String and binary
//! payloads live in a bump arena owned by the table; deletes reclaim
//! nothing until CLEAR resets everything at once.
//!
//! ## Wire protocol
//!
//! Requests are single `\n`-terminated lines split on whitespace; replies
//! use the RESP `+ - : $ *` framing:
//!
//! ```text
//! > SET name Alice          < +OK
//! > GET name                < $5 Alice
//! > DEL name                < :1
//! > GET name                < $-1
//! ```
//!
//! ## Module overview
//!
//! - [`storage`]: arena, typed values, hash table, snapshot codec, engine
//! - [`protocol`]: line framing/tokenizing and the reply encoder
//! - [`commands`]: dispatch table and the command implementations
//! - [`connection`]: per-connection tasks, registry, idle reaper

pub mod commands;
pub mod connection;
pub mod protocol;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::{CommandHandler, PROTOCOL_VERSION};
pub use connection::{handle_connection, ConnectionRegistry, Reaper, ReaperConfig, ServerStats};
pub use protocol::Reply;
pub use storage::{EngineConfig, KvEngine, StoreError, TypeTag, Value};

/// The default port the server listens on.
pub const DEFAULT_PORT: u16 = 7379;

/// The default bind address.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Crate version, reported by INFO and `--version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
