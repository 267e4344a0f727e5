//! Connection Management
//!
//! The serving side of the TCP front end:
//!
//! ```text
//! ┌──────────────┐ accept ┌──────────────────┐ register ┌────────────────┐
//! │ TCP listener │ ─────> │ handle_connection │ ───────> │    Registry    │
//! │  (main.rs)   │        │  (task per client)│          │ (Mutex'd list) │
//! └──────────────┘        └──────────────────┘          └────────┬───────┘
//!                                                                │ sweep
//!                                                       ┌────────┴───────┐
//!                                                       │     Reaper     │
//!                                                       │ (10 s interval)│
//!                                                       └────────────────┘
//! ```
//!
//! - [`handler`]: the per-connection read/dispatch/write loop and the
//!   server-wide counters
//! - [`registry`]: live-connection list, admission control, close signals
//! - [`reaper`]: periodic idle sweep

pub mod handler;
pub mod reaper;
pub mod registry;

// Re-export commonly used types
pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ServerStats};
pub use reaper::{Reaper, ReaperConfig};
pub use registry::{ConnectionEntry, ConnectionRegistry, MAX_CLIENTS};
