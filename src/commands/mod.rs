//! Command Processing
//!
//! Tokenized request lines flow through a static dispatch table into the
//! command implementations:
//!
//! ```text
//! tokens ──> table::dispatch ──> name lookup (case-insensitive)
//!                 │                    │
//!                 │              arity check (min..max)
//!                 │                    │
//!                 └──> -ERR            └──> CommandHandler::cmd_* ──> Reply
//! ```
//!
//! - [`table`]: the command table, lookup, and arity enforcement
//! - [`handler`]: the twelve command implementations

pub mod handler;
pub mod table;

// Re-export the main entry points
pub use handler::{CommandHandler, PROTOCOL_VERSION};
pub use table::{dispatch, lookup, CommandSpec, Dispatch, COMMANDS};
