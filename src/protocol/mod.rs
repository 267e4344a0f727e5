//! Wire Protocol
//!
//! Requests are single text lines; replies are RESP-shaped frames. The two
//! halves are deliberately asymmetric: requests stay a plain line protocol
//! that is easy to type into netcat, not full RESP.
//!
//! - [`parser`]: line framing out of the read buffer, whitespace
//!   tokenization
//! - [`reply`]: reply construction and encoding into the write buffer

pub mod parser;
pub mod reply;

// Re-export commonly used types for convenience
pub use parser::{next_line, tokenize, FrameError, MAX_LINE_LEN, MAX_TOKENS};
pub use reply::Reply;
