//! Line Framing and Tokenization
//!
//! Requests arrive as `\n`-terminated text lines (an optional preceding
//! `\r` is stripped). TCP gives no message boundaries, so the connection
//! handler accumulates reads in a buffer and this module carves complete
//! lines out of it:
//!
//! 1. Append incoming bytes to the buffer
//! 2. Call [`next_line`] until it yields `None`
//! 3. [`tokenize`] each line and dispatch
//! 4. A buffer that fills up without a newline is a protocol violation;
//!    the caller reports `Command too long` and drops the connection
//!
//! Tokens are slices of the line (`Bytes` handles, no copying), split on
//! runs of spaces and tabs. The server honors no quoting; a SET value with
//! spaces is reassembled by the handler from the trailing tokens.

use bytes::{Bytes, BytesMut};
use thiserror::Error;

/// A line in progress may use at most this many bytes (64 KiB − 1). One
/// byte of headroom distinguishes "full with newline" from "overflow".
pub const MAX_LINE_LEN: usize = 64 * 1024 - 1;

/// Tokens beyond this count are dropped.
pub const MAX_TOKENS: usize = 32;

/// Framing errors. Both are fatal for the connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The buffer filled up without a line terminator.
    #[error("Command too long")]
    LineTooLong,
}

/// Extracts the next complete line from `buf`, consuming it (terminator
/// included). The returned line has `\n` and any preceding `\r` stripped.
///
/// Returns `Ok(None)` when no full line is buffered yet; the caller should
/// read more. Returns [`FrameError::LineTooLong`] once the partial line
/// reaches [`MAX_LINE_LEN`].
pub fn next_line(buf: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
    match buf.iter().position(|&b| b == b'\n') {
        Some(pos) => {
            let mut line = buf.split_to(pos + 1).freeze();
            // Drop '\n' and an optional '\r' before it.
            let mut end = line.len() - 1;
            if end > 0 && line[end - 1] == b'\r' {
                end -= 1;
            }
            line.truncate(end);
            Ok(Some(line))
        }
        None if buf.len() >= MAX_LINE_LEN => Err(FrameError::LineTooLong),
        None => Ok(None),
    }
}

/// Splits a line into at most [`MAX_TOKENS`] tokens on runs of space/tab.
///
/// An empty or all-whitespace line yields no tokens; the caller skips it
/// silently.
pub fn tokenize(line: &Bytes) -> Vec<Bytes> {
    let mut tokens = Vec::new();
    let mut start = None;

    for (i, &byte) in line.iter().enumerate() {
        let is_sep = byte == b' ' || byte == b'\t';
        match (start, is_sep) {
            (None, false) => start = Some(i),
            (Some(s), true) => {
                if tokens.len() < MAX_TOKENS {
                    tokens.push(line.slice(s..i));
                }
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        if tokens.len() < MAX_TOKENS {
            tokens.push(line.slice(s..));
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buf(data: &[u8]) -> BytesMut {
        BytesMut::from(data)
    }

    #[test]
    fn test_next_line_lf() {
        let mut b = buf(b"PING\n");
        assert_eq!(next_line(&mut b).unwrap(), Some(Bytes::from_static(b"PING")));
        assert!(b.is_empty());
    }

    #[test]
    fn test_next_line_crlf() {
        let mut b = buf(b"PING\r\nGET k\r\n");
        assert_eq!(next_line(&mut b).unwrap(), Some(Bytes::from_static(b"PING")));
        assert_eq!(
            next_line(&mut b).unwrap(),
            Some(Bytes::from_static(b"GET k"))
        );
        assert_eq!(next_line(&mut b).unwrap(), None);
    }

    #[test]
    fn test_incomplete_line() {
        let mut b = buf(b"PARTIAL");
        assert_eq!(next_line(&mut b).unwrap(), None);
        assert_eq!(b.len(), 7); // untouched
    }

    #[test]
    fn test_empty_line() {
        let mut b = buf(b"\n\r\n");
        assert_eq!(next_line(&mut b).unwrap(), Some(Bytes::new()));
        assert_eq!(next_line(&mut b).unwrap(), Some(Bytes::new()));
    }

    #[test]
    fn test_line_too_long() {
        let mut b = BytesMut::new();
        b.resize(MAX_LINE_LEN, b'x');
        assert_eq!(next_line(&mut b), Err(FrameError::LineTooLong));
    }

    #[test]
    fn test_long_line_with_terminator_is_fine() {
        let mut b = BytesMut::new();
        b.resize(MAX_LINE_LEN - 1, b'x');
        b.extend_from_slice(b"\n");
        let line = next_line(&mut b).unwrap().unwrap();
        assert_eq!(line.len(), MAX_LINE_LEN - 1);
    }

    #[test]
    fn test_tokenize_basic() {
        let tokens = tokenize(&Bytes::from_static(b"SET name Alice"));
        assert_eq!(
            tokens,
            vec![
                Bytes::from_static(b"SET"),
                Bytes::from_static(b"name"),
                Bytes::from_static(b"Alice"),
            ]
        );
    }

    #[test]
    fn test_tokenize_runs_and_tabs() {
        let tokens = tokenize(&Bytes::from_static(b"  GET\t\t key  "));
        assert_eq!(
            tokens,
            vec![Bytes::from_static(b"GET"), Bytes::from_static(b"key")]
        );
    }

    #[test]
    fn test_tokenize_empty() {
        assert!(tokenize(&Bytes::new()).is_empty());
        assert!(tokenize(&Bytes::from_static(b" \t ")).is_empty());
    }

    #[test]
    fn test_tokenize_caps_token_count() {
        let line = "t ".repeat(MAX_TOKENS + 10);
        let tokens = tokenize(&Bytes::from(line));
        assert_eq!(tokens.len(), MAX_TOKENS);
    }

    #[test]
    fn test_tokens_are_byte_exact() {
        let tokens = tokenize(&Bytes::from_static(b"SET k\xc3\xa9y v"));
        assert_eq!(tokens[1], Bytes::from_static(b"k\xc3\xa9y"));
    }
}
