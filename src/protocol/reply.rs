//! Reply Encoder
//!
//! Replies use the RESP framing prefixes:
//!
//! - `+` simple status (`+OK\r\n`, `+PONG\r\n`)
//! - `-` error (`-ERR <message>\r\n`)
//! - `:` integer (`:1\r\n`)
//! - `$` bulk string (`$5\r\nhello\r\n`); an absent value is `$-1\r\n`
//! - `*` array header followed by its elements
//!
//! Every reply is appended into the connection's write buffer with
//! [`Reply::write_to`]; nothing here touches the socket.

use bytes::{BufMut, Bytes, BytesMut};

const CRLF: &[u8] = b"\r\n";

/// One complete reply to a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// `+OK`
    Ok,
    /// `+PONG`
    Pong,
    /// Arbitrary simple status line (no CR/LF allowed in the text).
    Simple(String),
    /// `-ERR <message>`
    Error(String),
    /// `:<n>`
    Integer(i64),
    /// `$<len>` + payload
    Bulk(Bytes),
    /// `$-1`, the absent value
    NullBulk,
    /// `*<count>` + elements
    Array(Vec<Reply>),
}

impl Reply {
    /// Builds an error reply; the `ERR ` tag is added on the wire.
    pub fn error(message: impl Into<String>) -> Self {
        Reply::Error(message.into())
    }

    /// Builds a bulk reply from anything byte-like.
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Reply::Bulk(data.into())
    }

    /// True for error replies; used for the request/error counters.
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Appends the wire form to `buf`.
    pub fn write_to(&self, buf: &mut BytesMut) {
        match self {
            Reply::Ok => buf.put_slice(b"+OK\r\n"),
            Reply::Pong => buf.put_slice(b"+PONG\r\n"),
            Reply::Simple(text) => {
                buf.put_u8(b'+');
                buf.put_slice(text.as_bytes());
                buf.put_slice(CRLF);
            }
            Reply::Error(message) => {
                buf.put_slice(b"-ERR ");
                buf.put_slice(message.as_bytes());
                buf.put_slice(CRLF);
            }
            Reply::Integer(n) => {
                buf.put_u8(b':');
                buf.put_slice(n.to_string().as_bytes());
                buf.put_slice(CRLF);
            }
            Reply::Bulk(data) => {
                buf.put_u8(b'$');
                buf.put_slice(data.len().to_string().as_bytes());
                buf.put_slice(CRLF);
                buf.put_slice(data);
                buf.put_slice(CRLF);
            }
            Reply::NullBulk => buf.put_slice(b"$-1\r\n"),
            Reply::Array(elements) => {
                buf.put_u8(b'*');
                buf.put_slice(elements.len().to_string().as_bytes());
                buf.put_slice(CRLF);
                for element in elements {
                    element.write_to(buf);
                }
            }
        }
    }

    /// Wire form as a standalone byte vector.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.write_to(&mut buf);
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_and_pong() {
        assert_eq!(&Reply::Ok.to_bytes()[..], b"+OK\r\n");
        assert_eq!(&Reply::Pong.to_bytes()[..], b"+PONG\r\n");
    }

    #[test]
    fn test_simple_status() {
        let reply = Reply::Simple("LOADING".to_string());
        assert_eq!(&reply.to_bytes()[..], b"+LOADING\r\n");
    }

    #[test]
    fn test_error_carries_prefix() {
        let reply = Reply::error("Unknown command");
        assert_eq!(&reply.to_bytes()[..], b"-ERR Unknown command\r\n");
        assert!(reply.is_error());
    }

    #[test]
    fn test_integer() {
        assert_eq!(&Reply::Integer(1000).to_bytes()[..], b":1000\r\n");
        assert_eq!(&Reply::Integer(-42).to_bytes()[..], b":-42\r\n");
    }

    #[test]
    fn test_bulk() {
        assert_eq!(&Reply::bulk("hello").to_bytes()[..], b"$5\r\nhello\r\n");
        assert_eq!(&Reply::bulk("").to_bytes()[..], b"$0\r\n\r\n");
    }

    #[test]
    fn test_bulk_is_binary_safe() {
        let reply = Reply::Bulk(Bytes::from_static(&[0x00, 0xFF, b'\n']));
        assert_eq!(&reply.to_bytes()[..], b"$3\r\n\x00\xff\n\r\n");
    }

    #[test]
    fn test_null_bulk() {
        assert_eq!(&Reply::NullBulk.to_bytes()[..], b"$-1\r\n");
    }

    #[test]
    fn test_array_of_bulks() {
        let reply = Reply::Array(vec![Reply::bulk("one"), Reply::bulk("two")]);
        assert_eq!(&reply.to_bytes()[..], b"*2\r\n$3\r\none\r\n$3\r\ntwo\r\n");
    }

    #[test]
    fn test_empty_array() {
        assert_eq!(&Reply::Array(vec![]).to_bytes()[..], b"*0\r\n");
    }

    #[test]
    fn test_write_to_appends() {
        let mut buf = BytesMut::new();
        Reply::Ok.write_to(&mut buf);
        Reply::Integer(1).write_to(&mut buf);
        assert_eq!(&buf[..], b"+OK\r\n:1\r\n");
    }
}
