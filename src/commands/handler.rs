//! Command Implementations
//!
//! Each handler validates its arguments, performs exactly one engine
//! operation, and produces a [`Reply`]. Engine failures become `-ERR`
//! replies and the connection keeps serving; only the framing layer closes
//! connections on error.
//!
//! A key rule worth calling out: GET of an absent key is *not* an error.
//! It replies with the null bulk `$-1` and counts as a successful request.

use crate::commands::table::{dispatch, Dispatch};
use crate::connection::ServerStats;
use crate::protocol::Reply;
use crate::storage::{KvEngine, StoreError, Value, MAX_STRING_SIZE};
use bytes::{BufMut, Bytes, BytesMut};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Protocol revision reported by INFO.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Executes parsed command lines against the shared engine.
///
/// Cheap to clone; one per connection.
#[derive(Clone)]
pub struct CommandHandler {
    engine: Arc<KvEngine>,
    stats: Arc<ServerStats>,
    start_time: Instant,
}

impl CommandHandler {
    pub fn new(engine: Arc<KvEngine>, stats: Arc<ServerStats>) -> Self {
        Self {
            engine,
            stats,
            start_time: Instant::now(),
        }
    }

    /// Runs one tokenized line (command name first) and returns the reply
    /// plus whether the connection should close. Also bumps the
    /// request/error counters.
    pub fn execute(&self, tokens: &[Bytes]) -> Dispatch {
        debug_assert!(!tokens.is_empty(), "empty lines are skipped before dispatch");

        let result = dispatch(self, tokens);
        if result.reply.is_error() {
            self.stats.record_error();
        } else {
            self.stats.record_request();
        }
        result
    }

    fn key_of(args: &[Bytes]) -> Result<&[u8], Reply> {
        let key = &args[0][..];
        if key.is_empty() || key.len() > MAX_STRING_SIZE {
            return Err(Reply::error("Invalid key format"));
        }
        Ok(key)
    }

    /// Optional filename argument for SAVE/LOAD; must be UTF-8.
    fn path_of(args: &[Bytes]) -> Result<Option<PathBuf>, Reply> {
        match args.first() {
            None => Ok(None),
            Some(raw) => match std::str::from_utf8(raw) {
                Ok(name) => Ok(Some(PathBuf::from(name))),
                Err(_) => Err(Reply::error("Invalid file name")),
            },
        }
    }

    // ========================================================================
    // Handlers (invoked through the dispatch table)
    // ========================================================================

    /// PING [msg]
    pub(crate) fn cmd_ping(&self, args: &[Bytes]) -> Reply {
        match args.first() {
            None => Reply::Pong,
            Some(msg) => Reply::Bulk(msg.clone()),
        }
    }

    /// INFO
    pub(crate) fn cmd_info(&self, _args: &[Bytes]) -> Reply {
        let uptime = self.start_time.elapsed().as_secs();
        let info = format!(
            "# Server\r\n\
             kv_version:{}\r\n\
             protocol_version:{}\r\n\
             uptime_in_seconds:{}\r\n\
             connected_clients:{}\r\n\
             total_commands_processed:{}\r\n\
             total_errors:{}\r\n\
             \r\n\
             # Keyspace\r\n\
             keys:{}\r\n",
            crate::VERSION,
            PROTOCOL_VERSION,
            uptime,
            self.stats.active_connections(),
            self.stats.total_requests(),
            self.stats.total_errors(),
            self.engine.len(),
        );
        Reply::bulk(info)
    }

    /// SET key value[ more words…]
    ///
    /// The tokenizer has already collapsed whitespace, so a multi-word value
    /// is rebuilt by joining the trailing tokens with single spaces.
    pub(crate) fn cmd_set(&self, args: &[Bytes]) -> Reply {
        let key = match Self::key_of(args) {
            Ok(k) => k,
            Err(reply) => return reply,
        };

        let value = if args.len() == 2 {
            args[1].clone()
        } else {
            let total: usize =
                args[1..].iter().map(|t| t.len()).sum::<usize>() + args.len() - 2;
            let mut joined = BytesMut::with_capacity(total);
            for (i, token) in args[1..].iter().enumerate() {
                if i > 0 {
                    joined.put_u8(b' ');
                }
                joined.put_slice(token);
            }
            joined.freeze()
        };

        if value.len() > MAX_STRING_SIZE {
            return Reply::error("Value too large");
        }

        match self.engine.set_string_bytes(key, value) {
            Ok(()) => Reply::Ok,
            Err(e) => Reply::error(e.to_string()),
        }
    }

    /// GET key. Renders the stored value by tag.
    pub(crate) fn cmd_get(&self, args: &[Bytes]) -> Reply {
        let key = match Self::key_of(args) {
            Ok(k) => k,
            Err(reply) => return reply,
        };

        match self.engine.get(key) {
            Ok(Value::Null) => Reply::NullBulk,
            Ok(value) => Reply::Bulk(value.render()),
            Err(StoreError::KeyNotFound) => Reply::NullBulk,
            Err(e) => Reply::error(e.to_string()),
        }
    }

    /// DEL key
    pub(crate) fn cmd_del(&self, args: &[Bytes]) -> Reply {
        let key = match Self::key_of(args) {
            Ok(k) => k,
            Err(reply) => return reply,
        };

        match self.engine.delete(key) {
            Ok(deleted) => Reply::Integer(deleted as i64),
            Err(e) => Reply::error(e.to_string()),
        }
    }

    /// EXISTS key
    pub(crate) fn cmd_exists(&self, args: &[Bytes]) -> Reply {
        let key = match Self::key_of(args) {
            Ok(k) => k,
            Err(reply) => return reply,
        };
        Reply::Integer(self.engine.exists(key) as i64)
    }

    /// KEYS. Every key as a bulk, iteration order.
    pub(crate) fn cmd_keys(&self, _args: &[Bytes]) -> Reply {
        let keys = self.engine.keys();
        Reply::Array(keys.into_iter().map(Reply::Bulk).collect())
    }

    /// CLEAR
    pub(crate) fn cmd_clear(&self, _args: &[Bytes]) -> Reply {
        self.engine.clear();
        Reply::Ok
    }

    /// STATS. Table and arena figures.
    pub(crate) fn cmd_stats(&self, _args: &[Bytes]) -> Reply {
        let stats = self.engine.stats();
        let text = format!(
            "keys:{}\r\n\
             capacity:{}\r\n\
             load_factor:{:.2}\r\n\
             arena_allocated:{}\r\n\
             arena_used:{}\r\n",
            stats.keys, stats.capacity, stats.load_factor, stats.arena_allocated, stats.arena_used,
        );
        Reply::bulk(text)
    }

    /// SAVE [file]
    pub(crate) fn cmd_save(&self, args: &[Bytes]) -> Reply {
        let path = match Self::path_of(args) {
            Ok(p) => p,
            Err(reply) => return reply,
        };
        match self.engine.save(path.as_deref()) {
            Ok(()) => Reply::Ok,
            Err(e) => Reply::error(e.to_string()),
        }
    }

    /// LOAD [file]
    pub(crate) fn cmd_load(&self, args: &[Bytes]) -> Reply {
        let path = match Self::path_of(args) {
            Ok(p) => p,
            Err(reply) => return reply,
        };
        match self.engine.load(path.as_deref()) {
            Ok(()) => Reply::Ok,
            Err(e) => Reply::error(e.to_string()),
        }
    }

    /// QUIT. The table marks this as closing; the reply still goes out.
    pub(crate) fn cmd_quit(&self, _args: &[Bytes]) -> Reply {
        debug!("Client requested QUIT");
        Reply::Ok
    }
}
