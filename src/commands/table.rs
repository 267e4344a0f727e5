//! Command Dispatch Table
//!
//! A static table maps command names to handler functions plus their arity
//! bounds. Lookups are case-insensitive ASCII. Arity violations and unknown
//! names are rejected here with an error reply; the handler is never
//! invoked for them.

use crate::commands::handler::CommandHandler;
use crate::protocol::Reply;
use bytes::Bytes;

/// Handler signature: `args` excludes the command name itself.
pub type HandlerFn = fn(&CommandHandler, &[Bytes]) -> Reply;

/// One dispatch table entry.
pub struct CommandSpec {
    /// Canonical uppercase name.
    pub name: &'static str,
    pub handler: HandlerFn,
    /// Minimum argument count (command name excluded).
    pub min_args: usize,
    /// Maximum argument count; `0` means unbounded.
    pub max_args: usize,
    /// True when a successful reply should be followed by connection close.
    pub closes_connection: bool,
}

/// The command set, checked in order. Kept small enough that linear scan
/// beats any map.
pub static COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "PING",
        handler: CommandHandler::cmd_ping,
        min_args: 0,
        max_args: 1,
        closes_connection: false,
    },
    CommandSpec {
        name: "INFO",
        handler: CommandHandler::cmd_info,
        min_args: 0,
        max_args: 1,
        closes_connection: false,
    },
    CommandSpec {
        name: "SET",
        handler: CommandHandler::cmd_set,
        min_args: 2,
        max_args: 0,
        closes_connection: false,
    },
    CommandSpec {
        name: "GET",
        handler: CommandHandler::cmd_get,
        min_args: 1,
        max_args: 1,
        closes_connection: false,
    },
    CommandSpec {
        name: "DEL",
        handler: CommandHandler::cmd_del,
        min_args: 1,
        max_args: 1,
        closes_connection: false,
    },
    CommandSpec {
        name: "EXISTS",
        handler: CommandHandler::cmd_exists,
        min_args: 1,
        max_args: 1,
        closes_connection: false,
    },
    CommandSpec {
        name: "KEYS",
        handler: CommandHandler::cmd_keys,
        min_args: 0,
        max_args: 0,
        closes_connection: false,
    },
    CommandSpec {
        name: "CLEAR",
        handler: CommandHandler::cmd_clear,
        min_args: 0,
        max_args: 0,
        closes_connection: false,
    },
    CommandSpec {
        name: "STATS",
        handler: CommandHandler::cmd_stats,
        min_args: 0,
        max_args: 0,
        closes_connection: false,
    },
    CommandSpec {
        name: "SAVE",
        handler: CommandHandler::cmd_save,
        min_args: 0,
        max_args: 1,
        closes_connection: false,
    },
    CommandSpec {
        name: "LOAD",
        handler: CommandHandler::cmd_load,
        min_args: 0,
        max_args: 1,
        closes_connection: false,
    },
    CommandSpec {
        name: "QUIT",
        handler: CommandHandler::cmd_quit,
        min_args: 0,
        max_args: 0,
        closes_connection: true,
    },
];

/// Case-insensitive lookup by raw name bytes.
pub fn lookup(name: &[u8]) -> Option<&'static CommandSpec> {
    COMMANDS
        .iter()
        .find(|spec| spec.name.as_bytes().eq_ignore_ascii_case(name))
}

/// Result of dispatching one line.
#[derive(Debug)]
pub struct Dispatch {
    pub reply: Reply,
    /// The connection should close after this reply is flushed.
    pub close: bool,
}

/// Resolves and runs the command in `tokens` (name first). Arity and name
/// errors become `-ERR` replies without reaching a handler.
pub fn dispatch(handler: &CommandHandler, tokens: &[Bytes]) -> Dispatch {
    let Some(spec) = lookup(&tokens[0]) else {
        return Dispatch {
            reply: Reply::error("Unknown command"),
            close: false,
        };
    };

    let argc = tokens.len() - 1;
    if argc < spec.min_args || (spec.max_args > 0 && argc > spec.max_args) {
        return Dispatch {
            reply: Reply::error("Wrong number of arguments"),
            close: false,
        };
    }

    Dispatch {
        reply: (spec.handler)(handler, &tokens[1..]),
        close: spec.closes_connection,
    }
}
