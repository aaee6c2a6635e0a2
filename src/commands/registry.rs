//! Command registry.
//!
//! An immutable table of command descriptors built once at startup.
//! Lookup is case-insensitive. Arity follows the original convention:
//! a positive arity is exact, a negative arity means "at least |arity|"
//! - both counts include the command name itself.

use super::{CommandFlags, ParsedCommand};
use crate::protocol::Frame;
use crate::server::ClientState;
use crate::storage::Database;
use crate::Result;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Type alias for async command handlers.
pub type CommandHandler = fn(
    ParsedCommand,
    Arc<Database>,
    Arc<ClientState>,
) -> Pin<Box<dyn Future<Output = Result<Frame>> + Send>>;

/// Command descriptor.
#[derive(Clone)]
pub struct Command {
    /// Command name (uppercase)
    pub name: &'static str,
    /// Arity including the command name; negative means at-least
    pub arity: i32,
    /// Command flags
    pub flags: CommandFlags,
    /// Handler function
    pub handler: CommandHandler,
    /// Help text
    pub summary: &'static str,
}

impl Command {
    /// Create a new command descriptor with a flag-letter string.
    pub fn new(
        name: &'static str,
        arity: i32,
        flags: &str,
        handler: CommandHandler,
        summary: &'static str,
    ) -> Self {
        Self {
            name,
            arity,
            flags: CommandFlags::from_letters(flags),
            handler,
            summary,
        }
    }

    /// Validate an argument count (including the command name).
    pub fn validate_arity(&self, argc: usize) -> bool {
        if self.arity > 0 {
            argc == self.arity as usize
        } else {
            argc >= self.arity.unsigned_abs() as usize
        }
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("flags", &self.flags)
            .field("summary", &self.summary)
            .finish()
    }
}

/// Registry of all available commands.
#[derive(Debug, Default)]
pub struct CommandRegistry {
    commands: HashMap<String, Command>,
}

impl CommandRegistry {
    /// Create a new registry with all built-in commands.
    pub fn new() -> Self {
        let mut registry = Self {
            commands: HashMap::new(),
        };
        registry.register_all();
        registry
    }

    /// Register a command.
    fn register(&mut self, cmd: Command) {
        self.commands.insert(cmd.name.to_string(), cmd);
    }

    /// Look up a command by name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&Command> {
        self.commands.get(&name.to_uppercase())
    }

    /// Iterate all registered commands.
    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.commands.values()
    }

    /// Number of registered commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    fn register_all(&mut self) {
        self.register_transaction_commands();
        self.register_string_commands();
        self.register_key_commands();
        self.register_connection_commands();
        self.register_server_commands();
    }

    fn register_transaction_commands(&mut self) {
        use super::transactions::*;

        self.register(Command::new(
            "MULTI",
            1,
            "sF",
            cmd_multi,
            "Mark the start of a transaction block",
        ));
        // EXEC is flagged skip-monitor; the transaction engine replays it
        // to monitors after the batch so the relative order is right.
        self.register(Command::new(
            "EXEC",
            1,
            "sM",
            cmd_exec,
            "Execute all commands issued after MULTI",
        ));
        self.register(Command::new(
            "DISCARD",
            1,
            "sF",
            cmd_discard,
            "Discard all commands issued after MULTI",
        ));
        self.register(Command::new(
            "WATCH",
            -2,
            "sF",
            cmd_watch,
            "Watch the given keys to determine execution of the MULTI/EXEC block",
        ));
        self.register(Command::new(
            "UNWATCH",
            1,
            "sF",
            cmd_unwatch,
            "Forget about all watched keys",
        ));
    }

    fn register_string_commands(&mut self) {
        use super::strings::*;

        self.register(Command::new(
            "GET",
            2,
            "rF",
            cmd_get,
            "Get the value of a key",
        ));
        self.register(Command::new(
            "SET",
            -3,
            "w",
            cmd_set,
            "Set the string value of a key",
        ));
        self.register(Command::new(
            "INCR",
            2,
            "wF",
            cmd_incr,
            "Increment the integer value of a key by one",
        ));
        self.register(Command::new(
            "DECR",
            2,
            "wF",
            cmd_decr,
            "Decrement the integer value of a key by one",
        ));
        self.register(Command::new(
            "INCRBY",
            3,
            "wF",
            cmd_incrby,
            "Increment the integer value of a key by the given amount",
        ));
        self.register(Command::new(
            "APPEND",
            3,
            "w",
            cmd_append,
            "Append a value to a key",
        ));
        self.register(Command::new(
            "STRLEN",
            2,
            "rF",
            cmd_strlen,
            "Get the length of the value stored in a key",
        ));
    }

    fn register_key_commands(&mut self) {
        use super::keys::*;

        self.register(Command::new("DEL", -2, "w", cmd_del, "Delete keys"));
        self.register(Command::new(
            "EXISTS",
            -2,
            "rF",
            cmd_exists,
            "Determine if keys exist",
        ));
        self.register(Command::new(
            "TYPE",
            2,
            "rF",
            cmd_type,
            "Determine the type stored at a key",
        ));
    }

    fn register_connection_commands(&mut self) {
        use super::connection::*;

        self.register(Command::new("PING", -1, "tF", cmd_ping, "Ping the server"));
        self.register(Command::new("ECHO", 2, "F", cmd_echo, "Echo the given string"));
        self.register(Command::new(
            "SELECT",
            2,
            "lF",
            cmd_select,
            "Change the selected database for the current connection",
        ));
        self.register(Command::new("QUIT", 1, "tF", cmd_quit, "Close the connection"));
        self.register(Command::new(
            "RESET",
            1,
            "F",
            cmd_reset,
            "Reset the connection state",
        ));
        self.register(Command::new(
            "CLIENT",
            -2,
            "as",
            cmd_client,
            "Client connection commands",
        ));
    }

    fn register_server_commands(&mut self) {
        use super::server_cmds::*;

        self.register(Command::new(
            "DBSIZE",
            1,
            "rF",
            cmd_dbsize,
            "Return the number of keys in the selected database",
        ));
        self.register(Command::new(
            "FLUSHDB",
            -1,
            "w",
            cmd_flushdb,
            "Remove all keys from the current database",
        ));
        self.register(Command::new(
            "FLUSHALL",
            -1,
            "w",
            cmd_flushall,
            "Remove all keys from all databases",
        ));
        self.register(Command::new(
            "CONFIG",
            -2,
            "alt",
            cmd_config,
            "Get or set configuration parameters",
        ));
        self.register(Command::new(
            "SLOWLOG",
            -2,
            "a",
            cmd_slowlog,
            "Manage the slow queries log",
        ));
        self.register(Command::new(
            "MONITOR",
            1,
            "as",
            cmd_monitor,
            "Listen for all requests received by the server in real time",
        ));
        self.register(Command::new(
            "REPLICAOF",
            3,
            "ast",
            cmd_replicaof,
            "Make the server a replica of another instance, or promote it",
        ));
    }
}
