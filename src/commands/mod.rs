//! Command parsing, routing, and execution layer.

mod connection;
mod executor;
mod keys;
pub mod registry;
mod server_cmds;
mod strings;
pub mod transactions;

pub use executor::CommandExecutor;
pub use registry::{Command, CommandRegistry};

use crate::error::{CommandError, Result};
use crate::protocol::Frame;
use bytes::Bytes;

/// Parsed command with name and arguments.
#[derive(Debug, Clone)]
pub struct ParsedCommand {
    /// Command name (uppercase)
    pub name: String,
    /// Command arguments (excluding the name)
    pub args: Vec<Bytes>,
}

impl ParsedCommand {
    /// Parse a command from a RESP frame.
    pub fn from_frame(frame: Frame) -> Result<Self> {
        let frames = match frame {
            Frame::Array(arr) if !arr.is_empty() => arr,
            _ => return Err(CommandError::SyntaxError.into()),
        };

        let mut iter = frames.into_iter();

        let name_frame = iter.next().ok_or(CommandError::SyntaxError)?;
        let name_bytes = name_frame.to_bytes().ok_or(CommandError::SyntaxError)?;
        let name = std::str::from_utf8(&name_bytes)
            .map_err(|_| CommandError::SyntaxError)?
            .to_uppercase();

        let args: Vec<Bytes> = iter.map(|f| f.to_bytes().unwrap_or_default()).collect();

        Ok(Self { name, args })
    }

    /// Build a command directly from name and argument parts.
    pub fn new(name: impl Into<String>, args: Vec<Bytes>) -> Self {
        Self {
            name: name.into().to_uppercase(),
            args,
        }
    }

    /// The complete argument vector: command name followed by the
    /// arguments. This is what the slow log, the monitor feed, and the
    /// propagation sink record.
    pub fn full_argv(&self) -> Vec<Bytes> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(Bytes::from(self.name.clone().into_bytes()));
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// Get an argument as a string.
    pub fn get_str(&self, index: usize) -> Result<&str> {
        let bytes = self
            .args
            .get(index)
            .ok_or_else(|| CommandError::WrongArity {
                command: self.name.clone(),
            })?;
        std::str::from_utf8(bytes).map_err(|_| CommandError::SyntaxError.into())
    }

    /// Get an argument as an i64.
    pub fn get_i64(&self, index: usize) -> Result<i64> {
        let s = self.get_str(index)?;
        s.parse().map_err(|_| CommandError::NotInteger.into())
    }
}

bitflags::bitflags! {
    /// Command table flags.
    ///
    /// The letters follow the original command-table notation, so the
    /// registry can declare commands with compact flag strings.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CommandFlags: u16 {
        /// `r` - command only reads the keyspace
        const READONLY        = 1 << 0;
        /// `w` - command may modify the keyspace
        const WRITE           = 1 << 1;
        /// `a` - administrative command
        const ADMIN           = 1 << 2;
        /// `s` - not allowed from scripts
        const NO_SCRIPT       = 1 << 3;
        /// `R` - output is random for identical inputs
        const RANDOM          = 1 << 4;
        /// `S` - script output requires sorting for determinism
        const SORT_FOR_SCRIPT = 1 << 5;
        /// `l` - allowed while the dataset is loading
        const LOADING         = 1 << 6;
        /// `t` - allowed while a replica has stale data
        const STALE           = 1 << 7;
        /// `M` - not replayed to MONITOR sessions at dispatch time
        const SKIP_MONITOR    = 1 << 8;
        /// `k` - allowed while the slot is being imported
        const ASKING          = 1 << 9;
        /// `F` - O(1) or O(log N) command
        const FAST            = 1 << 10;
        /// `p` - pub/sub related
        const PUBSUB          = 1 << 11;
    }
}

impl CommandFlags {
    /// Parse a flag-letter string (e.g. `"wF"`, `"rst"`).
    ///
    /// # Panics
    ///
    /// Panics on an unknown letter; flag strings are compile-time
    /// constants in the command table.
    pub fn from_letters(letters: &str) -> Self {
        let mut flags = Self::empty();
        for c in letters.chars() {
            flags |= match c {
                'r' => Self::READONLY,
                'w' => Self::WRITE,
                'a' => Self::ADMIN,
                's' => Self::NO_SCRIPT,
                'R' => Self::RANDOM,
                'S' => Self::SORT_FOR_SCRIPT,
                'l' => Self::LOADING,
                't' => Self::STALE,
                'M' => Self::SKIP_MONITOR,
                'k' => Self::ASKING,
                'F' => Self::FAST,
                'p' => Self::PUBSUB,
                _ => panic!("unknown command flag letter '{c}'"),
            };
        }
        flags
    }
}
