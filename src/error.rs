//! Error types for tessera.
//!
//! Every error that can surface to a connected client renders to a RESP
//! error string via [`Error::to_error_reply`]; the string carries the
//! Redis-compatible error code prefix (`ERR`, `EXECABORT`, ...).

use std::io;
use std::net::AddrParseError;
use std::num::{ParseFloatError, ParseIntError};
use thiserror::Error;

/// Result type alias for tessera operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for tessera.
#[derive(Error, Debug)]
pub enum Error {
    /// Protocol parsing errors
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Command execution errors
    #[error("command error: {0}")]
    Command(#[from] CommandError),

    /// Storage / persistence errors
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal server error
    #[error("internal error: {0}")]
    Internal(String),

    /// Address parsing error
    #[error("address parse error: {0}")]
    AddrParse(#[from] AddrParseError),
}

/// Protocol-level errors during RESP parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Invalid RESP data type marker
    #[error("invalid type marker: {0:?}")]
    InvalidTypeMarker(u8),

    /// Invalid UTF-8 in simple string
    #[error("invalid UTF-8 in string")]
    InvalidUtf8,

    /// Invalid integer format
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Line too long (exceeds inline limit)
    #[error("line too long: {len} bytes (max: {max})")]
    LineTooLong {
        /// Actual line length in bytes
        len: usize,
        /// Maximum allowed length
        max: usize,
    },

    /// Bulk string too large
    #[error("bulk string too large: {len} bytes (max: {max})")]
    BulkTooLarge {
        /// Actual bulk string length in bytes
        len: usize,
        /// Maximum allowed length
        max: usize,
    },

    /// Too many array elements
    #[error("too many array elements: {count} (max: {max})")]
    TooManyElements {
        /// Actual element count
        count: usize,
        /// Maximum allowed count
        max: usize,
    },

    /// Missing CRLF terminator
    #[error("missing CRLF terminator")]
    MissingCrlf,

    /// Incomplete frame - need more data
    #[error("incomplete frame, need more data")]
    Incomplete,
}

/// Command execution errors.
///
/// Display strings here are the exact wire-level error replies, so the
/// dispatcher can forward `e.to_string()` verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command
    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    /// Wrong number of arguments
    #[error("ERR wrong number of arguments for '{command}' command")]
    WrongArity {
        /// Command name that received wrong arity
        command: String,
    },

    /// Syntax error
    #[error("ERR syntax error")]
    SyntaxError,

    /// Not an integer
    #[error("ERR value is not an integer or out of range")]
    NotInteger,

    /// Value out of range
    #[error("ERR increment or decrement would overflow")]
    IncrOverflow,

    /// Invalid expire time
    #[error("ERR invalid expire time in 'set' command")]
    InvalidExpireTime,

    /// Nested MULTI call
    #[error("ERR MULTI calls can not be nested")]
    NestedMulti,

    /// EXEC without MULTI
    #[error("ERR EXEC without MULTI")]
    ExecWithoutMulti,

    /// DISCARD without MULTI
    #[error("ERR DISCARD without MULTI")]
    DiscardWithoutMulti,

    /// A command failed validation while being queued
    #[error("EXECABORT Transaction discarded because of previous errors.")]
    ExecAborted,

    /// WATCH inside MULTI
    #[error("ERR WATCH inside MULTI is not allowed")]
    WatchInsideMulti,

    /// A batch containing writes reached EXEC after the instance was
    /// demoted to a read-only replica
    #[error(
        "ERR Transaction contains write commands but instance is now a read-only replica. EXEC aborted."
    )]
    TxWriteOnReadOnlyReplica,

    /// Database index out of range
    #[error("ERR DB index is out of range")]
    DbIndexOutOfRange,

    /// Unknown CONFIG parameter
    #[error("ERR Unknown option or number of arguments for CONFIG SET - '{0}'")]
    UnknownConfigParameter(String),

    /// Unknown subcommand
    #[error("ERR Unknown subcommand or wrong number of arguments for '{0}'")]
    UnknownSubcommand(String),
}

/// Storage-level errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Persistence error
    #[error("persistence error: {0}")]
    Persistence(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Returns true if this is a client error (malformed input, bad state).
    #[inline]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::Protocol(_) | Error::Command(_))
    }

    /// Converts the error to a RESP error reply string (without the
    /// leading `-` marker).
    #[must_use]
    pub fn to_error_reply(&self) -> String {
        match self {
            Error::Protocol(e) => format!("ERR Protocol error: {e}"),
            Error::Command(e) => e.to_string(),
            Error::Storage(e) => format!("ERR {e}"),
            Error::Io(e) => format!("ERR I/O error: {e}"),
            Error::Config(e) => format!("ERR configuration error: {e}"),
            Error::Internal(e) => format!("ERR internal error: {e}"),
            Error::AddrParse(e) => format!("ERR address parse error: {e}"),
        }
    }
}

impl From<ParseIntError> for ProtocolError {
    fn from(e: ParseIntError) -> Self {
        ProtocolError::InvalidInteger(e.to_string())
    }
}

impl From<ParseFloatError> for ProtocolError {
    fn from(e: ParseFloatError) -> Self {
        ProtocolError::InvalidInteger(e.to_string())
    }
}
