//! # Tessera
//!
//! An in-memory key-value store built around a transactional
//! command-batching core.
//!
//! Tessera implements:
//! - MULTI/EXEC/DISCARD command batching with optimistic concurrency
//!   over a watch-set (WATCH/UNWATCH)
//! - Deterministic propagation of executed writes to the append-only
//!   file and the replication backlog
//! - A bounded slow-query log (SLOWLOG)
//! - RESP2 protocol with inline command support
//!
//! ## Example
//!
//! ```no_run
//! use tessera::{Config, Server, Result};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::default();
//!     let server = Arc::new(Server::new(config));
//!     server.run().await
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/tessera/0.1.0")]
#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    rust_2018_idioms,
    trivial_casts,
    trivial_numeric_casts,
    unused_lifetimes,
    unused_qualifications
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::await_holding_lock,         // Reviewed: parking_lot locks are sync-safe
    clippy::type_complexity,            // Boxed futures in the command table
    clippy::should_implement_trait,     // from_str naming on config enums
    missing_docs
)]

// Use jemalloc for better performance on Unix systems.
// Disabled under Miri since it cannot interpret jemalloc's foreign functions.
#[cfg(all(not(target_env = "msvc"), not(miri)))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

// ─────────────────────────────────────────────────────────────────────────────
// Modules
// ─────────────────────────────────────────────────────────────────────────────

/// Command parsing, routing, and execution layer.
pub mod commands;
/// Error types and result aliases.
pub mod error;
/// AOF persistence.
pub mod persistence;
/// RESP2 protocol implementation.
pub mod protocol;
/// TCP server, sessions, watch bookkeeping, slow log, propagation.
pub mod server;
/// In-memory keyspaces and global server state.
pub mod storage;
/// Key and value types.
pub mod types;

// ─────────────────────────────────────────────────────────────────────────────
// Common Re-exports
// ─────────────────────────────────────────────────────────────────────────────

pub use error::{Error, Result};

pub use protocol::{Frame, RespParser};

pub use server::{ClientState, Config, Server, SlowLog};

pub use storage::{Database, Db};

pub use types::Key;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Crate version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default server port.
pub const DEFAULT_PORT: u16 = 6379;

/// Maximum inline request size (64 KiB).
pub const MAX_INLINE_SIZE: usize = 64 * 1024;

/// Maximum bulk string size (512 MiB).
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum number of arguments in a command.
pub const MAX_ARGUMENTS: usize = 1_000_000;

/// Maximum number of concurrent clients.
pub const MAX_CLIENTS: usize = 10_000;
