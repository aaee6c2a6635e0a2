//! Persistence: the append-only-file writer.

mod aof;

pub use aof::{AofFsync, AofWriter};
