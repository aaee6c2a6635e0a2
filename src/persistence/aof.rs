//! AOF (Append Only File) writer.
//!
//! The propagation sink serializes write records into its durability
//! stream; this writer drains that stream to disk. Records are already
//! RESP-framed, so replaying the file through the normal parser
//! reconstructs the dataset.
//!
//! # Fsync Policies
//!
//! - **Always**: fsync after every append (safest, slowest)
//! - **EverySec**: fsync at most once per second (good balance)
//! - **No**: let the OS decide (fastest, least safe)

use crate::error::StorageError;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant};

/// AOF fsync policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AofFsync {
    /// Fsync after every append
    Always,
    /// Fsync once per second
    #[default]
    EverySec,
    /// Never explicitly fsync
    No,
}

impl AofFsync {
    /// Parse from a config value.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "always" => Some(Self::Always),
            "everysec" => Some(Self::EverySec),
            "no" => Some(Self::No),
            _ => None,
        }
    }
}

/// Appends serialized records to the AOF.
#[derive(Debug)]
pub struct AofWriter {
    writer: BufWriter<File>,
    fsync_policy: AofFsync,
    last_fsync: Instant,
    total_bytes: u64,
}

impl AofWriter {
    /// Open (or create) the AOF at `path` for appending.
    pub fn new<P: AsRef<Path>>(path: P, fsync_policy: AofFsync) -> Result<Self, StorageError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(StorageError::Io)?;

        Ok(Self {
            writer: BufWriter::with_capacity(64 * 1024, file),
            fsync_policy,
            last_fsync: Instant::now(),
            total_bytes: 0,
        })
    }

    /// Append already-serialized RESP records.
    pub fn append(&mut self, records: &[u8]) -> Result<(), StorageError> {
        self.writer.write_all(records).map_err(StorageError::Io)?;
        self.total_bytes += records.len() as u64;

        match self.fsync_policy {
            AofFsync::Always => self.fsync()?,
            AofFsync::EverySec => {
                if self.last_fsync.elapsed() >= Duration::from_secs(1) {
                    self.fsync()?;
                }
            }
            AofFsync::No => {
                self.writer.flush().map_err(StorageError::Io)?;
            }
        }

        Ok(())
    }

    /// Flush buffers and fsync the file.
    pub fn fsync(&mut self) -> Result<(), StorageError> {
        self.writer.flush().map_err(StorageError::Io)?;
        self.writer
            .get_ref()
            .sync_data()
            .map_err(StorageError::Io)?;
        self.last_fsync = Instant::now();
        Ok(())
    }

    /// Total bytes appended since the writer was opened.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fsync_policy_from_str() {
        assert_eq!(AofFsync::from_str("always"), Some(AofFsync::Always));
        assert_eq!(AofFsync::from_str("EVERYSEC"), Some(AofFsync::EverySec));
        assert_eq!(AofFsync::from_str("No"), Some(AofFsync::No));
        assert_eq!(AofFsync::from_str("invalid"), None);
    }

    #[test]
    fn test_append_writes_through() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("tessera-aof-test-{}.aof", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let mut writer = AofWriter::new(&path, AofFsync::Always).unwrap();
        writer
            .append(b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n")
            .unwrap();
        assert_eq!(writer.total_bytes(), 27);
        drop(writer);

        let contents = std::fs::read(&path).unwrap();
        assert_eq!(contents, b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n");
        let _ = std::fs::remove_file(&path);
    }
}
