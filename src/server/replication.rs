//! Replication role state and the replication backlog.
//!
//! The backlog is the ordered byte stream of propagated write records
//! that connected replicas consume (and that partial resyncs would be
//! served from). The core only needs the feed side and offset tracking;
//! the socket-level replica handshake lives outside this crate's scope.

use bytes::Bytes;
use parking_lot::RwLock;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

/// Replication role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplicationRole {
    /// This instance is a master
    #[default]
    Master,
    /// This instance replicates from a master
    Replica,
}

/// Replication role and knobs.
#[derive(Debug)]
pub struct ReplicationState {
    role: RwLock<ReplicationRole>,
    /// Master address when acting as a replica
    master_addr: RwLock<Option<(String, u16)>>,
    /// Whether a replica rejects writes from ordinary clients
    replica_read_only: AtomicBool,
}

impl ReplicationState {
    /// Create a fresh master-role state.
    pub fn new(replica_read_only: bool) -> Self {
        Self {
            role: RwLock::new(ReplicationRole::Master),
            master_addr: RwLock::new(None),
            replica_read_only: AtomicBool::new(replica_read_only),
        }
    }

    /// Current role.
    pub fn role(&self) -> ReplicationRole {
        *self.role.read()
    }

    /// Check if this instance is a master.
    #[inline]
    pub fn is_master(&self) -> bool {
        self.role() == ReplicationRole::Master
    }

    /// Check if this instance is a replica.
    #[inline]
    pub fn is_replica(&self) -> bool {
        self.role() == ReplicationRole::Replica
    }

    /// Demote to replica of the given master.
    pub fn set_master(&self, host: String, port: u16) {
        *self.master_addr.write() = Some((host, port));
        *self.role.write() = ReplicationRole::Replica;
    }

    /// Promote back to master (REPLICAOF NO ONE).
    pub fn promote(&self) {
        *self.master_addr.write() = None;
        *self.role.write() = ReplicationRole::Master;
    }

    /// Master address when acting as a replica.
    pub fn master_addr(&self) -> Option<(String, u16)> {
        self.master_addr.read().clone()
    }

    /// Whether this instance rejects client writes while a replica.
    #[inline]
    pub fn replica_read_only(&self) -> bool {
        self.replica_read_only.load(Ordering::Relaxed)
    }

    /// Toggle replica write rejection.
    #[inline]
    pub fn set_replica_read_only(&self, value: bool) {
        self.replica_read_only.store(value, Ordering::Relaxed);
    }
}

/// Entry in the replication backlog.
#[derive(Debug, Clone)]
struct BacklogEntry {
    data: Bytes,
    offset: i64,
}

/// Bounded byte-stream history of propagated records.
#[derive(Debug)]
pub struct ReplicationBacklog {
    buffer: RwLock<VecDeque<BacklogEntry>>,
    /// Maximum retained size in bytes
    max_size: usize,
    current_size: AtomicU64,
    first_offset: AtomicI64,
    current_offset: AtomicI64,
    repl_id: RwLock<String>,
}

impl ReplicationBacklog {
    /// Create a backlog retaining up to `max_size` bytes.
    pub fn new(max_size: usize) -> Self {
        Self {
            buffer: RwLock::new(VecDeque::with_capacity(1024)),
            max_size,
            current_size: AtomicU64::new(0),
            first_offset: AtomicI64::new(0),
            current_offset: AtomicI64::new(0),
            repl_id: RwLock::new(generate_repl_id()),
        }
    }

    /// Append a record to the backlog, trimming the oldest entries when
    /// over capacity.
    pub fn feed(&self, data: Bytes) {
        let size = data.len() as u64;
        let offset = self
            .current_offset
            .fetch_add(data.len() as i64, Ordering::SeqCst);

        let mut buffer = self.buffer.write();
        buffer.push_back(BacklogEntry { data, offset });

        let mut current = self.current_size.fetch_add(size, Ordering::Relaxed) + size;
        while current > self.max_size as u64 && buffer.len() > 1 {
            if let Some(entry) = buffer.pop_front() {
                let len = entry.data.len() as u64;
                current -= len;
                self.current_size.fetch_sub(len, Ordering::Relaxed);
                self.first_offset
                    .store(entry.offset + entry.data.len() as i64, Ordering::Relaxed);
            }
        }
    }

    /// Replication stream offset after the last fed record.
    pub fn current_offset(&self) -> i64 {
        self.current_offset.load(Ordering::Relaxed)
    }

    /// Replication id of this history.
    pub fn repl_id(&self) -> String {
        self.repl_id.read().clone()
    }

    /// Retained records in feed order.
    pub fn snapshot(&self) -> Vec<Bytes> {
        self.buffer.read().iter().map(|e| e.data.clone()).collect()
    }

    /// Retained stream as one contiguous byte string.
    pub fn as_bytes(&self) -> Vec<u8> {
        let buffer = self.buffer.read();
        let mut out = Vec::with_capacity(self.current_size.load(Ordering::Relaxed) as usize);
        for entry in buffer.iter() {
            out.extend_from_slice(&entry.data);
        }
        out
    }
}

impl Default for ReplicationBacklog {
    fn default() -> Self {
        // 1MB backlog
        Self::new(1024 * 1024)
    }
}

/// 40 hex characters, like the original replication ids.
fn generate_repl_id() -> String {
    let mut rng = rand::thread_rng();
    (0..40)
        .map(|_| {
            let n: u8 = rng.gen_range(0..16);
            char::from_digit(u32::from(n), 16).unwrap_or('0')
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_transitions() {
        let state = ReplicationState::new(true);
        assert!(state.is_master());

        state.set_master("127.0.0.1".to_string(), 6379);
        assert!(state.is_replica());
        assert_eq!(
            state.master_addr(),
            Some(("127.0.0.1".to_string(), 6379))
        );

        state.promote();
        assert!(state.is_master());
        assert!(state.master_addr().is_none());
    }

    #[test]
    fn test_backlog_preserves_feed_order() {
        let backlog = ReplicationBacklog::new(1024);
        backlog.feed(Bytes::from_static(b"one"));
        backlog.feed(Bytes::from_static(b"two"));
        backlog.feed(Bytes::from_static(b"three"));

        assert_eq!(backlog.as_bytes(), b"onetwothree");
        assert_eq!(backlog.current_offset(), 11);
    }

    #[test]
    fn test_backlog_trims_oldest() {
        let backlog = ReplicationBacklog::new(8);
        backlog.feed(Bytes::from_static(b"aaaa"));
        backlog.feed(Bytes::from_static(b"bbbb"));
        backlog.feed(Bytes::from_static(b"cccc"));

        let snapshot = backlog.snapshot();
        assert!(snapshot.len() < 3);
        // The newest entry always survives trimming.
        assert_eq!(snapshot.last().unwrap(), &Bytes::from_static(b"cccc"));
        // Offsets keep counting even as entries drop.
        assert_eq!(backlog.current_offset(), 12);
    }

    #[test]
    fn test_repl_id_shape() {
        let backlog = ReplicationBacklog::default();
        let id = backlog.repl_id();
        assert_eq!(id.len(), 40);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
