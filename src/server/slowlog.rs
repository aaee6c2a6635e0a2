//! Slow-query log.
//!
//! Remembers the latest N commands whose execution took more than M
//! microseconds. The threshold and the retention bound are runtime
//! tunables (`slowlog-log-slower-than`, `slowlog-max-len`); a negative
//! threshold disables admission entirely. Entries are pushed at the head
//! and trimmed from the tail, and ids grow monotonically for the life of
//! the server.

use crate::server::state::ClientState;
use crate::types::current_timestamp_secs;
use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};

/// Most argument slots retained per entry; the last slot turns into a
/// `... (N more arguments)` marker when the command had more.
pub const SLOWLOG_ENTRY_MAX_ARGC: usize = 32;

/// Longest argument prefix retained; the rest is summarized as
/// `... (N more bytes)`.
pub const SLOWLOG_ENTRY_MAX_STRING: usize = 128;

/// One retained slow execution.
#[derive(Debug, Clone)]
pub struct SlowLogEntry {
    /// Server-wide monotonic id
    pub id: u64,
    /// Wall-clock time the command finished (unix seconds)
    pub time: i64,
    /// Measured execution time in microseconds
    pub duration_micros: u64,
    /// Truncated argument vector (command name first)
    pub argv: Vec<Bytes>,
    /// Peer address of the session (`ip:port`)
    pub peer_addr: String,
    /// Client name at the time of execution (may be empty)
    pub client_name: String,
}

/// The bounded slow-query log.
#[derive(Debug)]
pub struct SlowLog {
    /// Entries, newest first
    entries: Mutex<VecDeque<SlowLogEntry>>,
    /// Next entry id
    next_id: AtomicU64,
    /// Admission threshold in microseconds; negative disables the log
    threshold_micros: AtomicI64,
    /// Retention bound
    max_len: AtomicUsize,
}

impl SlowLog {
    /// Create a slow log with the given threshold and bound.
    pub fn new(threshold_micros: i64, max_len: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            next_id: AtomicU64::new(0),
            threshold_micros: AtomicI64::new(threshold_micros),
            max_len: AtomicUsize::new(max_len),
        }
    }

    /// Current admission threshold in microseconds.
    #[inline]
    pub fn threshold_micros(&self) -> i64 {
        self.threshold_micros.load(Ordering::Relaxed)
    }

    /// Set the admission threshold (negative disables).
    #[inline]
    pub fn set_threshold_micros(&self, micros: i64) {
        self.threshold_micros.store(micros, Ordering::Relaxed);
    }

    /// Current retention bound.
    #[inline]
    pub fn max_len(&self) -> usize {
        self.max_len.load(Ordering::Relaxed)
    }

    /// Set the retention bound, trimming immediately if it shrank.
    pub fn set_max_len(&self, max_len: usize) {
        self.max_len.store(max_len, Ordering::Relaxed);
        let mut entries = self.entries.lock();
        while entries.len() > max_len {
            entries.pop_back();
        }
    }

    /// Offer an executed command to the log. Admits it when the log is
    /// enabled and the duration reached the threshold, then trims the
    /// tail down to the bound.
    pub fn observe(&self, client: &ClientState, argv: &[Bytes], duration_micros: u64) {
        let threshold = self.threshold_micros.load(Ordering::Relaxed);
        if threshold < 0 {
            return; // disabled
        }
        if duration_micros < threshold as u64 {
            return;
        }

        let entry = self.build_entry(client, argv, duration_micros);
        let max_len = self.max_len.load(Ordering::Relaxed);
        let mut entries = self.entries.lock();
        entries.push_front(entry);
        while entries.len() > max_len {
            entries.pop_back();
        }
    }

    fn build_entry(
        &self,
        client: &ClientState,
        argv: &[Bytes],
        duration_micros: u64,
    ) -> SlowLogEntry {
        let argc = argv.len();
        let slargc = argc.min(SLOWLOG_ENTRY_MAX_ARGC);
        let mut retained = Vec::with_capacity(slargc);

        for (j, arg) in argv.iter().take(slargc).enumerate() {
            if slargc != argc && j == slargc - 1 {
                // Logging too many arguments is a useless memory waste;
                // the last slot records how many were dropped.
                retained.push(Bytes::from(format!(
                    "... ({} more arguments)",
                    argc - slargc + 1
                )));
            } else if arg.len() > SLOWLOG_ENTRY_MAX_STRING {
                let mut truncated =
                    BytesMut::with_capacity(SLOWLOG_ENTRY_MAX_STRING + 24);
                truncated.put_slice(&arg[..SLOWLOG_ENTRY_MAX_STRING]);
                truncated.put_slice(
                    format!("... ({} more bytes)", arg.len() - SLOWLOG_ENTRY_MAX_STRING)
                        .as_bytes(),
                );
                retained.push(truncated.freeze());
            } else {
                // A Bytes clone shares the immutable payload, so a later
                // keyspace flush cannot race with slow-log readout.
                retained.push(arg.clone());
            }
        }

        SlowLogEntry {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            time: current_timestamp_secs(),
            duration_micros,
            argv: retained,
            peer_addr: client.peer_addr().to_string(),
            client_name: client.name().unwrap_or_default(),
        }
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Pop every entry.
    pub fn reset(&self) {
        let mut entries = self.entries.lock();
        while entries.pop_back().is_some() {}
    }

    /// Up to `count` entries from the head (newest first). A negative
    /// count returns everything.
    pub fn get(&self, count: i64) -> Vec<SlowLogEntry> {
        let entries = self.entries.lock();
        let take = if count < 0 {
            entries.len()
        } else {
            (count as usize).min(entries.len())
        };
        entries.iter().take(take).cloned().collect()
    }
}
