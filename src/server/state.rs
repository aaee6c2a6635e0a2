//! Client session state.

use crate::commands::registry::Command;
use crate::commands::CommandFlags;
use crate::types::{DbIndex, Key};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};

/// A command queued inside a MULTI block, argv already validated.
#[derive(Debug, Clone)]
pub struct QueuedCommand {
    /// Command descriptor from the registry
    pub cmd: Command,
    /// Command arguments (excluding the name)
    pub args: Vec<Bytes>,
}

/// Transaction queue plus the OR of all queued command flags.
///
/// The flags union is what lets EXEC reject a batch containing writes on
/// a read-only replica without walking the queue.
#[derive(Debug, Default)]
struct TxState {
    queue: Vec<QueuedCommand>,
    cmd_flags: CommandFlags,
}

/// A key watched by a session, identified by keyspace and name.
///
/// A session may watch keys across several keyspaces; the pair is the
/// identity used to deduplicate and to unwatch.
#[derive(Debug, Clone)]
pub struct WatchedKey {
    /// Keyspace index
    pub db: DbIndex,
    /// Watched key
    pub key: Key,
}

/// Per-connection session state.
///
/// Invariants:
/// - `in_multi` is set iff the session is between a successful MULTI and
///   its terminating EXEC/DISCARD/disconnect.
/// - The queue is empty and `dirty_exec` clear whenever `in_multi` is
///   clear ([`ClientState::clear_transaction`] enforces both).
/// - `dirty_cas`, once set, survives until the transaction terminates or
///   UNWATCH clears it explicitly.
#[derive(Debug)]
pub struct ClientState {
    /// Connection id
    id: u64,
    /// Peer address (`ip:port`), recorded in slow-log entries
    peer_addr: String,
    /// Selected keyspace index
    db_index: AtomicU16,
    /// Client name (CLIENT SETNAME), recorded in slow-log entries
    name: RwLock<Option<String>>,
    /// Connection is closed
    closed: AtomicBool,
    /// Session is inside a MULTI block
    in_multi: AtomicBool,
    /// A watched key was touched since WATCH
    dirty_cas: AtomicBool,
    /// A command failed validation while being queued
    dirty_exec: AtomicBool,
    /// Connection from our master (exempt from replica read-only checks)
    master_link: AtomicBool,
    /// Session entered MONITOR mode
    monitor: AtomicBool,
    /// Transaction queue
    tx: Mutex<TxState>,
    /// Keys watched by this session
    watched: Mutex<Vec<WatchedKey>>,
}

impl ClientState {
    /// Create a new session.
    pub fn new(id: u64, peer_addr: String) -> Self {
        Self {
            id,
            peer_addr,
            db_index: AtomicU16::new(0),
            name: RwLock::new(None),
            closed: AtomicBool::new(false),
            in_multi: AtomicBool::new(false),
            dirty_cas: AtomicBool::new(false),
            dirty_exec: AtomicBool::new(false),
            master_link: AtomicBool::new(false),
            monitor: AtomicBool::new(false),
            tx: Mutex::new(TxState::default()),
            watched: Mutex::new(Vec::new()),
        }
    }

    /// Connection id.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Peer address string (`ip:port`).
    #[inline]
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    /// Selected keyspace index.
    #[inline]
    pub fn db_index(&self) -> DbIndex {
        self.db_index.load(Ordering::Relaxed)
    }

    /// Select a keyspace.
    #[inline]
    pub fn set_db_index(&self, index: DbIndex) {
        self.db_index.store(index, Ordering::Relaxed);
    }

    /// Client name, if set.
    pub fn name(&self) -> Option<String> {
        self.name.read().clone()
    }

    /// Set the client name.
    pub fn set_name(&self, name: String) {
        *self.name.write() = Some(name);
    }

    /// Check if the connection is closed.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    /// Close the connection.
    #[inline]
    pub fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }

    /// Check whether this is the link from our master.
    #[inline]
    pub fn is_master_link(&self) -> bool {
        self.master_link.load(Ordering::Relaxed)
    }

    /// Mark this session as the link from our master.
    #[inline]
    pub fn set_master_link(&self, value: bool) {
        self.master_link.store(value, Ordering::Relaxed);
    }

    /// Check whether the session is in MONITOR mode.
    #[inline]
    pub fn is_monitor(&self) -> bool {
        self.monitor.load(Ordering::Relaxed)
    }

    /// Enter or leave MONITOR mode.
    #[inline]
    pub fn set_monitor(&self, value: bool) {
        self.monitor.store(value, Ordering::Relaxed);
    }

    // ── Transaction state ────────────────────────────────────────────────

    /// Check if the session is inside a MULTI block.
    #[inline]
    pub fn is_in_multi(&self) -> bool {
        self.in_multi.load(Ordering::Relaxed)
    }

    /// Open a MULTI block with a clean queue.
    pub fn begin_multi(&self) {
        let mut tx = self.tx.lock();
        tx.queue.clear();
        tx.cmd_flags = CommandFlags::empty();
        self.dirty_exec.store(false, Ordering::Relaxed);
        self.in_multi.store(true, Ordering::Relaxed);
    }

    /// Append a validated command to the queue, OR-ing its flags into
    /// the batch union.
    pub fn queue_command(&self, queued: QueuedCommand) {
        let mut tx = self.tx.lock();
        tx.cmd_flags |= queued.cmd.flags;
        tx.queue.push(queued);
    }

    /// Number of queued commands.
    pub fn queued_len(&self) -> usize {
        self.tx.lock().queue.len()
    }

    /// OR of all queued command flags.
    pub fn tx_flags(&self) -> CommandFlags {
        self.tx.lock().cmd_flags
    }

    /// Take the queue for execution, leaving it empty.
    pub fn take_queue(&self) -> Vec<QueuedCommand> {
        std::mem::take(&mut self.tx.lock().queue)
    }

    /// Clear every piece of transaction state. Watched keys are the
    /// caller's responsibility (see `transactions::discard_transaction`).
    pub fn clear_transaction(&self) {
        let mut tx = self.tx.lock();
        tx.queue.clear();
        tx.cmd_flags = CommandFlags::empty();
        self.in_multi.store(false, Ordering::Relaxed);
        self.dirty_cas.store(false, Ordering::Relaxed);
        self.dirty_exec.store(false, Ordering::Relaxed);
    }

    /// Check the dirty-CAS flag.
    #[inline]
    pub fn is_dirty_cas(&self) -> bool {
        self.dirty_cas.load(Ordering::Relaxed)
    }

    /// Set the dirty-CAS flag (a watched key was touched).
    #[inline]
    pub fn mark_dirty_cas(&self) {
        self.dirty_cas.store(true, Ordering::Relaxed);
    }

    /// Clear the dirty-CAS flag (UNWATCH).
    #[inline]
    pub fn clear_dirty_cas(&self) {
        self.dirty_cas.store(false, Ordering::Relaxed);
    }

    /// Check the dirty-EXEC flag.
    #[inline]
    pub fn is_dirty_exec(&self) -> bool {
        self.dirty_exec.load(Ordering::Relaxed)
    }

    /// Flag the transaction so EXEC will abort. No-op outside MULTI;
    /// called whenever a command fails validation while being queued.
    #[inline]
    pub fn mark_dirty_exec(&self) {
        if self.is_in_multi() {
            self.dirty_exec.store(true, Ordering::Relaxed);
        }
    }

    // ── Watched keys ─────────────────────────────────────────────────────

    /// Record a watched key. Returns false if the (db, key) pair is
    /// already watched by this session.
    pub fn add_watched(&self, db: DbIndex, key: Key) -> bool {
        let mut watched = self.watched.lock();
        if watched.iter().any(|wk| wk.db == db && wk.key == key) {
            return false;
        }
        watched.push(WatchedKey { db, key });
        true
    }

    /// Take the watched-key list, leaving it empty.
    pub fn take_watched(&self) -> Vec<WatchedKey> {
        std::mem::take(&mut *self.watched.lock())
    }

    /// Number of watched keys.
    pub fn watched_len(&self) -> usize {
        self.watched.lock().len()
    }

    /// Check whether this session watches `key` in keyspace `db`.
    pub fn is_watching(&self, db: DbIndex, key: &Key) -> bool {
        self.watched
            .lock()
            .iter()
            .any(|wk| wk.db == db && &wk.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> ClientState {
        ClientState::new(1, "127.0.0.1:5555".to_string())
    }

    #[test]
    fn test_multi_lifecycle() {
        let client = session();
        assert!(!client.is_in_multi());

        client.begin_multi();
        assert!(client.is_in_multi());
        assert_eq!(client.queued_len(), 0);

        client.clear_transaction();
        assert!(!client.is_in_multi());
        assert!(!client.is_dirty_exec());
        assert_eq!(client.queued_len(), 0);
    }

    #[test]
    fn test_dirty_exec_requires_multi() {
        let client = session();
        client.mark_dirty_exec();
        assert!(!client.is_dirty_exec());

        client.begin_multi();
        client.mark_dirty_exec();
        assert!(client.is_dirty_exec());
    }

    #[test]
    fn test_dirty_cas_survives_until_cleared() {
        let client = session();
        client.mark_dirty_cas();
        assert!(client.is_dirty_cas());
        client.mark_dirty_cas();
        assert!(client.is_dirty_cas());
        client.clear_dirty_cas();
        assert!(!client.is_dirty_cas());
    }

    #[test]
    fn test_watched_key_dedup() {
        let client = session();
        let key = Key::from("k");
        assert!(client.add_watched(0, key.clone()));
        assert!(!client.add_watched(0, key.clone()));
        assert!(client.add_watched(1, key.clone()));
        assert_eq!(client.watched_len(), 2);
        assert!(client.is_watching(0, &key));
        assert!(client.is_watching(1, &key));
    }
}
