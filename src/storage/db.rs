//! Keyspace implementation.
//!
//! `Db` is one numbered keyspace: the main dict, the expires index, and
//! the map of watched keys to watcher lists. `Database` gathers every
//! piece of global mutable server state into a single value that is
//! threaded through command execution: the keyspace vector, the dirty
//! counter, the slow log, the propagation sink, the replication state,
//! and the monitor hub.

use crate::error::{CommandError, Error, Result, StorageError};
use crate::persistence::AofWriter;
use crate::server::monitor::MonitorHub;
use crate::server::propagation::PropagationSink;
use crate::server::replication::ReplicationState;
use crate::server::slowlog::SlowLog;
use crate::server::state::ClientState;
use crate::server::watch::{self, Watcher};
use crate::server::Config;
use crate::types::{DbIndex, Expiry, Key, StoredValue, Timestamp};
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A single numbered keyspace.
///
/// # Thread Safety
///
/// The dicts use `DashMap`; the watcher map sits behind a `parking_lot`
/// mutex since watcher lists are small and mutated rarely compared to
/// the keyspace itself.
///
/// # Watch semantics
///
/// Every write path touches the key's watchers *before* mutating the
/// dict, then bumps the server-wide dirty counter. A touch marks every
/// watcher of the key dirty, including the session that issued the
/// write; EXEC unwatches before running, so a transaction never poisons
/// itself.
#[derive(Debug)]
pub struct Db {
    /// Keyspace index
    index: DbIndex,

    /// Main key-value store
    data: DashMap<Key, StoredValue>,

    /// Keys with expiration times, for efficient expiry scanning
    expires: DashMap<Key, Timestamp>,

    /// Watched keys: key -> ordered list of watching sessions
    watchers: Mutex<HashMap<Key, Vec<Watcher>>>,

    /// Server-wide dirty counter, shared by all keyspaces
    dirty: Arc<AtomicU64>,
}

impl Db {
    /// Create a new empty keyspace.
    pub fn new(index: DbIndex, dirty: Arc<AtomicU64>) -> Self {
        Self {
            index,
            data: DashMap::new(),
            expires: DashMap::new(),
            watchers: Mutex::new(HashMap::new()),
            dirty,
        }
    }

    /// Keyspace index.
    #[inline]
    pub fn index(&self) -> DbIndex {
        self.index
    }

    /// Number of keys in the keyspace.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the keyspace is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    fn bump_dirty(&self) {
        self.dirty.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a value by key.
    ///
    /// Returns `None` if the key doesn't exist or has expired. Expired
    /// entries are removed lazily; the removal touches watchers (the
    /// value went away) but does not count as a propagated write.
    pub fn get(&self, key: &Key) -> Option<Bytes> {
        let entry = self.data.get(key)?;
        if entry.is_expired() {
            drop(entry);
            self.touch_watchers(key);
            self.remove_entry(key);
            return None;
        }
        Some(entry.value.clone())
    }

    /// Set a value, replacing any existing entry.
    pub fn set(&self, key: Key, value: Bytes) {
        self.set_with_expiry(key, value, Expiry::Never);
    }

    /// Set a value with expiration.
    pub fn set_with_expiry(&self, key: Key, value: Bytes, expiry: Expiry) {
        self.touch_watchers(&key);
        match expiry {
            Expiry::Never => {
                self.expires.remove(&key);
            }
            Expiry::At(ts) => {
                self.expires.insert(key.clone(), ts);
            }
        }
        self.data.insert(key, StoredValue::with_expiry(value, expiry));
        self.bump_dirty();
    }

    /// Delete a key. Returns true if the key existed.
    pub fn delete(&self, key: &Key) -> bool {
        if !self.exists(key) {
            return false;
        }
        self.touch_watchers(key);
        self.remove_entry(key);
        self.bump_dirty();
        true
    }

    fn remove_entry(&self, key: &Key) {
        self.expires.remove(key);
        self.data.remove(key);
    }

    /// Check if a key exists (and is not expired).
    pub fn exists(&self, key: &Key) -> bool {
        match self.data.get(key) {
            Some(entry) => {
                if entry.is_expired() {
                    drop(entry);
                    self.touch_watchers(key);
                    self.remove_entry(key);
                    false
                } else {
                    true
                }
            }
            None => false,
        }
    }

    /// Remove every key.
    ///
    /// Watchers of keys that exist at flush time are marked dirty first;
    /// watched keys that never existed are unaffected. Returns the number
    /// of keys removed.
    pub fn flush(&self) -> usize {
        self.touch_watchers_on_flush();
        let removed = self.data.len();
        self.data.clear();
        self.expires.clear();
        if removed > 0 {
            self.dirty.fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }

    // ── Watcher bookkeeping ──────────────────────────────────────────────

    /// Append a watcher to the key's list. The caller guarantees the
    /// session is not already present (the session-side list is checked
    /// first).
    pub(crate) fn add_watcher(&self, key: Key, watcher: Watcher) {
        self.watchers.lock().entry(key).or_default().push(watcher);
    }

    /// Remove a session from the key's watcher list, dropping the list
    /// entirely when it empties.
    pub(crate) fn remove_watcher(&self, key: &Key, client_id: u64) {
        let mut watchers = self.watchers.lock();
        if let Some(list) = watchers.get_mut(key) {
            list.retain(|w| w.client_id() != client_id);
            if list.is_empty() {
                watchers.remove(key);
            }
        }
    }

    /// Mark every session watching `key` as dirty-CAS. Idempotent.
    pub fn touch_watchers(&self, key: &Key) {
        let watchers = self.watchers.lock();
        if let Some(list) = watchers.get(key) {
            for watcher in list {
                watcher.mark_dirty();
            }
        }
    }

    /// Mark watchers of every key that currently exists. Used when the
    /// whole keyspace is cleared.
    fn touch_watchers_on_flush(&self) {
        let watchers = self.watchers.lock();
        for (key, list) in watchers.iter() {
            if let Some(entry) = self.data.get(key) {
                if !entry.is_expired() {
                    for watcher in list {
                        watcher.mark_dirty();
                    }
                }
            }
        }
    }

    /// Number of sessions watching `key`.
    pub fn watcher_count(&self, key: &Key) -> usize {
        self.watchers.lock().get(key).map_or(0, Vec::len)
    }

    /// Total number of watched keys in this keyspace.
    pub fn watched_key_count(&self) -> usize {
        self.watchers.lock().len()
    }
}

/// Global server state, threaded through command execution as a single
/// value.
#[derive(Debug)]
pub struct Database {
    /// The numbered keyspaces
    dbs: Vec<Arc<Db>>,

    /// Counter of keyspace modifications since startup. The dispatcher
    /// samples it around each handler call; a positive delta is what
    /// marks a command for propagation.
    dirty: Arc<AtomicU64>,

    /// Slow-query log
    slowlog: Arc<SlowLog>,

    /// Propagation sink (AOF stream + replication backlog)
    sink: Arc<PropagationSink>,

    /// Replication role and knobs
    replication: Arc<ReplicationState>,

    /// Monitor fan-out
    monitors: Arc<MonitorHub>,

    /// AOF writer draining the sink's durability stream, when enabled
    aof_writer: Mutex<Option<AofWriter>>,
}

impl Database {
    /// Create the server state from a configuration.
    pub fn new(config: &Config) -> Self {
        let dirty = Arc::new(AtomicU64::new(0));
        let dbs = (0..config.databases)
            .map(|i| Arc::new(Db::new(i, dirty.clone())))
            .collect();

        Self {
            dbs,
            dirty,
            slowlog: Arc::new(SlowLog::new(
                config.slowlog_log_slower_than,
                config.slowlog_max_len,
            )),
            sink: Arc::new(PropagationSink::new(config.appendonly)),
            replication: Arc::new(ReplicationState::new(config.replica_read_only)),
            monitors: Arc::new(MonitorHub::new()),
            aof_writer: Mutex::new(None),
        }
    }

    /// Get a keyspace by index.
    pub fn db(&self, index: DbIndex) -> Result<Arc<Db>> {
        self.dbs
            .get(index as usize)
            .cloned()
            .ok_or_else(|| Error::Command(CommandError::DbIndexOutOfRange))
    }

    /// Number of configured keyspaces.
    #[inline]
    pub fn db_count(&self) -> DbIndex {
        self.dbs.len() as DbIndex
    }

    /// Current value of the dirty counter.
    #[inline]
    pub fn dirty(&self) -> u64 {
        self.dirty.load(Ordering::Relaxed)
    }

    /// Bump the dirty counter by one.
    #[inline]
    pub fn bump_dirty(&self) {
        self.dirty.fetch_add(1, Ordering::Relaxed);
    }

    /// The slow-query log.
    #[inline]
    pub fn slowlog(&self) -> &Arc<SlowLog> {
        &self.slowlog
    }

    /// The propagation sink.
    #[inline]
    pub fn sink(&self) -> &Arc<PropagationSink> {
        &self.sink
    }

    /// The replication state.
    #[inline]
    pub fn replication(&self) -> &Arc<ReplicationState> {
        &self.replication
    }

    /// The monitor hub.
    #[inline]
    pub fn monitors(&self) -> &Arc<MonitorHub> {
        &self.monitors
    }

    /// Clear one keyspace. Returns the number of keys removed.
    pub fn flush_db(&self, index: DbIndex) -> Result<usize> {
        Ok(self.db(index)?.flush())
    }

    /// Clear every keyspace. Returns the number of keys removed.
    pub fn flush_all(&self) -> usize {
        self.dbs.iter().map(|db| db.flush()).sum()
    }

    /// Attach the AOF writer that drains the sink's durability stream.
    pub fn attach_aof_writer(&self, writer: AofWriter) {
        *self.aof_writer.lock() = Some(writer);
    }

    /// Drain pending AOF bytes into the writer, if one is attached.
    pub fn flush_aof(&self) -> std::result::Result<(), StorageError> {
        let mut guard = self.aof_writer.lock();
        if let Some(writer) = guard.as_mut() {
            if let Some(chunk) = self.sink.take_aof_buffer() {
                writer.append(&chunk)?;
            }
        }
        Ok(())
    }

    /// Session teardown: discard any open transaction, remove the
    /// session from every watcher list, drop monitor registration.
    pub fn on_client_disconnect(&self, client: &Arc<ClientState>) {
        watch::unwatch_all(self, client);
        client.clear_transaction();
        self.monitors.unregister(client.id());
        client.set_monitor(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Db {
        Db::new(0, Arc::new(AtomicU64::new(0)))
    }

    #[test]
    fn test_set_get_delete() {
        let db = test_db();
        let key = Key::from("k");

        assert!(db.get(&key).is_none());
        db.set(key.clone(), Bytes::from_static(b"v"));
        assert_eq!(db.get(&key), Some(Bytes::from_static(b"v")));
        assert!(db.delete(&key));
        assert!(!db.delete(&key));
        assert!(db.get(&key).is_none());
    }

    #[test]
    fn test_expired_key_is_gone() {
        let db = test_db();
        let key = Key::from("k");
        db.set_with_expiry(key.clone(), Bytes::from_static(b"v"), Expiry::At(0));
        assert!(db.get(&key).is_none());
        assert!(!db.exists(&key));
        assert_eq!(db.len(), 0);
    }

    #[test]
    fn test_dirty_counter_tracks_writes() {
        let dirty = Arc::new(AtomicU64::new(0));
        let db = Db::new(0, dirty.clone());
        let key = Key::from("k");

        db.get(&key);
        assert_eq!(dirty.load(Ordering::Relaxed), 0);

        db.set(key.clone(), Bytes::from_static(b"v"));
        assert_eq!(dirty.load(Ordering::Relaxed), 1);

        db.delete(&key);
        assert_eq!(dirty.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_flush_counts_keys() {
        let db = test_db();
        db.set(Key::from("a"), Bytes::from_static(b"1"));
        db.set(Key::from("b"), Bytes::from_static(b"2"));
        assert_eq!(db.flush(), 2);
        assert!(db.is_empty());
        assert_eq!(db.flush(), 0);
    }

    #[test]
    fn test_database_db_index_bounds() {
        let database = Database::new(&Config::default());
        assert!(database.db(0).is_ok());
        assert!(database.db(15).is_ok());
        assert!(database.db(16).is_err());
    }
}
