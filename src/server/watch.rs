//! WATCH bookkeeping: the bidirectional relation between sessions and
//! watched keys.
//!
//! The keyspace side maps each watched key to an ordered list of
//! watching sessions, so a write can mark every interested session as
//! dirty-CAS in one lookup. The session side keeps the `(db, key)` pairs
//! so UNWATCH and disconnect can remove the session from exactly the
//! lists it sits in. The relation is maintained explicitly by
//! [`watch_key`] and [`unwatch_all`]; nothing owns anything across the
//! two sides (the db side holds weak references).

use crate::storage::{Database, Db};
use crate::server::state::ClientState;
use crate::types::Key;
use std::sync::{Arc, Weak};

/// A session entry in a key's watcher list.
#[derive(Debug, Clone)]
pub struct Watcher {
    client_id: u64,
    session: Weak<ClientState>,
}

impl Watcher {
    /// Session id, used to remove the entry on unwatch.
    #[inline]
    pub fn client_id(&self) -> u64 {
        self.client_id
    }

    /// Set dirty-CAS on the watching session, if it is still alive.
    pub fn mark_dirty(&self) {
        if let Some(client) = self.session.upgrade() {
            client.mark_dirty_cas();
        }
    }
}

/// Watch `key` in `db` on behalf of `client`.
///
/// No-op when the session already watches the pair. The session must
/// not be inside MULTI (the WATCH command enforces that precondition).
pub fn watch_key(db: &Arc<Db>, client: &Arc<ClientState>, key: Key) {
    if !client.add_watched(db.index(), key.clone()) {
        return; // already watched
    }
    db.add_watcher(
        key,
        Watcher {
            client_id: client.id(),
            session: Arc::downgrade(client),
        },
    );
}

/// Remove `client` from every watcher list it sits in and clear its
/// watched-key list. Leaves dirty-CAS untouched; the caller decides
/// whether to clear it.
pub fn unwatch_all(database: &Database, client: &Arc<ClientState>) {
    for wk in client.take_watched() {
        if let Ok(db) = database.db(wk.db) {
            db.remove_watcher(&wk.key, client.id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::Config;
    use bytes::Bytes;

    fn setup() -> (Database, Arc<ClientState>) {
        let database = Database::new(&Config::default());
        let client = Arc::new(ClientState::new(1, "127.0.0.1:7000".to_string()));
        (database, client)
    }

    #[test]
    fn test_watch_is_bidirectional() {
        let (database, client) = setup();
        let db = database.db(0).unwrap();
        let key = Key::from("k");

        watch_key(&db, &client, key.clone());
        assert_eq!(db.watcher_count(&key), 1);
        assert!(client.is_watching(0, &key));

        unwatch_all(&database, &client);
        assert_eq!(db.watcher_count(&key), 0);
        assert_eq!(db.watched_key_count(), 0);
        assert_eq!(client.watched_len(), 0);
    }

    #[test]
    fn test_double_watch_is_single_entry() {
        let (database, client) = setup();
        let db = database.db(0).unwrap();
        let key = Key::from("k");

        watch_key(&db, &client, key.clone());
        watch_key(&db, &client, key.clone());
        assert_eq!(db.watcher_count(&key), 1);
        assert_eq!(client.watched_len(), 1);
    }

    #[test]
    fn test_touch_marks_every_watcher() {
        let (database, c1) = setup();
        let c2 = Arc::new(ClientState::new(2, "127.0.0.1:7001".to_string()));
        let db = database.db(0).unwrap();
        let key = Key::from("k");

        watch_key(&db, &c1, key.clone());
        watch_key(&db, &c2, key.clone());

        db.set(key.clone(), Bytes::from_static(b"v"));
        assert!(c1.is_dirty_cas());
        assert!(c2.is_dirty_cas());
    }

    #[test]
    fn test_write_to_unwatched_key_does_not_mark() {
        let (database, client) = setup();
        let db = database.db(0).unwrap();

        watch_key(&db, &client, Key::from("watched"));
        db.set(Key::from("other"), Bytes::from_static(b"v"));
        assert!(!client.is_dirty_cas());
    }

    #[test]
    fn test_flush_touches_only_existing_keys() {
        let (database, client) = setup();
        let db = database.db(0).unwrap();

        db.set(Key::from("present"), Bytes::from_static(b"v"));
        client.clear_dirty_cas(); // the set above predates the watch

        watch_key(&db, &client, Key::from("present"));
        watch_key(&db, &client, Key::from("missing"));
        db.flush();
        assert!(client.is_dirty_cas());

        // A flush of an empty keyspace leaves watchers of absent keys alone.
        let c2 = Arc::new(ClientState::new(3, "127.0.0.1:7002".to_string()));
        watch_key(&db, &c2, Key::from("missing"));
        db.flush();
        assert!(!c2.is_dirty_cas());
    }

    #[test]
    fn test_watch_across_keyspaces() {
        let (database, client) = setup();
        let db0 = database.db(0).unwrap();
        let db1 = database.db(1).unwrap();
        let key = Key::from("k");

        watch_key(&db0, &client, key.clone());
        watch_key(&db1, &client, key.clone());
        assert_eq!(client.watched_len(), 2);

        // Touch in db1 only; db0's watch entry is irrelevant to the flag,
        // both map entries are still removed by unwatch_all.
        db1.set(key.clone(), Bytes::from_static(b"v"));
        assert!(client.is_dirty_cas());

        unwatch_all(&database, &client);
        assert_eq!(db0.watched_key_count(), 0);
        assert_eq!(db1.watched_key_count(), 0);
    }
}
