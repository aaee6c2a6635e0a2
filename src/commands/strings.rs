//! String command implementations.

use super::ParsedCommand;
use crate::error::CommandError;
use crate::protocol::Frame;
use crate::server::ClientState;
use crate::storage::{Database, Db};
use crate::types::{Expiry, Key};
use crate::Result;
use bytes::{BufMut, Bytes, BytesMut};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// GET key
pub fn cmd_get(
    cmd: ParsedCommand,
    database: Arc<Database>,
    client: Arc<ClientState>,
) -> Pin<Box<dyn Future<Output = Result<Frame>> + Send>> {
    Box::pin(async move {
        let db = database.db(client.db_index())?;
        let key = Key::from(cmd.args[0].clone());
        match db.get(&key) {
            Some(value) => Ok(Frame::Bulk(value)),
            None => Ok(Frame::Null),
        }
    })
}

/// SET key value [NX | XX] [EX seconds | PX milliseconds]
pub fn cmd_set(
    cmd: ParsedCommand,
    database: Arc<Database>,
    client: Arc<ClientState>,
) -> Pin<Box<dyn Future<Output = Result<Frame>> + Send>> {
    Box::pin(async move {
        let db = database.db(client.db_index())?;
        let key = Key::from(cmd.args[0].clone());
        let value = cmd.args[1].clone();

        let mut expiry = Expiry::Never;
        let mut nx = false;
        let mut xx = false;

        let mut i = 2;
        while i < cmd.args.len() {
            let opt = cmd.get_str(i)?.to_uppercase();
            match opt.as_str() {
                "EX" => {
                    i += 1;
                    let seconds = cmd.get_i64(i)?;
                    if seconds <= 0 {
                        return Err(CommandError::InvalidExpireTime.into());
                    }
                    expiry = Expiry::from_seconds(seconds);
                }
                "PX" => {
                    i += 1;
                    let ms = cmd.get_i64(i)?;
                    if ms <= 0 {
                        return Err(CommandError::InvalidExpireTime.into());
                    }
                    expiry = Expiry::from_millis(ms);
                }
                "NX" => nx = true,
                "XX" => xx = true,
                _ => return Err(CommandError::SyntaxError.into()),
            }
            i += 1;
        }

        if nx && xx {
            return Err(CommandError::SyntaxError.into());
        }

        if (nx && db.exists(&key)) || (xx && !db.exists(&key)) {
            return Ok(Frame::Null);
        }

        db.set_with_expiry(key, value, expiry);
        Ok(Frame::ok())
    })
}

/// INCR key
pub fn cmd_incr(
    cmd: ParsedCommand,
    database: Arc<Database>,
    client: Arc<ClientState>,
) -> Pin<Box<dyn Future<Output = Result<Frame>> + Send>> {
    Box::pin(async move {
        let db = database.db(client.db_index())?;
        incr_by(&db, Key::from(cmd.args[0].clone()), 1)
    })
}

/// DECR key
pub fn cmd_decr(
    cmd: ParsedCommand,
    database: Arc<Database>,
    client: Arc<ClientState>,
) -> Pin<Box<dyn Future<Output = Result<Frame>> + Send>> {
    Box::pin(async move {
        let db = database.db(client.db_index())?;
        incr_by(&db, Key::from(cmd.args[0].clone()), -1)
    })
}

/// INCRBY key increment
pub fn cmd_incrby(
    cmd: ParsedCommand,
    database: Arc<Database>,
    client: Arc<ClientState>,
) -> Pin<Box<dyn Future<Output = Result<Frame>> + Send>> {
    Box::pin(async move {
        let db = database.db(client.db_index())?;
        let increment = cmd.get_i64(1)?;
        incr_by(&db, Key::from(cmd.args[0].clone()), increment)
    })
}

/// Shared INCR/DECR/INCRBY path. Validation happens before the write,
/// so a failing increment leaves the keyspace (and the dirty counter)
/// untouched.
fn incr_by(db: &Arc<Db>, key: Key, increment: i64) -> Result<Frame> {
    let current = match db.get(&key) {
        Some(bytes) => std::str::from_utf8(&bytes)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or(CommandError::NotInteger)?,
        None => 0,
    };

    let new = current
        .checked_add(increment)
        .ok_or(CommandError::IncrOverflow)?;

    db.set(key, Bytes::from(new.to_string()));
    Ok(Frame::Integer(new))
}

/// APPEND key value
pub fn cmd_append(
    cmd: ParsedCommand,
    database: Arc<Database>,
    client: Arc<ClientState>,
) -> Pin<Box<dyn Future<Output = Result<Frame>> + Send>> {
    Box::pin(async move {
        let db = database.db(client.db_index())?;
        let key = Key::from(cmd.args[0].clone());
        let suffix = &cmd.args[1];

        let new_value = match db.get(&key) {
            Some(existing) => {
                let mut buf = BytesMut::with_capacity(existing.len() + suffix.len());
                buf.put_slice(&existing);
                buf.put_slice(suffix);
                buf.freeze()
            }
            None => suffix.clone(),
        };

        let len = new_value.len() as i64;
        db.set(key, new_value);
        Ok(Frame::Integer(len))
    })
}

/// STRLEN key
pub fn cmd_strlen(
    cmd: ParsedCommand,
    database: Arc<Database>,
    client: Arc<ClientState>,
) -> Pin<Box<dyn Future<Output = Result<Frame>> + Send>> {
    Box::pin(async move {
        let db = database.db(client.db_index())?;
        let key = Key::from(cmd.args[0].clone());
        let len = db.get(&key).map_or(0, |v| v.len() as i64);
        Ok(Frame::Integer(len))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn test_incr_by_on_missing_key_starts_at_zero() {
        let db = Arc::new(Db::new(0, Arc::new(AtomicU64::new(0))));
        let frame = incr_by(&db, Key::from("n"), 5).unwrap();
        assert_eq!(frame, Frame::Integer(5));
    }

    #[test]
    fn test_incr_by_rejects_non_integer() {
        let db = Arc::new(Db::new(0, Arc::new(AtomicU64::new(0))));
        db.set(Key::from("n"), Bytes::from_static(b"foo"));
        assert!(incr_by(&db, Key::from("n"), 1).is_err());
        // Failed increment must not mutate.
        assert_eq!(
            db.get(&Key::from("n")),
            Some(Bytes::from_static(b"foo"))
        );
    }

    #[test]
    fn test_incr_by_overflow() {
        let db = Arc::new(Db::new(0, Arc::new(AtomicU64::new(0))));
        db.set(Key::from("n"), Bytes::from(i64::MAX.to_string()));
        assert!(incr_by(&db, Key::from("n"), 1).is_err());
    }
}
