//! Generic key command implementations.

use super::ParsedCommand;
use crate::protocol::Frame;
use crate::server::ClientState;
use crate::storage::Database;
use crate::types::Key;
use crate::Result;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// DEL key [key ...]
pub fn cmd_del(
    cmd: ParsedCommand,
    database: Arc<Database>,
    client: Arc<ClientState>,
) -> Pin<Box<dyn Future<Output = Result<Frame>> + Send>> {
    Box::pin(async move {
        let db = database.db(client.db_index())?;
        let deleted = cmd
            .args
            .iter()
            .filter(|arg| db.delete(&Key::from((*arg).clone())))
            .count();
        Ok(Frame::Integer(deleted as i64))
    })
}

/// EXISTS key [key ...]
pub fn cmd_exists(
    cmd: ParsedCommand,
    database: Arc<Database>,
    client: Arc<ClientState>,
) -> Pin<Box<dyn Future<Output = Result<Frame>> + Send>> {
    Box::pin(async move {
        let db = database.db(client.db_index())?;
        let count = cmd
            .args
            .iter()
            .filter(|arg| db.exists(&Key::from((*arg).clone())))
            .count();
        Ok(Frame::Integer(count as i64))
    })
}

/// TYPE key
pub fn cmd_type(
    cmd: ParsedCommand,
    database: Arc<Database>,
    client: Arc<ClientState>,
) -> Pin<Box<dyn Future<Output = Result<Frame>> + Send>> {
    Box::pin(async move {
        let db = database.db(client.db_index())?;
        let key = Key::from(cmd.args[0].clone());
        if db.exists(&key) {
            Ok(Frame::simple("string"))
        } else {
            Ok(Frame::simple("none"))
        }
    })
}
