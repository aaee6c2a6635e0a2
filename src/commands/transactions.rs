//! Transaction command handlers (MULTI, DISCARD, WATCH, UNWATCH).
//!
//! EXEC's batch execution lives in the executor, which owns the registry
//! and the dispatch machinery; the `cmd_exec` handler here only covers
//! the EXEC-without-MULTI error path.

use super::ParsedCommand;
use crate::error::CommandError;
use crate::protocol::Frame;
use crate::server::watch;
use crate::server::ClientState;
use crate::storage::Database;
use crate::types::Key;
use crate::Result;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// MULTI - Start a transaction block.
pub fn cmd_multi(
    _cmd: ParsedCommand,
    _database: Arc<Database>,
    client: Arc<ClientState>,
) -> Pin<Box<dyn Future<Output = Result<Frame>> + Send>> {
    Box::pin(async move {
        if client.is_in_multi() {
            return Err(CommandError::NestedMulti.into());
        }
        client.begin_multi();
        Ok(Frame::ok())
    })
}

/// EXEC - Execute all commands issued after MULTI.
///
/// Reached only when the session is not inside MULTI; the executor
/// intercepts EXEC for open transactions.
pub fn cmd_exec(
    _cmd: ParsedCommand,
    _database: Arc<Database>,
    client: Arc<ClientState>,
) -> Pin<Box<dyn Future<Output = Result<Frame>> + Send>> {
    Box::pin(async move {
        debug_assert!(!client.is_in_multi());
        Err(CommandError::ExecWithoutMulti.into())
    })
}

/// DISCARD - Throw away the queued commands and leave the transaction.
pub fn cmd_discard(
    _cmd: ParsedCommand,
    database: Arc<Database>,
    client: Arc<ClientState>,
) -> Pin<Box<dyn Future<Output = Result<Frame>> + Send>> {
    Box::pin(async move {
        if !client.is_in_multi() {
            return Err(CommandError::DiscardWithoutMulti.into());
        }
        discard_transaction(&database, &client);
        Ok(Frame::ok())
    })
}

/// WATCH key [key ...] - Mark keys for conditional execution.
pub fn cmd_watch(
    cmd: ParsedCommand,
    database: Arc<Database>,
    client: Arc<ClientState>,
) -> Pin<Box<dyn Future<Output = Result<Frame>> + Send>> {
    Box::pin(async move {
        if client.is_in_multi() {
            return Err(CommandError::WatchInsideMulti.into());
        }

        let db = database.db(client.db_index())?;
        for arg in &cmd.args {
            watch::watch_key(&db, &client, Key::from(arg.clone()));
        }
        Ok(Frame::ok())
    })
}

/// UNWATCH - Forget about all watched keys.
///
/// Also clears dirty-CAS: with no watch-set left there is nothing for
/// the flag to assert.
pub fn cmd_unwatch(
    _cmd: ParsedCommand,
    database: Arc<Database>,
    client: Arc<ClientState>,
) -> Pin<Box<dyn Future<Output = Result<Frame>> + Send>> {
    Box::pin(async move {
        watch::unwatch_all(&database, &client);
        client.clear_dirty_cas();
        Ok(Frame::ok())
    })
}

/// Throw away every piece of transaction state: queued commands,
/// transaction flags, and the watch-set. Used by DISCARD, by EXEC after
/// running (or aborting) a batch, and on session disconnect.
pub fn discard_transaction(database: &Database, client: &Arc<ClientState>) {
    client.clear_transaction();
    watch::unwatch_all(database, client);
}
