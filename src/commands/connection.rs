//! Connection command implementations.

use super::ParsedCommand;
use crate::error::CommandError;
use crate::protocol::Frame;
use crate::server::ClientState;
use crate::storage::Database;
use crate::types::DbIndex;
use crate::Result;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// PING [message]
pub fn cmd_ping(
    cmd: ParsedCommand,
    _database: Arc<Database>,
    _client: Arc<ClientState>,
) -> Pin<Box<dyn Future<Output = Result<Frame>> + Send>> {
    Box::pin(async move {
        match cmd.args.first() {
            Some(message) => Ok(Frame::Bulk(message.clone())),
            None => Ok(Frame::pong()),
        }
    })
}

/// ECHO message
pub fn cmd_echo(
    cmd: ParsedCommand,
    _database: Arc<Database>,
    _client: Arc<ClientState>,
) -> Pin<Box<dyn Future<Output = Result<Frame>> + Send>> {
    Box::pin(async move { Ok(Frame::Bulk(cmd.args[0].clone())) })
}

/// SELECT index
pub fn cmd_select(
    cmd: ParsedCommand,
    database: Arc<Database>,
    client: Arc<ClientState>,
) -> Pin<Box<dyn Future<Output = Result<Frame>> + Send>> {
    Box::pin(async move {
        let index = cmd
            .get_i64(0)
            .map_err(|_| CommandError::NotInteger)?;
        if index < 0 || index >= i64::from(database.db_count()) {
            return Err(CommandError::DbIndexOutOfRange.into());
        }
        client.set_db_index(index as DbIndex);
        Ok(Frame::ok())
    })
}

/// QUIT
pub fn cmd_quit(
    _cmd: ParsedCommand,
    _database: Arc<Database>,
    client: Arc<ClientState>,
) -> Pin<Box<dyn Future<Output = Result<Frame>> + Send>> {
    Box::pin(async move {
        client.close();
        Ok(Frame::ok())
    })
}

/// RESET - Return the session to its post-connect state: discard any
/// open transaction, drop the watch-set, leave monitor mode, select
/// database 0.
pub fn cmd_reset(
    _cmd: ParsedCommand,
    database: Arc<Database>,
    client: Arc<ClientState>,
) -> Pin<Box<dyn Future<Output = Result<Frame>> + Send>> {
    Box::pin(async move {
        super::transactions::discard_transaction(&database, &client);
        database.monitors().unregister(client.id());
        client.set_monitor(false);
        client.set_db_index(0);
        Ok(Frame::simple("RESET"))
    })
}

/// CLIENT ID|GETNAME|SETNAME
pub fn cmd_client(
    cmd: ParsedCommand,
    _database: Arc<Database>,
    client: Arc<ClientState>,
) -> Pin<Box<dyn Future<Output = Result<Frame>> + Send>> {
    Box::pin(async move {
        let subcommand = cmd.get_str(0)?.to_uppercase();
        match subcommand.as_str() {
            "ID" => Ok(Frame::Integer(client.id() as i64)),
            "GETNAME" => match client.name() {
                Some(name) => Ok(Frame::bulk(name)),
                None => Ok(Frame::bulk("")),
            },
            "SETNAME" => {
                let name = cmd.get_str(1)?;
                if name.contains(' ') || name.contains('\n') {
                    return Err(CommandError::SyntaxError.into());
                }
                client.set_name(name.to_string());
                Ok(Frame::ok())
            }
            _ => Err(CommandError::UnknownSubcommand(format!(
                "CLIENT {subcommand}"
            ))
            .into()),
        }
    })
}
