//! Server administration command implementations.

use super::ParsedCommand;
use crate::error::CommandError;
use crate::protocol::Frame;
use crate::server::ClientState;
use crate::storage::Database;
use crate::Result;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::info;

/// DBSIZE
pub fn cmd_dbsize(
    _cmd: ParsedCommand,
    database: Arc<Database>,
    client: Arc<ClientState>,
) -> Pin<Box<dyn Future<Output = Result<Frame>> + Send>> {
    Box::pin(async move {
        let db = database.db(client.db_index())?;
        Ok(Frame::Integer(db.len() as i64))
    })
}

/// FLUSHDB [ASYNC|SYNC]
pub fn cmd_flushdb(
    _cmd: ParsedCommand,
    database: Arc<Database>,
    client: Arc<ClientState>,
) -> Pin<Box<dyn Future<Output = Result<Frame>> + Send>> {
    Box::pin(async move {
        database.flush_db(client.db_index())?;
        Ok(Frame::ok())
    })
}

/// FLUSHALL [ASYNC|SYNC]
pub fn cmd_flushall(
    _cmd: ParsedCommand,
    database: Arc<Database>,
    _client: Arc<ClientState>,
) -> Pin<Box<dyn Future<Output = Result<Frame>> + Send>> {
    Box::pin(async move {
        database.flush_all();
        Ok(Frame::ok())
    })
}

/// CONFIG GET parameter | CONFIG SET parameter value
pub fn cmd_config(
    cmd: ParsedCommand,
    database: Arc<Database>,
    _client: Arc<ClientState>,
) -> Pin<Box<dyn Future<Output = Result<Frame>> + Send>> {
    Box::pin(async move {
        let subcommand = cmd.get_str(0)?.to_uppercase();
        match subcommand.as_str() {
            "GET" => {
                if cmd.args.len() != 2 {
                    return Err(CommandError::WrongArity {
                        command: "CONFIG GET".to_string(),
                    }
                    .into());
                }
                let pattern = cmd.get_str(1)?.to_lowercase();
                let mut reply = Vec::new();
                for (name, value) in runtime_parameters(&database) {
                    if simple_glob(pattern.as_bytes(), name.as_bytes()) {
                        reply.push(Frame::bulk(name));
                        reply.push(Frame::bulk(value));
                    }
                }
                Ok(Frame::Array(reply))
            }
            "SET" => {
                if cmd.args.len() != 3 {
                    return Err(CommandError::WrongArity {
                        command: "CONFIG SET".to_string(),
                    }
                    .into());
                }
                let parameter = cmd.get_str(1)?.to_lowercase();
                let value = cmd.get_str(2)?;
                set_runtime_parameter(&database, &parameter, value)?;
                Ok(Frame::ok())
            }
            _ => Err(CommandError::UnknownSubcommand(format!(
                "CONFIG {subcommand}"
            ))
            .into()),
        }
    })
}

/// The runtime-tunable parameters and their current values.
fn runtime_parameters(database: &Database) -> Vec<(&'static str, String)> {
    vec![
        (
            "slowlog-log-slower-than",
            database.slowlog().threshold_micros().to_string(),
        ),
        ("slowlog-max-len", database.slowlog().max_len().to_string()),
        (
            "replica-read-only",
            if database.replication().replica_read_only() {
                "yes".to_string()
            } else {
                "no".to_string()
            },
        ),
        (
            "appendonly",
            if database.sink().aof_enabled() {
                "yes".to_string()
            } else {
                "no".to_string()
            },
        ),
        ("databases", database.db_count().to_string()),
    ]
}

fn set_runtime_parameter(database: &Database, parameter: &str, value: &str) -> Result<()> {
    match parameter {
        "slowlog-log-slower-than" => {
            let micros: i64 = value
                .parse()
                .map_err(|_| CommandError::UnknownConfigParameter(parameter.to_string()))?;
            database.slowlog().set_threshold_micros(micros);
            Ok(())
        }
        "slowlog-max-len" => {
            let max_len: usize = value
                .parse()
                .map_err(|_| CommandError::UnknownConfigParameter(parameter.to_string()))?;
            database.slowlog().set_max_len(max_len);
            Ok(())
        }
        "replica-read-only" => match value.to_lowercase().as_str() {
            "yes" => {
                database.replication().set_replica_read_only(true);
                Ok(())
            }
            "no" => {
                database.replication().set_replica_read_only(false);
                Ok(())
            }
            _ => Err(CommandError::UnknownConfigParameter(parameter.to_string()).into()),
        },
        _ => Err(CommandError::UnknownConfigParameter(parameter.to_string()).into()),
    }
}

/// SLOWLOG GET [count] | LEN | RESET | HELP
pub fn cmd_slowlog(
    cmd: ParsedCommand,
    database: Arc<Database>,
    _client: Arc<ClientState>,
) -> Pin<Box<dyn Future<Output = Result<Frame>> + Send>> {
    Box::pin(async move {
        let subcommand = cmd.get_str(0)?.to_uppercase();
        let slowlog = database.slowlog();

        match (subcommand.as_str(), cmd.args.len()) {
            ("GET", 1) | ("GET", 2) => {
                let count = if cmd.args.len() == 2 {
                    cmd.get_i64(1)?
                } else {
                    10
                };
                let entries = slowlog
                    .get(count)
                    .into_iter()
                    .map(|entry| {
                        // Six elements: id, time, duration, argv, peer, name.
                        Frame::Array(vec![
                            Frame::Integer(entry.id as i64),
                            Frame::Integer(entry.time),
                            Frame::Integer(entry.duration_micros as i64),
                            Frame::Array(
                                entry.argv.into_iter().map(Frame::Bulk).collect(),
                            ),
                            Frame::bulk(entry.peer_addr),
                            Frame::bulk(entry.client_name),
                        ])
                    })
                    .collect();
                Ok(Frame::Array(entries))
            }
            ("LEN", 1) => Ok(Frame::Integer(slowlog.len() as i64)),
            ("RESET", 1) => {
                slowlog.reset();
                Ok(Frame::ok())
            }
            ("HELP", 1) => Ok(Frame::Array(vec![
                Frame::bulk("SLOWLOG GET [count] -- Return top entries from the slowlog (default: 10)."),
                Frame::bulk("    Entries are made of: id, timestamp, time in microseconds,"),
                Frame::bulk("    arguments array, client IP and port, client name"),
                Frame::bulk("SLOWLOG LEN -- Return the length of the slowlog."),
                Frame::bulk("SLOWLOG RESET -- Reset the slowlog."),
            ])),
            _ => Err(CommandError::UnknownSubcommand(format!(
                "SLOWLOG {subcommand}"
            ))
            .into()),
        }
    })
}

/// MONITOR - Flag the session for command replay; the connection loop
/// registers with the hub and switches into monitor mode once the OK
/// reply is on the wire.
pub fn cmd_monitor(
    _cmd: ParsedCommand,
    _database: Arc<Database>,
    client: Arc<ClientState>,
) -> Pin<Box<dyn Future<Output = Result<Frame>> + Send>> {
    Box::pin(async move {
        client.set_monitor(true);
        Ok(Frame::ok())
    })
}

/// REPLICAOF host port | REPLICAOF NO ONE
pub fn cmd_replicaof(
    cmd: ParsedCommand,
    database: Arc<Database>,
    _client: Arc<ClientState>,
) -> Pin<Box<dyn Future<Output = Result<Frame>> + Send>> {
    Box::pin(async move {
        let host = cmd.get_str(0)?;
        let port = cmd.get_str(1)?;

        if host.eq_ignore_ascii_case("no") && port.eq_ignore_ascii_case("one") {
            if database.replication().is_replica() {
                info!("MASTER MODE enabled");
                database.replication().promote();
            }
            return Ok(Frame::ok());
        }

        let port: u16 = port.parse().map_err(|_| CommandError::NotInteger)?;
        info!("REPLICAOF {}:{} enabled", host, port);
        database.replication().set_master(host.to_string(), port);
        Ok(Frame::ok())
    })
}

/// Glob matcher supporting `*` and `?`, enough for CONFIG GET patterns.
fn simple_glob(pattern: &[u8], text: &[u8]) -> bool {
    match (pattern.first(), text.first()) {
        (None, None) => true,
        (Some(b'*'), _) => {
            simple_glob(&pattern[1..], text)
                || (!text.is_empty() && simple_glob(pattern, &text[1..]))
        }
        (Some(b'?'), Some(_)) => simple_glob(&pattern[1..], &text[1..]),
        (Some(p), Some(t)) if p == t => simple_glob(&pattern[1..], &text[1..]),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_glob() {
        assert!(simple_glob(b"*", b"anything"));
        assert!(simple_glob(b"slowlog-*", b"slowlog-max-len"));
        assert!(simple_glob(b"slowlog-max-len", b"slowlog-max-len"));
        assert!(simple_glob(b"slow?og-*", b"slowlog-max-len"));
        assert!(!simple_glob(b"slowlog-*", b"appendonly"));
        assert!(!simple_glob(b"", b"x"));
    }
}
