//! Command executor: the dispatcher and the transaction engine.
//!
//! One executor owns the command registry and a lock that serializes
//! command execution. Every command runs to completion under that lock,
//! which is what makes an EXEC batch atomic: no other session's command
//! can interleave between the first and last queued command.
//!
//! Around each handler call the executor measures wall-clock duration,
//! offers the record to the slow log, replays it to monitor sessions,
//! and - when the dirty counter moved - appends it to the propagation
//! sink. EXEC itself is intercepted here rather than dispatched to a
//! handler, since replaying the queue needs the registry and the call
//! machinery.

use super::registry::{Command, CommandRegistry};
use super::transactions;
use super::{CommandFlags, ParsedCommand};
use crate::error::{CommandError, Error};
use crate::protocol::{responses, Frame};
use crate::server::propagation::PropagationTarget;
use crate::server::state::QueuedCommand;
use crate::server::watch;
use crate::server::ClientState;
use crate::storage::Database;
use crate::Result;
use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

/// Commands that execute immediately inside a MULTI block instead of
/// being queued.
const NO_QUEUE_IN_MULTI: &[&str] = &["EXEC", "DISCARD", "MULTI", "WATCH", "RESET"];

/// Command executor responsible for routing and executing commands.
#[derive(Debug)]
pub struct CommandExecutor {
    /// Command registry
    registry: CommandRegistry,
    /// Global server state
    database: Arc<Database>,
    /// Primary-executor lock: commands run to completion, one at a time
    exec_lock: tokio::sync::Mutex<()>,
}

impl CommandExecutor {
    /// Create a new executor over the given server state.
    pub fn new(database: Arc<Database>) -> Self {
        Self {
            registry: CommandRegistry::new(),
            database,
            exec_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// The command registry.
    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// The server state.
    pub fn database(&self) -> &Arc<Database> {
        &self.database
    }

    /// Where records propagate right now: the AOF stream always (a
    /// replica keeps its own AOF), the replication stream only while we
    /// are a top-level master. The skip is what leaves a demoted
    /// instance's backlog with a dangling MULTI that EXEC must close
    /// explicitly.
    fn propagation_targets(&self) -> PropagationTarget {
        let mut targets = PropagationTarget::AOF;
        if self.database.replication().is_master() {
            targets |= PropagationTarget::REPL;
        }
        targets
    }

    /// Execute one parsed command on behalf of a session.
    ///
    /// Routing order matters: unknown-command and arity failures flag
    /// the open transaction (dirty-exec) before reporting the error;
    /// anything else issued inside MULTI is queued unless it is one of
    /// the immediate commands.
    pub async fn execute(&self, cmd: ParsedCommand, client: Arc<ClientState>) -> Result<Frame> {
        let _guard = self.exec_lock.lock().await;

        trace!("executing {} with {} args", cmd.name, cmd.args.len());

        let command = match self.registry.get(&cmd.name) {
            Some(command) => command.clone(),
            None => {
                client.mark_dirty_exec();
                return Err(Error::Command(CommandError::UnknownCommand(
                    cmd.name.clone(),
                )));
            }
        };

        // Arity counts the command name itself.
        if !command.validate_arity(cmd.args.len() + 1) {
            client.mark_dirty_exec();
            return Err(Error::Command(CommandError::WrongArity {
                command: cmd.name.clone(),
            }));
        }

        if client.is_in_multi() && !NO_QUEUE_IN_MULTI.contains(&command.name) {
            client.queue_command(QueuedCommand {
                cmd: command,
                args: cmd.args,
            });
            return Ok(Frame::queued());
        }

        Ok(self.call(&command, cmd, &client).await)
    }

    /// Invoke a command with the full dispatch wrapper: monitor replay,
    /// duration measurement, slow-log admission, and dirty-delta
    /// propagation. Returns a reply frame; handler errors become error
    /// frames here so a failing command inside EXEC stays an element of
    /// the batch reply.
    fn call<'a>(
        &'a self,
        command: &'a Command,
        cmd: ParsedCommand,
        client: &'a Arc<ClientState>,
    ) -> Pin<Box<dyn Future<Output = Frame> + Send + 'a>> {
        Box::pin(async move {
            let full_argv = cmd.full_argv();
            let db_index = client.db_index();

            let monitors = self.database.monitors();
            if monitors.has_monitors() && !command.flags.contains(CommandFlags::SKIP_MONITOR) {
                monitors.feed(db_index, client.peer_addr(), &full_argv);
            }

            let dirty_before = self.database.dirty();
            let start = Instant::now();

            let result = if command.name == "EXEC" && client.is_in_multi() {
                self.execute_transaction(client).await
            } else {
                (command.handler)(cmd, Arc::clone(&self.database), Arc::clone(client)).await
            };

            let duration = start.elapsed();

            let reply = match result {
                Ok(frame) => frame,
                Err(e) => {
                    debug!("{} failed: {}", command.name, e);
                    Frame::Error(e.to_error_reply())
                }
            };

            self.database
                .slowlog()
                .observe(client, &full_argv, duration.as_micros() as u64);

            if self.database.dirty() > dirty_before {
                self.database
                    .sink()
                    .propagate(db_index, &full_argv, self.propagation_targets());
                if let Err(e) = self.database.flush_aof() {
                    tracing::error!("AOF write failed: {}", e);
                }
            }

            reply
        })
    }

    /// Run the queued batch for EXEC.
    ///
    /// Abort conditions, in order: a queue-time error (EXECABORT), a
    /// touched watch-set (null multi-bulk - success-shaped, not an
    /// error), then a write batch on a read-only replica. The normal
    /// path unwatches first, replays the queue in insertion order, and
    /// brackets propagation with synthetic MULTI / literal EXEC.
    async fn execute_transaction(&self, client: &Arc<ClientState>) -> Result<Frame> {
        if client.is_dirty_exec() {
            transactions::discard_transaction(&self.database, client);
            return Err(Error::Command(CommandError::ExecAborted));
        }

        if client.is_dirty_cas() {
            transactions::discard_transaction(&self.database, client);
            return Ok(Frame::NullArray);
        }

        let replication = self.database.replication();
        if replication.is_replica()
            && replication.replica_read_only()
            && !client.is_master_link()
            && client.tx_flags().contains(CommandFlags::WRITE)
        {
            transactions::discard_transaction(&self.database, client);
            return Err(Error::Command(CommandError::TxWriteOnReadOnlyReplica));
        }

        let was_master = replication.is_master();

        // Unwatch ASAP, otherwise we'd pay CAS tracking for every write
        // in the batch.
        watch::unwatch_all(&self.database, client);

        let queued = client.take_queue();
        let mut replies = Vec::with_capacity(queued.len());
        let mut must_propagate = false;

        for QueuedCommand { cmd, args } in queued {
            // Propagate MULTI once, before the first command that is
            // neither read-only nor administrative, so both streams see
            // the block as a unit.
            if !must_propagate
                && !cmd
                    .flags
                    .intersects(CommandFlags::READONLY | CommandFlags::ADMIN)
            {
                self.database.sink().propagate(
                    client.db_index(),
                    &[Bytes::from_static(b"MULTI")],
                    self.propagation_targets(),
                );
                must_propagate = true;
            }

            let parsed = ParsedCommand {
                name: cmd.name.to_string(),
                args,
            };
            replies.push(self.call(&cmd, parsed, client).await);
        }

        transactions::discard_transaction(&self.database, client);

        if must_propagate {
            // The EXEC invocation itself closes the block: bumping the
            // dirty counter makes the outer dispatch wrapper propagate
            // the literal EXEC record right after the batch.
            self.database.bump_dirty();

            // If the instance was demoted from master mid-batch, the
            // backlog got the initial MULTI but the dispatch wrapper no
            // longer speaks for a master; terminate the block so
            // downstream replicas never see a dangling MULTI.
            if was_master && replication.is_replica() {
                self.database.sink().feed_repl_raw(responses::EXEC_RECORD);
            }
        }

        // Monitors get EXEC here, after the queued commands, matching
        // the order the server actually executed things.
        let monitors = self.database.monitors();
        if monitors.has_monitors() {
            monitors.feed(
                client.db_index(),
                client.peer_addr(),
                &[Bytes::from_static(b"EXEC")],
            );
        }

        Ok(Frame::Array(replies))
    }
}
