//! Tessera server implementation.
//!
//! The async TCP server, per-connection handling, session state, and
//! the cross-cutting services the command core depends on: watch
//! bookkeeping, the slow log, the propagation sink, replication state,
//! and the monitor hub.

pub mod config;
mod connection;
pub mod monitor;
pub mod propagation;
pub mod replication;
pub mod slowlog;
pub mod state;
pub mod watch;

pub use config::{Config, LogLevel};
pub use connection::Connection;
pub use monitor::MonitorHub;
pub use propagation::{PropagationSink, PropagationTarget};
pub use replication::{ReplicationBacklog, ReplicationRole, ReplicationState};
pub use slowlog::{SlowLog, SlowLogEntry};
pub use state::{ClientState, QueuedCommand, WatchedKey};
pub use watch::Watcher;

use crate::commands::CommandExecutor;
use crate::persistence::AofWriter;
use crate::storage::Database;
use crate::Result;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{Notify, Semaphore};
use tracing::{error, info, warn};

/// The tessera server.
#[derive(Debug)]
pub struct Server {
    /// Server configuration
    config: Config,
    /// Global server state
    database: Arc<Database>,
    /// Command executor
    executor: Arc<CommandExecutor>,
    /// Running flag
    running: AtomicBool,
    /// Shutdown notification
    shutdown: Arc<Notify>,
    /// Active connection count
    connection_count: AtomicU64,
    /// Total connections since startup (also the connection id source)
    total_connections: AtomicU64,
    /// Connection semaphore for backpressure
    connection_semaphore: Arc<Semaphore>,
}

impl Server {
    /// Create a new server with the given configuration.
    pub fn new(config: Config) -> Self {
        let database = Arc::new(Database::new(&config));
        let executor = Arc::new(CommandExecutor::new(database.clone()));
        let connection_semaphore = Arc::new(Semaphore::new(config.max_clients));

        Self {
            config,
            database,
            executor,
            running: AtomicBool::new(false),
            shutdown: Arc::new(Notify::new()),
            connection_count: AtomicU64::new(0),
            total_connections: AtomicU64::new(0),
            connection_semaphore,
        }
    }

    /// Run the server accept loop until shutdown.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        if self.config.appendonly {
            let path = self.config.dir.join(&self.config.appendfilename);
            let writer = AofWriter::new(&path, self.config.appendfsync)?;
            self.database.attach_aof_writer(writer);
            info!("AOF enabled, appending to {}", path.display());
        }

        let addr: SocketAddr = format!("{}:{}", self.config.bind, self.config.port).parse()?;
        let listener = TcpListener::bind(addr).await?;
        info!("Ready to accept connections tcp");

        self.running.store(true, Ordering::SeqCst);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((socket, peer_addr)) => {
                            if let Err(e) = socket.set_nodelay(true) {
                                warn!("Failed to set TCP_NODELAY: {}", e);
                            }

                            let permit = match self.connection_semaphore.clone().try_acquire_owned() {
                                Ok(permit) => permit,
                                Err(_) => {
                                    warn!("Max clients reached, rejecting connection from {}", peer_addr);
                                    continue;
                                }
                            };

                            self.connection_count.fetch_add(1, Ordering::Relaxed);
                            let conn_id = self.total_connections.fetch_add(1, Ordering::Relaxed) + 1;

                            let server = self.clone();
                            tokio::spawn(async move {
                                // permit is held for the connection's lifetime
                                let _permit = permit;

                                let mut connection = Connection::new(
                                    socket,
                                    peer_addr,
                                    conn_id,
                                    server.executor.clone(),
                                    server.database.clone(),
                                );

                                if let Err(e) = connection.run().await {
                                    error!("Connection error from {}: {}", peer_addr, e);
                                }

                                server.connection_count.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }
                _ = self.shutdown.notified() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        // Graceful shutdown: give in-flight connections a moment to drain.
        let deadline = Duration::from_secs(10);
        let start = std::time::Instant::now();
        while self.connection_count.load(Ordering::Relaxed) > 0 {
            if start.elapsed() > deadline {
                warn!(
                    "Shutdown timeout reached, {} connections still active",
                    self.connection_count.load(Ordering::Relaxed)
                );
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        if let Err(e) = self.database.flush_aof() {
            error!("Final AOF flush failed: {}", e);
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Tessera is now ready to exit, bye bye...");

        Ok(())
    }

    /// Signal the server to shut down.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Check if the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Current connection count.
    pub fn connection_count(&self) -> u64 {
        self.connection_count.load(Ordering::Relaxed)
    }

    /// The global server state.
    pub fn database(&self) -> &Arc<Database> {
        &self.database
    }

    /// The configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }
}
