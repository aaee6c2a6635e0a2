//! Connection handling for individual clients.

use crate::commands::{CommandExecutor, ParsedCommand};
use crate::protocol::{Frame, RespParser};
use crate::storage::Database;
use crate::Result;
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, trace};

/// Buffer size for reading from the socket.
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Maximum number of replies to batch before flushing.
const WRITE_BATCH_SIZE: usize = 64;

/// Maximum bytes to buffer before forcing a flush.
const WRITE_BUFFER_HIGH_WATER: usize = 64 * 1024;

/// A connection to a single client.
pub struct Connection {
    /// TCP stream
    stream: BufWriter<TcpStream>,
    /// Peer address
    peer_addr: SocketAddr,
    /// RESP parser
    parser: RespParser,
    /// Session state
    state: Arc<crate::server::ClientState>,
    /// Command executor
    executor: Arc<CommandExecutor>,
    /// Global server state (disconnect cleanup, monitor registration)
    database: Arc<Database>,
    /// Write buffer
    write_buffer: BytesMut,
    /// Number of pending replies (for batching)
    pending_writes: usize,
}

impl Connection {
    /// Create a new connection.
    pub fn new(
        stream: TcpStream,
        peer_addr: SocketAddr,
        id: u64,
        executor: Arc<CommandExecutor>,
        database: Arc<Database>,
    ) -> Self {
        debug!("New connection from {} (id={})", peer_addr, id);

        Self {
            stream: BufWriter::new(stream),
            peer_addr,
            parser: RespParser::new(),
            state: Arc::new(crate::server::ClientState::new(id, peer_addr.to_string())),
            executor,
            database,
            write_buffer: BytesMut::with_capacity(4096),
            pending_writes: 0,
        }
    }

    /// Run the connection handler until the peer goes away.
    ///
    /// A disconnect mid-transaction behaves like DISCARD: the queue is
    /// dropped and the session leaves every watcher list.
    pub async fn run(&mut self) -> Result<()> {
        let result = self.run_inner().await;
        self.database.on_client_disconnect(&self.state);
        result
    }

    async fn run_inner(&mut self) -> Result<()> {
        let mut read_buf = vec![0u8; READ_BUFFER_SIZE];

        loop {
            if self.state.is_closed() {
                self.flush_writes().await?;
                break;
            }

            if self.state.is_monitor() {
                self.run_monitor_mode(&mut read_buf).await?;
                continue;
            }

            let n = self.stream.get_mut().read(&mut read_buf).await?;
            if n == 0 {
                debug!("Connection closed by peer: {}", self.peer_addr);
                break;
            }

            trace!("Read {} bytes from {}", n, self.peer_addr);
            self.parser.extend(&read_buf[..n]);

            loop {
                match self.parser.parse() {
                    Ok(Some(frame)) => {
                        self.handle_frame(frame).await?;

                        // QUIT or MONITOR switches the loop mode; stop
                        // treating buffered input as ordinary commands.
                        if self.state.is_closed() || self.state.is_monitor() {
                            self.flush_writes().await?;
                            break;
                        }

                        if self.pending_writes >= WRITE_BATCH_SIZE
                            || self.write_buffer.len() >= WRITE_BUFFER_HIGH_WATER
                        {
                            self.flush_writes().await?;
                        }
                    }
                    Ok(None) => {
                        if self.pending_writes > 0 {
                            self.flush_writes().await?;
                        }
                        break;
                    }
                    Err(e) => {
                        let error_frame = Frame::error(format!("ERR Protocol error: {e}"));
                        self.queue_frame(&error_frame);
                        self.flush_writes().await?;
                        self.parser.clear();
                        self.state.close();
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Monitor mode: stream replayed commands to the client while still
    /// accepting a small set of commands (RESET leaves monitor mode,
    /// QUIT closes).
    async fn run_monitor_mode(&mut self, read_buf: &mut [u8]) -> Result<()> {
        let mut feed = self.database.monitors().register(self.state.id());
        self.flush_writes().await?;

        loop {
            if self.state.is_closed() || !self.state.is_monitor() {
                break;
            }

            tokio::select! {
                line = feed.recv() => {
                    match line {
                        Some(frame) => {
                            self.queue_frame(&frame);
                            self.flush_writes().await?;
                        }
                        None => break,
                    }
                }
                result = self.stream.get_mut().read(read_buf) => {
                    let n = result?;
                    if n == 0 {
                        debug!("Monitor connection closed by peer: {}", self.peer_addr);
                        self.state.close();
                        break;
                    }
                    self.parser.extend(&read_buf[..n]);
                    while let Ok(Some(frame)) = self.parser.parse() {
                        self.handle_monitor_command(frame).await?;
                    }
                    self.flush_writes().await?;
                }
            }
        }

        self.database.monitors().unregister(self.state.id());
        Ok(())
    }

    /// Commands accepted while in monitor mode.
    async fn handle_monitor_command(&mut self, frame: Frame) -> Result<()> {
        let cmd = match ParsedCommand::from_frame(frame) {
            Ok(cmd) => cmd,
            Err(e) => {
                let error_frame = Frame::error(e.to_error_reply());
                self.queue_frame(&error_frame);
                return Ok(());
            }
        };

        match cmd.name.as_str() {
            "QUIT" => {
                self.queue_frame(&Frame::ok());
                self.state.close();
            }
            "RESET" => {
                self.state.set_monitor(false);
                self.queue_frame(&Frame::simple("RESET"));
            }
            "PING" => {
                self.queue_frame(&Frame::pong());
            }
            _ => {
                let error = Frame::error(format!(
                    "ERR Can't execute '{}': only QUIT / RESET / PING are allowed in this context",
                    cmd.name
                ));
                self.queue_frame(&error);
            }
        }
        Ok(())
    }

    /// Handle a complete frame (one command).
    async fn handle_frame(&mut self, frame: Frame) -> Result<()> {
        trace!("Handling frame: {:?}", frame);

        let cmd = match ParsedCommand::from_frame(frame) {
            Ok(cmd) => cmd,
            Err(e) => {
                let error_frame = Frame::error(e.to_error_reply());
                self.queue_frame(&error_frame);
                return Ok(());
            }
        };

        let response = match self.executor.execute(cmd, self.state.clone()).await {
            Ok(frame) => frame,
            Err(e) => Frame::error(e.to_error_reply()),
        };

        self.queue_frame(&response);
        Ok(())
    }

    /// Queue a frame for writing (batched).
    fn queue_frame(&mut self, frame: &Frame) {
        frame.serialize(&mut self.write_buffer);
        self.pending_writes += 1;
    }

    /// Flush all pending writes to the socket.
    async fn flush_writes(&mut self) -> Result<()> {
        if self.write_buffer.is_empty() {
            return Ok(());
        }

        self.stream.write_all(&self.write_buffer).await?;
        self.stream.flush().await?;
        self.write_buffer.clear();
        self.pending_writes = 0;

        Ok(())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer_addr", &self.peer_addr)
            .field("state", &self.state)
            .finish()
    }
}
