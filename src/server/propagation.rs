//! Propagation sink: ordered fan-out of executed writes to the
//! durability (AOF) stream and the replication backlog.
//!
//! Records reach each downstream in exactly the order they are appended
//! by the dispatcher; the single-threaded execution model makes that
//! order the command execution order. Each stream tracks its own
//! selected keyspace and injects a `SELECT` record when a command
//! targets a different one. EXEC batches arrive as synthetic `MULTI`,
//! the write commands, then the literal `EXEC` record (which, on
//! mid-batch demotion, the transaction engine also feeds to the backlog
//! directly to terminate the block).

use crate::server::replication::ReplicationBacklog;
use crate::types::DbIndex;
use bitflags::bitflags;
use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;

bitflags! {
    /// Downstream targets for a propagated record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PropagationTarget: u8 {
        /// Append-only file
        const AOF  = 1 << 0;
        /// Replication stream
        const REPL = 1 << 1;
    }
}

/// Per-stream cursor: which keyspace the last emitted record targeted.
#[derive(Debug, Default)]
struct StreamState {
    selected_db: Option<DbIndex>,
}

/// The propagation sink.
#[derive(Debug)]
pub struct PropagationSink {
    /// Streams this sink actually feeds (REPL always, AOF when enabled)
    enabled: PropagationTarget,
    aof_state: Mutex<StreamState>,
    /// Serialized AOF records pending a drain to the writer
    aof_buf: Mutex<BytesMut>,
    repl_state: Mutex<StreamState>,
    backlog: ReplicationBacklog,
}

impl PropagationSink {
    /// Create a sink. The replication stream is always fed; the AOF
    /// stream only when `appendonly` is on.
    pub fn new(appendonly: bool) -> Self {
        let mut enabled = PropagationTarget::REPL;
        if appendonly {
            enabled |= PropagationTarget::AOF;
        }
        Self {
            enabled,
            aof_state: Mutex::new(StreamState::default()),
            aof_buf: Mutex::new(BytesMut::new()),
            repl_state: Mutex::new(StreamState::default()),
            backlog: ReplicationBacklog::default(),
        }
    }

    /// Whether the AOF stream is being fed.
    #[inline]
    pub fn aof_enabled(&self) -> bool {
        self.enabled.contains(PropagationTarget::AOF)
    }

    /// Append one command record for the given targets.
    pub fn propagate(&self, db: DbIndex, argv: &[Bytes], targets: PropagationTarget) {
        let targets = targets & self.enabled;
        if targets.is_empty() {
            return;
        }

        let record = encode_command(argv);

        if targets.contains(PropagationTarget::AOF) {
            let mut state = self.aof_state.lock();
            let mut buf = self.aof_buf.lock();
            if state.selected_db != Some(db) {
                buf.put_slice(&encode_select(db));
                state.selected_db = Some(db);
            }
            buf.put_slice(&record);
        }

        if targets.contains(PropagationTarget::REPL) {
            let mut state = self.repl_state.lock();
            if state.selected_db != Some(db) {
                self.backlog.feed(encode_select(db));
                state.selected_db = Some(db);
            }
            self.backlog.feed(record);
        }
    }

    /// Feed raw bytes straight into the replication backlog. Used for
    /// the literal `EXEC` that terminates a MULTI block when the
    /// instance was demoted mid-batch.
    pub fn feed_repl_raw(&self, data: &'static [u8]) {
        self.backlog.feed(Bytes::from_static(data));
    }

    /// Drain pending AOF bytes, if any.
    pub fn take_aof_buffer(&self) -> Option<Bytes> {
        let mut buf = self.aof_buf.lock();
        if buf.is_empty() {
            None
        } else {
            Some(buf.split().freeze())
        }
    }

    /// Pending AOF bytes without draining (test observation).
    pub fn aof_pending(&self) -> Bytes {
        Bytes::copy_from_slice(&self.aof_buf.lock())
    }

    /// The replication backlog.
    #[inline]
    pub fn backlog(&self) -> &ReplicationBacklog {
        &self.backlog
    }
}

/// Serialize a command as a RESP array of bulk strings.
fn encode_command(argv: &[Bytes]) -> Bytes {
    let mut buf = BytesMut::with_capacity(32 + argv.iter().map(Bytes::len).sum::<usize>());
    buf.put_slice(format!("*{}\r\n", argv.len()).as_bytes());
    for arg in argv {
        buf.put_slice(format!("${}\r\n", arg.len()).as_bytes());
        buf.put_slice(arg);
        buf.put_slice(b"\r\n");
    }
    buf.freeze()
}

fn encode_select(db: DbIndex) -> Bytes {
    encode_command(&[
        Bytes::from_static(b"SELECT"),
        Bytes::from(db.to_string()),
    ])
}
