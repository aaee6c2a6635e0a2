//! Transaction semantics, driven through the command executor.
//!
//! Each test builds the server state and dispatches parsed commands the
//! way a connection would, then asserts on reply frames (or their exact
//! wire encoding) and on keyspace / propagation effects.

use bytes::Bytes;
use std::sync::Arc;
use tessera::commands::{CommandExecutor, ParsedCommand};
use tessera::protocol::{Frame, RespParser};
use tessera::server::{ClientState, Config};
use tessera::storage::Database;

fn setup() -> (Arc<Database>, Arc<CommandExecutor>) {
    setup_with(Config::default())
}

fn setup_with(config: Config) -> (Arc<Database>, Arc<CommandExecutor>) {
    let database = Arc::new(Database::new(&config));
    let executor = Arc::new(CommandExecutor::new(database.clone()));
    (database, executor)
}

fn session(id: u64) -> Arc<ClientState> {
    Arc::new(ClientState::new(id, format!("127.0.0.1:{}", 40000 + id)))
}

async fn run(executor: &CommandExecutor, client: &Arc<ClientState>, parts: &[&str]) -> Frame {
    let args = parts[1..]
        .iter()
        .map(|p| Bytes::copy_from_slice(p.as_bytes()))
        .collect();
    let cmd = ParsedCommand::new(parts[0], args);
    match executor.execute(cmd, client.clone()).await {
        Ok(frame) => frame,
        Err(e) => Frame::error(e.to_error_reply()),
    }
}

/// Decode a propagation stream back into argv vectors.
fn decode_stream(bytes: &[u8]) -> Vec<Vec<String>> {
    let mut parser = RespParser::new();
    parser.extend(bytes);
    let mut commands = Vec::new();
    while let Some(frame) = parser.parse().expect("valid propagation stream") {
        let argv = frame
            .as_array()
            .expect("propagated records are arrays")
            .iter()
            .map(|f| String::from_utf8_lossy(f.as_bytes_or_panic()).to_string())
            .collect();
        commands.push(argv);
    }
    commands
}

trait FrameExt {
    fn as_bytes_or_panic(&self) -> &[u8];
}

impl FrameExt for Frame {
    fn as_bytes_or_panic(&self) -> &[u8] {
        match self {
            Frame::Bulk(b) => b,
            Frame::Simple(s) => s.as_bytes(),
            _ => panic!("expected bulk frame, got {self:?}"),
        }
    }
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test]
async fn basic_atomic_batch() {
    let (_database, executor) = setup();
    let c1 = session(1);

    assert_eq!(run(&executor, &c1, &["MULTI"]).await, Frame::ok());
    assert_eq!(
        run(&executor, &c1, &["SET", "a", "1"]).await,
        Frame::queued()
    );
    assert_eq!(run(&executor, &c1, &["INCR", "a"]).await, Frame::queued());
    assert_eq!(run(&executor, &c1, &["GET", "a"]).await, Frame::queued());

    let reply = run(&executor, &c1, &["EXEC"]).await;
    assert_eq!(reply.to_vec(), b"*3\r\n+OK\r\n:2\r\n$1\r\n2\r\n");
}

#[tokio::test]
async fn cas_failure_returns_null_array() {
    let (_database, executor) = setup();
    let c1 = session(1);
    let c2 = session(2);

    assert_eq!(run(&executor, &c1, &["WATCH", "k"]).await, Frame::ok());
    assert_eq!(run(&executor, &c2, &["SET", "k", "x"]).await, Frame::ok());

    assert_eq!(run(&executor, &c1, &["MULTI"]).await, Frame::ok());
    assert_eq!(
        run(&executor, &c1, &["SET", "k", "y"]).await,
        Frame::queued()
    );

    let reply = run(&executor, &c1, &["EXEC"]).await;
    assert_eq!(reply, Frame::NullArray);
    assert_eq!(reply.to_vec(), b"*-1\r\n");

    // The batch did not run.
    assert_eq!(
        run(&executor, &c1, &["GET", "k"]).await,
        Frame::Bulk(Bytes::from("x"))
    );
}

#[tokio::test]
async fn queue_time_error_aborts_exec() {
    let (_database, executor) = setup();
    let c1 = session(1);

    assert_eq!(run(&executor, &c1, &["MULTI"]).await, Frame::ok());

    let err = run(&executor, &c1, &["NOSUCHCMD"]).await;
    assert!(err.is_error());
    assert!(err.as_str().unwrap().contains("unknown command"));

    // Queueing keeps going after the error.
    assert_eq!(
        run(&executor, &c1, &["SET", "a", "1"]).await,
        Frame::queued()
    );

    let reply = run(&executor, &c1, &["EXEC"]).await;
    assert_eq!(
        reply,
        Frame::error("EXECABORT Transaction discarded because of previous errors.")
    );

    // Nothing ran; the transaction is gone.
    assert_eq!(run(&executor, &c1, &["GET", "a"]).await, Frame::Null);
    assert_eq!(
        run(&executor, &c1, &["EXEC"]).await,
        Frame::error("ERR EXEC without MULTI")
    );
}

#[tokio::test]
async fn arity_error_while_queueing_aborts_exec() {
    let (_database, executor) = setup();
    let c1 = session(1);

    run(&executor, &c1, &["MULTI"]).await;
    let err = run(&executor, &c1, &["GET"]).await;
    assert!(err.as_str().unwrap().contains("wrong number of arguments"));

    let reply = run(&executor, &c1, &["EXEC"]).await;
    assert!(reply.as_str().unwrap().starts_with("EXECABORT"));
}

#[tokio::test]
async fn runtime_error_does_not_abort_batch() {
    let (_database, executor) = setup();
    let c1 = session(1);

    assert_eq!(run(&executor, &c1, &["SET", "a", "foo"]).await, Frame::ok());

    run(&executor, &c1, &["MULTI"]).await;
    run(&executor, &c1, &["INCR", "a"]).await;
    run(&executor, &c1, &["SET", "b", "1"]).await;

    let reply = run(&executor, &c1, &["EXEC"]).await;
    assert_eq!(
        reply.to_vec(),
        b"*2\r\n-ERR value is not an integer or out of range\r\n+OK\r\n"
    );

    // The failing INCR left `a` alone; the following SET still ran.
    assert_eq!(
        run(&executor, &c1, &["GET", "a"]).await,
        Frame::Bulk(Bytes::from("foo"))
    );
    assert_eq!(
        run(&executor, &c1, &["GET", "b"]).await,
        Frame::Bulk(Bytes::from("1"))
    );
}

#[tokio::test]
async fn nested_multi_is_rejected() {
    let (_database, executor) = setup();
    let c1 = session(1);

    assert_eq!(run(&executor, &c1, &["MULTI"]).await, Frame::ok());
    assert_eq!(
        run(&executor, &c1, &["MULTI"]).await,
        Frame::error("ERR MULTI calls can not be nested")
    );

    // The rejection is a state error, not a queueing error: EXEC of the
    // (empty) queue still runs.
    let reply = run(&executor, &c1, &["EXEC"]).await;
    assert_eq!(reply.to_vec(), b"*0\r\n");
}

// ── DISCARD / UNWATCH / state preconditions ──────────────────────────────

#[tokio::test]
async fn discard_drops_queue_and_watches() {
    let (database, executor) = setup();
    let c1 = session(1);
    let c2 = session(2);

    run(&executor, &c1, &["WATCH", "k"]).await;
    run(&executor, &c1, &["MULTI"]).await;
    run(&executor, &c1, &["SET", "a", "1"]).await;
    assert_eq!(run(&executor, &c1, &["DISCARD"]).await, Frame::ok());

    assert_eq!(run(&executor, &c1, &["GET", "a"]).await, Frame::Null);
    assert_eq!(database.db(0).unwrap().watched_key_count(), 0);

    // The old watch is dead: another session's write no longer spoils
    // a fresh transaction.
    run(&executor, &c2, &["SET", "k", "x"]).await;
    run(&executor, &c1, &["MULTI"]).await;
    run(&executor, &c1, &["SET", "k", "z"]).await;
    let reply = run(&executor, &c1, &["EXEC"]).await;
    assert_eq!(reply.as_array().unwrap().len(), 1);
    assert_eq!(
        run(&executor, &c1, &["GET", "k"]).await,
        Frame::Bulk(Bytes::from("z"))
    );
}

#[tokio::test]
async fn unwatch_clears_cas_tracking() {
    let (_database, executor) = setup();
    let c1 = session(1);
    let c2 = session(2);

    run(&executor, &c1, &["WATCH", "k"]).await;
    run(&executor, &c2, &["SET", "k", "x"]).await; // poisons c1
    assert_eq!(run(&executor, &c1, &["UNWATCH"]).await, Frame::ok());

    run(&executor, &c1, &["MULTI"]).await;
    run(&executor, &c1, &["SET", "k", "y"]).await;
    let reply = run(&executor, &c1, &["EXEC"]).await;
    assert_eq!(reply.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn own_write_outside_tx_poisons_own_watch() {
    let (_database, executor) = setup();
    let c1 = session(1);

    run(&executor, &c1, &["WATCH", "k"]).await;
    run(&executor, &c1, &["SET", "k", "v"]).await; // a touch spares no one
    run(&executor, &c1, &["MULTI"]).await;
    run(&executor, &c1, &["GET", "k"]).await;
    assert_eq!(run(&executor, &c1, &["EXEC"]).await, Frame::NullArray);
}

#[tokio::test]
async fn own_write_inside_tx_does_not_poison() {
    let (_database, executor) = setup();
    let c1 = session(1);

    run(&executor, &c1, &["WATCH", "k"]).await;
    run(&executor, &c1, &["MULTI"]).await;
    run(&executor, &c1, &["SET", "k", "v"]).await;
    run(&executor, &c1, &["INCR", "n"]).await;

    // EXEC unwatches before running, so the batch's own writes cannot
    // fail its CAS check.
    let reply = run(&executor, &c1, &["EXEC"]).await;
    assert_eq!(reply.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn watch_inside_multi_rejected_without_aborting() {
    let (_database, executor) = setup();
    let c1 = session(1);

    run(&executor, &c1, &["MULTI"]).await;
    assert_eq!(
        run(&executor, &c1, &["WATCH", "k"]).await,
        Frame::error("ERR WATCH inside MULTI is not allowed")
    );
    run(&executor, &c1, &["SET", "a", "1"]).await;

    let reply = run(&executor, &c1, &["EXEC"]).await;
    assert_eq!(reply.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn state_precondition_errors() {
    let (_database, executor) = setup();
    let c1 = session(1);

    assert_eq!(
        run(&executor, &c1, &["EXEC"]).await,
        Frame::error("ERR EXEC without MULTI")
    );
    assert_eq!(
        run(&executor, &c1, &["DISCARD"]).await,
        Frame::error("ERR DISCARD without MULTI")
    );
}

#[tokio::test]
async fn flush_poisons_watchers_of_existing_keys_only() {
    let (_database, executor) = setup();
    let c1 = session(1);
    let c2 = session(2);

    run(&executor, &c2, &["SET", "present", "v"]).await;
    run(&executor, &c1, &["WATCH", "missing"]).await;
    run(&executor, &c2, &["WATCH", "present"]).await;

    run(&executor, &session(3), &["FLUSHDB"]).await;

    // c1 watched a key the flush never removed.
    run(&executor, &c1, &["MULTI"]).await;
    run(&executor, &c1, &["GET", "missing"]).await;
    assert!(run(&executor, &c1, &["EXEC"]).await.as_array().is_some());

    // c2 watched a key that existed; its batch dies.
    run(&executor, &c2, &["MULTI"]).await;
    run(&executor, &c2, &["GET", "present"]).await;
    assert_eq!(run(&executor, &c2, &["EXEC"]).await, Frame::NullArray);
}

// ── Disconnect lifecycle ─────────────────────────────────────────────────

#[tokio::test]
async fn disconnect_discards_transaction_and_watches() {
    let (database, executor) = setup();
    let c1 = session(1);
    let c2 = session(2);

    run(&executor, &c1, &["WATCH", "k"]).await;
    run(&executor, &c1, &["MULTI"]).await;
    run(&executor, &c1, &["SET", "a", "1"]).await;

    database.on_client_disconnect(&c1);

    assert!(!c1.is_in_multi());
    assert_eq!(c1.queued_len(), 0);
    assert_eq!(database.db(0).unwrap().watched_key_count(), 0);

    // Writes to the previously-watched key reach nobody.
    run(&executor, &c2, &["SET", "k", "x"]).await;
    assert!(!c1.is_dirty_cas());
}

// ── Read-only replica enforcement ────────────────────────────────────────

#[tokio::test]
async fn write_batch_rejected_on_read_only_replica() {
    let (_database, executor) = setup();
    let c1 = session(1);
    let admin = session(2);

    run(&executor, &c1, &["MULTI"]).await;
    run(&executor, &c1, &["SET", "a", "1"]).await;

    // Demotion lands between MULTI and EXEC.
    assert_eq!(
        run(&executor, &admin, &["REPLICAOF", "10.0.0.1", "6379"]).await,
        Frame::ok()
    );

    let reply = run(&executor, &c1, &["EXEC"]).await;
    assert!(reply.as_str().unwrap().contains("read-only replica"));

    // The transaction is discarded.
    assert_eq!(
        run(&executor, &c1, &["EXEC"]).await,
        Frame::error("ERR EXEC without MULTI")
    );
}

#[tokio::test]
async fn read_only_batch_allowed_on_replica() {
    let (_database, executor) = setup();
    let c1 = session(1);

    run(&executor, &session(2), &["REPLICAOF", "10.0.0.1", "6379"]).await;

    run(&executor, &c1, &["MULTI"]).await;
    run(&executor, &c1, &["GET", "a"]).await;
    assert!(run(&executor, &c1, &["EXEC"]).await.as_array().is_some());
}

#[tokio::test]
async fn master_link_bypasses_read_only_check() {
    let (_database, executor) = setup();
    let c1 = session(1);
    c1.set_master_link(true);

    run(&executor, &session(2), &["REPLICAOF", "10.0.0.1", "6379"]).await;

    run(&executor, &c1, &["MULTI"]).await;
    run(&executor, &c1, &["SET", "a", "1"]).await;
    let reply = run(&executor, &c1, &["EXEC"]).await;
    assert_eq!(reply.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn writable_replica_accepts_write_batch() {
    let (_database, executor) = setup();
    let c1 = session(1);

    run(&executor, &session(2), &["REPLICAOF", "10.0.0.1", "6379"]).await;
    run(
        &executor,
        &session(2),
        &["CONFIG", "SET", "replica-read-only", "no"],
    )
    .await;

    run(&executor, &c1, &["MULTI"]).await;
    run(&executor, &c1, &["SET", "a", "1"]).await;
    assert!(run(&executor, &c1, &["EXEC"]).await.as_array().is_some());
}

// ── Propagation ──────────────────────────────────────────────────────────

fn appendonly_config() -> Config {
    let mut config = Config::default();
    config.appendonly = true;
    config
}

#[tokio::test]
async fn exec_batch_is_bracketed_in_both_streams() {
    let (database, executor) = setup_with(appendonly_config());
    let c1 = session(1);

    run(&executor, &c1, &["MULTI"]).await;
    run(&executor, &c1, &["SET", "a", "1"]).await;
    run(&executor, &c1, &["GET", "a"]).await;
    run(&executor, &c1, &["SET", "b", "2"]).await;
    run(&executor, &c1, &["EXEC"]).await;

    let aof = database.sink().aof_pending();
    let repl = database.sink().backlog().as_bytes();
    assert_eq!(&aof[..], &repl[..]);

    let commands = decode_stream(&repl);
    let names: Vec<&str> = commands.iter().map(|c| c[0].as_str()).collect();
    // The read never propagates; the block is SELECT-prefixed and
    // bracketed by MULTI/EXEC.
    assert_eq!(names, vec!["SELECT", "MULTI", "SET", "SET", "EXEC"]);
    assert_eq!(commands[2], vec!["SET", "a", "1"]);
    assert_eq!(commands[3], vec!["SET", "b", "2"]);
}

#[tokio::test]
async fn read_only_batch_propagates_nothing() {
    let (database, executor) = setup_with(appendonly_config());
    let c1 = session(1);

    run(&executor, &c1, &["MULTI"]).await;
    run(&executor, &c1, &["GET", "a"]).await;
    run(&executor, &c1, &["EXEC"]).await;

    assert!(database.sink().backlog().as_bytes().is_empty());
    assert!(database.sink().aof_pending().is_empty());
}

#[tokio::test]
async fn plain_write_propagates_without_brackets() {
    let (database, executor) = setup_with(appendonly_config());
    let c1 = session(1);

    run(&executor, &c1, &["SET", "a", "1"]).await;
    run(&executor, &c1, &["DEL", "a"]).await;
    run(&executor, &c1, &["DEL", "a"]).await; // no-op, must not propagate

    let commands = decode_stream(&database.sink().backlog().as_bytes());
    let names: Vec<&str> = commands.iter().map(|c| c[0].as_str()).collect();
    assert_eq!(names, vec!["SELECT", "SET", "DEL"]);
}

#[tokio::test]
async fn select_reinjected_when_db_changes() {
    let (database, executor) = setup_with(appendonly_config());
    let c1 = session(1);

    run(&executor, &c1, &["SET", "a", "1"]).await;
    run(&executor, &c1, &["SELECT", "2"]).await;
    run(&executor, &c1, &["SET", "b", "2"]).await;

    let commands = decode_stream(&database.sink().backlog().as_bytes());
    assert_eq!(commands[0], vec!["SELECT", "0"]);
    assert_eq!(commands[2], vec!["SELECT", "2"]);
    assert_eq!(commands[3], vec!["SET", "b", "2"]);
}

#[tokio::test]
async fn demotion_mid_batch_terminates_backlog_block() {
    let (database, executor) = setup_with(appendonly_config());
    let c1 = session(1);

    run(&executor, &c1, &["MULTI"]).await;
    run(&executor, &c1, &["SET", "a", "1"]).await;
    run(&executor, &c1, &["REPLICAOF", "10.0.0.1", "6379"]).await;
    run(&executor, &c1, &["SET", "b", "2"]).await;
    let reply = run(&executor, &c1, &["EXEC"]).await;

    // The batch keeps running locally after the demotion.
    assert_eq!(reply.as_array().unwrap().len(), 3);
    assert_eq!(
        run(&executor, &c1, &["GET", "b"]).await,
        Frame::Bulk(Bytes::from("2"))
    );

    // The replication stream got MULTI and the first write, then the
    // demotion cut it off; the explicit EXEC record closes the block.
    let repl = decode_stream(&database.sink().backlog().as_bytes());
    let repl_names: Vec<&str> = repl.iter().map(|c| c[0].as_str()).collect();
    assert_eq!(repl_names, vec!["SELECT", "MULTI", "SET", "EXEC"]);

    // The AOF keeps the whole batch.
    let aof = decode_stream(&database.sink().aof_pending());
    let aof_names: Vec<&str> = aof.iter().map(|c| c[0].as_str()).collect();
    assert_eq!(aof_names, vec!["SELECT", "MULTI", "SET", "SET", "EXEC"]);
}

// ── Queueing details ─────────────────────────────────────────────────────

#[tokio::test]
async fn unwatch_is_queued_inside_multi() {
    let (_database, executor) = setup();
    let c1 = session(1);

    run(&executor, &c1, &["MULTI"]).await;
    assert_eq!(run(&executor, &c1, &["UNWATCH"]).await, Frame::queued());
    let reply = run(&executor, &c1, &["EXEC"]).await;
    assert_eq!(reply.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn replies_arrive_in_insertion_order() {
    let (_database, executor) = setup();
    let c1 = session(1);

    run(&executor, &c1, &["MULTI"]).await;
    for i in 0..10 {
        run(&executor, &c1, &["INCR", &format!("ctr{i}")]).await;
    }
    let reply = run(&executor, &c1, &["EXEC"]).await;
    let frames = reply.as_array().unwrap();
    assert_eq!(frames.len(), 10);
    assert!(frames.iter().all(|f| *f == Frame::Integer(1)));
}
