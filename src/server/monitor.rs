//! MONITOR fan-out.
//!
//! Sessions that issue MONITOR receive a formatted replay of every
//! command the dispatcher processes. Commands flagged skip-monitor are
//! not fed at dispatch time; EXEC is one of those and is replayed
//! explicitly after its batch so monitors observe `MULTI, EXEC, <queued
//! commands>` in the order the server actually ran them.

use crate::protocol::Frame;
use crate::types::DbIndex;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

/// Registry of monitor sessions and their outgoing line queues.
#[derive(Debug, Default)]
pub struct MonitorHub {
    senders: DashMap<u64, mpsc::UnboundedSender<Frame>>,
    count: AtomicUsize,
}

impl MonitorHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a monitor session; returns the receiving end of its
    /// line queue.
    pub fn register(&self, client_id: u64) -> mpsc::UnboundedReceiver<Frame> {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.senders.insert(client_id, tx).is_none() {
            self.count.fetch_add(1, Ordering::Relaxed);
        }
        rx
    }

    /// Remove a monitor session.
    pub fn unregister(&self, client_id: u64) {
        if self.senders.remove(&client_id).is_some() {
            self.count.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Cheap check the dispatcher performs before formatting anything.
    #[inline]
    pub fn has_monitors(&self) -> bool {
        self.count.load(Ordering::Relaxed) > 0
    }

    /// Replay a command to every registered monitor.
    pub fn feed(&self, db: DbIndex, peer_addr: &str, argv: &[Bytes]) {
        if !self.has_monitors() {
            return;
        }

        let line = format_monitor_line(db, peer_addr, argv);
        let frame = Frame::Simple(line);

        // Dead receivers are reaped lazily on send failure.
        let mut dead = Vec::new();
        for entry in self.senders.iter() {
            if entry.value().send(frame.clone()).is_err() {
                dead.push(*entry.key());
            }
        }
        for id in dead {
            self.unregister(id);
        }
    }
}

/// `<unix-time> [<db> <addr>] "CMD" "arg" ...`
fn format_monitor_line(db: DbIndex, peer_addr: &str, argv: &[Bytes]) -> String {
    let now = chrono::Utc::now();
    let mut line = format!(
        "{}.{:06} [{} {}]",
        now.timestamp(),
        now.timestamp_subsec_micros(),
        db,
        peer_addr
    );
    for arg in argv {
        line.push(' ');
        line.push('"');
        for &b in arg.iter() {
            match b {
                b'"' | b'\\' => {
                    line.push('\\');
                    line.push(b as char);
                }
                b'\n' => line.push_str("\\n"),
                b'\r' => line.push_str("\\r"),
                0x20..=0x7e => line.push(b as char),
                _ => line.push_str(&format!("\\x{b:02x}")),
            }
        }
        line.push('"');
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<Bytes> {
        parts
            .iter()
            .map(|p| Bytes::copy_from_slice(p.as_bytes()))
            .collect()
    }

    #[tokio::test]
    async fn test_feed_reaches_registered_monitor() {
        let hub = MonitorHub::new();
        assert!(!hub.has_monitors());

        let mut rx = hub.register(1);
        assert!(hub.has_monitors());

        hub.feed(0, "127.0.0.1:5000", &argv(&["SET", "k", "v"]));
        let frame = rx.recv().await.unwrap();
        let line = frame.as_str().unwrap();
        assert!(line.contains("[0 127.0.0.1:5000]"));
        assert!(line.ends_with("\"SET\" \"k\" \"v\""));
    }

    #[tokio::test]
    async fn test_unregister_stops_feed() {
        let hub = MonitorHub::new();
        let mut rx = hub.register(1);
        hub.unregister(1);
        assert!(!hub.has_monitors());

        hub.feed(0, "127.0.0.1:5000", &argv(&["PING"]));
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_line_escapes_binary() {
        let line = format_monitor_line(
            2,
            "10.0.0.9:1",
            &[Bytes::from_static(b"SET"), Bytes::from_static(b"a\x01\"b")],
        );
        assert!(line.contains("\"a\\x01\\\"b\""));
    }
}
