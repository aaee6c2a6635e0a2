//! Pre-allocated RESP responses for zero-allocation common replies.

/// Static OK response: +OK\r\n
pub static OK: &[u8] = b"+OK\r\n";

/// Static PONG response: +PONG\r\n
pub static PONG: &[u8] = b"+PONG\r\n";

/// Static QUEUED response (for transactions): +QUEUED\r\n
pub static QUEUED: &[u8] = b"+QUEUED\r\n";

/// Static NULL bulk string: $-1\r\n
pub static NULL_BULK: &[u8] = b"$-1\r\n";

/// Static NULL array: *-1\r\n
pub static NULL_ARRAY: &[u8] = b"*-1\r\n";

/// Static empty bulk string: $0\r\n\r\n
pub static EMPTY_BULK: &[u8] = b"$0\r\n\r\n";

/// Static empty array: *0\r\n
pub static EMPTY_ARRAY: &[u8] = b"*0\r\n";

/// Literal EXEC record fed to the replication backlog when a batch must
/// be explicitly terminated (instance demoted mid-EXEC).
pub static EXEC_RECORD: &[u8] = b"*1\r\n$4\r\nEXEC\r\n";
