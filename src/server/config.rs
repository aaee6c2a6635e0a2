//! Server configuration.
//!
//! Loads redis.conf-style files: one `option value...` pair per line,
//! `#` comments, unknown options rejected so typos surface at startup.

use crate::persistence::AofFsync;
use crate::{Error, Result, DEFAULT_PORT, MAX_CLIENTS};
use std::fs;
use std::path::{Path, PathBuf};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address
    pub bind: String,
    /// Port number
    pub port: u16,
    /// Number of keyspaces
    pub databases: u16,
    /// Maximum number of clients
    pub max_clients: usize,
    /// TCP keepalive (seconds, 0 to disable)
    pub tcp_keepalive: u32,
    /// Timeout for idle clients (seconds, 0 to disable)
    pub timeout: u32,
    /// Log level
    pub loglevel: LogLevel,
    /// Log file path (None for stdout)
    pub logfile: Option<PathBuf>,
    /// Working directory
    pub dir: PathBuf,
    /// Enable AOF persistence
    pub appendonly: bool,
    /// AOF filename
    pub appendfilename: String,
    /// AOF fsync policy
    pub appendfsync: AofFsync,
    /// Execution time in microseconds above which a command is retained
    /// in the slow log; negative disables the log
    pub slowlog_log_slower_than: i64,
    /// Slow log retention bound
    pub slowlog_max_len: usize,
    /// Whether a replica rejects writes from ordinary clients
    pub replica_read_only: bool,
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Debug,
    Verbose,
    #[default]
    Notice,
    Warning,
}

impl LogLevel {
    /// Parse a config-file log level.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "debug" => Some(Self::Debug),
            "verbose" => Some(Self::Verbose),
            "notice" => Some(Self::Notice),
            "warning" => Some(Self::Warning),
            _ => None,
        }
    }

    /// The tracing filter directive this level maps to.
    pub fn as_filter(&self) -> &'static str {
        match self {
            Self::Debug | Self::Verbose => "debug",
            Self::Notice => "info",
            Self::Warning => "warn",
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            databases: 16,
            max_clients: MAX_CLIENTS,
            tcp_keepalive: 300,
            timeout: 0,
            loglevel: LogLevel::default(),
            logfile: None,
            dir: PathBuf::from("."),
            appendonly: false,
            appendfilename: "appendonly.aof".to_string(),
            appendfsync: AofFsync::default(),
            slowlog_log_slower_than: 10_000,
            slowlog_max_len: 128,
            replica_read_only: true,
        }
    }
}

impl Config {
    /// Load configuration from a redis.conf-style file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let mut config = Self::default();

        for (lineno, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut parts = line.splitn(2, char::is_whitespace);
            let option = parts.next().unwrap_or("").to_lowercase();
            let value = parts.next().unwrap_or("").trim();

            config
                .apply_option(&option, value)
                .map_err(|e| Error::Config(format!("line {}: {e}", lineno + 1)))?;
        }

        Ok(config)
    }

    fn apply_option(&mut self, option: &str, value: &str) -> std::result::Result<(), String> {
        match option {
            "bind" => self.bind = value.to_string(),
            "port" => self.port = parse(option, value)?,
            "databases" => {
                let n: u16 = parse(option, value)?;
                if n == 0 {
                    return Err("databases must be at least 1".to_string());
                }
                self.databases = n;
            }
            "maxclients" => self.max_clients = parse(option, value)?,
            "tcp-keepalive" => self.tcp_keepalive = parse(option, value)?,
            "timeout" => self.timeout = parse(option, value)?,
            "loglevel" => {
                self.loglevel = LogLevel::from_str(value)
                    .ok_or_else(|| format!("invalid loglevel '{value}'"))?;
            }
            "logfile" => {
                if !value.is_empty() {
                    self.logfile = Some(PathBuf::from(value));
                }
            }
            "dir" => self.dir = PathBuf::from(value),
            "appendonly" => self.appendonly = parse_bool(option, value)?,
            "appendfilename" => self.appendfilename = value.trim_matches('"').to_string(),
            "appendfsync" => {
                self.appendfsync = AofFsync::from_str(value)
                    .ok_or_else(|| format!("invalid appendfsync '{value}'"))?;
            }
            "slowlog-log-slower-than" => self.slowlog_log_slower_than = parse(option, value)?,
            "slowlog-max-len" => self.slowlog_max_len = parse(option, value)?,
            "replica-read-only" | "slave-read-only" => {
                self.replica_read_only = parse_bool(option, value)?;
            }
            _ => return Err(format!("unknown option '{option}'")),
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(option: &str, value: &str) -> std::result::Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("invalid value '{value}' for '{option}'"))
}

fn parse_bool(option: &str, value: &str) -> std::result::Result<bool, String> {
    match value.to_lowercase().as_str() {
        "yes" => Ok(true),
        "no" => Ok(false),
        _ => Err(format!("argument for '{option}' must be 'yes' or 'no'")),
    }
}
