//! Tessera: an in-memory key-value store with transactional command
//! batching.
//!
//! This is the main entry point for the tessera server.

use std::path::PathBuf;
use std::sync::Arc;
use tessera::{Config, Server, VERSION};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let cli = parse_args(&args);

    if cli.help {
        print_help();
        return Ok(());
    }
    if cli.version {
        println!("Tessera version {VERSION}");
        return Ok(());
    }

    // Load configuration
    let mut config = if let Some(ref config_path) = cli.config {
        match Config::load_from_file(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Error loading config file: {e}");
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    // CLI overrides
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }
    if cli.appendonly {
        config.appendonly = true;
    }
    if let Some(dir) = cli.dir {
        config.dir = dir;
    }

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.loglevel.as_filter()));

    if let Some(ref logfile) = config.logfile {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(logfile)?;
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_ansi(false)
            .with_writer(file)
            .init();
    } else {
        fmt().with_env_filter(filter).with_target(false).init();
    }

    info!(
        "Tessera {} starting on {}:{}",
        VERSION, config.bind, config.port
    );

    let server = Arc::new(Server::new(config));

    let server_clone = server.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        info!("Received shutdown signal");
        server_clone.shutdown();
    });

    server.run().await?;

    Ok(())
}

/// CLI arguments
struct CliArgs {
    config: Option<PathBuf>,
    port: Option<u16>,
    bind: Option<String>,
    appendonly: bool,
    dir: Option<PathBuf>,
    help: bool,
    version: bool,
}

fn parse_args(args: &[String]) -> CliArgs {
    let mut cli = CliArgs {
        config: None,
        port: None,
        bind: None,
        appendonly: false,
        dir: None,
        help: false,
        version: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                cli.config = args.get(i).map(PathBuf::from);
            }
            "--port" | "-p" => {
                i += 1;
                cli.port = args.get(i).and_then(|s| s.parse().ok());
            }
            "--bind" | "-b" => {
                i += 1;
                cli.bind = args.get(i).cloned();
            }
            "--appendonly" => {
                cli.appendonly = true;
            }
            "--dir" => {
                i += 1;
                cli.dir = args.get(i).map(PathBuf::from);
            }
            "--help" | "-h" => {
                cli.help = true;
            }
            "--version" | "-v" => {
                cli.version = true;
            }
            arg => {
                eprintln!("Unknown option: {arg}");
                cli.help = true;
            }
        }
        i += 1;
    }

    cli
}

fn print_help() {
    println!(
        r"Tessera {VERSION} - An in-memory key-value store

USAGE:
    tessera [OPTIONS]

OPTIONS:
    -c, --config <FILE>   Load configuration from file
    -p, --port <PORT>     Set the server port (default: 6379)
    -b, --bind <ADDR>     Set the bind address (default: 127.0.0.1)
        --appendonly      Enable AOF persistence
        --dir <DIR>       Set working directory
    -h, --help            Print this help message
    -v, --version         Print version information

CONFIGURATION FILE:
    Tessera reads redis.conf-style configuration files; recognized
    options include slowlog-log-slower-than, slowlog-max-len,
    replica-read-only, appendonly, and appendfsync.
"
    );
}
