//! Huddle — single-room WebSocket chat relay
//!
//! Clients connect to `/ws`, register a display name, and every chat
//! message is relayed to all connected clients. `/health` reports how many
//! connections are live.
//!
//! Usage:
//!   huddle                         # Port from $PORT, else 3001
//!   huddle --port 8080             # Custom port
//!   huddle --max-connections 100   # Reject upgrades beyond 100 sockets
//!   huddle --log-file              # Log to ~/.huddle/logs/huddle.log

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use huddle_server::Dispatcher;
use huddle_transport::{TransportConfig, TransportServer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "huddle", about = "Huddle — real-time chat relay over WebSocket")]
struct Cli {
    /// Port to listen on (0 for OS-assigned)
    #[arg(long, env = "PORT", default_value = "3001")]
    port: u16,

    /// Hostname to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    hostname: String,

    /// Maximum concurrent connections (unlimited if unset)
    #[arg(long)]
    max_connections: Option<usize>,

    /// Disable the permissive CORS layer on HTTP routes
    #[arg(long)]
    no_cors: bool,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Write logs to a file (defaults to ~/.huddle/logs/huddle.log if no path given)
    #[arg(long, default_missing_value = "DEFAULT", num_args = 0..=1)]
    log_file: Option<String>,
}

fn init_tracing(cli: &Cli) {
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let Some(log_file_arg) = cli.log_file.as_deref() else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return;
    };

    let log_path = if log_file_arg == "DEFAULT" {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home).join(".huddle/logs/huddle.log")
    } else {
        PathBuf::from(log_file_arg)
    };

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    match std::fs::OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(file) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .init();
            eprintln!("Logging to {}", log_path.display());
        }
        Err(e) => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            error!("Failed to open log file {}: {e}; logging to stderr", log_path.display());
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    let config = TransportConfig {
        port: cli.port,
        hostname: cli.hostname.clone(),
        enable_cors: !cli.no_cors,
        max_connections: cli.max_connections,
    };

    let dispatcher = Arc::new(Dispatcher::new());

    let mut transport = match TransportServer::start_with_handler(config, dispatcher.clone()).await {
        Ok(t) => t,
        Err(e) => {
            error!("Failed to start transport: {e}");
            std::process::exit(1);
        }
    };

    let addr = transport.local_addr();
    println!();
    println!("  Huddle chat relay");
    println!();
    println!("  WebSocket:  ws://{addr}/ws");
    println!("  Health:     http://{addr}/health");
    match cli.max_connections {
        Some(max) => println!("  Max conns:  {max}"),
        None => println!("  Max conns:  unlimited"),
    }
    println!("  CORS:       {}", if cli.no_cors { "disabled" } else { "permissive" });
    println!();
    println!("  Press Ctrl+C to stop.");
    println!();

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {e}");
    }

    info!(
        "Shutting down with {} connection(s) open",
        dispatcher.connected_count()
    );
    transport.stop().await;
}
