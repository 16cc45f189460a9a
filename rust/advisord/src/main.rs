mod attachments;
mod backup;
mod db;
mod ipc;
mod plan;

use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Academic advising sidecar: one JSON request per stdin line, one JSON
/// response per stdout line.
#[derive(Parser, Debug)]
#[command(name = "advisord", version, about)]
struct Cli {
    /// Workspace directory to open at start-up
    #[arg(long, env = "ADVISORD_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, env = "ADVISORD_LOG", default_value = "info")]
    log_level: String,
}

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("advisord={}", cli.log_level.to_lowercase())));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr) // stdout carries the protocol
        .init();

    tracing::debug!("advisord v{} starting", env!("CARGO_PKG_VERSION"));

    let mut state = ipc::AppState::new();
    if let Some(ws) = cli.workspace {
        if let Err(e) = ipc::open_workspace(&mut state, ws) {
            tracing::error!(code = e.code, "{}", e.message);
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::error!("stdin closed: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            Err(e) => {
                // No id to echo back.
                tracing::warn!("bad request line: {e}");
                ipc::err("", "bad_json", e.to_string(), None)
            }
        };
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    tracing::debug!("stdin closed; exiting");
}
