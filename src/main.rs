mod backup;
mod controller;
mod db;
mod ipc;
mod logging;
mod session;
mod store;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::Parser;

/// Grade-scale administration sidecar: line-delimited JSON requests on
/// stdin, one response per line on stdout.
#[derive(Debug, Parser)]
#[command(name = "gradescaled", version)]
struct Cli {
    /// Workspace directory to open at startup (otherwise use
    /// workspace.select).
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Default log filter level (RUST_LOG overrides).
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let mut state = ipc::AppState::new();
    if let Some(workspace) = cli.workspace {
        match db::open_db(&workspace) {
            Ok(conn) => {
                tracing::info!(workspace = %workspace.to_string_lossy(), "workspace opened");
                state.workspace = Some(workspace);
                state.db = Some(conn);
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to open workspace");
                std::process::exit(1);
            }
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply with an id; report and move on.
                tracing::warn!(error = %e, "unparseable request line");
                let _ = writeln!(
                    stdout,
                    "{{\"ok\":false,\"error\":{{\"code\":\"bad_json\",\"message\":\"{}\"}}}}",
                    e
                );
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
