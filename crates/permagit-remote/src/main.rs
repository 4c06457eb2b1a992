//! git-remote-permagit - git remote helper for `permagit://` remotes.

use anyhow::Context;
use clap::Parser;
use permagit_remote::{ui, App, Remote};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding the log filter; falls back to `RUST_LOG`.
const LOG_ENV: &str = "PERMAGIT_LOG";

/// Serve a permagit repository to git
#[derive(Parser, Debug)]
#[command(name = "git-remote-permagit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Remote name, or the URL for anonymous remotes
    remote: String,

    /// Remote URL
    url: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs share standard error with operator messages; standard output is the protocol.
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| format!("permagit={log_level}").into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            ui::error(format!("Error: {e:#}"));
            1
        }
    };

    // A pending stdin read would otherwise hold the runtime open.
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let git_dir = std::env::var_os("GIT_DIR")
        .map(PathBuf::from)
        .context("GIT_DIR is not set; git-remote-permagit must be run by git")?;
    let git_dir = std::fs::canonicalize(&git_dir).unwrap_or(git_dir);

    let remote = Remote::new(cli.remote, cli.url);
    tracing::debug!(remote = %remote.name, url = %remote.url, git_dir = %git_dir.display(), "Starting");

    let app = App::from_environment(git_dir)
        .await
        .context("failed to initialize")?;
    Ok(app
        .run(
            &remote,
            tokio::io::stdin(),
            &mut tokio::io::stdout(),
            &mut tokio::io::stderr(),
        )
        .await)
}
