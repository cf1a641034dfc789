//! # rd CLI Entry Point
//!
//! `rd` finds the directories you actually use. A background daemon watches
//! process working directories and records every one it sees; this binary is
//! the thin client that queries it.
//!
//! ## Usage
//!
//! ```bash
//! # fuzzy-search the history
//! rd query proj
//!
//! # expand a result id from the previous query
//! rd query 2
//!
//! # record a directory explicitly
//! rd push ~/work/notes
//!
//! # everything the daemon knows
//! rd list
//!
//! # run the daemon in the foreground (normally started automatically)
//! rd daemon
//! ```
//!
//! A query with one match prints the bare path, ready for command
//! substitution: `cd "$(rd query proj)"`. With several matches it prints a
//! short numbered list; querying the number jumps to the full path.
//!
//! ## Architecture
//!
//! Everything stateful lives in the daemon. The client connects over a Unix
//! socket, sends one JSON request, prints the response, and exits, starting
//! the daemon first if none is running.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use recent_dirs::config::Config;
use recent_dirs::daemon;
use recent_dirs::engine::{MatchOffset, QueryMatch};
use recent_dirs::rpc::{connect_or_start, DaemonClient, Request, Response};

/// Fast access to recently used directories.
#[derive(Parser, Debug)]
#[command(name = "rd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Fast access to recently used directories", long_about = None)]
struct Args {
    /// When to highlight matched parts of paths
    #[arg(long, value_enum, default_value_t = ColorMode::Auto, global = true)]
    color: ColorMode,

    /// Print nothing when a query has no matches
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ColorMode {
    /// Highlight only when stdout is a terminal
    Auto,
    /// Always emit highlight escapes
    Always,
    /// Never emit highlight escapes
    Never,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search the directory history
    #[command(alias = "q")]
    Query {
        /// Search terms, a result id, or "*" for everything
        #[arg(required = true)]
        terms: Vec<String>,
    },

    /// Record a directory use
    #[command(alias = "p")]
    Push {
        /// The directory to record
        path: PathBuf,
    },

    /// Print every known directory, sorted
    List,

    /// Stop the background daemon
    Stop,

    /// Run the daemon in the foreground
    Daemon,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let use_color = match args.color {
        ColorMode::Auto => std::io::stdout().is_terminal(),
        ColorMode::Always => true,
        ColorMode::Never => false,
    };

    match args.command {
        Command::Query { terms } => query_command(&terms, use_color, args.quiet).await,
        Command::Push { path } => push_command(&path).await,
        Command::List => list_command().await,
        Command::Stop => stop_command().await,
        Command::Daemon => daemon_command().await,
    }
}

/// Connect to the daemon for one request, starting it if needed.
async fn connect_client() -> Result<DaemonClient> {
    let config = Config::load();
    let socket = config.socket_file()?;
    connect_or_start(&socket).await
}

async fn query_command(terms: &[String], use_color: bool, quiet: bool) -> Result<()> {
    let pattern = terms.join(" ");
    let mut client = connect_client().await?;
    let response = client
        .request(&Request::Query {
            pattern: pattern.clone(),
        })
        .await
        .context("Failed to query the rd daemon")?;

    let matches = match response {
        Response::Matches { matches } => matches,
        Response::Error { message } => bail!("{message}"),
        other => bail!("Unexpected response from the daemon: {other:?}"),
    };

    if matches.is_empty() {
        if !quiet {
            if use_color {
                eprintln!("No matches for {HIGHLIGHT}{pattern}{RESET}.");
            } else {
                eprintln!("No matches for {pattern}.");
            }
        }
        return Ok(());
    }

    print!("{}", format_matches(&matches, use_color));
    Ok(())
}

async fn push_command(path: &Path) -> Result<()> {
    // resolve client-side: the daemon has a different working directory
    let path = std::fs::canonicalize(path)
        .with_context(|| format!("Directory {} does not exist", path.display()))?;

    let mut client = connect_client().await?;
    let response = client
        .request(&Request::Push { path })
        .await
        .context("Failed to push to the rd daemon")?;

    match response {
        Response::Ok => Ok(()),
        Response::Error { message } => bail!("{message}"),
        other => bail!("Unexpected response from the daemon: {other:?}"),
    }
}

async fn list_command() -> Result<()> {
    let mut client = connect_client().await?;
    let response = client
        .request(&Request::List)
        .await
        .context("Failed to query the rd daemon")?;

    match response {
        Response::Paths { paths } => {
            for path in paths {
                println!("{}", path.display());
            }
            Ok(())
        }
        Response::Error { message } => bail!("{message}"),
        other => bail!("Unexpected response from the daemon: {other:?}"),
    }
}

async fn stop_command() -> Result<()> {
    let mut client = connect_client().await?;
    // the daemon may exit before the reply gets out; that is still a stop
    let _ = client.request(&Request::Stop).await;
    Ok(())
}

async fn daemon_command() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::load();
    daemon::run(config, CancellationToken::new()).await
}

const HIGHLIGHT: &str = "\x1b[1;31m";
const RESET: &str = "\x1b[0m";

/// How many matches a query prints before summarizing the rest.
const MAX_SHOWN: usize = 5;

/// Render query results the way a shell user wants them: a single match as
/// the bare path (for `cd "$(rd query ...)"`), several matches as a short
/// numbered list.
fn format_matches(matches: &[QueryMatch], use_color: bool) -> String {
    if let [only] = matches {
        return format!("{}\n", only.usage.path.display());
    }

    let mut output = String::new();
    for entry in matches.iter().take(MAX_SHOWN) {
        let path = entry.usage.path.display().to_string();
        let rendered = if use_color {
            highlight_path(&path, &entry.offsets)
        } else {
            path
        };
        output.push_str(&format!("  {}: {}\n", entry.id, rendered));
    }
    if matches.len() > MAX_SHOWN {
        output.push_str(&format!(
            "  ... {} other matches not shown\n",
            matches.len() - MAX_SHOWN
        ));
    }
    output
}

/// Wrap every matched byte range in highlight escapes. Overlapping offsets
/// are merged first so no part of the path is printed twice.
fn highlight_path(path: &str, offsets: &[MatchOffset]) -> String {
    let mut sorted = offsets.to_vec();
    sorted.sort_by_key(|offset| offset.start);

    let mut merged: Vec<(usize, usize)> = Vec::new();
    for offset in sorted {
        let end = offset.end().min(path.len());
        let start = offset.start.min(end);
        match merged.last_mut() {
            Some((_, last_end)) if start <= *last_end => *last_end = (*last_end).max(end),
            _ => merged.push((start, end)),
        }
    }

    let mut output = String::new();
    let mut cursor = 0;
    for (start, end) in merged {
        output.push_str(&path[cursor..start]);
        output.push_str(HIGHLIGHT);
        output.push_str(&path[start..end]);
        output.push_str(RESET);
        cursor = end;
    }
    output.push_str(&path[cursor..]);
    output
}
