//! # Wire Protocol
//!
//! Requests and responses exchanged over the daemon's Unix socket, one JSON
//! object per line. The `op` / `status` tags keep frames self-describing, so
//! a shell user can poke the daemon with `nc -U` and readable JSON.
//!
//! ```text
//! → {"op":"query","pattern":"proj"}
//! ← {"status":"matches","matches":[...]}
//! ```
//!
//! A connection may carry any number of request/response pairs in sequence.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::engine::QueryMatch;

/// A client request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Free-text terms, a result id, or the wildcard token.
    Query { pattern: String },
    /// Record a directory use right now.
    Push { path: PathBuf },
    /// All known paths, sorted.
    List,
    /// Shut the daemon down.
    Stop,
}

/// The daemon's answer to a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    /// Ranked results of a query.
    Matches { matches: Vec<QueryMatch> },
    /// Listing of every known path.
    Paths { paths: Vec<PathBuf> },
    /// Push acknowledged.
    Ok,
    /// Shutdown under way; no further responses on this socket.
    Stopping,
    /// The request failed; nothing was changed.
    Error { message: String },
}

/// Write one value as a JSON line.
pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(value).context("Failed to serialize frame")?;
    line.push(b'\n');
    writer
        .write_all(&line)
        .await
        .context("Failed to write frame")?;
    Ok(())
}

/// Read the next JSON line, or `None` at end of stream.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    let mut line = String::new();
    let read = reader
        .read_line(&mut line)
        .await
        .context("Failed to read frame")?;
    if read == 0 {
        return Ok(None);
    }
    let value = serde_json::from_str(line.trim_end())
        .with_context(|| format!("Malformed frame: {}", line.trim_end()))?;
    Ok(Some(value))
}
