//! # RPC Server
//!
//! Accept loop for the daemon's Unix socket. Each connection gets its own
//! task reading [`Request`] lines and writing one [`Response`] line per
//! request. Handlers talk to the engine through its handle; nothing here
//! touches engine state directly.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;
use tokio::io::BufReader;
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::{EngineHandle, ManualHandle, QUERY_ALL};

use super::proto::{read_frame, write_frame, Request, Response};

/// Bind the daemon socket, clearing a stale file left by a dead daemon.
///
/// Fails when another daemon still answers on the socket, so at most one
/// daemon runs per socket path.
pub async fn bind_socket(path: &Path) -> Result<UnixListener> {
    if path.exists() {
        match UnixStream::connect(path).await {
            Ok(_) => bail!("Another daemon is already listening on {}", path.display()),
            Err(_) => {
                debug!(path = %path.display(), "removing stale socket file");
                fs::remove_file(path).with_context(|| {
                    format!("Failed to remove stale socket: {}", path.display())
                })?;
            }
        }
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create socket directory: {}", parent.display()))?;
    }

    UnixListener::bind(path)
        .with_context(|| format!("Failed to bind socket: {}", path.display()))
}

/// Accept clients until the cancellation token fires.
pub async fn serve(
    listener: UnixListener,
    engine: EngineHandle,
    manual: ManualHandle,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            accepted = listener.accept() => {
                let stream = match accepted {
                    Ok((stream, _)) => stream,
                    Err(err) => {
                        warn!("Failed to accept client connection: {err}");
                        continue;
                    }
                };
                let engine = engine.clone();
                let manual = manual.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_client(stream, engine, manual, cancel).await {
                        debug!("client connection ended with error: {err:#}");
                    }
                });
            }
        }
    }
}

async fn handle_client(
    stream: UnixStream,
    engine: EngineHandle,
    manual: ManualHandle,
    cancel: CancellationToken,
) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    loop {
        let request = match read_frame::<_, Request>(&mut reader).await {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(()),
            Err(err) => {
                // a garbled line poisons only itself, not the connection
                let response = Response::Error {
                    message: format!("{err:#}"),
                };
                write_frame(&mut write_half, &response).await?;
                continue;
            }
        };

        let response = dispatch(request, &engine, &manual).await;
        let stopping = matches!(response, Response::Stopping);
        write_frame(&mut write_half, &response).await?;

        if stopping {
            info!("stop requested, shutting down");
            cancel.cancel();
            return Ok(());
        }
    }
}

async fn dispatch(request: Request, engine: &EngineHandle, manual: &ManualHandle) -> Response {
    match request {
        Request::Query { pattern } => match engine.query(&pattern).await {
            Ok(matches) => Response::Matches { matches },
            Err(err) => Response::Error {
                message: err.to_string(),
            },
        },
        Request::Push { path } => {
            if !path.exists() {
                return Response::Error {
                    message: format!("Directory {} does not exist", path.display()),
                };
            }
            match manual.push(path).await {
                Ok(()) => Response::Ok,
                Err(err) => Response::Error {
                    message: err.to_string(),
                },
            }
        }
        Request::List => match engine.query(QUERY_ALL).await {
            Ok(matches) => Response::Paths {
                paths: matches.into_iter().map(|m| m.usage.path).collect(),
            },
            Err(err) => Response::Error {
                message: err.to_string(),
            },
        },
        Request::Stop => Response::Stopping,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_bind_replaces_stale_socket() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("rd.sock");

        // a listener that goes away leaves its socket file behind
        drop(UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        bind_socket(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_refuses_second_daemon() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("rd.sock");

        let _live = UnixListener::bind(&path).unwrap();

        assert!(bind_socket(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_bind_creates_missing_parent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("runtime/rd.sock");

        bind_socket(&path).await.unwrap();

        assert!(path.exists());
    }
}
