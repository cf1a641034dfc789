//! # Daemon Client
//!
//! Connects to the daemon socket and exchanges one request/response pair at
//! a time. [`connect_or_start`] is what the CLI uses: if no daemon answers,
//! it spawns `rd daemon` in the background and retries for about a second,
//! so the first `rd` invocation after boot just works.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;

use super::proto::{read_frame, write_frame, Request, Response};

/// One connection to a running daemon.
pub struct DaemonClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl DaemonClient {
    /// Connect to a daemon that is already running.
    pub async fn connect(socket: &Path) -> Result<Self> {
        let stream = UnixStream::connect(socket)
            .await
            .with_context(|| format!("Failed to connect to daemon socket: {}", socket.display()))?;
        let (read_half, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer,
        })
    }

    /// Send one request and wait for the daemon's response.
    pub async fn request(&mut self, request: &Request) -> Result<Response> {
        write_frame(&mut self.writer, request).await?;
        match read_frame(&mut self.reader).await? {
            Some(response) => Ok(response),
            None => bail!("Daemon closed the connection without answering"),
        }
    }
}

/// Connect to the daemon, starting one if none is running.
pub async fn connect_or_start(socket: &Path) -> Result<DaemonClient> {
    if let Ok(client) = DaemonClient::connect(socket).await {
        return Ok(client);
    }

    spawn_daemon()?;

    // give the fresh daemon up to a second to come up
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if let Ok(client) = DaemonClient::connect(socket).await {
            return Ok(client);
        }
    }
    bail!("Started a daemon but could not connect to it")
}

/// Launch `rd daemon` detached from this process.
fn spawn_daemon() -> Result<()> {
    let exe = std::env::current_exe().context("Failed to locate the rd executable")?;
    std::process::Command::new(exe)
        .arg("daemon")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("Failed to start the daemon")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use tokio::net::UnixListener;

    #[tokio::test]
    async fn test_client_round_trips_requests() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("rd.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);

            let request: Request = read_frame(&mut reader).await.unwrap().unwrap();
            assert_eq!(request, Request::List);
            write_frame(
                &mut write_half,
                &Response::Paths {
                    paths: vec![PathBuf::from("/a")],
                },
            )
            .await
            .unwrap();
        });

        let mut client = DaemonClient::connect(&path).await.unwrap();
        let response = client.request(&Request::List).await.unwrap();

        assert_eq!(
            response,
            Response::Paths {
                paths: vec![PathBuf::from("/a")]
            }
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_fails_without_daemon() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("rd.sock");

        assert!(DaemonClient::connect(&path).await.is_err());
    }
}
