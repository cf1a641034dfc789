//! # Usage Event Sources
//!
//! A [`UsageSource`] produces a stream of "this directory is in use" events
//! and forwards them into the engine's event channel. Sources run as their
//! own tasks and stop when the daemon's cancellation token fires.
//!
//! Two sources exist: the `/proc` poller in [`poller`](super::poller), and
//! [`ManualSource`], which turns explicit `push` requests from clients into
//! events.

use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A single observation that a process is using a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageEvent {
    /// Observing process, when known. Manual pushes carry no pid.
    pub pid: Option<u32>,
    /// The directory in use.
    pub path: PathBuf,
}

impl UsageEvent {
    /// Event for an explicit client push.
    pub fn manual(path: PathBuf) -> Self {
        Self { pid: None, path }
    }
}

/// Produces usage events until cancelled.
///
/// Events from one source arrive in observation order; nothing is guaranteed
/// across sources. A source that returns cannot be restarted, only recreated.
#[async_trait]
pub trait UsageSource: Send {
    /// Source name used in logs.
    fn name(&self) -> &'static str;

    /// Forward events into `events` until `cancel` fires or the channel
    /// closes.
    async fn run(
        self: Box<Self>,
        events: mpsc::Sender<UsageEvent>,
        cancel: CancellationToken,
    ) -> Result<()>;
}

/// Source fed by explicit pushes through a [`ManualHandle`].
pub struct ManualSource {
    rx: mpsc::Receiver<UsageEvent>,
}

/// Injects synthetic usage events into a running [`ManualSource`].
#[derive(Clone)]
pub struct ManualHandle {
    tx: mpsc::Sender<UsageEvent>,
}

/// Create a manual source and the handle that feeds it.
pub fn manual_source() -> (ManualHandle, ManualSource) {
    let (tx, rx) = mpsc::channel(16);
    (ManualHandle { tx }, ManualSource { rx })
}

impl ManualHandle {
    /// Record a directory use as if a source had observed it.
    pub async fn push(&self, path: PathBuf) -> Result<()> {
        self.tx
            .send(UsageEvent::manual(path))
            .await
            .map_err(|_| anyhow::anyhow!("Usage event channel closed"))
    }
}

#[async_trait]
impl UsageSource for ManualSource {
    fn name(&self) -> &'static str {
        "manual"
    }

    async fn run(
        mut self: Box<Self>,
        events: mpsc::Sender<UsageEvent>,
        cancel: CancellationToken,
    ) -> Result<()> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                event = self.rx.recv() => {
                    let Some(event) = event else {
                        return Ok(());
                    };
                    if events.send(event).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[tokio::test]
    async fn test_manual_source_forwards_pushes() {
        let (handle, source) = manual_source();
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(Box::new(source).run(tx, cancel.clone()));

        handle.push(PathBuf::from("/tmp/somewhere")).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.path, Path::new("/tmp/somewhere"));
        assert_eq!(event.pid, None);

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_manual_source_stops_when_cancelled() {
        let (_handle, source) = manual_source();
        let (tx, _rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(Box::new(source).run(tx, cancel.clone()));

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_manual_source_stops_when_handle_dropped() {
        let (handle, source) = manual_source();
        let (tx, _rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(Box::new(source).run(tx, cancel));

        drop(handle);
        task.await.unwrap().unwrap();
    }
}
