//! # Working-Directory Poller
//!
//! Periodically sweeps the current working directory of every visible
//! process and emits a [`UsageEvent`] whenever one has changed since the
//! previous sweep. This is how the daemon learns about directory use without
//! any shell integration: `cd` somewhere, and within one poll interval the
//! directory is in the history.
//!
//! On Linux the sweep reads the `/proc/<pid>/cwd` symlinks; processes whose
//! link cannot be read (other users' processes, kernel threads) are skipped.
//! On other platforms the sweep observes nothing and the daemon relies on
//! manual pushes alone.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::source::{UsageEvent, UsageSource};

/// Polls process working directories at a fixed interval.
pub struct CwdPoller {
    interval: Duration,
}

impl CwdPoller {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

#[async_trait]
impl UsageSource for CwdPoller {
    fn name(&self) -> &'static str {
        "cwd-poller"
    }

    async fn run(
        self: Box<Self>,
        events: mpsc::Sender<UsageEvent>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut prev: HashMap<u32, PathBuf> = HashMap::new();
        // first sweep after one full interval, not at startup
        let start = tokio::time::Instant::now() + self.interval;
        let mut tick = tokio::time::interval_at(start, self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tick.tick() => {
                    let sweep = scan_process_dirs();
                    debug!(processes = sweep.len(), "swept process working directories");
                    for event in changed_dirs(&prev, &sweep) {
                        if events.send(event).await.is_err() {
                            return Ok(());
                        }
                    }
                    // rebuilding from the sweep also drops exited pids
                    prev = sweep.into_iter().collect();
                }
            }
        }
    }
}

/// Events for every process whose directory differs from the previous sweep.
/// A process seen for the first time always counts as changed.
fn changed_dirs(prev: &HashMap<u32, PathBuf>, sweep: &[(u32, PathBuf)]) -> Vec<UsageEvent> {
    sweep
        .iter()
        .filter(|(pid, dir)| prev.get(pid) != Some(dir))
        .map(|(pid, dir)| UsageEvent {
            pid: Some(*pid),
            path: dir.clone(),
        })
        .collect()
}

/// The working directory of every process we can inspect.
#[cfg(target_os = "linux")]
fn scan_process_dirs() -> Vec<(u32, PathBuf)> {
    let entries = match std::fs::read_dir("/proc") {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut dirs = Vec::new();
    for entry in entries.flatten() {
        let pid = match entry.file_name().to_str().and_then(|name| name.parse().ok()) {
            Some(pid) => pid,
            None => continue,
        };
        let cwd = match std::fs::read_link(entry.path().join("cwd")) {
            Ok(cwd) => cwd,
            Err(_) => continue,
        };
        dirs.push((pid, cwd));
    }
    dirs
}

#[cfg(not(target_os = "linux"))]
fn scan_process_dirs() -> Vec<(u32, PathBuf)> {
    Vec::new()
}
