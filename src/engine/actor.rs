//! # Engine Actor
//!
//! The engine is a single task that exclusively owns the history map and
//! the result-id table. Everything else talks to it through channels:
//! sources send [`UsageEvent`]s, clients send queries carrying a one-shot
//! reply sender, and a timer drives periodic saves. Because only this task
//! touches the state, there are no locks anywhere around it, and every
//! mutation happens in one serialized order.
//!
//! ## Lifecycle
//!
//! [`spawn_engine`] loads the history, spawns the task, and returns an
//! [`EngineHandle`] for producers. The task runs until the cancellation
//! token fires or every handle is gone, then flushes unsaved state and
//! exits.

use anyhow::{anyhow, Result};
use chrono::DateTime;
use std::path::Path;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::history::{DirUsage, HistoryMap, HistoryStore};

use super::query::{match_path, sort_group, Candidate, QueryMatch, ResultIdTable, QUERY_ALL};
use super::source::UsageEvent;

/// A query waiting for the engine, with its reply slot.
struct QueryRequest {
    pattern: String,
    reply: oneshot::Sender<Vec<QueryMatch>>,
}

/// Sends events and queries into a running engine. Cheap to clone.
#[derive(Clone)]
pub struct EngineHandle {
    events: mpsc::Sender<UsageEvent>,
    queries: mpsc::Sender<QueryRequest>,
}

impl EngineHandle {
    /// Sender half of the event channel, for wiring up usage sources.
    pub fn event_sender(&self) -> mpsc::Sender<UsageEvent> {
        self.events.clone()
    }

    /// Run a query and wait for the engine's answer.
    ///
    /// Exactly one reply arrives per query; the one-shot reply channel makes
    /// anything else unrepresentable.
    pub async fn query(&self, pattern: &str) -> Result<Vec<QueryMatch>> {
        let (reply, answer) = oneshot::channel();
        self.queries
            .send(QueryRequest {
                pattern: pattern.to_string(),
                reply,
            })
            .await
            .map_err(|_| anyhow!("Engine is not running"))?;
        answer.await.map_err(|_| anyhow!("Engine dropped the query"))
    }
}

/// Load the history and start the engine task.
pub fn spawn_engine(
    store: HistoryStore,
    save_interval: Duration,
    cancel: CancellationToken,
) -> (EngineHandle, JoinHandle<()>) {
    let (event_tx, event_rx) = mpsc::channel(64);
    let (query_tx, query_rx) = mpsc::channel(16);

    let history = store.load();
    info!(entries = history.len(), "loaded directory history");

    let engine = Engine {
        history,
        ids: ResultIdTable::default(),
        store,
        save_interval,
        dirty: false,
        events: event_rx,
        queries: query_rx,
    };
    let task = tokio::spawn(engine.run(cancel));

    (
        EngineHandle {
            events: event_tx,
            queries: query_tx,
        },
        task,
    )
}

struct Engine {
    history: HistoryMap,
    ids: ResultIdTable,
    store: HistoryStore,
    save_interval: Duration,
    /// Set on every mutation, cleared by a successful save.
    dirty: bool,
    events: mpsc::Receiver<UsageEvent>,
    queries: mpsc::Receiver<QueryRequest>,
}

impl Engine {
    async fn run(mut self, cancel: CancellationToken) {
        let mut save_tick = tokio::time::interval(self.save_interval);
        save_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = save_tick.tick() => self.save_if_dirty(),
                event = self.events.recv() => {
                    let Some(event) = event else { break };
                    self.record_usage(event);
                }
                request = self.queries.recv() => {
                    let Some(request) = request else { break };
                    let matches = self.handle_query(&request.pattern);
                    // the client may have given up waiting
                    let _ = request.reply.send(matches);
                }
            }
        }

        self.save_if_dirty();
        info!("engine stopped");
    }

    fn record_usage(&mut self, event: UsageEvent) {
        // the snapshot is JSON keyed by path strings; one key that cannot
        // convert would fail every save from here on
        if event.path.to_str().is_none() {
            warn!(path = %event.path.display(), "ignoring directory with non-UTF-8 path");
            return;
        }
        if !self.history.contains_key(&event.path) {
            info!(
                path = %event.path.display(),
                total = self.history.len() + 1,
                "recording new directory"
            );
        }
        let usage = DirUsage::now(event.path.clone());
        self.history.insert(event.path, usage);
        self.dirty = true;
    }

    fn save_if_dirty(&mut self) {
        if !self.dirty {
            return;
        }
        match self.store.save(&self.history) {
            Ok(()) => self.dirty = false,
            Err(err) => warn!("failed to save directory history: {err:#}"),
        }
    }

    fn handle_query(&mut self, pattern: &str) -> Vec<QueryMatch> {
        if pattern == QUERY_ALL {
            return self.list_all();
        }
        if let Ok(id) = pattern.parse::<i64>() {
            return self.resolve_id(id);
        }
        self.ranked_query(pattern)
    }

    /// Every live entry, sorted by path. Skips ranking and id assignment.
    fn list_all(&mut self) -> Vec<QueryMatch> {
        let entries: Vec<DirUsage> = self.history.values().cloned().collect();
        let mut live = Vec::new();
        for usage in entries {
            if self.remove_if_stale(&usage.path) {
                continue;
            }
            live.push(usage);
        }
        // byte order, not component order: "/a-b" sorts before "/a/c"
        live.sort_by(|a, b| a.path.as_os_str().cmp(b.path.as_os_str()));
        live.into_iter()
            .map(|usage| QueryMatch {
                id: 0,
                usage,
                offsets: Vec::new(),
            })
            .collect()
    }

    /// Resolve a numeric query against ids handed out by the last ranked
    /// query. The table is read, never rebuilt.
    fn resolve_id(&self, id: i64) -> Vec<QueryMatch> {
        let resolved = u32::try_from(id)
            .ok()
            .and_then(|id| self.ids.resolve(id).map(|path| (id, path.to_path_buf())));
        let Some((id, path)) = resolved else {
            return Vec::new();
        };

        // synthetic group prefixes resolve to an id but have no map entry
        let last_access = self
            .history
            .get(&path)
            .map_or(DateTime::UNIX_EPOCH, |usage| usage.last_access);
        vec![QueryMatch {
            id,
            usage: DirUsage { path, last_access },
            offsets: Vec::new(),
        }]
    }

    fn ranked_query(&mut self, pattern: &str) -> Vec<QueryMatch> {
        let mut matched = Vec::new();
        for usage in self.history.values() {
            let Some(path) = usage.path.to_str() else {
                continue;
            };
            if let Some(offsets) = match_path(pattern, path) {
                matched.push((usage.clone(), offsets));
            }
        }

        let mut live = Vec::new();
        for (usage, offsets) in matched {
            if self.remove_if_stale(&usage.path) {
                continue;
            }
            live.push(Candidate { usage, offsets });
        }

        let ranked = sort_group(live);
        self.ids.reset();
        ranked
            .into_iter()
            .map(|candidate| QueryMatch {
                id: self.ids.assign(&candidate.usage.path),
                usage: candidate.usage,
                offsets: candidate.offsets,
            })
            .collect()
    }

    /// Drop an entry whose directory no longer exists. Returns true when the
    /// entry was stale.
    fn remove_if_stale(&mut self, path: &Path) -> bool {
        if path.exists() {
            return false;
        }
        self.history.remove(path);
        self.dirty = true;
        debug!(path = %path.display(), "removed stale directory");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Spawned engine over a fresh store, with slow ticks so only the final
    /// flush writes unless a test says otherwise.
    fn start(
        temp: &TempDir,
        save_interval: Duration,
    ) -> (EngineHandle, JoinHandle<()>, CancellationToken) {
        let store = HistoryStore::new(temp.path().join("history.json"));
        let cancel = CancellationToken::new();
        let (handle, task) = spawn_engine(store, save_interval, cancel.clone());
        (handle, task, cancel)
    }

    async fn record(handle: &EngineHandle, path: &Path) {
        handle
            .event_sender()
            .send(UsageEvent::manual(path.to_path_buf()))
            .await
            .unwrap();
        // events and queries travel on different channels; give the engine
        // a moment to drain the event before querying
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    fn make_dirs(temp: &TempDir, names: &[&str]) -> Vec<PathBuf> {
        names
            .iter()
            .map(|name| {
                let dir = temp.path().join(name);
                fs::create_dir_all(&dir).unwrap();
                dir
            })
            .collect()
    }

    #[tokio::test]
    async fn test_recorded_directories_are_queryable() {
        let temp = TempDir::new().unwrap();
        let dirs = make_dirs(&temp, &["projects/alpha", "projects/beta"]);
        let (handle, _task, _cancel) = start(&temp, Duration::from_secs(3600));

        record(&handle, &dirs[0]).await;
        record(&handle, &dirs[1]).await;

        let matches = handle.query("alpha").await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].usage.path, dirs[0]);
        assert_eq!(matches[0].id, 1);
        assert!(!matches[0].offsets.is_empty());
    }

    #[tokio::test]
    async fn test_requery_returns_same_paths_and_ids() {
        let temp = TempDir::new().unwrap();
        let dirs = make_dirs(&temp, &["work/alpha", "work/beta"]);
        let (handle, _task, _cancel) = start(&temp, Duration::from_secs(3600));
        for dir in &dirs {
            record(&handle, dir).await;
        }

        let first = handle.query("work").await.unwrap();
        let second = handle.query("work").await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_numeric_query_resolves_last_ranked_ids() {
        let temp = TempDir::new().unwrap();
        let dirs = make_dirs(&temp, &["projects/alpha", "projects/beta"]);
        let (handle, _task, _cancel) = start(&temp, Duration::from_secs(3600));
        for dir in &dirs {
            record(&handle, dir).await;
        }

        let ranked = handle.query("alpha").await.unwrap();
        assert_eq!(ranked.len(), 1);
        let id = ranked[0].id.to_string();

        let resolved = handle.query(&id).await.unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].usage.path, ranked[0].usage.path);
        assert!(resolved[0].offsets.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_id_resolves_to_nothing() {
        let temp = TempDir::new().unwrap();
        let (handle, _task, _cancel) = start(&temp, Duration::from_secs(3600));

        assert!(handle.query("42").await.unwrap().is_empty());
        assert!(handle.query("-3").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wildcard_lists_everything_sorted() {
        let temp = TempDir::new().unwrap();
        let dirs = make_dirs(&temp, &["b-dir", "a-dir", "c-dir"]);
        let (handle, _task, _cancel) = start(&temp, Duration::from_secs(3600));
        for dir in &dirs {
            record(&handle, dir).await;
        }

        let all = handle.query(QUERY_ALL).await.unwrap();

        let paths: Vec<&PathBuf> = all.iter().map(|m| &m.usage.path).collect();
        let mut sorted = paths.clone();
        sorted.sort();
        assert_eq!(paths, sorted);
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|m| m.id == 0 && m.offsets.is_empty()));
    }

    #[tokio::test]
    async fn test_stale_entries_vanish_on_query() {
        let temp = TempDir::new().unwrap();
        let dirs = make_dirs(&temp, &["doomed", "alive"]);
        let (handle, _task, _cancel) = start(&temp, Duration::from_secs(3600));
        for dir in &dirs {
            record(&handle, dir).await;
        }

        fs::remove_dir(&dirs[0]).unwrap();

        assert!(handle.query("doomed").await.unwrap().is_empty());
        // removed from the map too, not just filtered from this response
        let all = handle.query(QUERY_ALL).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].usage.path, dirs[1]);
    }

    #[tokio::test]
    async fn test_cancel_flushes_history_to_disk() {
        let temp = TempDir::new().unwrap();
        let dirs = make_dirs(&temp, &["kept"]);
        let (handle, task, cancel) = start(&temp, Duration::from_secs(3600));
        record(&handle, &dirs[0]).await;

        cancel.cancel();
        task.await.unwrap();

        let reloaded = HistoryStore::new(temp.path().join("history.json")).load();
        assert!(reloaded.contains_key(&dirs[0]));
    }

    #[tokio::test]
    async fn test_save_tick_persists_updates() {
        let temp = TempDir::new().unwrap();
        let dirs = make_dirs(&temp, &["ticked"]);
        let (handle, _task, _cancel) = start(&temp, Duration::from_millis(25));
        record(&handle, &dirs[0]).await;

        tokio::time::sleep(Duration::from_millis(150)).await;

        let reloaded = HistoryStore::new(temp.path().join("history.json")).load();
        assert!(reloaded.contains_key(&dirs[0]));
    }

    #[tokio::test]
    async fn test_grouping_collapses_sibling_matches() {
        let temp = TempDir::new().unwrap();
        let dirs = make_dirs(&temp, &["proj/sub1", "proj/sub2", "proj/sub3"]);
        let (handle, _task, _cancel) = start(&temp, Duration::from_secs(3600));
        for dir in &dirs {
            record(&handle, dir).await;
        }

        let matches = handle.query("proj").await.unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].usage.path, temp.path().join("proj"));
    }

    #[tokio::test]
    #[cfg(target_os = "linux")]
    async fn test_non_utf8_path_never_enters_history() {
        use std::ffi::OsString;
        use std::os::unix::ffi::OsStringExt;

        let temp = TempDir::new().unwrap();
        let dirs = make_dirs(&temp, &["plain"]);
        // a real directory whose name is not valid UTF-8, as the /proc
        // poller can observe via read_link
        let undecodable = temp.path().join(OsString::from_vec(vec![b'w', 0xff, 0xfe]));
        fs::create_dir(&undecodable).unwrap();

        let (handle, task, cancel) = start(&temp, Duration::from_secs(3600));
        record(&handle, &undecodable).await;
        record(&handle, &dirs[0]).await;

        // the directory exists on disk, so this cannot be stale removal
        let all = handle.query(QUERY_ALL).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].usage.path, dirs[0]);

        cancel.cancel();
        task.await.unwrap();

        // the flush must not be poisoned; the valid entry persists
        let reloaded = HistoryStore::new(temp.path().join("history.json")).load();
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.contains_key(&dirs[0]));
    }
}
