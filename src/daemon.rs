//! # Daemon Assembly
//!
//! Wires the pieces into a running daemon: load config, bind the socket,
//! spawn the engine and its usage sources, then serve clients until a stop
//! request or a termination signal arrives. Shutdown is cooperative: one
//! cancellation token reaches every task, the engine flushes its history,
//! and the socket file is removed.

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::engine::{manual_source, spawn_engine, CwdPoller, UsageSource};
use crate::history::HistoryStore;
use crate::rpc;

/// Run the daemon until cancelled. Fails fast when the socket cannot be
/// bound, including when another daemon already owns it.
pub async fn run(config: Config, cancel: CancellationToken) -> Result<()> {
    let history_file = config.history_file()?;
    let socket_file = config.socket_file()?;

    let listener = rpc::bind_socket(&socket_file).await?;
    info!(socket = %socket_file.display(), "daemon listening");

    let store = HistoryStore::new(history_file);
    let (engine, engine_task) = spawn_engine(store, config.save_interval(), cancel.clone());

    let (manual, manual_src) = manual_source();
    let sources: Vec<Box<dyn UsageSource>> = vec![
        Box::new(CwdPoller::new(config.poll_interval())),
        Box::new(manual_src),
    ];
    let mut source_tasks = Vec::new();
    for source in sources {
        let name = source.name();
        let events = engine.event_sender();
        let cancel = cancel.clone();
        source_tasks.push(tokio::spawn(async move {
            if let Err(err) = source.run(events, cancel).await {
                warn!("usage source {name} stopped: {err:#}");
            }
        }));
    }

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if shutdown_signal().await.is_ok() {
            info!("shutdown signal received");
            signal_cancel.cancel();
        }
    });

    rpc::serve(listener, engine.clone(), manual, cancel).await;

    // serve only returns once cancelled; let the tasks wind down
    for task in source_tasks {
        let _ = task.await;
    }
    drop(engine);
    engine_task.await.context("Engine task panicked")?;

    if let Err(err) = std::fs::remove_file(&socket_file) {
        warn!("Failed to remove socket file: {err}");
    }
    info!("daemon stopped");
    Ok(())
}

/// Resolves when the process receives SIGINT or SIGTERM.
async fn shutdown_signal() -> Result<()> {
    let mut terminate =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("Failed to listen for ctrl-c")?,
        _ = terminate.recv() => {}
    }
    Ok(())
}
