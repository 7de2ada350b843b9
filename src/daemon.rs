//! Daemon mode: event monitor, switch dispatcher and IPC server

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::engine::{HotkeyTable, KeyIntake, MatchEngine};
use crate::events::DaemonEvent;
use crate::hotkey::{system_tap, EventMonitor, MonitorError};
use crate::ipc::{DaemonStatus, EngineControl, Server};
use crate::lifecycle::ShutdownSignal;
use crate::switcher::{system_directory, SwitchDispatcher};

/// Run until SIGINT or SIGTERM
pub async fn run(config: Config) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "puck daemon starting");

    config.ensure_dirs().context("failed to create data directory")?;

    let table = match config.load_table() {
        Ok(table) => table,
        Err(e) => {
            warn!(error = %e, "starting with no hotkeys; fix the file and run `puck reload`");
            HotkeyTable::default()
        }
    };
    let hotkeys = table.len();
    if table.is_empty() {
        warn!(path = %config.hotkeys_path.display(), "no hotkeys configured, every key passes through");
    } else {
        info!(hotkeys, path = %config.hotkeys_path.display(), "hotkey table loaded");
    }

    let mut shutdown = ShutdownSignal::new().context("failed to register signal handlers")?;

    // Capture thread -> dispatcher
    let (switch_tx, switch_rx) = mpsc::unbounded_channel();
    // Everything -> IPC subscribers and the status snapshot
    let (event_tx, _) = broadcast::channel::<DaemonEvent>(64);
    let mut status_rx = event_tx.subscribe();

    let (intake, engine) = KeyIntake::new(MatchEngine::new(table), switch_tx, event_tx.clone());

    let mut monitor = EventMonitor::new();
    let engine = match monitor.start(system_tap(), intake) {
        Ok(()) => {
            let _ = event_tx.send(DaemonEvent::TapInstalled);
            Some(engine)
        }
        Err(MonitorError::PermissionDenied) => {
            error!("Accessibility permission missing; grant it in System Settings > Privacy & Security > Accessibility and restart");
            let _ = event_tx.send(DaemonEvent::PermissionDenied);
            None
        }
        Err(e) => {
            error!(error = %e, "failed to start event monitor");
            warn!("continuing without key interception");
            None
        }
    };
    let intercepting = engine.is_some();

    let dispatcher = SwitchDispatcher::new(system_directory(), event_tx.clone());

    let status = DaemonStatus {
        hotkeys,
        ..DaemonStatus::default()
    };
    let server = Server::new(
        &config.socket_path,
        event_tx.clone(),
        EngineControl::new(config.clone(), engine),
        status,
    )?;

    info!("daemon initialized, entering main loop");

    // Input source selection stays on this thread
    tokio::select! {
        _ = dispatcher.run(switch_rx), if intercepting => {
            warn!("switch dispatcher exited");
        }

        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        _ = record_events(&server, &mut status_rx) => {
            info!("event recorder exited");
        }

        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    info!("shutting down...");

    if monitor.is_running() {
        monitor.stop();
        let _ = event_tx.send(DaemonEvent::TapStopped);
    }
    server.shutdown().await;

    let status = server.status().await;
    info!(
        uptime_secs = status.uptime_secs,
        switches_ok = status.switches_ok,
        switches_failed = dispatcher.failures(),
        "puck daemon stopped"
    );

    Ok(())
}

/// Fold broadcast events into the server's status snapshot
async fn record_events(server: &Server, events: &mut broadcast::Receiver<DaemonEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                debug!(%event, "daemon event");
                server.record(&event).await;
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "status recorder lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
