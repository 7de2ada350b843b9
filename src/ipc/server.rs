//! Unix domain socket server for IPC
//!
//! Provides request-response communication for status and reload, and
//! push notifications of daemon events to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::engine::EngineHandle;
use crate::events::DaemonEvent;

use super::protocol::{read_message, write_message, DaemonStatus, IpcError, Notification, Request, Response};

/// Reaches the engine on the capture thread on behalf of IPC clients
pub struct EngineControl {
    config: Config,
    engine: Option<EngineHandle>,
}

impl EngineControl {
    pub fn new(config: Config, engine: Option<EngineHandle>) -> Self {
        Self { config, engine }
    }

    fn engine(&self) -> Result<&EngineHandle> {
        self.engine.as_ref().context("key interception is not running")
    }

    /// Re-read the hotkey file; returns the number of hotkeys in the new table
    fn reload(&self) -> Result<usize> {
        let engine = self.engine()?;
        let table = self.config.load_table()?;
        let hotkeys = table.len();
        engine.reload(table)?;
        info!(hotkeys, path = %self.config.hotkeys_path.display(), "hotkey file reloaded via IPC");
        Ok(hotkeys)
    }

    fn reset(&self) -> Result<()> {
        self.engine()?.clear()?;
        info!("cycle and debounce state reset via IPC");
        Ok(())
    }
}

fn error_response(code: &str, error: anyhow::Error) -> Response {
    warn!(code, error = %error, "request failed");
    Response::Error {
        code: code.to_string(),
        message: format!("{error:#}"),
    }
}

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    state: Arc<RwLock<ServerState>>,
    shutdown_tx: broadcast::Sender<()>,
    events: broadcast::Sender<DaemonEvent>,
    control: Arc<EngineControl>,
}

/// Shared server state
struct ServerState {
    status: DaemonStatus,
    start_time: Instant,
}

impl ServerState {
    fn snapshot(&self) -> DaemonStatus {
        let mut status = self.status.clone();
        status.uptime_secs = self.start_time.elapsed().as_secs();
        status
    }
}

impl Server {
    /// Create a new IPC server
    pub fn new(
        socket_path: &Path,
        events: broadcast::Sender<DaemonEvent>,
        control: EngineControl,
        status: DaemonStatus,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        let state = Arc::new(RwLock::new(ServerState {
            status,
            start_time: Instant::now(),
        }));

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            state,
            shutdown_tx,
            events,
            control: Arc::new(control),
        })
    }

    /// Fold a daemon event into the status snapshot
    pub async fn record(&self, event: &DaemonEvent) {
        self.state.write().await.status.record(event);
    }

    /// Current status snapshot
    pub async fn status(&self) -> DaemonStatus {
        self.state.read().await.snapshot()
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let state = Arc::clone(&self.state);
                    let events = self.events.clone();
                    let control = Arc::clone(&self.control);
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, state, events, control) => {
                                if let Err(e) = result {
                                    warn!(error = %e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(
        mut stream: UnixStream,
        state: Arc<RwLock<ServerState>>,
        events: broadcast::Sender<DaemonEvent>,
        control: Arc<EngineControl>,
    ) -> Result<(), IpcError> {
        loop {
            let request: Request = match read_message(&mut stream).await {
                Ok(request) => request,
                Err(IpcError::Closed) => {
                    debug!("client disconnected");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            debug!(?request, "received request");

            if request == Request::Subscribe {
                // subscribe before confirming so no event slips between the two
                let rx = events.subscribe();
                write_message(&mut stream, &Response::Subscribed).await?;
                debug!("client subscribed to notifications");
                return Self::stream_events(stream, rx).await;
            }

            let response = Self::process_request(request, &state, &control).await;
            write_message(&mut stream, &response).await?;
        }
    }

    /// Forward daemon events to a subscribed client until it goes away
    async fn stream_events(
        mut stream: UnixStream,
        mut rx: broadcast::Receiver<DaemonEvent>,
    ) -> Result<(), IpcError> {
        loop {
            let notification = match rx.recv().await {
                Ok(event) => Notification::Event(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscriber lagged");
                    Notification::Lagged { skipped }
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            };

            if let Err(e) = write_message(&mut stream, &notification).await {
                debug!(error = %e, "subscriber went away");
                return Ok(());
            }
        }
    }

    /// Process a request and return a response
    async fn process_request(
        request: Request,
        state: &Arc<RwLock<ServerState>>,
        control: &EngineControl,
    ) -> Response {
        match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => Response::Status(state.read().await.snapshot()),

            Request::Reload => match control.reload() {
                Ok(hotkeys) => Response::Reloaded { hotkeys },
                Err(e) => error_response("reload_failed", e),
            },

            Request::Reset => match control.reset() {
                Ok(()) => Response::ResetDone,
                Err(e) => error_response("reset_failed", e),
            },

            Request::Subscribe => Response::Subscribed,
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::Client;

    fn temp_socket(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("puck-{}-{}.sock", name, std::process::id()))
    }

    fn control_without_engine() -> EngineControl {
        let config = Config {
            home: PathBuf::from("/nonexistent"),
            hotkeys_path: PathBuf::from("/nonexistent/puckrc"),
            socket_path: PathBuf::from("/unused"),
            log_path: PathBuf::from("/unused"),
            data_dir: PathBuf::from("/unused"),
        };
        EngineControl::new(config, None)
    }

    #[tokio::test]
    async fn test_ping_and_status() {
        let path = temp_socket("status");
        let (events, _) = broadcast::channel(8);
        let status = DaemonStatus {
            hotkeys: 3,
            ..DaemonStatus::default()
        };
        let server = Arc::new(Server::new(&path, events, control_without_engine(), status).unwrap());

        let running = Arc::clone(&server);
        let task = tokio::spawn(async move { running.run().await });

        let mut client = Client::connect(&path).await.unwrap();
        assert_eq!(client.request(&Request::Ping).await.unwrap(), Response::Pong);
        match client.request(&Request::GetStatus).await.unwrap() {
            Response::Status(status) => {
                assert_eq!(status.hotkeys, 3);
                assert!(!status.tap_active);
            }
            other => panic!("unexpected response {other:?}"),
        }

        server.shutdown().await;
        task.abort();
    }

    #[tokio::test]
    async fn test_engine_requests_fail_without_tap() {
        let path = temp_socket("reload");
        let (events, _) = broadcast::channel(8);
        let server = Arc::new(Server::new(&path, events, control_without_engine(), DaemonStatus::default()).unwrap());

        let running = Arc::clone(&server);
        let task = tokio::spawn(async move { running.run().await });

        let mut client = Client::connect(&path).await.unwrap();
        let response = client.request(&Request::Reload).await.unwrap();
        assert!(matches!(response, Response::Error { ref code, .. } if code == "reload_failed"));
        let response = client.request(&Request::Reset).await.unwrap();
        assert!(matches!(response, Response::Error { ref code, .. } if code == "reset_failed"));

        server.shutdown().await;
        task.abort();
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let path = temp_socket("subscribe");
        let (events, _) = broadcast::channel(8);
        let server = Arc::new(
            Server::new(&path, events.clone(), control_without_engine(), DaemonStatus::default()).unwrap(),
        );

        let running = Arc::clone(&server);
        let task = tokio::spawn(async move { running.run().await });

        let mut client = Client::connect(&path).await.unwrap();
        assert_eq!(client.request(&Request::Subscribe).await.unwrap(), Response::Subscribed);

        events.send(DaemonEvent::TapInstalled).unwrap();
        let note = client.next_notification().await.unwrap();
        assert_eq!(note, Notification::Event(DaemonEvent::TapInstalled));

        server.shutdown().await;
        task.abort();
    }

    #[tokio::test]
    async fn test_record_updates_status() {
        let path = temp_socket("record");
        let (events, _) = broadcast::channel(8);
        let server = Server::new(&path, events, control_without_engine(), DaemonStatus::default()).unwrap();

        server.record(&DaemonEvent::TapInstalled).await;
        server.record(&DaemonEvent::ConfigReloaded { hotkeys: 5 }).await;

        let status = server.status().await;
        assert!(status.tap_active);
        assert_eq!(status.hotkeys, 5);

        server.shutdown().await;
    }
}
