//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::events::DaemonEvent;

/// Largest accepted message body
pub const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Requests from a client to the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current daemon status
    GetStatus,

    /// Re-read the hotkey file and reset cycle/debounce state
    Reload,

    /// Forget cycle positions and debounce timestamps
    Reset,

    /// Ping to check connectivity
    Ping,

    /// Turn this connection into a stream of event notifications
    Subscribe,
}

/// Responses from daemon to client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(DaemonStatus),

    /// Hotkey file re-read
    Reloaded { hotkeys: usize },

    /// Cycle and debounce state cleared
    ResetDone,

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

/// Push notification to subscribed clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    Event(DaemonEvent),
    /// The subscriber fell behind and missed `skipped` events
    Lagged { skipped: u64 },
}

/// Outcome of the most recent switch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastSwitch {
    pub hotkey: String,
    pub target: String,
    pub ok: bool,
}

/// Full daemon status snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Whether key interception is installed
    pub tap_active: bool,

    /// Whether the Accessibility permission was missing at startup
    pub permission_denied: bool,

    /// Number of configured hotkeys
    pub hotkeys: usize,

    /// Uptime in seconds
    pub uptime_secs: u64,

    pub switches_ok: u64,

    pub switches_failed: u64,

    pub last_switch: Option<LastSwitch>,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            tap_active: false,
            permission_denied: false,
            hotkeys: 0,
            uptime_secs: 0,
            switches_ok: 0,
            switches_failed: 0,
            last_switch: None,
        }
    }
}

impl DaemonStatus {
    /// Fold one daemon event into the snapshot
    pub fn record(&mut self, event: &DaemonEvent) {
        match event {
            DaemonEvent::TapInstalled => {
                self.tap_active = true;
                self.permission_denied = false;
            }
            DaemonEvent::TapStopped => self.tap_active = false,
            DaemonEvent::PermissionDenied => {
                self.tap_active = false;
                self.permission_denied = true;
            }
            DaemonEvent::ConfigReloaded { hotkeys } => self.hotkeys = *hotkeys,
            DaemonEvent::SwitchSucceeded { hotkey, target } => {
                self.switches_ok += 1;
                self.last_switch = Some(LastSwitch {
                    hotkey: hotkey.clone(),
                    target: target.clone(),
                    ok: true,
                });
            }
            DaemonEvent::SwitchFailed { hotkey, target, .. } => {
                self.switches_failed += 1;
                self.last_switch = Some(LastSwitch {
                    hotkey: hotkey.clone(),
                    target: target.clone(),
                    ok: false,
                });
            }
            DaemonEvent::TapReenabled { .. } | DaemonEvent::CycleAdvanced { .. } => {}
        }
    }
}

/// Errors on the IPC wire
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message of {0} bytes exceeds the limit")]
    TooLarge(usize),

    #[error("connection closed")]
    Closed,
}

/// Send a length-prefixed JSON message
pub async fn write_message<W, T>(stream: &mut W, msg: &T) -> Result<(), IpcError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    stream.write_all(&msg_len).await?;
    stream.write_all(&msg_bytes).await?;
    stream.flush().await?;

    Ok(())
}

/// Read a length-prefixed JSON message
pub async fn read_message<R, T>(stream: &mut R) -> Result<T, IpcError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(IpcError::Closed),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        return Err(IpcError::TooLarge(len));
    }

    let mut msg_buf = vec![0u8; len];
    stream.read_exact(&mut msg_buf).await?;
    Ok(serde_json::from_slice(&msg_buf)?)
}
