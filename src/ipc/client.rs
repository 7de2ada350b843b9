//! IPC client for talking to a running daemon

use std::path::Path;

use tokio::net::UnixStream;

use super::protocol::{read_message, write_message, IpcError, Notification, Request, Response};

/// A connection to the daemon socket
pub struct Client {
    stream: UnixStream,
}

impl Client {
    /// Connect to the daemon listening on `socket_path`
    pub async fn connect(socket_path: &Path) -> Result<Self, IpcError> {
        let stream = UnixStream::connect(socket_path).await?;
        Ok(Self { stream })
    }

    /// Send a request and wait for its response
    pub async fn request(&mut self, request: &Request) -> Result<Response, IpcError> {
        write_message(&mut self.stream, request).await?;
        read_message(&mut self.stream).await
    }

    /// Next pushed notification after a successful subscribe
    pub async fn next_notification(&mut self) -> Result<Notification, IpcError> {
        read_message(&mut self.stream).await
    }
}
