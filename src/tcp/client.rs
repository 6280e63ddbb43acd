//! Connection lifecycle: connect, disconnect, and socket event relay.

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::registry::{Connection, ConnectionId};
use super::ConnectionManager;
use crate::encoding::Encoding;
use crate::error::ClientError;
use crate::notify::Notification;

impl ConnectionManager {
    /// Open a TCP connection to `host:port` and register it.
    ///
    /// Suspends until the handshake completes or `connect_timeout_ms`
    /// elapses. On success emits `connected(count)` and returns the new id.
    /// On failure emits an `error` tagged with the id reserved for this
    /// attempt and returns [`ClientError::Transport`].
    pub async fn connect(&self, host: &str, port: u16) -> Result<ConnectionId, ClientError> {
        let reserved = self.registry.lock().await.reserve_id();
        let id = reserved.id.clone();
        info!(connection_id = %id, %host, port, "connecting to TCP server");

        let timeout = self.settings.connect_timeout();
        let stream = match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(self.connect_failed(&id, host, port, e.to_string())),
            Err(_) => {
                let reason = format!("connection timed out after {}ms", timeout.as_millis());
                return Err(self.connect_failed(&id, host, port, reason));
            }
        };

        if self.settings.nodelay {
            if let Err(e) = stream.set_nodelay(true) {
                warn!(connection_id = %id, error = %e, "failed to set TCP_NODELAY");
            }
        }

        let (read_half, write_half) = stream.into_split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        // Hold the registry while the tasks start so that an immediate EOF
        // cannot be processed before the connection is registered.
        let mut registry = self.registry.lock().await;
        let reader = tokio::spawn(read_loop(
            self.clone(),
            id.clone(),
            read_half,
            self.settings.read_buffer_size.max(1),
        ));
        let writer = tokio::spawn(write_loop(self.clone(), id.clone(), write_half, outbound_rx));
        registry.insert(Connection::new(reserved, host, port, outbound_tx, reader, writer));

        let count = registry.len();
        info!(connection_id = %id, %host, port, count, "connected to TCP server");
        self.notifier.emit(Notification::Connected { count });

        Ok(id)
    }

    fn connect_failed(&self, id: &ConnectionId, host: &str, port: u16, reason: String) -> ClientError {
        error!(connection_id = %id, %host, port, error = %reason, "TCP connect failed");
        self.notifier.error(reason.clone(), Some(id.as_str()));
        ClientError::Transport {
            host: host.to_string(),
            port,
            reason,
        }
    }

    /// Close one connection, or all of them when `id` is `None`.
    ///
    /// Closing an unknown id is a silent no-op and returns `false`.
    /// Closing all connections emits exactly one `disconnected(0)`, however
    /// many were open. Returns true if at least one connection was closed.
    pub async fn disconnect(&self, id: Option<&str>) -> bool {
        let mut registry = self.registry.lock().await;

        match id {
            Some(id) => match registry.remove(id) {
                Some(connection) => {
                    drop(connection);
                    let count = registry.len();
                    info!(connection_id = %id, count, "disconnected from TCP server");
                    self.notifier.emit(Notification::Disconnected { count });
                    true
                }
                None => {
                    debug!(connection_id = %id, "disconnect requested for unknown connection, ignoring");
                    false
                }
            },
            None => {
                let connections = registry.drain();
                let closed = connections.len();
                // Detach every reader before any socket goes away, so no
                // per-connection close is reported for this batch.
                for connection in &connections {
                    connection.detach();
                }
                drop(connections);
                info!(closed, "disconnected from all TCP servers");
                self.notifier.emit(Notification::Disconnected { count: 0 });
                closed > 0
            }
        }
    }

    /// Relay inbound bytes if the connection is still registered.
    async fn relay(&self, id: &ConnectionId, payload: Bytes) {
        let registry = self.registry.lock().await;
        if registry.contains(id.as_str()) {
            debug!(connection_id = %id, bytes = payload.len(), "received data");
            self.notifier.emit(Notification::Data {
                payload,
                encoding: Encoding::Latin1,
                connection_id: id.to_string(),
            });
        }
    }

    /// The peer closed the connection.
    async fn closed_by_peer(&self, id: &ConnectionId) {
        let mut registry = self.registry.lock().await;
        if let Some(connection) = registry.remove(id.as_str()) {
            let count = registry.len();
            info!(connection_id = %id, count, "connection closed by peer");
            self.notifier.emit(Notification::Disconnected { count });
            drop(connection);
        }
    }

    /// A read or write on the socket failed.
    async fn socket_failed(&self, id: &ConnectionId, reason: String) {
        let mut registry = self.registry.lock().await;
        if let Some(connection) = registry.remove(id.as_str()) {
            error!(connection_id = %id, error = %reason, count = registry.len(), "TCP client error");
            self.notifier.error(reason, Some(id.as_str()));
            drop(connection);
        }
    }
}

// Removing a connection aborts these tasks, possibly from inside the task
// itself; neither loop awaits again after reporting its own removal.

async fn read_loop(
    manager: ConnectionManager,
    id: ConnectionId,
    mut read_half: OwnedReadHalf,
    buffer_size: usize,
) {
    let mut buf = vec![0u8; buffer_size];
    loop {
        match read_half.read(&mut buf).await {
            Ok(0) => {
                manager.closed_by_peer(&id).await;
                return;
            }
            Ok(n) => {
                manager.relay(&id, Bytes::copy_from_slice(&buf[..n])).await;
            }
            Err(e) => {
                manager.socket_failed(&id, e.to_string()).await;
                return;
            }
        }
    }
}

async fn write_loop(
    manager: ConnectionManager,
    id: ConnectionId,
    mut write_half: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Bytes>,
) {
    while let Some(chunk) = outbound.recv().await {
        if let Err(e) = write_half.write_all(&chunk).await {
            manager.socket_failed(&id, e.to_string()).await;
            return;
        }
        debug!(connection_id = %id, bytes = chunk.len(), "wrote data");
    }
    let _ = write_half.shutdown().await;
}
