//! Outgoing data routing: single-target send and best-effort broadcast.

use bytes::Bytes;
use tracing::{debug, error, warn};

use super::registry::Registry;
use super::ConnectionManager;
use crate::encoding::Encoding;
use crate::error::ClientError;

impl ConnectionManager {
    /// Encode `message` and write it to connection `id`, or to every open
    /// connection when `id` is `None`.
    ///
    /// Every failure is also published as an `error` notification. Returns
    /// the number of connections the payload was queued on.
    pub async fn send(
        &self,
        message: &str,
        encoding: Encoding,
        id: Option<&str>,
    ) -> Result<usize, ClientError> {
        let registry = self.registry.lock().await;
        self.send_locked(&registry, message, encoding, id)
    }

    /// [`send`](Self::send) against a registry the caller already holds.
    pub(crate) fn send_locked(
        &self,
        registry: &Registry,
        message: &str,
        encoding: Encoding,
        id: Option<&str>,
    ) -> Result<usize, ClientError> {
        if !registry.is_connected() {
            let err = ClientError::NotConnected;
            let msg = format!("Cannot send data: {}", err);
            error!("{}", msg);
            self.notifier.error(msg, None);
            return Err(err);
        }

        let payload = match encoding.encode(message) {
            Ok(bytes) => Bytes::from(bytes),
            Err(err) => {
                let msg = format!("Error sending data: {}", err);
                error!("{}", msg);
                self.notifier.error(msg, None);
                return Err(err);
            }
        };

        match id {
            Some(id) => {
                let Some(connection) = registry.get(id) else {
                    let err = ClientError::UnknownConnection(id.to_string());
                    let msg = format!("Cannot send data: {}", err);
                    error!(connection_id = %id, "{}", msg);
                    self.notifier.error(msg, Some(id));
                    return Err(err);
                };
                if connection.queue(payload.clone()) {
                    debug!(connection_id = %id, %encoding, bytes = payload.len(), "sent data");
                    Ok(1)
                } else {
                    warn!(connection_id = %id, "connection writer already stopped, payload dropped");
                    Ok(0)
                }
            }
            None => {
                let mut delivered = 0;
                for connection in registry.iter() {
                    if connection.queue(payload.clone()) {
                        delivered += 1;
                        debug!(connection_id = %connection.id, %encoding, bytes = payload.len(), "sent data");
                    } else {
                        warn!(connection_id = %connection.id, "connection writer already stopped, skipping");
                    }
                }
                Ok(delivered)
            }
        }
    }
}
