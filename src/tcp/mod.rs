//! Multi-connection TCP client: registry, lifecycle, and data transfer.
//!
//! [`ConnectionManager`] is the single owner of the connection registry.
//! All registry mutations and the notifications describing them happen under
//! one lock, so subscribers observe state changes in the order they occurred.

mod client;
mod gateway;
pub mod registry;

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use crate::config::ConnectionConfig;
use crate::notify::Notifier;

pub use self::registry::{ConnectionId, ConnectionInfo, Registry};

/// Cloneable handle to the connection registry and its lifecycle operations.
#[derive(Clone)]
pub struct ConnectionManager {
    registry: Arc<Mutex<Registry>>,
    notifier: Notifier,
    settings: ConnectionConfig,
}

impl ConnectionManager {
    pub fn new(settings: ConnectionConfig, notifier: Notifier) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::new())),
            notifier,
            settings,
        }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Lock the registry so a check and a send happen atomically.
    pub(crate) async fn lock_registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().await
    }

    /// Number of open connections.
    pub async fn connection_count(&self) -> usize {
        self.registry.lock().await.len()
    }

    /// True iff at least one connection is open.
    pub async fn is_connected(&self) -> bool {
        self.registry.lock().await.is_connected()
    }

    /// Snapshot of open connections, oldest first.
    pub async fn connections(&self) -> Vec<ConnectionInfo> {
        self.registry.lock().await.iter().map(|c| c.info()).collect()
    }
}
