//! Connection registry: id -> live connection, plus the id counter.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Identifier of a tracked connection, e.g. `client-7`.
///
/// Ids come from a monotonically increasing counter and are never reused
/// within a process, so a notification naming an id is never ambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    fn from_seq(seq: u64) -> Self {
        Self(format!("client-{}", seq))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ConnectionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Serializable snapshot of a connection.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub host: String,
    pub port: u16,
    pub connected_at: DateTime<Utc>,
}

/// A live TCP connection owned by the [`Registry`].
///
/// Outgoing bytes are queued to the writer task; the reader task relays
/// inbound bytes. Dropping the connection aborts both tasks, which drops
/// both socket halves and closes the socket.
///
/// The outbound queue is unbounded, like a stream's userland write buffer:
/// a peer that stops reading makes it grow until the connection is closed.
pub struct Connection {
    seq: u64,
    pub id: ConnectionId,
    pub host: String,
    pub port: u16,
    pub connected_at: DateTime<Utc>,
    outbound: mpsc::UnboundedSender<Bytes>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Connection {
    pub(crate) fn new(
        reserved: ReservedId,
        host: &str,
        port: u16,
        outbound: mpsc::UnboundedSender<Bytes>,
        reader: JoinHandle<()>,
        writer: JoinHandle<()>,
    ) -> Self {
        Self {
            seq: reserved.seq,
            id: reserved.id,
            host: host.to_string(),
            port,
            connected_at: Utc::now(),
            outbound,
            reader,
            writer,
        }
    }

    /// Queue bytes for the writer task. Returns false if the writer is gone.
    pub fn queue(&self, bytes: Bytes) -> bool {
        self.outbound.send(bytes).is_ok()
    }

    /// Stop relaying socket events for this connection.
    pub fn detach(&self) {
        self.reader.abort();
    }

    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id.clone(),
            host: self.host.clone(),
            port: self.port,
            connected_at: self.connected_at,
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// An id handed out for a connect attempt that has not completed yet.
#[derive(Debug, Clone)]
pub struct ReservedId {
    seq: u64,
    pub id: ConnectionId,
}

/// Mapping of connection id to live connection.
///
/// Invariant: `len() == 0` iff `!is_connected()`.
pub struct Registry {
    connections: HashMap<ConnectionId, Connection>,
    next_seq: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
            next_seq: 1,
        }
    }

    /// Reserve the next id. Reserved ids are consumed even if the connect
    /// attempt fails.
    pub fn reserve_id(&mut self) -> ReservedId {
        let seq = self.next_seq;
        self.next_seq += 1;
        ReservedId {
            seq,
            id: ConnectionId::from_seq(seq),
        }
    }

    pub fn insert(&mut self, connection: Connection) {
        self.connections.insert(connection.id.clone(), connection);
    }

    pub fn remove(&mut self, id: &str) -> Option<Connection> {
        self.connections.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&Connection> {
        self.connections.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.connections.contains_key(id)
    }

    /// Remove every connection, returned oldest first.
    pub fn drain(&mut self) -> Vec<Connection> {
        let mut all: Vec<Connection> = self.connections.drain().map(|(_, c)| c).collect();
        all.sort_by_key(|c| c.seq);
        all
    }

    /// Connections in the order they were opened.
    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        let mut all: Vec<&Connection> = self.connections.values().collect();
        all.sort_by_key(|c| c.seq);
        all.into_iter()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Aggregate predicate: at least one connection is open.
    pub fn is_connected(&self) -> bool {
        !self.connections.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
