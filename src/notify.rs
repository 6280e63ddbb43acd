//! Outbound notification channel (core -> presentation layer).
//!
//! Every state transition in the connection manager and load generator is
//! published exactly once as a [`Notification`] on a broadcast channel.
//! Consumers (the SSE feed, the CLI printer, tests) subscribe and drain it.

use bytes::Bytes;
use serde::{Serialize, Serializer};
use tokio::sync::broadcast;
use tracing::trace;

use crate::encoding::Encoding;
use crate::loadtest::LoadTestConfig;

/// Default capacity of the notification channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum Notification {
    #[serde(rename = "connected")]
    Connected { count: usize },

    #[serde(rename = "disconnected")]
    Disconnected { count: usize },

    /// Bytes received from a server, untouched. `encoding` is the display
    /// hint the payload is rendered with when serialized.
    #[serde(rename = "data", rename_all = "camelCase")]
    Data {
        #[serde(serialize_with = "serialize_latin1")]
        payload: Bytes,
        encoding: Encoding,
        connection_id: String,
    },

    #[serde(rename = "error", rename_all = "camelCase")]
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        connection_id: Option<String>,
    },

    #[serde(rename = "loadtest.started")]
    LoadTestStarted { config: LoadTestConfig },

    #[serde(rename = "loadtest.stopped")]
    LoadTestStopped,

    #[serde(rename = "loadtest.message-sent")]
    LoadTestMessageSent { payload: String },
}

impl Notification {
    /// Event name as seen by subscribers.
    pub fn name(&self) -> &'static str {
        match self {
            Notification::Connected { .. } => "connected",
            Notification::Disconnected { .. } => "disconnected",
            Notification::Data { .. } => "data",
            Notification::Error { .. } => "error",
            Notification::LoadTestStarted { .. } => "loadtest.started",
            Notification::LoadTestStopped => "loadtest.stopped",
            Notification::LoadTestMessageSent { .. } => "loadtest.message-sent",
        }
    }
}

// Inbound payloads travel as a one-char-per-byte string so that no byte is
// lost in JSON; the presentation layer re-renders with its chosen encoding.
fn serialize_latin1<S: Serializer>(payload: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&Encoding::Latin1.decode(payload))
}

/// Cloneable publishing handle for [`Notification`]s.
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Publish a notification. Having no subscribers is not an error.
    pub fn emit(&self, notification: Notification) {
        trace!(event = notification.name(), "notify");
        let _ = self.tx.send(notification);
    }

    pub fn error(&self, message: impl Into<String>, connection_id: Option<&str>) {
        self.emit(Notification::Error {
            message: message.into(),
            connection_id: connection_id.map(str::to_string),
        });
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_shapes() {
        let v = serde_json::to_value(Notification::Connected { count: 2 }).unwrap();
        assert_eq!(v, json!({ "event": "connected", "count": 2 }));

        let v = serde_json::to_value(Notification::Error {
            message: "boom".into(),
            connection_id: None,
        })
        .unwrap();
        assert_eq!(v, json!({ "event": "error", "message": "boom" }));

        let v = serde_json::to_value(Notification::Data {
            payload: Bytes::from_static(&[0x68, 0xff]),
            encoding: Encoding::Latin1,
            connection_id: "client-3".into(),
        })
        .unwrap();
        assert_eq!(
            v,
            json!({ "event": "data", "payload": "h\u{ff}", "encoding": "binary", "connectionId": "client-3" })
        );

        let v = serde_json::to_value(Notification::LoadTestStopped).unwrap();
        assert_eq!(v, json!({ "event": "loadtest.stopped" }));
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_harmless() {
        let notifier = Notifier::new(4);
        notifier.error("nobody listening", None);

        let mut rx = notifier.subscribe();
        notifier.emit(Notification::Disconnected { count: 0 });
        assert_eq!(rx.recv().await.unwrap(), Notification::Disconnected { count: 0 });
    }
}
