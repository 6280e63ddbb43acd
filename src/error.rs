//! Error taxonomy for the connection manager and load generator.

use thiserror::Error;

use crate::encoding::Encoding;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {host}:{port}: {reason}")]
    Transport {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("not connected to any server")]
    NotConnected,

    #[error("connection {0} not found")]
    UnknownConnection(String),

    #[error("invalid load test configuration: {0}")]
    ConfigValidation(String),

    #[error("cannot encode payload as {encoding}: {reason}")]
    Encoding { encoding: Encoding, reason: String },
}

impl ClientError {
    /// Short machine-readable code used by the control API.
    pub fn code(&self) -> &'static str {
        match self {
            ClientError::Transport { .. } => "transport_error",
            ClientError::NotConnected => "not_connected",
            ClientError::UnknownConnection(_) => "unknown_connection",
            ClientError::ConfigValidation(_) => "config_validation",
            ClientError::Encoding { .. } => "encoding_error",
        }
    }
}
