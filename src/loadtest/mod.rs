//! Synthetic load generation: random payloads broadcast on a timer.

mod generator;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::encoding::Encoding;
use crate::error::ClientError;

pub use self::generator::{LoadGenerator, LoadTestStatus};

/// The 62 ASCII alphanumerics.
pub const DEFAULT_CHARSET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Largest payload a single tick may generate (16 MiB of characters).
pub const MAX_RANDOM_LENGTH: usize = 16 * 1024 * 1024;

/// Longest accepted tick interval (24 hours).
pub const MAX_INTERVAL_MS: u64 = 24 * 60 * 60 * 1000;

/// Parameters of one load-test run. Copied when a run starts; a running
/// test never observes later changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadTestConfig {
    /// Milliseconds between messages.
    #[serde(rename = "interval", alias = "interval_ms")]
    pub interval_ms: u64,
    /// Characters per generated message.
    #[serde(rename = "randomLength", alias = "random_length")]
    pub random_length: usize,
    /// Characters sampled from, uniformly and with replacement.
    pub charset: String,
    pub encoding: Encoding,
}

impl Default for LoadTestConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            random_length: 100,
            charset: DEFAULT_CHARSET.to_string(),
            encoding: Encoding::Utf8,
        }
    }
}

impl LoadTestConfig {
    /// Minimum checks the generator needs to run without misbehaving.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.interval_ms == 0 {
            return Err(ClientError::ConfigValidation(
                "interval must be at least 1ms".to_string(),
            ));
        }
        if self.interval_ms > MAX_INTERVAL_MS {
            return Err(ClientError::ConfigValidation(format!(
                "interval must be at most {}ms",
                MAX_INTERVAL_MS
            )));
        }
        if self.random_length == 0 {
            return Err(ClientError::ConfigValidation(
                "randomLength must be at least 1".to_string(),
            ));
        }
        if self.random_length > MAX_RANDOM_LENGTH {
            return Err(ClientError::ConfigValidation(format!(
                "randomLength must be at most {}",
                MAX_RANDOM_LENGTH
            )));
        }
        if self.charset.is_empty() {
            return Err(ClientError::ConfigValidation(
                "charset must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Build a string of `length` characters drawn uniformly from `charset`.
///
/// An empty charset yields an empty string.
pub fn random_payload<R: Rng + ?Sized>(rng: &mut R, length: usize, charset: &[char]) -> String {
    if charset.is_empty() {
        return String::new();
    }
    (0..length)
        .filter_map(|_| charset.choose(&mut *rng).copied())
        .collect()
}
