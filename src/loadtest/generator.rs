//! Timer-driven load generator bound to connection liveness.
//!
//! States are `IDLE` and `RUNNING`. A run starts only through
//! [`LoadGenerator::start`], and ends on [`LoadGenerator::stop`], on a
//! superseding start, or on the first tick that finds no open connection.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::{random_payload, LoadTestConfig};
use crate::error::ClientError;
use crate::notify::Notification;
use crate::tcp::ConnectionManager;

struct LoadTestState {
    active: bool,
    timer: Option<JoinHandle<()>>,
    config: LoadTestConfig,
    charset: Vec<char>,
    /// Bumped on every successful start; a tick from an older run is stale.
    generation: u64,
    messages_sent: u64,
    started_at: Option<DateTime<Utc>>,
}

/// Snapshot returned by [`LoadGenerator::status`].
#[derive(Debug, Clone, Serialize)]
pub struct LoadTestStatus {
    pub active: bool,
    pub config: LoadTestConfig,
    pub messages_sent: u64,
    pub started_at: Option<DateTime<Utc>>,
}

/// Cloneable handle to the process-wide load generator.
#[derive(Clone)]
pub struct LoadGenerator {
    state: Arc<Mutex<LoadTestState>>,
    manager: ConnectionManager,
    defaults: LoadTestConfig,
}

impl LoadGenerator {
    pub fn new(manager: ConnectionManager, defaults: LoadTestConfig) -> Self {
        let state = LoadTestState {
            active: false,
            timer: None,
            config: defaults.clone(),
            charset: Vec::new(),
            generation: 0,
            messages_sent: 0,
            started_at: None,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            manager,
            defaults,
        }
    }

    /// Start a run with `config`, stopping any run already in progress.
    ///
    /// Refuses to start (and emits `error`) if the config is degenerate or
    /// no connection is open; the generator then stays idle.
    pub async fn start(&self, config: LoadTestConfig) -> Result<(), ClientError> {
        let mut state = self.state.lock().await;
        state.config = config.clone();

        if state.active {
            self.stop_locked(&mut state);
        }

        if let Err(e) = config.validate() {
            let msg = format!("Cannot start load test: {}", e);
            error!("{}", msg);
            self.manager.notifier().error(msg, None);
            return Err(e);
        }

        if !self.manager.is_connected().await {
            let msg = "Cannot start load test: Not connected to server";
            error!("{}", msg);
            self.manager.notifier().error(msg, None);
            return Err(ClientError::NotConnected);
        }

        state.generation += 1;
        state.active = true;
        state.charset = config.charset.chars().collect();
        state.messages_sent = 0;
        state.started_at = Some(Utc::now());
        self.manager
            .notifier()
            .emit(Notification::LoadTestStarted { config: config.clone() });

        let period = Duration::from_millis(config.interval_ms);
        state.timer = Some(tokio::spawn(self.clone().run(state.generation, period)));

        info!(
            interval_ms = config.interval_ms,
            random_length = config.random_length,
            encoding = %config.encoding,
            "load test started"
        );
        Ok(())
    }

    /// Stop the current run. Returns false (and does nothing) when idle.
    pub async fn stop(&self) -> bool {
        let mut state = self.state.lock().await;
        if !state.active {
            debug!("load test stop requested while idle");
            return false;
        }
        self.stop_locked(&mut state);
        true
    }

    fn stop_locked(&self, state: &mut LoadTestState) {
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.active = false;
        self.manager.notifier().emit(Notification::LoadTestStopped);
        info!(messages_sent = state.messages_sent, "load test stopped");
    }

    pub async fn is_active(&self) -> bool {
        self.state.lock().await.active
    }

    /// Configuration of the current (or most recently requested) run.
    pub async fn config(&self) -> LoadTestConfig {
        self.state.lock().await.config.clone()
    }

    pub fn default_config(&self) -> LoadTestConfig {
        self.defaults.clone()
    }

    pub async fn status(&self) -> LoadTestStatus {
        let state = self.state.lock().await;
        LoadTestStatus {
            active: state.active,
            config: state.config.clone(),
            messages_sent: state.messages_sent,
            started_at: state.started_at,
        }
    }

    async fn run(self, generation: u64, period: Duration) {
        // First tick one period after start, like a repeating timer.
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if !self.tick(generation).await {
                break;
            }
        }
    }

    /// One timer tick. Returns false when the run is over.
    async fn tick(&self, generation: u64) -> bool {
        let mut state = self.state.lock().await;
        if !state.active || state.generation != generation {
            return false;
        }

        // Check, send, and report under one registry lock so a concurrent
        // disconnect is observed either entirely before or after this tick.
        let registry = self.manager.lock_registry().await;
        if !registry.is_connected() {
            info!("no open connections, stopping load test");
            // The timer is this task; let it finish rather than abort it.
            state.timer.take();
            state.active = false;
            self.manager.notifier().emit(Notification::LoadTestStopped);
            return false;
        }

        let payload = random_payload(
            &mut rand::thread_rng(),
            state.config.random_length,
            &state.charset,
        );

        match self
            .manager
            .send_locked(&registry, &payload, state.config.encoding, None)
        {
            Ok(delivered) => {
                state.messages_sent += 1;
                debug!(delivered, length = state.config.random_length, "load test message sent");
                self.manager
                    .notifier()
                    .emit(Notification::LoadTestMessageSent { payload });
            }
            Err(e) => {
                warn!(error = %e, "load test message not sent");
            }
        }
        true
    }
}
