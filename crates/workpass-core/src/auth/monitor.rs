//! Periodic session check.
//!
//! `SessionMonitor` wakes up on a fixed interval, validates the stored
//! session and refreshes it when it is close to expiry or was rejected.
//! When the session cannot be kept alive it stops itself and publishes
//! [`SessionStatus::Lost`] so the application can send the user back to
//! the sign-in screen.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::refresher::{RefreshOutcome, SessionRefresher};
use super::store::SessionVault;
use super::validator::SessionValidator;
use super::SessionErrorKind;

/// Default time between checks.
pub const DEFAULT_MONITOR_INTERVAL_MINUTES: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Monitoring,
}

/// What the application shell sees of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum SessionStatus {
    SignedOut,
    Active {
        #[serde(with = "chrono::serde::ts_milliseconds")]
        #[cfg_attr(feature = "ts", ts(type = "number"))]
        expires_at: DateTime<Utc>,
    },
    Lost { reason: SessionErrorKind },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Session is valid and not close to expiry.
    Healthy,
    /// Session was refreshed; carries the new expiry.
    Refreshed(DateTime<Utc>),
    /// The stored session changed underneath the tick; nothing was applied.
    Superseded,
    /// Session is gone; the user must sign in again.
    Lost(SessionErrorKind),
}

pub struct SessionMonitor {
    inner: Arc<MonitorInner>,
    task: Mutex<Option<RunningTask>>,
}

struct RunningTask {
    shutdown: watch::Sender<bool>,
    _handle: JoinHandle<()>,
}

struct MonitorInner {
    validator: Arc<SessionValidator>,
    refresher: Arc<SessionRefresher>,
    vault: Arc<SessionVault>,
    interval: Duration,
    state: Mutex<MonitorState>,
    /// Bumped on every start, stop and loss; a tick only applies its results
    /// while the generation it started under is still current.
    generation: AtomicU64,
    status: watch::Sender<SessionStatus>,
}

impl SessionMonitor {
    pub fn new(
        validator: Arc<SessionValidator>,
        refresher: Arc<SessionRefresher>,
        vault: Arc<SessionVault>,
        interval: Duration,
    ) -> Self {
        let (status, _) = watch::channel(SessionStatus::SignedOut);
        Self {
            inner: Arc::new(MonitorInner {
                validator,
                refresher,
                vault,
                interval,
                state: Mutex::new(MonitorState::Idle),
                generation: AtomicU64::new(0),
                status,
            }),
            task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> MonitorState {
        self.inner.state()
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        *self.inner.status.borrow()
    }

    pub(crate) fn publish(&self, status: SessionStatus) {
        self.inner.status.send_replace(status);
    }

    /// Begin periodic checks. The first check runs one interval from now.
    /// Must be called from within a tokio runtime. No-op while monitoring.
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        {
            let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state == MonitorState::Monitoring {
                return;
            }
            *state = MonitorState::Monitoring;
        }
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(self.inner.clone().run(generation, shutdown_rx));
        *task = Some(RunningTask {
            shutdown,
            _handle: handle,
        });
        info!(interval_secs = self.inner.interval.as_secs(), "Session monitor started");
    }

    /// Stop periodic checks. A check already in flight runs to completion
    /// but its results are not published. Idempotent.
    pub fn stop(&self) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        let was = std::mem::replace(
            &mut *self.inner.state.lock().unwrap_or_else(|e| e.into_inner()),
            MonitorState::Idle,
        );
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(running) = task.take() {
            let _ = running.shutdown.send(true);
        }
        if was == MonitorState::Monitoring {
            info!("Session monitor stopped");
        }
    }

    /// Run one check right away, outside the timer.
    pub async fn on_tick(&self) -> TickOutcome {
        let generation = self.inner.generation.load(Ordering::SeqCst);
        self.inner.tick(generation).await
    }
}

impl Drop for SessionMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl MonitorInner {
    fn state(&self) -> MonitorState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    async fn run(self: Arc<Self>, generation: u64, mut shutdown: watch::Receiver<bool>) {
        let first = tokio::time::Instant::now() + self.interval;
        let mut interval = tokio::time::interval_at(first, self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if !self.is_current(generation) {
                        break;
                    }
                    if let TickOutcome::Lost(_) = self.tick(generation).await {
                        break;
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        debug!(generation, "Session monitor task finished");
    }

    async fn tick(&self, generation: u64) -> TickOutcome {
        let record = match self.vault.load() {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Failed to load stored session");
                None
            }
        };

        let validation = self.validator.validate(record.as_ref()).await;
        if validation.valid && !validation.needs_refresh {
            return TickOutcome::Healthy;
        }

        let record = match record {
            Some(record) if validation.needs_refresh => record,
            _ => {
                let kind = validation.error.unwrap_or(SessionErrorKind::NoSession);
                return self.lose(generation, kind);
            }
        };

        debug!(error = ?validation.error, "Session needs refresh");
        match self.refresher.refresh(&record).await {
            RefreshOutcome::Refreshed(refreshed) => {
                if self.is_current(generation) {
                    self.status.send_replace(SessionStatus::Active {
                        expires_at: refreshed.expires_at,
                    });
                }
                TickOutcome::Refreshed(refreshed.expires_at)
            }
            RefreshOutcome::Superseded => TickOutcome::Superseded,
            RefreshOutcome::Failed(kind) => self.lose(generation, kind),
        }
    }

    fn lose(&self, generation: u64, kind: SessionErrorKind) -> TickOutcome {
        if self.is_current(generation) {
            // Retire the timer task too, in case this tick came from `on_tick`.
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            *state = MonitorState::Idle;
            self.generation.fetch_add(1, Ordering::SeqCst);
            drop(state);
            self.status.send_replace(SessionStatus::Lost { reason: kind });
            warn!(reason = %kind, "Session lost");
        } else {
            debug!(reason = %kind, "Session lost after monitor stopped, not publishing");
        }
        TickOutcome::Lost(kind)
    }
}
