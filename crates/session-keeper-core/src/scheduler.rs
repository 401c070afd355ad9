//! # Rotation Scheduler Module
//!
//! Timer-driven rotation of the session secret.
//!
//! The scheduler is either [`SchedulerState::Idle`] or
//! [`SchedulerState::Running`]. While running it owns one background task
//! that sleeps for the interval and then calls [`SecretStore::rotate`].
//! Starting an already running scheduler is a no-op, so at most one timer
//! exists at any time. Stopping signals the task and waits for it to exit:
//! once [`RotationScheduler::stop`] returns, no scheduled rotation fires.
//! A rotation already in progress when stop is requested is allowed to
//! finish.

use crate::{
    config::MAX_ROTATION_INTERVAL_HOURS,
    secret::SecretValue,
    store::{SecretStore, SecretStoreError},
    Timestamp,
};
use serde::Serialize;
use std::{
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, error, info, instrument, warn};

// ============================================================================
// Core Types
// ============================================================================

/// Scheduler lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// No timer is armed
    Idle,
    /// A timer task is armed and rotating on every interval
    Running,
}

/// Snapshot of scheduler activity for the admin surface
#[derive(Debug, Clone, Serialize)]
pub struct RotationStatus {
    pub state: SchedulerState,

    /// Interval of the running timer
    pub interval_seconds: Option<u64>,

    /// When the running timer was started
    pub started_at: Option<Timestamp>,

    /// When the next scheduled rotation is due
    pub next_rotation_at: Option<Timestamp>,

    /// Successful timer-driven rotations
    pub scheduled_rotations: u64,

    /// Successful forced rotations
    pub forced_rotations: u64,

    /// Rotations that returned an error
    pub failed_rotations: u64,

    /// Message of the most recent failure
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Scheduled,
    Forced,
}

impl Trigger {
    fn as_str(&self) -> &'static str {
        match self {
            Trigger::Scheduled => "scheduled",
            Trigger::Forced => "forced",
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    interval: Option<Duration>,
    started_at: Option<Timestamp>,
    next_rotation_at: Option<Timestamp>,
    scheduled_rotations: u64,
    forced_rotations: u64,
    failed_rotations: u64,
    last_error: Option<String>,
}

struct TimerTask {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

// ============================================================================
// Rotation Scheduler
// ============================================================================

/// Drives [`SecretStore::rotate`] on a fixed interval
pub struct RotationScheduler {
    store: Arc<SecretStore>,
    timer: Mutex<Option<TimerTask>>,
    counters: Arc<StdMutex<Counters>>,
}

impl RotationScheduler {
    /// Create an idle scheduler for `store`
    pub fn new(store: Arc<SecretStore>) -> Self {
        Self {
            store,
            timer: Mutex::new(None),
            counters: Arc::new(StdMutex::new(Counters::default())),
        }
    }

    /// Start rotating every `interval`
    ///
    /// Returns `Ok(true)` when a timer was started and `Ok(false)` when the
    /// scheduler was already running; the existing timer is kept unchanged.
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// Returns [`SchedulerError::InvalidInterval`] for a zero interval or one
    /// longer than [`MAX_ROTATION_INTERVAL_HOURS`].
    #[instrument(skip(self))]
    pub async fn start(&self, interval: Duration) -> Result<bool, SchedulerError> {
        if interval.is_zero() {
            return Err(SchedulerError::InvalidInterval {
                message: "rotation interval must be greater than zero".to_string(),
            });
        }
        if interval > Duration::from_secs(MAX_ROTATION_INTERVAL_HOURS * 60 * 60) {
            return Err(SchedulerError::InvalidInterval {
                message: format!(
                    "rotation interval must not exceed {} hours",
                    MAX_ROTATION_INTERVAL_HOURS
                ),
            });
        }

        let mut timer = self.timer.lock().await;
        if timer.is_some() {
            debug!("Rotation scheduler already running; start ignored");
            return Ok(false);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let store = Arc::clone(&self.store);
        let counters = Arc::clone(&self.counters);

        update(&self.counters, |c| {
            c.interval = Some(interval);
            c.started_at = Some(Timestamp::now());
        });

        let handle = tokio::spawn(run_timer(store, counters, interval, shutdown_rx));
        *timer = Some(TimerTask {
            shutdown_tx,
            handle,
        });

        info!(
            interval_seconds = interval.as_secs(),
            "Automatic secret rotation started"
        );
        Ok(true)
    }

    /// Stop the timer
    ///
    /// Safe to call when idle; returns `false` in that case. When this
    /// returns, the timer task has exited.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> bool {
        let mut timer = self.timer.lock().await;
        let Some(task) = timer.take() else {
            debug!("Rotation scheduler not running; stop ignored");
            return false;
        };

        let _ = task.shutdown_tx.send(true);
        if let Err(e) = task.handle.await {
            warn!(error = %e, "Rotation timer task ended abnormally");
        }

        update(&self.counters, |c| {
            c.interval = None;
            c.started_at = None;
            c.next_rotation_at = None;
        });

        info!("Automatic secret rotation stopped");
        true
    }

    /// Rotate immediately, outside the schedule
    ///
    /// Callable in either state and does not move the next scheduled tick.
    ///
    /// # Errors
    /// Returns [`SchedulerError::Rotation`] if the store failed to rotate.
    #[instrument(skip(self))]
    pub async fn force_rotation(&self) -> Result<SecretValue, SchedulerError> {
        info!("Forced secret rotation requested");
        rotate_once(&self.store, &self.counters, Trigger::Forced)
            .await
            .map_err(SchedulerError::from)
    }

    /// Current lifecycle state
    pub async fn state(&self) -> SchedulerState {
        if self.timer.lock().await.is_some() {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    /// Check if the timer is armed
    pub async fn is_running(&self) -> bool {
        self.state().await == SchedulerState::Running
    }

    /// Activity snapshot
    pub async fn status(&self) -> RotationStatus {
        let state = self.state().await;
        let counters = self.counters.lock().unwrap_or_else(|p| p.into_inner());

        RotationStatus {
            state,
            interval_seconds: counters.interval.map(|i| i.as_secs()),
            started_at: counters.started_at,
            next_rotation_at: counters.next_rotation_at,
            scheduled_rotations: counters.scheduled_rotations,
            forced_rotations: counters.forced_rotations,
            failed_rotations: counters.failed_rotations,
            last_error: counters.last_error.clone(),
        }
    }

    /// Store rotated by this scheduler
    pub fn store(&self) -> &Arc<SecretStore> {
        &self.store
    }
}

async fn run_timer(
    store: Arc<SecretStore>,
    counters: Arc<StdMutex<Counters>>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        update(&counters, |c| {
            c.next_rotation_at = Some(Timestamp::now().add_duration(interval));
        });

        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                // Failures are recorded inside; the next tick still fires.
                let _ = rotate_once(&store, &counters, Trigger::Scheduled).await;
            }
            _ = shutdown_rx.changed() => {
                debug!("Rotation timer received shutdown signal");
                break;
            }
        }
    }
}

async fn rotate_once(
    store: &SecretStore,
    counters: &StdMutex<Counters>,
    trigger: Trigger,
) -> Result<SecretValue, SecretStoreError> {
    match store.rotate().await {
        Ok(secret) => {
            update(counters, |c| match trigger {
                Trigger::Scheduled => c.scheduled_rotations += 1,
                Trigger::Forced => c.forced_rotations += 1,
            });
            debug!(trigger = trigger.as_str(), "Rotation completed");
            Ok(secret)
        }
        Err(e) => {
            update(counters, |c| {
                c.failed_rotations += 1;
                c.last_error = Some(e.to_string());
            });
            error!(
                trigger = trigger.as_str(),
                fatal = e.is_fatal(),
                error = %e,
                "Secret rotation failed"
            );
            Err(e)
        }
    }
}

fn update(counters: &StdMutex<Counters>, f: impl FnOnce(&mut Counters)) {
    let mut guard = counters.lock().unwrap_or_else(|p| p.into_inner());
    f(&mut guard);
}

impl std::fmt::Debug for RotationScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotationScheduler")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur in scheduler operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum SchedulerError {
    #[error("Rotation failed: {0}")]
    Rotation(#[from] SecretStoreError),

    #[error("Invalid rotation interval: {message}")]
    InvalidInterval { message: String },
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
