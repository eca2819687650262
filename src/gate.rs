//! Sliding-window admission gate.
//!
//! At most `capacity` permits are granted within any trailing window of
//! `duration`. The gate keeps the timestamps of the last `capacity` grants in a
//! ring; the slot under the cursor is always the oldest grant and is the only
//! one that needs to be inspected to decide whether the window has room.
//!
//! Semantics:
//! - A permit is available when the oldest recorded grant is absent or
//!   `granted_at + duration < now`, so no closed window `[now - duration, now]`
//!   ever holds more than `capacity` grants. A zero duration never throttles.
//! - Reading `now`, inspecting the slot, overwriting it and advancing the
//!   cursor happen under one lock. Waiting never holds the lock.
//! - A refused caller sleeps for `granted_at + duration - now`, computed from a
//!   fresh clock reading on every attempt (plus one timer tick), then
//!   re-evaluates.
//! - Cancellation, timeouts and shutdown only ever interrupt the wait, so a
//!   caller that gives up leaves the ring untouched.
//!
//! ```rust
//! use docgate::{AdmissionGate, RateWindow};
//! use std::time::Duration;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let window = RateWindow::new(2, Duration::from_millis(50)).unwrap();
//! let gate = AdmissionGate::new(window).unwrap();
//! let first = gate.acquire().await.unwrap();
//! let _second = gate.acquire().await.unwrap();
//! let third = gate.acquire().await.unwrap();
//! assert!(third.granted_at() - first.granted_at() > Duration::from_millis(50));
//! # });
//! ```

use crate::clock::{Clock, TokioClock};
use crate::error::{ConfigError, GateError};
use crate::sleeper::{Sleeper, TokioSleeper};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

pub mod layer;
pub use layer::{GateLayer, GateService, GatedError};

/// Resolution of the tokio timer. A refused caller sleeps one tick past expiry.
const TIMER_TICK: Duration = Duration::from_millis(1);

/// Unit of a "N requests per one unit" window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    /// Length of one unit.
    pub fn as_duration(self) -> Duration {
        match self {
            TimeUnit::Millisecond => Duration::from_millis(1),
            TimeUnit::Second => Duration::from_secs(1),
            TimeUnit::Minute => Duration::from_secs(60),
            TimeUnit::Hour => Duration::from_secs(60 * 60),
            TimeUnit::Day => Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Validated rate configuration: at most `capacity` permits per `duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    capacity: usize,
    duration: Duration,
}

impl RateWindow {
    /// Create a window, rejecting zero capacity and durations the clock cannot represent.
    ///
    /// A zero duration is accepted and disables throttling.
    pub fn new(capacity: usize, duration: Duration) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity { provided: capacity });
        }
        if Instant::now().checked_add(duration).is_none() {
            return Err(ConfigError::UnboundedDuration(duration));
        }
        Ok(Self { capacity, duration })
    }

    /// `capacity` permits per one `unit`.
    pub fn per(unit: TimeUnit, capacity: usize) -> Result<Self, ConfigError> {
        Self::new(capacity, unit.as_duration())
    }

    pub fn per_second(capacity: usize) -> Result<Self, ConfigError> {
        Self::per(TimeUnit::Second, capacity)
    }

    pub fn per_minute(capacity: usize) -> Result<Self, ConfigError> {
        Self::per(TimeUnit::Minute, capacity)
    }

    /// Maximum permits per window.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Window length.
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

/// Proof of admission returned by the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permit {
    granted_at: Instant,
    slot: usize,
}

impl Permit {
    /// Clock reading recorded for this grant.
    pub fn granted_at(&self) -> Instant {
        self.granted_at
    }

    /// Ring slot the grant was written to.
    pub fn slot(&self) -> usize {
        self.slot
    }
}

/// Ring of the last `capacity` grant timestamps, oldest under the cursor.
#[derive(Debug)]
struct PermitLog {
    slots: Box<[Option<Instant>]>,
    cursor: usize,
}

impl PermitLog {
    fn new(capacity: usize) -> Result<Self, ConfigError> {
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| ConfigError::CapacityTooLarge { provided: capacity })?;
        slots.resize(capacity, None);
        Ok(Self { slots: slots.into_boxed_slice(), cursor: 0 })
    }

    /// Grant at `now` if the oldest permit has left the window, else report the wait.
    fn admit(&mut self, now: Instant, duration: Duration) -> Result<Permit, Duration> {
        let slot = self.cursor;
        match self.slots[slot] {
            Some(_) if duration.is_zero() => {}
            Some(granted_at) => match granted_at.checked_add(duration) {
                Some(expires) if expires < now => {}
                Some(expires) => return Err(expires.saturating_duration_since(now) + TIMER_TICK),
                None => return Err(duration),
            },
            None => {}
        }
        self.slots[slot] = Some(now);
        self.cursor = (slot + 1) % self.slots.len();
        Ok(Permit { granted_at: now, slot })
    }

    fn count_since(&self, since: Option<Instant>) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|granted_at| match since {
                Some(since) => **granted_at >= since,
                None => true,
            })
            .count()
    }
}

#[derive(Debug)]
struct GateState {
    window: RateWindow,
    log: Mutex<PermitLog>,
    shutdown: watch::Sender<bool>,
}

impl GateState {
    // The critical section cannot panic halfway through a write, so a
    // poisoned lock still guards a consistent ring.
    fn log(&self) -> MutexGuard<'_, PermitLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Sliding-window admission gate.
///
/// Clones share the same permit ring and shutdown state, so every handle
/// counts against the same window. The clock and sleeper are per handle;
/// configure them before cloning.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    state: Arc<GateState>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
}

impl AdmissionGate {
    /// Create a gate for `window`.
    ///
    /// Errors with `ConfigError::CapacityTooLarge` if the permit ring cannot be allocated.
    pub fn new(window: RateWindow) -> Result<Self, ConfigError> {
        let log = PermitLog::new(window.capacity)?;
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            state: Arc::new(GateState { window, log: Mutex::new(log), shutdown }),
            clock: Arc::new(TokioClock),
            sleeper: Arc::new(TokioSleeper),
        })
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Provide a custom sleeper implementation.
    pub fn with_sleeper<S: Sleeper + 'static>(mut self, sleeper: S) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Configured window.
    pub fn window(&self) -> RateWindow {
        self.state.window
    }

    /// Maximum permits per window.
    pub fn capacity(&self) -> usize {
        self.state.window.capacity
    }

    /// Number of recorded grants inside the closed window `[now - duration, now]`.
    pub fn permits_in_window(&self) -> usize {
        if self.state.window.duration.is_zero() {
            return 0;
        }
        let now = self.clock.now();
        let since = now.checked_sub(self.state.window.duration);
        self.state.log().count_since(since)
    }

    /// Single non-blocking admission attempt.
    ///
    /// Returns the permit, or how long until the oldest grant leaves the
    /// window. Shutdown is not consulted here.
    pub fn try_acquire(&self) -> Result<Permit, Duration> {
        let decision = {
            let mut log = self.state.log();
            let now = self.clock.now();
            log.admit(now, self.state.window.duration)
        };
        if let Ok(permit) = &decision {
            tracing::debug!(
                slot = permit.slot,
                cursor = (permit.slot + 1) % self.state.window.capacity,
                capacity = self.state.window.capacity,
                "admission gate: permit granted"
            );
        }
        decision
    }

    /// Wait until a permit is granted.
    ///
    /// Returns `GateError::Cancelled` if the gate is shut down before or while waiting.
    pub async fn acquire(&self) -> Result<Permit, GateError> {
        self.acquire_until(std::future::pending::<()>()).await
    }

    /// Wait until a permit is granted or `cancel` completes.
    ///
    /// `cancel` is only polled while the caller is suspended; an immediately
    /// available permit is granted even if `cancel` is already complete.
    pub async fn acquire_until<F>(&self, cancel: F) -> Result<Permit, GateError>
    where
        F: Future,
    {
        let mut shutdown = self.state.shutdown.subscribe();
        tokio::pin!(cancel);

        loop {
            if *shutdown.borrow_and_update() {
                return Err(GateError::Cancelled);
            }

            let wait = match self.try_acquire() {
                Ok(permit) => return Ok(permit),
                Err(wait) => wait,
            };
            tracing::trace!(?wait, "admission gate full; waiting for oldest permit to expire");

            tokio::select! {
                _ = self.sleeper.sleep(wait) => {}
                _ = &mut cancel => {
                    tracing::debug!("admission gate: wait cancelled");
                    return Err(GateError::Cancelled);
                }
                // Re-checked at the top of the loop.
                _ = shutdown.changed() => {}
            }
        }
    }

    /// Wait at most `limit` for a permit.
    pub async fn acquire_timeout(&self, limit: Duration) -> Result<Permit, GateError> {
        match tokio::time::timeout(limit, self.acquire()).await {
            Ok(result) => result,
            Err(_) => Err(GateError::TimedOut { limit }),
        }
    }

    /// Close the gate. Waiting and future callers receive `GateError::Cancelled`.
    pub fn shutdown(&self) {
        if !self.state.shutdown.send_replace(true) {
            tracing::info!("admission gate shut down");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        *self.state.shutdown.borrow()
    }
}
