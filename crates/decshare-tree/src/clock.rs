use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime, TimeDelta};

/// Source of monotonic and wall-clock time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Current local wall-clock time, used for file dates.
    fn local_now(&self) -> NaiveDateTime;
}

/// The system clocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn local_now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

#[derive(Debug)]
struct ManualState {
    offset: Duration,
    local: NaiveDateTime,
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    state: Mutex<ManualState>,
}

impl ManualClock {
    /// Create a clock frozen at the current instant and local time.
    #[must_use]
    pub fn new() -> Self {
        Self::at(Local::now().naive_local())
    }

    /// Create a clock frozen at the current instant whose wall clock reads
    /// `local`.
    #[must_use]
    pub fn at(local: NaiveDateTime) -> Self {
        Self {
            base: Instant::now(),
            state: Mutex::new(ManualState {
                offset: Duration::ZERO,
                local,
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move both clocks forward.
    pub fn advance(&self, by: Duration) {
        let mut state = self.state();
        state.offset = state.offset.saturating_add(by);
        if let Some(local) = TimeDelta::from_std(by)
            .ok()
            .and_then(|d| state.local.checked_add_signed(d))
        {
            state.local = local;
        }
    }

    /// Set the wall clock without touching the monotonic clock.
    pub fn set_local(&self, local: NaiveDateTime) {
        self.state().local = local;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = self.state().offset;
        self.base.checked_add(offset).unwrap_or(self.base)
    }

    fn local_now(&self) -> NaiveDateTime {
        self.state().local
    }
}
