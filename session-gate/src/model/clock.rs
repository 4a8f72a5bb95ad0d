//! Time sources

use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, TimeDelta, Utc};

/// Source of the current instant
///
/// Everything deciding on expiration reads time through this trait, so the decision can be
/// evaluated against any instant.
pub trait Clock: Send + Sync + Debug {
    /// Current instant
    fn now(&self) -> DateTime<Utc>;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock standing still at a given instant until moved explicitly
///
/// The instant is kept as nanoseconds since the epoch, which covers years 1677 to 2262.
#[derive(Debug)]
pub struct FixedClock {
    nanos: AtomicI64,
}

impl FixedClock {
    /// Creates a clock stopped at `at`
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            nanos: AtomicI64::new(Self::to_nanos(at)),
        }
    }

    /// Moves the clock to `at`
    pub fn set(&self, at: DateTime<Utc>) {
        self.nanos.store(Self::to_nanos(at), Ordering::SeqCst);
    }

    /// Moves the clock by `delta`, which may be negative
    pub fn advance(&self, delta: TimeDelta) {
        let delta = delta.num_nanoseconds().unwrap_or(if delta < TimeDelta::zero() {
            i64::MIN
        } else {
            i64::MAX
        });
        // fetch_update never fails with a closure always returning Some
        let _ = self
            .nanos
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |nanos| {
                Some(nanos.saturating_add(delta))
            });
    }

    fn to_nanos(at: DateTime<Utc>) -> i64 {
        at.timestamp_nanos_opt().unwrap_or(if at.timestamp() < 0 {
            i64::MIN
        } else {
            i64::MAX
        })
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.nanos.load(Ordering::SeqCst))
    }
}
