//! # Operation Clock
//!
//! Withdrawals are time-gated, so the registry needs a notion of "now". It
//! reads it through the [`Clock`] trait exactly once per operation, which
//! keeps every precondition inside one call evaluated against the same
//! instant.
//!
//! Two clocks ship with the crate:
//!
//! - [`SystemClock`] follows the wall clock but never goes backwards. If the
//!   host clock is stepped back (NTP correction, manual change), readings
//!   stay pinned at the last value until real time catches up.
//! - [`ManualClock`] only moves when told to. Tests use it to cross the
//!   withdrawal grace period without sleeping, and the node's devnet mode
//!   exposes it over RPC.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use thiserror::Error;

/// Errors from adjusting a [`ManualClock`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClockError {
    /// The requested instant is earlier than the current reading.
    #[error("clock cannot move backwards: now {now}, requested {requested}")]
    Backwards {
        /// Current reading.
        now: DateTime<Utc>,
        /// Rejected target.
        requested: DateTime<Utc>,
    },

    /// A negative duration was passed to `advance`.
    #[error("cannot advance clock by a negative duration ({0})")]
    NegativeAdvance(Duration),

    /// The advanced reading would fall outside the representable range.
    #[error("advancing {now} by {by} overflows the clock")]
    Overflow {
        /// Current reading.
        now: DateTime<Utc>,
        /// Rejected step.
        by: Duration,
    },
}

/// A monotonically non-decreasing source of the current time.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time, clamped so it never decreases.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl SystemClock {
    /// Creates a system clock.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        let mut last = self.last.lock();
        let wall = Utc::now();
        let now = match *last {
            Some(prev) if prev > wall => prev,
            _ => wall,
        };
        *last = Some(now);
        now
    }
}

/// A clock that moves only when advanced explicitly.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Creates a clock frozen at the current wall-clock time.
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    /// Moves the clock forward by `by` and returns the new reading.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::NegativeAdvance`] for a negative duration and
    /// [`ClockError::Overflow`] if the result is past `DateTime::MAX_UTC`.
    /// The reading is unchanged on error.
    pub fn advance(&self, by: Duration) -> Result<DateTime<Utc>, ClockError> {
        if by < Duration::zero() {
            return Err(ClockError::NegativeAdvance(by));
        }
        let mut now = self.now.lock();
        let next = now
            .checked_add_signed(by)
            .ok_or(ClockError::Overflow { now: *now, by })?;
        *now = next;
        Ok(next)
    }

    /// Jumps to `to`, which must not be earlier than the current reading.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::Backwards`] if `to` is in the clock's past.
    pub fn set(&self, to: DateTime<Utc>) -> Result<(), ClockError> {
        let mut now = self.now.lock();
        if to < *now {
            return Err(ClockError::Backwards {
                now: *now,
                requested: to,
            });
        }
        *now = to;
        Ok(())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn manual_clock_is_frozen_until_advanced() {
        let clock = ManualClock::new(epoch());
        assert_eq!(clock.now(), epoch());
        assert_eq!(clock.now(), epoch());

        let later = clock.advance(Duration::days(2)).unwrap();
        assert_eq!(later, epoch() + Duration::days(2));
        assert_eq!(clock.now(), later);
    }

    #[test]
    fn manual_clock_refuses_to_go_backwards() {
        let clock = ManualClock::new(epoch());
        let err = clock.set(epoch() - Duration::seconds(1)).unwrap_err();
        assert!(matches!(err, ClockError::Backwards { .. }));
        assert_eq!(clock.now(), epoch());

        assert!(matches!(
            clock.advance(Duration::seconds(-5)),
            Err(ClockError::NegativeAdvance(_))
        ));
        assert_eq!(clock.now(), epoch());
    }

    #[test]
    fn manual_clock_rejects_advance_past_the_end_of_time() {
        let near_end = DateTime::<Utc>::MAX_UTC - Duration::days(1);
        let clock = ManualClock::new(near_end);

        let err = clock
            .advance(Duration::seconds(i64::from(u32::MAX)))
            .unwrap_err();
        assert!(matches!(err, ClockError::Overflow { .. }));
        assert_eq!(clock.now(), near_end);

        // Small steps still work right up to the edge.
        assert_eq!(
            clock.advance(Duration::hours(1)).unwrap(),
            near_end + Duration::hours(1)
        );
    }

    #[test]
    fn manual_clock_set_to_same_instant_is_allowed() {
        let clock = ManualClock::new(epoch());
        clock.set(epoch()).unwrap();
        clock.set(epoch() + Duration::hours(1)).unwrap();
        assert_eq!(clock.now(), epoch() + Duration::hours(1));
    }

    #[test]
    fn system_clock_never_decreases() {
        let clock = SystemClock::new();
        let mut prev = clock.now();
        for _ in 0..1_000 {
            let next = clock.now();
            assert!(next >= prev);
            prev = next;
        }
    }

    #[test]
    fn system_clock_holds_a_reading_ahead_of_wall_time() {
        let clock = SystemClock::new();
        let future = Utc::now() + Duration::hours(1);
        *clock.last.lock() = Some(future);
        assert_eq!(clock.now(), future);
    }

    #[test]
    fn clocks_are_object_safe() {
        let clocks: Vec<Box<dyn Clock>> =
            vec![Box::new(SystemClock::new()), Box::new(ManualClock::new(epoch()))];
        assert_eq!(clocks[1].now(), epoch());
    }
}
