//! One-shot system clock set from the first usable GPS time.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use std::sync::Mutex;

use crate::error::ClockError;
use crate::types::UtcFix;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockPhase {
    NotYet,
    InProgress,
    Done,
}

/// Access to the host clock, swapped out in tests.
pub trait SystemClock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    fn is_privileged(&self) -> bool;
    fn set(&self, time: DateTime<Utc>) -> Result<(), ClockError>;
}

/// The real clock, set through `settimeofday(2)`.
pub struct HostClock;

impl SystemClock for HostClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn is_privileged(&self) -> bool {
        // SAFETY: geteuid has no preconditions
        unsafe { libc::geteuid() == 0 }
    }

    fn set(&self, time: DateTime<Utc>) -> Result<(), ClockError> {
        let tv = libc::timeval {
            tv_sec: time.timestamp() as libc::time_t,
            tv_usec: time.timestamp_subsec_micros() as libc::suseconds_t,
        };
        // SAFETY: tv is a valid timeval and the timezone argument may be null
        let rc = unsafe { libc::settimeofday(&tv, std::ptr::null()) };
        if rc < 0 {
            return Err(ClockError::SetFailed(
                std::io::Error::last_os_error().to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse RMC `hhmmss[.ss]` and `ddmmyy` into a UTC instant.
pub fn parse_fix(fix: &UtcFix) -> Result<DateTime<Utc>, ClockError> {
    let time = fix.time.trim();
    let date = fix.date.trim();
    if time.len() < 6 || date.len() != 6 {
        return Err(ClockError::Incomplete {
            time: time.to_string(),
            date: date.to_string(),
        });
    }

    let digits = |s: &str, range: std::ops::Range<usize>| -> Result<u32, ClockError> {
        s.get(range)
            .and_then(|d| d.parse::<u32>().ok())
            .ok_or_else(|| ClockError::Invalid(format!("{} {}", time, date)))
    };

    let (hh, mm, ss) = (digits(time, 0..2)?, digits(time, 2..4)?, digits(time, 4..6)?);
    let (day, month, yy) = (digits(date, 0..2)?, digits(date, 2..4)?, digits(date, 4..6)?);

    let naive_date = NaiveDate::from_ymd_opt(2000 + yy as i32, month, day)
        .ok_or_else(|| ClockError::Invalid(format!("date {}", date)))?;
    let naive_time = NaiveTime::from_hms_opt(hh, mm, ss)
        .ok_or_else(|| ClockError::Invalid(format!("time {}", time)))?;

    Ok(Utc.from_utc_datetime(&naive_date.and_time(naive_time)))
}

struct SyncState {
    phase: ClockPhase,
    attempts: u32,
}

/// Sets the system clock at most once per process.
///
/// Incomplete fixes are retried up to `max_attempts` offers; after that,
/// or after one complete fix (applied or refused), the sync is `Done`.
pub struct ClockSync<C: SystemClock> {
    clock: C,
    state: Mutex<SyncState>,
    max_attempts: u32,
    max_backward_secs: i64,
}

impl<C: SystemClock> ClockSync<C> {
    pub fn new(clock: C, max_attempts: u32, max_backward_secs: i64) -> Self {
        ClockSync {
            clock,
            state: Mutex::new(SyncState {
                phase: ClockPhase::NotYet,
                attempts: 0,
            }),
            max_attempts,
            max_backward_secs,
        }
    }

    pub fn phase(&self) -> ClockPhase {
        self.state
            .lock()
            .map(|s| s.phase)
            .unwrap_or(ClockPhase::Done)
    }

    /// Offer a GPS time. Returns the phase after the offer.
    pub fn offer(&self, fix: &UtcFix) -> ClockPhase {
        {
            let Ok(mut state) = self.state.lock() else {
                return ClockPhase::Done;
            };
            if state.phase != ClockPhase::NotYet {
                return state.phase;
            }
            state.attempts += 1;
            if state.attempts > self.max_attempts {
                log::warn!("[clock] no usable GPS time after {} attempts, giving up", self.max_attempts);
                state.phase = ClockPhase::Done;
                return state.phase;
            }
            state.phase = ClockPhase::InProgress;
        }

        let next = match self.apply(fix) {
            Err(e @ ClockError::Incomplete { .. }) | Err(e @ ClockError::Invalid(_)) => {
                log::debug!("[clock] {}", e);
                ClockPhase::NotYet
            }
            Err(e) => {
                log::warn!("[clock] {}", e);
                ClockPhase::Done
            }
            Ok(()) => ClockPhase::Done,
        };

        if let Ok(mut state) = self.state.lock() {
            state.phase = next;
        }
        next
    }

    fn apply(&self, fix: &UtcFix) -> Result<(), ClockError> {
        let gps_time = parse_fix(fix)?;

        if !self.clock.is_privileged() {
            log::warn!("[clock] only root can set the system time from GPS, leaving it unchanged");
            return Ok(());
        }

        let behind = (self.clock.now() - gps_time).num_seconds();
        if behind > self.max_backward_secs {
            return Err(ClockError::MovingBackwards(behind));
        }

        self.clock.set(gps_time)?;
        log::info!("[clock] system time set from GPS: {}", gps_time.to_rfc3339());
        Ok(())
    }
}

/// Where collectors hand RMC time; object-safe so tests can substitute.
pub trait GpsTimeSink: Send + Sync {
    fn offer(&self, fix: &UtcFix) -> ClockPhase;
}

impl<C: SystemClock> GpsTimeSink for ClockSync<C> {
    fn offer(&self, fix: &UtcFix) -> ClockPhase {
        ClockSync::offer(self, fix)
    }
}

pub type SharedTimeSink = std::sync::Arc<dyn GpsTimeSink>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    struct FakeClock {
        now: DateTime<Utc>,
        root: bool,
        set_to: Arc<Mutex<Vec<DateTime<Utc>>>>,
    }

    impl SystemClock for FakeClock {
        fn now(&self) -> DateTime<Utc> {
            self.now
        }
        fn is_privileged(&self) -> bool {
            self.root
        }
        fn set(&self, time: DateTime<Utc>) -> Result<(), ClockError> {
            self.set_to.lock().unwrap().push(time);
            Ok(())
        }
    }

    fn fix(time: &str, date: &str) -> UtcFix {
        UtcFix {
            time: time.into(),
            date: date.into(),
        }
    }

    fn fake(now: DateTime<Utc>, root: bool) -> (FakeClock, Arc<Mutex<Vec<DateTime<Utc>>>>) {
        let set_to = Arc::new(Mutex::new(Vec::new()));
        (
            FakeClock {
                now,
                root,
                set_to: set_to.clone(),
            },
            set_to,
        )
    }

    #[test]
    fn test_parse_fix() {
        let t = parse_fix(&fix("123519.00", "230324")).unwrap();
        assert_eq!(t.to_rfc3339(), "2024-03-23T12:35:19+00:00");
        assert!(matches!(parse_fix(&fix("", "230324")), Err(ClockError::Incomplete { .. })));
        assert!(matches!(parse_fix(&fix("123519", "321324")), Err(ClockError::Invalid(_))));
        assert!(matches!(parse_fix(&fix("12a519", "230324")), Err(ClockError::Invalid(_))));
    }

    #[test]
    fn test_sets_once() {
        let gps = parse_fix(&fix("120000", "010124")).unwrap();
        let (clock, set_to) = fake(gps - Duration::hours(1), true);
        let sync = ClockSync::new(clock, 20, 10);

        assert_eq!(sync.offer(&fix("120000", "010124")), ClockPhase::Done);
        assert_eq!(sync.offer(&fix("130000", "010124")), ClockPhase::Done);
        assert_eq!(set_to.lock().unwrap().as_slice(), &[gps]);
    }

    #[test]
    fn test_incomplete_retries_until_budget() {
        let (clock, set_to) = fake(Utc::now(), true);
        let sync = ClockSync::new(clock, 3, 10);
        for _ in 0..3 {
            assert_eq!(sync.offer(&fix("", "")), ClockPhase::NotYet);
        }
        assert_eq!(sync.offer(&fix("", "")), ClockPhase::Done);
        assert_eq!(sync.offer(&fix("120000", "010124")), ClockPhase::Done);
        assert!(set_to.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unprivileged_skips() {
        let (clock, set_to) = fake(Utc::now(), false);
        let sync = ClockSync::new(clock, 20, 10);
        assert_eq!(sync.offer(&fix("120000", "010124")), ClockPhase::Done);
        assert!(set_to.lock().unwrap().is_empty());
    }

    #[test]
    fn test_refuses_to_move_backwards() {
        let gps = parse_fix(&fix("120000", "010124")).unwrap();
        let (clock, set_to) = fake(gps + Duration::seconds(30), true);
        let sync = ClockSync::new(clock, 20, 10);
        assert_eq!(sync.offer(&fix("120000", "010124")), ClockPhase::Done);
        assert!(set_to.lock().unwrap().is_empty());

        let (clock, set_to) = fake(gps + Duration::seconds(5), true);
        let sync = ClockSync::new(clock, 20, 10);
        sync.offer(&fix("120000", "010124"));
        assert_eq!(set_to.lock().unwrap().len(), 1);
    }
}
