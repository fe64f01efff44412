//! The shared navigation record.
//!
//! Every quantity lives in its own [`Slot`] with its own lock, timestamp and
//! producer tag. Collectors write slots independently and never take more
//! than one lock at a time, so a reader may see some fields a few seconds
//! older than others. Freshness is judged per slot against the staleness
//! threshold; nothing else ties fields together.

use serde::Serialize;
use std::sync::{Arc, OnceLock, RwLock};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::types::{
    EnergyCounters, Position, Source, TaggedReading, TrueWind, UtcFix, WindReading,
};

/// Seconds after which a stored value stops being authoritative.
pub const STALE_THRESHOLD_SECS: f64 = 4.0;

/// Seconds since the Unix epoch, read from a monotonic clock.
///
/// The wall clock is sampled once and every later reading advances by
/// [`Instant`] elapsed time. Slot stamps therefore never run backwards when
/// the host clock is stepped from GPS time.
pub fn current_timestamp() -> f64 {
    static ANCHOR: OnceLock<(Instant, f64)> = OnceLock::new();
    let (started, wall) = ANCHOR.get_or_init(|| {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        (Instant::now(), wall)
    });
    wall + started.elapsed().as_secs_f64()
}

/// A value plus when and by whom it was written.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Stamped<T> {
    pub value: T,
    pub timestamp: f64,
    pub source: Source,
}

impl<T> Stamped<T> {
    pub fn age(&self, now: f64) -> f64 {
        (now - self.timestamp).max(0.0)
    }

    pub fn is_fresh(&self, now: f64, stale_after: f64) -> bool {
        self.age(now) <= stale_after
    }
}

/// One independently locked, independently timestamped field.
#[derive(Debug)]
pub struct Slot<T> {
    inner: RwLock<Option<Stamped<T>>>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Slot {
            inner: RwLock::new(None),
        }
    }
}

impl<T: Clone> Slot<T> {
    /// Store `value` stamped `now`.
    ///
    /// A write carrying an older timestamp than the one already held is
    /// dropped, so the visible value is always the newest write. Returns
    /// whether the write landed.
    pub fn store(&self, value: T, source: Source, now: f64) -> bool {
        let Ok(mut slot) = self.inner.write() else {
            return false;
        };
        if let Some(current) = slot.as_ref() {
            if now < current.timestamp {
                return false;
            }
        }
        *slot = Some(Stamped {
            value,
            timestamp: now,
            source,
        });
        true
    }

    /// Store only when no other producer holds a fresh value.
    pub fn store_if_vacant(&self, value: T, source: Source, now: f64, stale_after: f64) -> bool {
        let Ok(mut slot) = self.inner.write() else {
            return false;
        };
        if let Some(current) = slot.as_ref() {
            if current.source != source && current.is_fresh(now, stale_after) {
                return false;
            }
            if now < current.timestamp {
                return false;
            }
        }
        *slot = Some(Stamped {
            value,
            timestamp: now,
            source,
        });
        true
    }

    /// Last write regardless of age.
    pub fn latest(&self) -> Option<Stamped<T>> {
        self.inner.read().ok().and_then(|slot| slot.clone())
    }

    /// Value if written within `stale_after` seconds of `now`.
    pub fn fresh(&self, now: f64, stale_after: f64) -> Option<T> {
        self.latest()
            .filter(|s| s.is_fresh(now, stale_after))
            .map(|s| s.value)
    }

    pub fn fresh_stamped(&self, now: f64, stale_after: f64) -> Option<Stamped<T>> {
        self.latest().filter(|s| s.is_fresh(now, stale_after))
    }

    pub fn timestamp(&self) -> Option<f64> {
        self.inner
            .read()
            .ok()
            .and_then(|slot| slot.as_ref().map(|s| s.timestamp))
    }

    /// Seconds since the last write, `None` if never written.
    pub fn age(&self, now: f64) -> Option<f64> {
        self.timestamp().map(|t| (now - t).max(0.0))
    }

    pub fn is_fresh(&self, now: f64, stale_after: f64) -> bool {
        self.age(now).map(|a| a <= stale_after).unwrap_or(false)
    }

    pub fn source(&self) -> Option<Source> {
        self.inner
            .read()
            .ok()
            .and_then(|slot| slot.as_ref().map(|s| s.source))
    }
}

impl Slot<()> {
    /// Refresh a bookkeeping timestamp.
    pub fn touch(&self, source: Source, now: f64) {
        self.store((), source, now);
    }
}

/// Blackboard shared by all collectors and the display side.
#[derive(Debug)]
pub struct NavState {
    stale_after: f64,

    /// Heading in degrees: magnetic, true or course over ground
    pub heading: Slot<f64>,
    /// Roll in degrees, positive to starboard
    pub roll: Slot<f64>,
    /// Speed over ground, knots
    pub sog: Slot<f64>,
    /// Speed through water, knots
    pub stw: Slot<f64>,
    /// Depth below surface, metres
    pub depth: Slot<f64>,
    /// Water temperature, °C
    pub water_temp: Slot<f64>,
    pub wind_relative: Slot<WindReading>,
    pub wind_true: Slot<TrueWind>,
    pub position: Slot<Position>,
    pub utc: Slot<UtcFix>,

    pub voltage: Slot<TaggedReading>,
    pub current: Slot<TaggedReading>,
    pub temperature: Slot<TaggedReading>,
    pub energy: Slot<EnergyCounters>,

    /// A network sentence wrote position or speed over ground
    pub network_fix: Slot<()>,
    /// Any RMC arrived, moving or not
    pub gps_fix: Slot<()>,
    /// Orientation sensor produced a sample
    pub sensor: Slot<()>,
}

pub type SharedNavState = Arc<NavState>;

impl NavState {
    pub fn new(stale_after: f64) -> Self {
        NavState {
            stale_after,
            heading: Slot::default(),
            roll: Slot::default(),
            sog: Slot::default(),
            stw: Slot::default(),
            depth: Slot::default(),
            water_temp: Slot::default(),
            wind_relative: Slot::default(),
            wind_true: Slot::default(),
            position: Slot::default(),
            utc: Slot::default(),
            voltage: Slot::default(),
            current: Slot::default(),
            temperature: Slot::default(),
            energy: Slot::default(),
            network_fix: Slot::default(),
            gps_fix: Slot::default(),
            sensor: Slot::default(),
        }
    }

    pub fn shared(stale_after: f64) -> SharedNavState {
        Arc::new(Self::new(stale_after))
    }

    pub fn stale_after(&self) -> f64 {
        self.stale_after
    }

    /// Whether the network has recently delivered GPS-capable data.
    pub fn network_has_precedence(&self, now: f64) -> bool {
        self.network_fix.is_fresh(now, self.stale_after)
    }

    /// Copy of every field that is still fresh at `now`.
    pub fn snapshot(&self, now: f64) -> NavSnapshot {
        let stale = self.stale_after;
        let heading = self.heading.fresh_stamped(now, stale);
        let position = self.position.fresh(now, stale);
        let decimal = position.as_ref().and_then(|p| p.to_decimal_degrees());
        NavSnapshot {
            timestamp: now,
            heading_deg: heading.as_ref().map(|h| h.value),
            heading_source: heading.as_ref().map(|h| h.source),
            roll_deg: self.roll.fresh(now, stale),
            sog_knots: self.sog.fresh(now, stale),
            stw_knots: self.stw.fresh(now, stale),
            depth_m: self.depth.fresh(now, stale),
            water_temp_c: self.water_temp.fresh(now, stale),
            wind_relative: self.wind_relative.fresh(now, stale),
            wind_true: self.wind_true.fresh(now, stale),
            position,
            latitude: decimal.map(|(lat, _)| lat),
            longitude: decimal.map(|(_, lon)| lon),
            voltage: self.voltage.fresh(now, stale),
            current: self.current.fresh(now, stale),
            temperature: self.temperature.fresh(now, stale),
            energy: self.energy.fresh(now, stale),
            network_active: self.network_has_precedence(now),
            sensor_active: self.sensor.is_fresh(now, stale),
        }
    }
}

impl Default for NavState {
    fn default() -> Self {
        Self::new(STALE_THRESHOLD_SECS)
    }
}

/// Read-only view handed to the display side. Stale fields are `None`.
#[derive(Clone, Debug, Default, Serialize)]
pub struct NavSnapshot {
    pub timestamp: f64,
    pub heading_deg: Option<f64>,
    pub heading_source: Option<Source>,
    pub roll_deg: Option<f64>,
    pub sog_knots: Option<f64>,
    pub stw_knots: Option<f64>,
    pub depth_m: Option<f64>,
    pub water_temp_c: Option<f64>,
    pub wind_relative: Option<WindReading>,
    pub wind_true: Option<TrueWind>,
    pub position: Option<Position>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub voltage: Option<TaggedReading>,
    pub current: Option<TaggedReading>,
    pub temperature: Option<TaggedReading>,
    pub energy: Option<EnergyCounters>,
    pub network_active: bool,
    pub sensor_active: bool,
}
