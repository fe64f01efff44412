//! Compass calibration: the record the fusion code consumes, the timed
//! sampling run that produces new hard-iron bounds, and the declination
//! lookup.

pub mod declination;
pub mod run;

pub use declination::{DeclinationFetcher, FetchError};
pub use run::{CalibrationController, CalibrationHandle, CalibrationRun};

use anyhow::{Context, Result};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::types::MagData;

/// Magnetometer per-axis extrema in raw LSB.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardIronBounds {
    pub x_min: i32,
    pub x_max: i32,
    pub y_min: i32,
    pub y_max: i32,
    pub z_min: i32,
    pub z_max: i32,
}

impl HardIronBounds {
    /// Inverted bounds ready to be widened by samples.
    pub fn empty() -> Self {
        HardIronBounds {
            x_min: 32767,
            x_max: -32767,
            y_min: 32767,
            y_max: -32767,
            z_min: 32767,
            z_max: -32767,
        }
    }

    pub fn include(&mut self, sample: MagData) {
        self.x_min = self.x_min.min(sample.x);
        self.x_max = self.x_max.max(sample.x);
        self.y_min = self.y_min.min(sample.y);
        self.y_max = self.y_max.max(sample.y);
        self.z_min = self.z_min.min(sample.z);
        self.z_max = self.z_max.max(sample.z);
    }

    /// At least one sample has been included on every axis.
    pub fn is_valid(&self) -> bool {
        self.x_min <= self.x_max && self.y_min <= self.y_max && self.z_min <= self.z_max
    }

    /// Midpoint of each axis, the DC bias to subtract.
    pub fn hard_iron_offset(&self) -> Vector3<f64> {
        Vector3::new(
            (self.x_min as f64 + self.x_max as f64) / 2.0,
            (self.y_min as f64 + self.y_max as f64) / 2.0,
            (self.z_min as f64 + self.z_max as f64) / 2.0,
        )
    }
}

impl Default for HardIronBounds {
    fn default() -> Self {
        HardIronBounds {
            x_min: -681,
            x_max: 1707,
            y_min: -1414,
            y_max: 717,
            z_min: -2719,
            z_max: -618,
        }
    }
}

/// Everything the heading computation needs beyond raw samples.
/// Angles are degrees.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationRecord {
    pub bounds: HardIronBounds,
    pub declination: f64,
    pub heading_offset: f64,
    pub roll_offset: f64,
}

impl Default for CalibrationRecord {
    fn default() -> Self {
        CalibrationRecord {
            bounds: HardIronBounds::default(),
            declination: 0.11,
            heading_offset: 0.0,
            roll_offset: 0.0,
        }
    }
}

impl CalibrationRecord {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading calibration {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing calibration {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("writing calibration {}", path.display()))?;
        Ok(())
    }
}

/// Hand-off point between the calibration controller and the orientation
/// collector.
///
/// The controller deposits a finished record; the collector takes it on its
/// next recheck cycle. The `active` flag keeps the collector off the bus
/// while a sampling run owns it.
#[derive(Clone, Debug, Default)]
pub struct CalibrationMailbox {
    pending: Arc<Mutex<Option<CalibrationRecord>>>,
    active: Arc<AtomicBool>,
}

impl CalibrationMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deposit(&self, record: CalibrationRecord) {
        if let Ok(mut slot) = self.pending.lock() {
            *slot = Some(record);
        }
    }

    pub fn take(&self) -> Option<CalibrationRecord> {
        self.pending.lock().ok().and_then(|mut slot| slot.take())
    }

    pub fn has_pending(&self) -> bool {
        self.pending
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    /// Claim the sensor for a calibration run. `false` if one is running.
    pub fn begin(&self) -> bool {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn end(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}
