//! Orientation sensor access.
//!
//! [`ImuBus`] is the seam between the collectors and the hardware: the
//! Linux I2C driver in [`lsm9ds`] implements it for real boards and
//! [`ScriptedBus`] replays canned samples for bench runs and tests.

pub mod lsm9ds;

pub use lsm9ds::Lsm9dsBus;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::error::SensorError;
use crate::types::{AccelData, GyroData, MagData};

/// Supported accelerometer/gyro/magnetometer packages
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SensorVariant {
    /// BerryIMU v1
    Lsm9ds0,
    /// BerryIMU v2
    Lsm9ds1,
}

impl SensorVariant {
    pub fn name(&self) -> &'static str {
        match self {
            SensorVariant::Lsm9ds0 => "LSM9DS0",
            SensorVariant::Lsm9ds1 => "LSM9DS1",
        }
    }
}

/// One raw reading of all three instruments
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ImuSample {
    pub acc: AccelData,
    pub gyro: GyroData,
    pub mag: MagData,
}

pub trait ImuBus: Send {
    fn variant(&self) -> SensorVariant;
    fn read_acc(&mut self) -> Result<AccelData, SensorError>;
    fn read_gyro(&mut self) -> Result<GyroData, SensorError>;
    fn read_mag(&mut self) -> Result<MagData, SensorError>;

    fn read_sample(&mut self) -> Result<ImuSample, SensorError> {
        Ok(ImuSample {
            mag: self.read_mag()?,
            acc: self.read_acc()?,
            gyro: self.read_gyro()?,
        })
    }
}

/// Bus handle shared by the orientation collector and calibration runs.
pub type SharedBus = Arc<Mutex<Box<dyn ImuBus>>>;

pub fn shared(bus: Box<dyn ImuBus>) -> SharedBus {
    Arc::new(Mutex::new(bus))
}

/// Replays a fixed sequence of samples or failures.
///
/// Once the script runs out the last successful sample repeats, or the bus
/// reports `ShortRead` if there never was one.
pub struct ScriptedBus {
    variant: SensorVariant,
    script: VecDeque<Result<ImuSample, SensorError>>,
    last: Option<ImuSample>,
}

impl ScriptedBus {
    pub fn new(variant: SensorVariant) -> Self {
        ScriptedBus {
            variant,
            script: VecDeque::new(),
            last: None,
        }
    }

    pub fn push(mut self, sample: ImuSample) -> Self {
        self.script.push_back(Ok(sample));
        self
    }

    pub fn push_error(mut self, error: SensorError) -> Self {
        self.script.push_back(Err(error));
        self
    }

    fn next(&mut self) -> Result<ImuSample, SensorError> {
        match self.script.pop_front() {
            Some(Ok(sample)) => {
                self.last = Some(sample);
                Ok(sample)
            }
            Some(Err(e)) => Err(e),
            None => self.last.ok_or(SensorError::ShortRead {
                expected: 6,
                got: 0,
            }),
        }
    }
}

impl ImuBus for ScriptedBus {
    fn variant(&self) -> SensorVariant {
        self.variant
    }

    fn read_acc(&mut self) -> Result<AccelData, SensorError> {
        Ok(self.next()?.acc)
    }

    fn read_gyro(&mut self) -> Result<GyroData, SensorError> {
        Ok(self.next()?.gyro)
    }

    fn read_mag(&mut self) -> Result<MagData, SensorError> {
        Ok(self.next()?.mag)
    }

    fn read_sample(&mut self) -> Result<ImuSample, SensorError> {
        self.next()
    }
}
