pub mod heading;
pub mod low_pass;
pub mod roll;
pub mod tilt;
pub mod wind;

pub use heading::{angle_difference, tilt_compensated_heading, HeadingFusion, TiltHeading};
pub use low_pass::LowPass3;
pub use roll::RollFilter;
pub use tilt::{Lsm9ds0Tilt, Lsm9ds1Tilt, TiltCompensation};
pub use wind::true_wind;

use crate::calibration::CalibrationRecord;
use crate::config::NavConfig;
use crate::sensor::{ImuSample, SensorVariant};

/// Fused orientation for one cycle
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Attitude {
    /// degrees [0, 360), `None` if gravity could not be resolved
    pub heading_deg: Option<f64>,
    /// degrees, manual roll offset applied
    pub roll_deg: f64,
}

/// Heading and roll estimation for one detected sensor.
pub struct HeadingRollFusion {
    heading: HeadingFusion,
    roll: RollFilter,
}

impl HeadingRollFusion {
    pub fn new(variant: SensorVariant, config: &NavConfig) -> Self {
        HeadingRollFusion {
            heading: HeadingFusion::new(
                tilt::for_variant(variant),
                config.mag_lpf_factor,
                config.acc_lpf_factor,
                config.heading_dead_band_deg,
            ),
            roll: RollFilter::new(config.gyro_gain, config.roll_blend),
        }
    }

    pub fn update(&mut self, sample: &ImuSample, calib: &CalibrationRecord, dt_secs: f64) -> Attitude {
        let heading_deg = self.heading.update(sample.mag, sample.acc, calib);
        let roll_deg = self.roll.update(sample.acc, sample.gyro, dt_secs) + calib.roll_offset;
        Attitude {
            heading_deg,
            roll_deg,
        }
    }

    pub fn tilt_name(&self) -> &'static str {
        self.heading.tilt_name()
    }

    pub fn reset(&mut self) {
        self.heading.reset();
        self.roll.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawTriple;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_fused_attitude_applies_roll_offset() {
        let config = NavConfig::default();
        let mut fusion = HeadingRollFusion::new(SensorVariant::Lsm9ds1, &config);
        let calib = CalibrationRecord {
            roll_offset: 1.5,
            ..CalibrationRecord::default()
        };
        let sample = ImuSample {
            acc: RawTriple::new(0, 0, 16384),
            gyro: RawTriple::default(),
            mag: RawTriple::new(0, 0, 0),
        };
        let out = fusion.update(&sample, &calib, 0.25);
        assert_abs_diff_eq!(out.roll_deg, 1.5);
        let heading = out.heading_deg.unwrap();
        assert!((0.0..360.0).contains(&heading));
        assert_eq!(fusion.tilt_name(), "LSM9DS1");
    }
}
