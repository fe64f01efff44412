use nalgebra::Vector3;

use super::low_pass::LowPass3;
use super::tilt::TiltCompensation;
use crate::calibration::CalibrationRecord;
use crate::types::{AccelData, MagData};

/// Pitch/roll from gravity plus the resulting compass heading.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TiltHeading {
    /// radians
    pub pitch: f64,
    /// radians
    pub roll: f64,
    /// degrees in [0, 360), before hysteresis
    pub heading_deg: f64,
}

/// Tilt-compensated heading from filtered accelerometer and magnetometer
/// vectors. `None` when the accelerometer reads a zero vector.
pub fn tilt_compensated_heading(
    mag: &Vector3<f64>,
    acc: &Vector3<f64>,
    calib: &CalibrationRecord,
    tilt: &dyn TiltCompensation,
) -> Option<TiltHeading> {
    let norm = acc.norm();
    if norm <= f64::EPSILON {
        return None;
    }
    let mag = mag - calib.bounds.hard_iron_offset();

    let pitch = (acc.x / norm).clamp(-1.0, 1.0).asin();
    let cos_pitch = pitch.cos();
    let roll = if cos_pitch.abs() <= f64::EPSILON {
        0.0
    } else {
        -((acc.y / norm) / cos_pitch).clamp(-1.0, 1.0).asin()
    };

    let (x, y) = tilt.compensate(&mag, pitch, roll);
    let heading_deg =
        (y.atan2(x).to_degrees() + calib.declination + calib.heading_offset).rem_euclid(360.0);

    Some(TiltHeading {
        pitch,
        roll,
        heading_deg,
    })
}

/// Signed shortest difference `a - b` on the circle, in (-180, 180].
pub fn angle_difference(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(360.0);
    if d > 180.0 {
        d - 360.0
    } else {
        d
    }
}

/// Low-pass filtered, tilt compensated compass with a dead-band.
pub struct HeadingFusion {
    mag_filter: LowPass3,
    acc_filter: LowPass3,
    tilt: Box<dyn TiltCompensation>,
    dead_band_deg: f64,
    accepted: Option<f64>,
}

impl HeadingFusion {
    pub fn new(
        tilt: Box<dyn TiltCompensation>,
        mag_factor: f64,
        acc_factor: f64,
        dead_band_deg: f64,
    ) -> Self {
        HeadingFusion {
            mag_filter: LowPass3::new(mag_factor),
            acc_filter: LowPass3::new(acc_factor),
            tilt,
            dead_band_deg,
            accepted: None,
        }
    }

    pub fn tilt_name(&self) -> &'static str {
        self.tilt.name()
    }

    /// Feed one raw sample, returning the held or newly accepted heading.
    pub fn update(
        &mut self,
        mag: MagData,
        acc: AccelData,
        calib: &CalibrationRecord,
    ) -> Option<f64> {
        let mag = self.mag_filter.apply(mag);
        let acc = self.acc_filter.apply(acc);
        let fresh = tilt_compensated_heading(&mag, &acc, calib, self.tilt.as_ref())?;
        Some(self.apply_dead_band(fresh.heading_deg))
    }

    /// Accept `heading` only if it moved at least the dead-band away from
    /// the last accepted value, otherwise keep the old one.
    pub fn apply_dead_band(&mut self, heading: f64) -> f64 {
        match self.accepted {
            Some(current) if angle_difference(heading, current).abs() < self.dead_band_deg => {
                current
            }
            _ => {
                self.accepted = Some(heading);
                heading
            }
        }
    }

    pub fn accepted(&self) -> Option<f64> {
        self.accepted
    }

    /// Drop filter history, used after a new calibration lands.
    pub fn reset(&mut self) {
        self.mag_filter.reset();
        self.acc_filter.reset();
        self.accepted = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::HardIronBounds;
    use crate::fusion::tilt::{Lsm9ds0Tilt, Lsm9ds1Tilt};
    use crate::types::RawTriple;
    use approx::assert_abs_diff_eq;

    fn centred_calibration() -> CalibrationRecord {
        CalibrationRecord {
            bounds: HardIronBounds {
                x_min: -1000,
                x_max: 1000,
                y_min: -1000,
                y_max: 1000,
                z_min: -1000,
                z_max: 1000,
            },
            declination: 0.0,
            heading_offset: 0.0,
            roll_offset: 0.0,
        }
    }

    #[test]
    fn test_level_heading_is_plain_atan2() {
        let calib = CalibrationRecord {
            bounds: HardIronBounds {
                x_min: -200,
                x_max: 400,
                y_min: -600,
                y_max: 200,
                z_min: -100,
                z_max: 100,
            },
            ..centred_calibration()
        };
        let acc = Vector3::new(0.0, 0.0, 16384.0);
        let mag = Vector3::new(350.0, 150.0, 40.0);

        let out = tilt_compensated_heading(&mag, &acc, &calib, &Lsm9ds1Tilt).unwrap();
        assert_abs_diff_eq!(out.pitch, 0.0);
        assert_abs_diff_eq!(out.roll, 0.0);
        // Hard-iron midpoints are (100, -200, 0)
        let expected = (150.0_f64 + 200.0).atan2(350.0 - 100.0).to_degrees();
        assert_abs_diff_eq!(out.heading_deg, expected, epsilon = 1e-9);
    }

    #[test]
    fn test_declination_and_offset_folded() {
        let calib = CalibrationRecord {
            declination: 5.0,
            heading_offset: -10.0,
            ..centred_calibration()
        };
        let acc = Vector3::new(0.0, 0.0, 1.0);
        // Pointing at 0°, shifted by -5° lands at 355°
        let mag = Vector3::new(500.0, 0.0, 0.0);
        let out = tilt_compensated_heading(&mag, &acc, &calib, &Lsm9ds0Tilt).unwrap();
        assert_abs_diff_eq!(out.heading_deg, 355.0, epsilon = 1e-9);
    }

    #[test]
    fn test_zero_gravity_vector_rejected() {
        let out = tilt_compensated_heading(
            &Vector3::new(1.0, 1.0, 1.0),
            &Vector3::zeros(),
            &centred_calibration(),
            &Lsm9ds0Tilt,
        );
        assert!(out.is_none());
    }

    #[test]
    fn test_dead_band_holds_small_jitter() {
        let mut fusion = HeadingFusion::new(Box::new(Lsm9ds1Tilt), 0.1, 0.4, 2.0);
        assert_eq!(fusion.apply_dead_band(90.0), 90.0);
        for jitter in [90.5, 89.2, 91.9, 88.1, 90.0] {
            assert_eq!(fusion.apply_dead_band(jitter), 90.0);
        }
        assert_eq!(fusion.apply_dead_band(92.5), 92.5);
    }

    #[test]
    fn test_dead_band_across_north() {
        let mut fusion = HeadingFusion::new(Box::new(Lsm9ds1Tilt), 0.1, 0.4, 2.0);
        fusion.apply_dead_band(359.5);
        assert_eq!(fusion.apply_dead_band(0.5), 359.5);
        assert_eq!(fusion.apply_dead_band(3.0), 3.0);
        assert_abs_diff_eq!(angle_difference(1.0, 359.0), 2.0);
        assert_abs_diff_eq!(angle_difference(359.0, 1.0), -2.0);
    }

    #[test]
    fn test_update_through_filters() {
        let mut fusion = HeadingFusion::new(Box::new(Lsm9ds1Tilt), 0.1, 0.4, 2.0);
        let calib = centred_calibration();
        let heading = fusion
            .update(RawTriple::new(0, 800, 0), RawTriple::new(0, 0, 16384), &calib)
            .unwrap();
        assert_abs_diff_eq!(heading, 90.0, epsilon = 1e-9);
        assert_eq!(fusion.accepted(), Some(heading));
        fusion.reset();
        assert_eq!(fusion.accepted(), None);
    }
}
