use crate::types::{AccelData, GyroData};

/// Complementary filter for roll about the X axis.
///
/// Gyro rate integrated over `dt` gives the short-term response; the
/// accelerometer tilt angle pulls the estimate back over time:
/// `angle = blend * (angle + rate * dt) + (1 - blend) * acc_angle`.
#[derive(Clone, Debug)]
pub struct RollFilter {
    /// deg/s per LSB
    gyro_gain: f64,
    blend: f64,
    angle: Option<f64>,
}

impl RollFilter {
    pub fn new(gyro_gain: f64, blend: f64) -> Self {
        RollFilter {
            gyro_gain,
            blend: blend.clamp(0.0, 1.0),
            angle: None,
        }
    }

    /// Roll in degrees implied by gravity alone.
    pub fn accel_angle(acc: AccelData) -> f64 {
        (acc.y as f64).atan2(acc.z as f64).to_degrees()
    }

    pub fn update(&mut self, acc: AccelData, gyro: GyroData, dt_secs: f64) -> f64 {
        let acc_angle = Self::accel_angle(acc);
        let rate = gyro.x as f64 * self.gyro_gain;

        let angle = match self.angle {
            Some(prev) => {
                self.blend * (prev + rate * dt_secs) + (1.0 - self.blend) * acc_angle
            }
            None => acc_angle,
        };
        self.angle = Some(angle);
        angle
    }

    pub fn angle(&self) -> Option<f64> {
        self.angle
    }

    pub fn reset(&mut self) {
        self.angle = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawTriple;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_level_reads_zero() {
        let mut filter = RollFilter::new(0.070, 0.97);
        let roll = filter.update(RawTriple::new(0, 0, 16384), RawTriple::default(), 0.25);
        assert_abs_diff_eq!(roll, 0.0);
    }

    #[test]
    fn test_seeded_from_accelerometer() {
        let mut filter = RollFilter::new(0.070, 0.97);
        let roll = filter.update(RawTriple::new(0, 16384, 16384), RawTriple::default(), 0.25);
        assert_abs_diff_eq!(roll, 45.0, epsilon = 1e-9);
    }

    #[test]
    fn test_gyro_dominates_short_term() {
        let mut filter = RollFilter::new(0.070, 0.97);
        let level = RawTriple::new(0, 0, 16384);
        filter.update(level, RawTriple::default(), 0.25);

        // 1000 LSB * 0.07 = 70 deg/s for 0.25 s = 17.5 deg
        let roll = filter.update(level, RawTriple::new(1000, 0, 0), 0.25);
        assert_abs_diff_eq!(roll, 0.97 * 17.5, epsilon = 1e-9);
    }

    #[test]
    fn test_converges_to_accelerometer_without_rotation() {
        let mut filter = RollFilter::new(0.070, 0.97);
        filter.update(RawTriple::new(0, 0, 16384), RawTriple::default(), 0.25);
        let heeled = RawTriple::new(0, 5600, 15400);
        let target = RollFilter::accel_angle(heeled);
        let mut roll = 0.0;
        for _ in 0..400 {
            roll = filter.update(heeled, RawTriple::default(), 0.25);
        }
        assert_abs_diff_eq!(roll, target, epsilon = 1e-3);
        assert!(filter.angle().is_some());
    }
}
