use nalgebra::Vector3;

use crate::types::RawTriple;

/// Exponential low-pass filter applied independently to each axis.
///
/// `out = factor * raw + (1 - factor) * previous`. A smaller factor smooths
/// harder. The first sample seeds the filter so startup does not ramp from
/// zero.
#[derive(Clone, Debug)]
pub struct LowPass3 {
    factor: f64,
    state: Option<Vector3<f64>>,
}

impl LowPass3 {
    pub fn new(factor: f64) -> Self {
        LowPass3 {
            factor: factor.clamp(0.0, 1.0),
            state: None,
        }
    }

    pub fn apply(&mut self, raw: RawTriple) -> Vector3<f64> {
        let sample = Vector3::new(raw.x as f64, raw.y as f64, raw.z as f64);
        let filtered = match self.state {
            Some(prev) => sample * self.factor + prev * (1.0 - self.factor),
            None => sample,
        };
        self.state = Some(filtered);
        filtered
    }

    pub fn current(&self) -> Option<Vector3<f64>> {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = None;
    }
}
