use crate::types::{TrueWind, WindReading};

/// True wind from apparent wind and boat speed through water.
///
/// Subtracts the boat's own motion (straight ahead) from the apparent wind
/// vector. Both speeds in m/s; the result angle is clockwise from the bow.
pub fn true_wind(apparent: &WindReading, boat_speed_ms: f64) -> TrueWind {
    let angle = apparent.clockwise_deg().to_radians();
    let along = apparent.speed_ms * angle.cos() - boat_speed_ms;
    let across = apparent.speed_ms * angle.sin();

    TrueWind {
        angle_deg: across.atan2(along).to_degrees().rem_euclid(360.0),
        speed_ms: along.hypot(across),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WindSide;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_stationary_boat_true_equals_apparent() {
        let apparent = WindReading::from_clockwise(60.0, 7.0);
        let tw = true_wind(&apparent, 0.0);
        assert_abs_diff_eq!(tw.angle_deg, 60.0, epsilon = 1e-9);
        assert_abs_diff_eq!(tw.speed_ms, 7.0, epsilon = 1e-9);
    }

    #[test]
    fn test_beam_reach() {
        // Apparent 45° at sqrt(2)*5, boat 5 m/s: true wind 5 m/s on the beam
        let apparent = WindReading {
            angle_deg: 45.0,
            side: WindSide::Starboard,
            speed_ms: 5.0 * 2f64.sqrt(),
        };
        let tw = true_wind(&apparent, 5.0);
        assert_abs_diff_eq!(tw.angle_deg, 90.0, epsilon = 1e-9);
        assert_abs_diff_eq!(tw.speed_ms, 5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_port_side_mirrors() {
        let stbd = true_wind(&WindReading::from_clockwise(40.0, 8.0), 3.0);
        let port = true_wind(&WindReading::from_clockwise(320.0, 8.0), 3.0);
        assert_abs_diff_eq!(port.angle_deg, 360.0 - stbd.angle_deg, epsilon = 1e-9);
        assert_abs_diff_eq!(port.speed_ms, stbd.speed_ms, epsilon = 1e-9);
    }
}
