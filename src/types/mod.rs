use serde::{Deserialize, Serialize};

/// Knots to metres per second
pub const KNOTS_TO_MS: f64 = 0.514_444;
/// Kilometres per hour to metres per second
pub const KMH_TO_MS: f64 = 1.0 / 3.6;

/// One raw 3-axis register read (LSB units, as the sensor reports them).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTriple {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl RawTriple {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        RawTriple { x, y, z }
    }

    /// Decode three little-endian i16 words.
    pub fn from_le_bytes(block: &[u8; 6]) -> Self {
        RawTriple {
            x: i16::from_le_bytes([block[0], block[1]]) as i32,
            y: i16::from_le_bytes([block[2], block[3]]) as i32,
            z: i16::from_le_bytes([block[4], block[5]]) as i32,
        }
    }
}

pub type AccelData = RawTriple;
pub type GyroData = RawTriple;
pub type MagData = RawTriple;

/// Producer of a stored value
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Serial,
    Network,
    Orientation,
}

impl Source {
    pub fn tag(&self) -> &'static str {
        match self {
            Source::Serial => "serial",
            Source::Network => "network",
            Source::Orientation => "orientation",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Latitude/longitude exactly as the talker sent them (`ddmm.mmmm`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: String,
    pub lat_hemisphere: String,
    pub longitude: String,
    pub lon_hemisphere: String,
}

impl Position {
    /// Signed decimal degrees `(lat, lon)`, `None` when either part is
    /// missing or out of range.
    pub fn to_decimal_degrees(&self) -> Option<(f64, f64)> {
        let lat = sexagesimal_to_degrees(&self.latitude, 90.0)?;
        let lon = sexagesimal_to_degrees(&self.longitude, 180.0)?;
        let lat = match self.lat_hemisphere.as_str() {
            "S" => -lat,
            _ => lat,
        };
        let lon = match self.lon_hemisphere.as_str() {
            "W" => -lon,
            _ => lon,
        };
        Some((lat, lon))
    }
}

/// `dddmm.mmmm` to degrees.
fn sexagesimal_to_degrees(raw: &str, limit: f64) -> Option<f64> {
    let value: f64 = raw.trim().parse().ok()?;
    if value < 0.0 {
        return None;
    }
    let degrees = (value / 100.0).trunc();
    let minutes = value - degrees * 100.0;
    let decimal = degrees + minutes / 60.0;
    if decimal > limit || minutes >= 60.0 {
        return None;
    }
    Some(decimal)
}

/// Which side of the bow the apparent wind comes from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindSide {
    /// Angle measured clockwise from the bow (0..=180)
    #[default]
    Starboard,
    /// Angle mirrored from a 180..360 report
    Port,
}

/// Wind normalized to a 0..=180 angle, a side flag and m/s.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WindReading {
    pub angle_deg: f64,
    pub side: WindSide,
    pub speed_ms: f64,
}

impl WindReading {
    /// Fold a 0..360 clockwise angle into 0..=180 plus side.
    pub fn from_clockwise(angle_deg: f64, speed_ms: f64) -> Self {
        let angle = angle_deg.rem_euclid(360.0);
        if angle > 180.0 {
            WindReading {
                angle_deg: 360.0 - angle,
                side: WindSide::Port,
                speed_ms,
            }
        } else {
            WindReading {
                angle_deg: angle,
                side: WindSide::Starboard,
                speed_ms,
            }
        }
    }

    /// Clockwise angle 0..360 from the bow.
    pub fn clockwise_deg(&self) -> f64 {
        match self.side {
            WindSide::Starboard => self.angle_deg,
            WindSide::Port => (360.0 - self.angle_deg).rem_euclid(360.0),
        }
    }
}

/// True wind, clockwise from the bow.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrueWind {
    pub angle_deg: f64,
    pub speed_ms: f64,
}

/// A tagged electrical or thermal channel from the vendor telemetry sentence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TaggedReading {
    pub value: f64,
    /// Bank number for electrical channels, location code for temperature
    pub tag: i64,
}

/// Energy counters reported alongside the electrical channels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EnergyCounters {
    pub charged_kwh: f64,
    pub consumed_kwh: f64,
    /// Unix time the telemetry server started
    pub server_start: i64,
}

/// UTC time-of-day and date from an RMC sentence (`hhmmss.ss`, `ddmmyy`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtcFix {
    pub time: String,
    pub date: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_raw_triple_from_le_bytes() {
        let t = RawTriple::from_le_bytes(&[0x00, 0x40, 0xff, 0xff, 0x00, 0x80]);
        assert_eq!(t, RawTriple::new(16384, -1, -32768));
    }

    #[test]
    fn test_position_to_decimal() {
        let p = Position {
            latitude: "4807.038".into(),
            lat_hemisphere: "N".into(),
            longitude: "01131.000".into(),
            lon_hemisphere: "W".into(),
        };
        let (lat, lon) = p.to_decimal_degrees().unwrap();
        assert_abs_diff_eq!(lat, 48.1173, epsilon = 1e-4);
        assert_abs_diff_eq!(lon, -11.516_666, epsilon = 1e-4);
    }

    #[test]
    fn test_position_rejects_garbage() {
        let p = Position {
            latitude: "".into(),
            lat_hemisphere: "N".into(),
            longitude: "01131.000".into(),
            lon_hemisphere: "E".into(),
        };
        assert!(p.to_decimal_degrees().is_none());

        let p = Position {
            latitude: "9907.0".into(),
            lat_hemisphere: "N".into(),
            longitude: "01131.000".into(),
            lon_hemisphere: "E".into(),
        };
        assert!(p.to_decimal_degrees().is_none());
    }

    #[test]
    fn test_wind_fold() {
        let w = WindReading::from_clockwise(200.0, 5.0);
        assert_abs_diff_eq!(w.angle_deg, 160.0);
        assert_eq!(w.side, WindSide::Port);
        assert_abs_diff_eq!(w.clockwise_deg(), 200.0);

        let w = WindReading::from_clockwise(45.0, 5.0);
        assert_abs_diff_eq!(w.angle_deg, 45.0);
        assert_eq!(w.side, WindSide::Starboard);

        let w = WindReading::from_clockwise(180.0, 1.0);
        assert_eq!(w.side, WindSide::Starboard);
    }
}
