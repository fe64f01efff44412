// config.rs - Tunables for collectors, fusion and calibration
//
// Every constant the collectors use lives here so a deployment can override
// it from a JSON file. Missing keys keep their defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    // ── Arbitration ──
    /// Seconds after which a stored value is stale
    pub stale_after_secs: f64,
    /// Below this speed over ground (knots) course is not trusted
    pub trusted_speed_knots: f64,
    /// Minimum speed through water (knots) for true-wind derivation
    pub true_wind_min_stw_knots: f64,

    // ── Serial collector ──
    pub serial_device: String,
    pub serial_baud: u32,
    pub serial_read_timeout_ms: u64,
    /// Reads discarded right after the port opens
    pub serial_settle_reads: u32,
    /// Pause while the network holds GPS precedence
    pub serial_yield_ms: u64,

    // ── Network collector ──
    pub net_host: String,
    pub net_port: u16,
    pub net_connect_timeout_ms: u64,
    pub net_read_timeout_ms: u64,
    /// Empty polls tolerated before forcing a reconnect
    pub net_inactivity_limit: u32,

    // ── Orientation collector ──
    pub i2c_bus: u8,
    pub orientation_interval_ms: u64,
    /// Consecutive bus failures tolerated before the collector stops
    pub orientation_max_failures: u32,
    /// Cycles between calibration mailbox checks
    pub calibration_recheck_cycles: u32,

    // ── Fusion ──
    pub mag_lpf_factor: f64,
    pub acc_lpf_factor: f64,
    pub heading_dead_band_deg: f64,
    /// Gyro sensitivity, deg/s per LSB
    pub gyro_gain: f64,
    pub roll_blend: f64,

    // ── Calibration ──
    pub calibration_window_secs: u64,
    pub calibration_sample_ms: u64,
    pub declination_timeout_secs: u64,
    pub declination_url: String,
    /// Optional API key for the declination service
    pub declination_key: Option<String>,

    // ── Reconnect policy ──
    pub retry_base_cooldown_ms: u64,
    /// `None` keeps retrying forever
    pub retry_max_attempts: Option<u32>,

    // ── Clock ──
    pub clock_max_attempts: u32,
    pub clock_max_backward_secs: i64,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: 4.0,
            trusted_speed_knots: 2.5,
            true_wind_min_stw_knots: 0.9,
            serial_device: "/dev/ttyS0".to_string(),
            serial_baud: 9600,
            serial_read_timeout_ms: 1000,
            serial_settle_reads: 3,
            serial_yield_ms: 1000,
            net_host: "127.0.0.1".to_string(),
            net_port: 10110,
            net_connect_timeout_ms: 5000,
            net_read_timeout_ms: 3000,
            net_inactivity_limit: 10,
            i2c_bus: 1,
            orientation_interval_ms: 250,
            orientation_max_failures: 3,
            calibration_recheck_cycles: 26,
            mag_lpf_factor: 0.1,
            acc_lpf_factor: 0.4,
            heading_dead_band_deg: 2.0,
            gyro_gain: 0.070,
            roll_blend: 0.97,
            calibration_window_secs: 60,
            calibration_sample_ms: 25,
            declination_timeout_secs: 6,
            declination_url:
                "https://www.ngdc.noaa.gov/geomag-web/calculators/calculateDeclination".to_string(),
            declination_key: None,
            retry_base_cooldown_ms: 2000,
            retry_max_attempts: None,
            clock_max_attempts: 20,
            clock_max_backward_secs: 10,
        }
    }
}

impl NavConfig {
    /// Load overrides from a JSON file on top of the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Deferral window for secondary sentences within one source.
    pub fn half_window_secs(&self) -> f64 {
        self.stale_after_secs / 2.0
    }

    pub fn orientation_interval(&self) -> Duration {
        Duration::from_millis(self.orientation_interval_ms)
    }

    pub fn retry_base_cooldown(&self) -> Duration {
        Duration::from_millis(self.retry_base_cooldown_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NavConfig::default();
        assert_eq!(config.stale_after_secs, 4.0);
        assert_eq!(config.half_window_secs(), 2.0);
        assert_eq!(config.orientation_interval(), Duration::from_millis(250));
        // Smaller factor smooths harder, the magnetometer is the noisier axis set
        assert!(config.mag_lpf_factor < config.acc_lpf_factor);
    }

    #[test]
    fn test_partial_override() {
        let config = NavConfig::from_json(r#"{ "net_port": 2000, "stale_after_secs": 6.0 }"#)
            .unwrap();
        assert_eq!(config.net_port, 2000);
        assert_eq!(config.stale_after_secs, 6.0);
        assert_eq!(config.serial_baud, 9600);
    }

    #[test]
    fn test_bad_json_is_error() {
        assert!(NavConfig::from_json("{ not json").is_err());
    }
}
