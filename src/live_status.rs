use chrono::Utc;
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::health::{HealthMonitor, SourceReport};
use crate::nav_state::{current_timestamp, NavSnapshot, NavState};

/// Contents of `live_status.json`, rewritten on every status tick.
#[derive(Serialize, Clone)]
pub struct LiveStatus {
    pub timestamp: f64,
    /// RFC 3339 rendering of `timestamp`
    pub updated_at: String,
    pub uptime_seconds: u64,
    pub navigation: NavSnapshot,
    pub sources: Vec<SourceReport>,
    pub calibration_running: bool,
}

impl LiveStatus {
    pub fn collect(
        state: &NavState,
        health: &HealthMonitor,
        uptime_seconds: u64,
        calibration_running: bool,
    ) -> Self {
        let now = current_timestamp();
        Self {
            timestamp: now,
            updated_at: Utc::now().to_rfc3339(),
            uptime_seconds,
            navigation: state.snapshot(now),
            sources: health.check_health(),
            calibration_running,
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        // Write-then-rename so readers never see a half-written file
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)
    }
}
