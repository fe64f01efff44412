use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::retry::CollectorPhase;
use crate::types::Source;

/// Health counters for one collector
#[derive(Debug)]
pub struct SourceHealth {
    pub source: Source,
    pub silence_threshold: Duration,
    phase: Mutex<CollectorPhase>,
    last_update: Mutex<Option<Instant>>,
    accepted: AtomicU64,
    rejected: AtomicU64,
    failures: AtomicU64,
}

impl SourceHealth {
    pub fn new(source: Source, silence_threshold: Duration) -> Self {
        SourceHealth {
            source,
            silence_threshold,
            phase: Mutex::new(CollectorPhase::Connecting),
            last_update: Mutex::new(None),
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn set_phase(&self, phase: CollectorPhase) {
        if let Ok(mut current) = self.phase.lock() {
            if *current != phase {
                log::debug!("[{}] {} -> {}", self.source, current.as_str(), phase.as_str());
                *current = phase;
            }
        }
    }

    pub fn phase(&self) -> CollectorPhase {
        self.phase
            .lock()
            .map(|p| *p)
            .unwrap_or(CollectorPhase::Failed)
    }

    /// A sentence or sample made it into the shared state
    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut time) = self.last_update.lock() {
            *time = Some(Instant::now());
        }
    }

    /// A sentence failed framing or checksum validation
    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn time_since_last_update(&self) -> Option<Duration> {
        self.last_update
            .lock()
            .ok()
            .and_then(|t| t.map(|t| t.elapsed()))
    }

    pub fn is_silent(&self) -> bool {
        self.time_since_last_update()
            .map(|d| d > self.silence_threshold)
            .unwrap_or(true)
    }

    pub fn report(&self) -> SourceReport {
        SourceReport {
            source: self.source,
            phase: self.phase(),
            healthy: !self.is_silent() && !self.phase().is_terminal(),
            silence_secs: self.time_since_last_update().map(|d| d.as_secs_f64()),
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time health of one source, serialized into the status file.
#[derive(Clone, Debug, Serialize)]
pub struct SourceReport {
    pub source: Source,
    pub phase: CollectorPhase,
    pub healthy: bool,
    pub silence_secs: Option<f64>,
    pub accepted: u64,
    pub rejected: u64,
    pub failures: u64,
}

impl SourceReport {
    fn short(&self) -> String {
        match (self.phase, self.silence_secs) {
            (CollectorPhase::Failed, _) => "✗ failed".to_string(),
            (CollectorPhase::Reading, Some(_)) if self.healthy => "✓".to_string(),
            (phase, Some(s)) => format!("⚠ {} (silent {:.1}s)", phase.as_str(), s),
            (phase, None) => format!("⚠ {} (no data)", phase.as_str()),
        }
    }
}

/// Health of all three collectors
#[derive(Debug)]
pub struct HealthMonitor {
    pub serial: Arc<SourceHealth>,
    pub network: Arc<SourceHealth>,
    pub orientation: Arc<SourceHealth>,
}

impl HealthMonitor {
    pub fn new(silence_threshold: Duration) -> Self {
        HealthMonitor {
            serial: Arc::new(SourceHealth::new(Source::Serial, silence_threshold)),
            network: Arc::new(SourceHealth::new(Source::Network, silence_threshold)),
            orientation: Arc::new(SourceHealth::new(Source::Orientation, silence_threshold)),
        }
    }

    pub fn check_health(&self) -> Vec<SourceReport> {
        vec![
            self.serial.report(),
            self.network.report(),
            self.orientation.report(),
        ]
    }

    /// One-line status for the periodic log
    pub fn format_status(&self) -> String {
        let parts: Vec<String> = self
            .check_health()
            .iter()
            .map(|r| format!("{} {}", r.source, r.short()))
            .collect();
        format!("Health: {}", parts.join(" | "))
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new(Duration::from_secs(4))
    }
}
