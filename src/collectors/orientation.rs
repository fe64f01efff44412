use std::sync::Arc;
use std::time::Duration;

use super::{pause, RunFlag};
use crate::calibration::{CalibrationMailbox, CalibrationRecord};
use crate::config::NavConfig;
use crate::error::SensorError;
use crate::fusion::{Attitude, HeadingRollFusion};
use crate::health::SourceHealth;
use crate::nav_state::{current_timestamp, SharedNavState};
use crate::retry::{CollectorPhase, RetryBudget, RetryDecision};
use crate::sensor::{SensorVariant, SharedBus};
use crate::types::Source;

/// Result of one orientation cycle
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StepOutcome {
    Published(Attitude),
    /// A calibration run owns the bus
    HeldOff,
    ReadFailed,
    /// Consecutive failures exceeded the budget; the collector is done
    Failed,
}

/// Heading and roll from the local IMU.
///
/// Heading is only written when no other source holds a fresh one, so a
/// GPS course or a network compass always wins while it is alive.
pub struct OrientationCollector {
    bus: SharedBus,
    fusion: HeadingRollFusion,
    calibration: CalibrationRecord,
    mailbox: CalibrationMailbox,
    state: SharedNavState,
    health: Arc<SourceHealth>,
    interval: Duration,
    recheck_cycles: u32,
    cycles_since_recheck: u32,
    budget: RetryBudget,
    last_sample_at: Option<f64>,
}

impl OrientationCollector {
    pub fn new(
        config: &NavConfig,
        bus: SharedBus,
        calibration: CalibrationRecord,
        mailbox: CalibrationMailbox,
        state: SharedNavState,
        health: Arc<SourceHealth>,
    ) -> Self {
        let variant = bus
            .lock()
            .map(|bus| bus.variant())
            .unwrap_or(SensorVariant::Lsm9ds1);
        let fusion = HeadingRollFusion::new(variant, config);
        log::info!(
            "[orientation] {} with {} tilt compensation",
            variant.name(),
            fusion.tilt_name()
        );

        OrientationCollector {
            bus,
            fusion,
            calibration,
            mailbox,
            state,
            health,
            interval: config.orientation_interval(),
            recheck_cycles: config.calibration_recheck_cycles.max(1),
            cycles_since_recheck: 0,
            budget: RetryBudget::new(
                "orientation",
                Some(config.orientation_max_failures),
                config.orientation_interval(),
            ),
            last_sample_at: None,
        }
    }

    pub fn calibration(&self) -> &CalibrationRecord {
        &self.calibration
    }

    /// Pick up a record deposited by a finished calibration run.
    fn recheck_calibration(&mut self) {
        if let Some(record) = self.mailbox.take() {
            log::info!(
                "[orientation] new calibration: declination {:.2}°, heading offset {:.1}°",
                record.declination,
                record.heading_offset
            );
            self.calibration = record;
            self.fusion.reset();
        }
    }

    /// One read-fuse-publish cycle at time `now` (seconds).
    pub fn step(&mut self, now: f64) -> StepOutcome {
        if self.mailbox.is_active() {
            self.last_sample_at = None;
            return StepOutcome::HeldOff;
        }

        self.cycles_since_recheck += 1;
        if self.cycles_since_recheck >= self.recheck_cycles {
            self.cycles_since_recheck = 0;
            self.recheck_calibration();
        }

        let sample = match self.bus.lock() {
            Ok(mut bus) => bus.read_sample(),
            Err(_) => Err(SensorError::Busy),
        };
        let sample = match sample {
            Ok(sample) => sample,
            Err(e) => return self.on_read_failure(e),
        };

        self.budget.record_success();
        self.health.set_phase(CollectorPhase::Reading);

        let dt = self
            .last_sample_at
            .map(|t| now - t)
            .filter(|dt| *dt > 0.0)
            .unwrap_or(self.interval.as_secs_f64());
        self.last_sample_at = Some(now);

        let attitude = self.fusion.update(&sample, &self.calibration, dt);
        let stale = self.state.stale_after();
        if let Some(heading) = attitude.heading_deg {
            self.state
                .heading
                .store_if_vacant(heading, Source::Orientation, now, stale);
        }
        self.state
            .roll
            .store_if_vacant(attitude.roll_deg, Source::Orientation, now, stale);
        self.state.sensor.touch(Source::Orientation, now);
        self.health.record_accepted();

        StepOutcome::Published(attitude)
    }

    fn on_read_failure(&mut self, error: SensorError) -> StepOutcome {
        self.health.record_failure();
        log::debug!("[orientation] read failed: {}", error);
        match self.budget.record_failure() {
            RetryDecision::RetryAfter(_) => {
                self.health.set_phase(CollectorPhase::BackingOff);
                StepOutcome::ReadFailed
            }
            RetryDecision::Exhausted => {
                self.health.set_phase(CollectorPhase::Failed);
                log::error!(
                    "[orientation] sensor unreadable ({}), heading and roll will go stale",
                    self.budget.status()
                );
                StepOutcome::Failed
            }
        }
    }

    /// Blocking loop, one step per interval.
    pub fn run(mut self, run: RunFlag) {
        self.health.set_phase(CollectorPhase::Reading);
        while run.is_running() {
            if self.step(current_timestamp()) == StepOutcome::Failed {
                return;
            }
            pause(&run, self.interval);
        }
        log::info!("[orientation] stopped");
    }
}
