//! Long-lived producers feeding the shared navigation state.
//!
//! Each collector owns its link, turns bytes or samples into stores on
//! [`NavState`], and reports its phase through [`SourceHealth`]. The
//! sentence-driven collectors share the arbitration rules in [`Arbiter`].

pub mod network;
pub mod orientation;
pub mod serial;

pub use network::NetworkCollector;
pub use orientation::{OrientationCollector, StepOutcome};
pub use serial::{Intake, SerialCollector};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::SharedTimeSink;
use crate::config::NavConfig;
use crate::fusion::true_wind;
use crate::health::SourceHealth;
use crate::nav_state::NavState;
use crate::nmea::{DepthKind, EnvTelemetry, NavMessage, SentenceFramer};
use crate::types::{Source, WindReading, KNOTS_TO_MS};

/// Below this the ENV voltage channel is considered disconnected
const MIN_VALID_VOLTAGE: f64 = 8.0;
/// ENV temperature reported when no probe is fitted
const TEMPERATURE_ABSENT: f64 = 100.0;

/// Cooperative "keep running" flag shared by all collectors.
#[derive(Clone, Debug)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    pub fn new() -> Self {
        RunFlag(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn stop(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}

const PAUSE_SLICE: Duration = Duration::from_millis(100);

/// Sleep up to `duration`, waking early once `run` is cleared.
pub fn pause(run: &RunFlag, duration: Duration) {
    let mut left = duration;
    while !left.is_zero() && run.is_running() {
        let step = left.min(PAUSE_SLICE);
        std::thread::sleep(step);
        left -= step;
    }
}

/// Async twin of [`pause`].
pub async fn pause_async(run: &RunFlag, duration: Duration) {
    let mut left = duration;
    while !left.is_zero() && run.is_running() {
        let step = left.min(PAUSE_SLICE);
        tokio::time::sleep(step).await;
        left -= step;
    }
}

/// Per-source arbitration of decoded sentences into the shared state.
///
/// Secondary sentences (GLL, VTG, HDx, DBT, VWR) defer to their primary
/// counterpart from the same source for half a staleness window. Speed
/// over ground below the trusted threshold never refreshes the course.
pub struct Arbiter {
    source: Source,
    stale_after: f64,
    half_window: f64,
    trusted_speed_knots: f64,
    true_wind_min_stw_knots: f64,
    clock: Option<SharedTimeSink>,

    rmc_position_at: Option<f64>,
    rmc_course_at: Option<f64>,
    dpt_at: Option<f64>,
    mwv_at: Option<f64>,
    mwv_true_at: Option<f64>,
}

impl Arbiter {
    pub fn new(source: Source, config: &NavConfig) -> Self {
        Arbiter {
            source,
            stale_after: config.stale_after_secs,
            half_window: config.half_window_secs(),
            trusted_speed_knots: config.trusted_speed_knots,
            true_wind_min_stw_knots: config.true_wind_min_stw_knots,
            clock: None,
            rmc_position_at: None,
            rmc_course_at: None,
            dpt_at: None,
            mwv_at: None,
            mwv_true_at: None,
        }
    }

    /// RMC time from this source is offered to `clock`.
    pub fn with_clock(mut self, clock: SharedTimeSink) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn source(&self) -> Source {
        self.source
    }

    fn within_half_window(&self, stamp: Option<f64>, now: f64) -> bool {
        stamp.is_some_and(|t| now - t < self.half_window)
    }

    fn is_trusted_speed(&self, sog_knots: Option<f64>) -> bool {
        sog_knots.is_some_and(|s| s >= self.trusted_speed_knots)
    }

    /// Apply one decoded message. Returns whether any field was stored.
    pub fn apply(&mut self, state: &NavState, message: &NavMessage, now: f64) -> bool {
        let source = self.source;
        match message {
            NavMessage::Rmc {
                utc,
                valid,
                position,
                sog_knots,
                cog_deg,
            } => {
                state.gps_fix.touch(source, now);
                let mut stored = state.utc.store(utc.clone(), source, now);
                // Status V carries whatever the receiver RTC holds
                if !valid {
                    return stored;
                }
                if let Some(clock) = &self.clock {
                    clock.offer(utc);
                }
                if let Some(position) = position {
                    stored |= state.position.store(position.clone(), source, now);
                    self.rmc_position_at = Some(now);
                }
                if let Some(sog) = sog_knots {
                    stored |= state.sog.store(*sog, source, now);
                }
                if position.is_some() || sog_knots.is_some() {
                    self.mark_network_fix(state, now);
                }
                if self.is_trusted_speed(*sog_knots) {
                    self.rmc_course_at = Some(now);
                    if let Some(cog) = cog_deg.filter(|c| *c != 0.0) {
                        stored |= state.heading.store(cog, source, now);
                    }
                }
                stored
            }
            NavMessage::Gll { position } => {
                if self.within_half_window(self.rmc_position_at, now) {
                    return false;
                }
                match position {
                    Some(position) => {
                        self.mark_network_fix(state, now);
                        state.position.store(position.clone(), source, now)
                    }
                    None => false,
                }
            }
            NavMessage::Vtg { cog_deg, sog_knots } => {
                if self.within_half_window(self.rmc_course_at, now) {
                    return false;
                }
                let mut stored = false;
                if let Some(sog) = sog_knots {
                    self.mark_network_fix(state, now);
                    stored |= state.sog.store(*sog, source, now);
                }
                if self.is_trusted_speed(*sog_knots) {
                    if let Some(cog) = cog_deg.filter(|c| *c != 0.0) {
                        stored |= state.heading.store(cog, source, now);
                    }
                }
                stored
            }
            NavMessage::Heading { degrees, .. } => {
                if self.within_half_window(self.rmc_course_at, now) {
                    return false;
                }
                state.heading.store(*degrees, source, now)
            }
            NavMessage::WaterSpeed { stw_knots } => {
                if *stw_knots == 0.0 {
                    return false;
                }
                state.stw.store(*stw_knots, source, now)
            }
            NavMessage::Depth { kind, metres } => match kind {
                DepthKind::Dpt => {
                    self.dpt_at = Some(now);
                    state.depth.store(*metres, source, now)
                }
                DepthKind::Dbt => {
                    if self.within_half_window(self.dpt_at, now) {
                        return false;
                    }
                    state.depth.store(*metres, source, now)
                }
            },
            NavMessage::WaterTemperature { celsius } => {
                state.water_temp.store(*celsius, source, now)
            }
            NavMessage::RelativeWind { wind, legacy } => {
                if *legacy {
                    if self.within_half_window(self.mwv_at, now) {
                        return false;
                    }
                } else {
                    self.mwv_at = Some(now);
                }
                let stored = state.wind_relative.store(*wind, source, now);
                self.derive_true_wind(state, wind, now);
                stored
            }
            NavMessage::TrueWind(tw) => {
                self.mwv_true_at = Some(now);
                state.wind_true.store(*tw, source, now)
            }
            NavMessage::Environment(env) => self.apply_environment(state, env, now),
        }
    }

    /// Only called once a GPS slot is written, so a fixless feed never
    /// silences the serial receiver.
    fn mark_network_fix(&self, state: &NavState, now: f64) {
        if self.source == Source::Network {
            state.network_fix.touch(self.source, now);
        }
    }

    fn derive_true_wind(&self, state: &NavState, apparent: &WindReading, now: f64) {
        if self.within_half_window(self.mwv_true_at, now) {
            return;
        }
        let Some(stw) = state.stw.fresh(now, self.stale_after) else {
            return;
        };
        if stw <= self.true_wind_min_stw_knots {
            return;
        }
        let tw = true_wind(apparent, stw * KNOTS_TO_MS);
        state.wind_true.store(tw, self.source, now);
    }

    fn apply_environment(&self, state: &NavState, env: &EnvTelemetry, now: f64) -> bool {
        let source = self.source;
        let mut stored = false;
        if let Some(voltage) = env.voltage.filter(|v| v.value >= MIN_VALID_VOLTAGE) {
            stored |= state.voltage.store(voltage, source, now);
        }
        if let Some(current) = env.current {
            stored |= state.current.store(current, source, now);
        }
        if let Some(temp) = env.temperature.filter(|t| t.value != TEMPERATURE_ABSENT) {
            stored |= state.temperature.store(temp, source, now);
        }
        if let Some(energy) = env.energy {
            stored |= state.energy.store(energy, source, now);
        }
        stored
    }
}

/// Framer plus arbiter for one byte-stream source.
pub struct SentencePipeline {
    pub framer: SentenceFramer,
    pub arbiter: Arbiter,
}

impl SentencePipeline {
    pub fn new(arbiter: Arbiter) -> Self {
        SentencePipeline {
            framer: SentenceFramer::new(),
            arbiter,
        }
    }

    /// Frame, decode and apply everything complete in `bytes`.
    ///
    /// `accept` filters decoded messages this source is allowed to
    /// publish. Returns the number of messages that stored something.
    pub fn feed(
        &mut self,
        bytes: &[u8],
        state: &NavState,
        health: &SourceHealth,
        now: f64,
        accept: impl Fn(&NavMessage) -> bool,
    ) -> usize {
        self.framer.push(bytes);
        let mut applied = 0;
        while let Some(frame) = self.framer.next_sentence() {
            let sentence = match frame {
                Ok(sentence) => sentence,
                Err(e) => {
                    log::debug!("[{}] dropped sentence: {}", self.arbiter.source(), e);
                    health.record_rejected();
                    continue;
                }
            };
            let Some(message) = NavMessage::decode(&sentence) else {
                continue;
            };
            if !accept(&message) {
                continue;
            }
            if self.arbiter.apply(state, &message, now) {
                applied += 1;
                health.record_accepted();
            }
        }
        applied
    }

    pub fn reset(&mut self) {
        self.framer.clear();
    }
}
