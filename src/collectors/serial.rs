use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{ErrorKind, Read};
use std::sync::Arc;
use std::time::Duration;

use super::{pause, Arbiter, RunFlag, SentencePipeline};
use crate::clock::SharedTimeSink;
use crate::config::NavConfig;
use crate::health::SourceHealth;
use crate::nav_state::{current_timestamp, SharedNavState};
use crate::nmea::NavMessage;
use crate::retry::{CollectorPhase, RetryBudget, RetryDecision};
use crate::types::Source;

/// What happened to one serial read
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intake {
    /// Device still settling after open, bytes dropped
    Settling,
    /// Network GPS is active, bytes dropped
    Yielded,
    /// Bytes framed; this many messages stored something
    Applied(usize),
}

/// The serial GPS only publishes position, course and speed.
fn is_gps_message(message: &NavMessage) -> bool {
    matches!(
        message,
        NavMessage::Rmc { .. }
            | NavMessage::Gll { .. }
            | NavMessage::Vtg { .. }
            | NavMessage::Heading { .. }
    )
}

/// Local GPS receiver on a serial line.
pub struct SerialCollector {
    device: String,
    baud: u32,
    read_timeout: Duration,
    settle_reads: u32,
    yield_interval: Duration,
    state: SharedNavState,
    health: Arc<SourceHealth>,
    pipeline: SentencePipeline,
    budget: RetryBudget,
    settle_left: u32,
}

impl SerialCollector {
    pub fn new(
        config: &NavConfig,
        state: SharedNavState,
        health: Arc<SourceHealth>,
        clock: Option<SharedTimeSink>,
    ) -> Self {
        let mut arbiter = Arbiter::new(Source::Serial, config);
        if let Some(clock) = clock {
            arbiter = arbiter.with_clock(clock);
        }
        SerialCollector {
            device: config.serial_device.clone(),
            baud: config.serial_baud,
            read_timeout: Duration::from_millis(config.serial_read_timeout_ms),
            settle_reads: config.serial_settle_reads,
            yield_interval: Duration::from_millis(config.serial_yield_ms),
            state,
            health,
            pipeline: SentencePipeline::new(arbiter),
            budget: RetryBudget::new(
                "serial",
                config.retry_max_attempts,
                config.retry_base_cooldown(),
            ),
            settle_left: config.serial_settle_reads,
        }
    }

    /// Process one read's worth of bytes.
    pub fn handle_bytes(&mut self, bytes: &[u8], now: f64) -> Intake {
        if self.settle_left > 0 {
            self.settle_left -= 1;
            return Intake::Settling;
        }
        if self.state.network_has_precedence(now) {
            // Partial lines from before the gap would splice into garbage
            self.pipeline.reset();
            return Intake::Yielded;
        }
        Intake::Applied(self.pipeline.feed(
            bytes,
            &self.state,
            &self.health,
            now,
            is_gps_message,
        ))
    }

    fn open(&self) -> Result<Box<dyn SerialPort>, serialport::Error> {
        serialport::new(&self.device, self.baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(self.read_timeout)
            .open()
    }

    /// Blocking collector loop. Returns when `run` is cleared or the
    /// retry budget is spent.
    pub fn run(mut self, run: RunFlag) {
        log::info!("[serial] using {} at {} baud", self.device, self.baud);

        while run.is_running() {
            self.health.set_phase(CollectorPhase::Connecting);
            let port = match self.open() {
                Ok(port) => port,
                Err(e) => {
                    log::warn!("[serial] cannot open {}: {}", self.device, e);
                    if !self.back_off(&run) {
                        return;
                    }
                    continue;
                }
            };

            log::info!("[serial] {} open", self.device);
            self.health.set_phase(CollectorPhase::Reading);
            self.budget.record_success();
            self.settle_left = self.settle_reads;
            self.pipeline.reset();

            if let Err(e) = self.read_until_error(port, &run) {
                log::warn!("[serial] read failed on {}: {}", self.device, e);
                if !self.back_off(&run) {
                    return;
                }
            }
        }
        log::info!("[serial] stopped");
    }

    fn read_until_error(
        &mut self,
        mut port: Box<dyn SerialPort>,
        run: &RunFlag,
    ) -> std::io::Result<()> {
        let mut buf = [0u8; 1024];
        while run.is_running() {
            let n = match port.read(&mut buf) {
                Ok(n) => n,
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted) => {
                    continue
                }
                Err(e) => return Err(e),
            };
            if n == 0 {
                continue;
            }
            if self.handle_bytes(&buf[..n], current_timestamp()) == Intake::Yielded {
                log::debug!("[serial] network GPS active, discarding read");
                pause(run, self.yield_interval);
            }
        }
        Ok(())
    }

    /// Returns false once the collector should give up.
    fn back_off(&mut self, run: &RunFlag) -> bool {
        self.health.record_failure();
        match self.budget.record_failure() {
            RetryDecision::RetryAfter(cooldown) => {
                self.health.set_phase(CollectorPhase::BackingOff);
                pause(run, cooldown);
                true
            }
            RetryDecision::Exhausted => {
                self.health.set_phase(CollectorPhase::Failed);
                log::error!("[serial] giving up on {}: {}", self.device, self.budget.status());
                false
            }
        }
    }
}
