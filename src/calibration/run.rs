use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::{CalibrationMailbox, CalibrationRecord, HardIronBounds};
use crate::error::SensorError;
use crate::sensor::SharedBus;
use crate::types::MagData;

/// Running extrema of one sampling window
#[derive(Clone, Debug)]
pub struct CalibrationRun {
    pub bounds: HardIronBounds,
    pub samples: u64,
    pub read_errors: u64,
    pub started: Instant,
    pub window: Duration,
    /// Declination resolved before sampling started, degrees
    pub declination: Option<f64>,
}

impl CalibrationRun {
    pub fn new(window: Duration, declination: Option<f64>) -> Self {
        CalibrationRun {
            bounds: HardIronBounds::empty(),
            samples: 0,
            read_errors: 0,
            started: Instant::now(),
            window,
            declination,
        }
    }

    pub fn include(&mut self, sample: MagData) {
        self.bounds.include(sample);
        self.samples += 1;
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.window.saturating_sub(self.elapsed())
    }

    pub fn is_complete(&self) -> bool {
        self.elapsed() >= self.window
    }

    /// Merge this run into `base`. Bounds are only replaced when every axis
    /// saw at least one sample; offsets always carry over.
    pub fn finish(&self, base: &CalibrationRecord) -> CalibrationRecord {
        let mut record = base.clone();
        if self.bounds.is_valid() {
            record.bounds = self.bounds;
        }
        if let Some(declination) = self.declination {
            record.declination = declination;
        }
        record
    }

    pub fn progress(&self) -> String {
        let b = &self.bounds;
        format!(
            "magX {}..{} magY {}..{} magZ {}..{} samples {} remaining {}s",
            b.x_min,
            b.x_max,
            b.y_min,
            b.y_max,
            b.z_min,
            b.z_max,
            self.samples,
            self.remaining().as_secs()
        )
    }
}

/// Starts sampling runs against the shared orientation bus.
pub struct CalibrationController {
    bus: SharedBus,
    mailbox: CalibrationMailbox,
    window: Duration,
    sample_interval: Duration,
}

impl CalibrationController {
    pub fn new(
        bus: SharedBus,
        mailbox: CalibrationMailbox,
        window: Duration,
        sample_interval: Duration,
    ) -> Self {
        CalibrationController {
            bus,
            mailbox,
            window,
            sample_interval,
        }
    }

    /// Spawn the sampling thread.
    ///
    /// Fails with `Busy` if another run already owns the sensor. The
    /// finished record goes into the mailbox and to the returned handle.
    pub fn start(
        &self,
        base: CalibrationRecord,
        declination: Option<f64>,
    ) -> Result<CalibrationHandle, SensorError> {
        if !self.mailbox.begin() {
            return Err(SensorError::Busy);
        }

        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let (done_tx, done_rx) = channel::bounded::<CalibrationRecord>(1);
        let run = Arc::new(Mutex::new(CalibrationRun::new(self.window, declination)));

        let bus = self.bus.clone();
        let mailbox = self.mailbox.clone();
        let interval = self.sample_interval;
        let thread_run = run.clone();

        log::info!(
            "[calibration] sampling magnetometer for {}s, turn the vessel through a full circle",
            self.window.as_secs()
        );

        let join = thread::spawn(move || {
            sample_loop(&bus, &thread_run, &stop_rx, interval);

            let record = match thread_run.lock() {
                Ok(run) => {
                    if !run.bounds.is_valid() {
                        log::warn!("[calibration] no magnetometer samples, keeping old bounds");
                    }
                    log::info!("[calibration] done: {}", run.progress());
                    run.finish(&base)
                }
                Err(_) => base,
            };
            mailbox.deposit(record.clone());
            mailbox.end();
            let _ = done_tx.send(record);
        });

        Ok(CalibrationHandle {
            stop_tx,
            done_rx,
            run,
            join: Some(join),
        })
    }
}

fn sample_loop(
    bus: &SharedBus,
    run: &Arc<Mutex<CalibrationRun>>,
    stop_rx: &Receiver<()>,
    interval: Duration,
) {
    loop {
        if let Ok(run) = run.lock() {
            if run.is_complete() {
                break;
            }
        }

        let sample = match bus.lock() {
            Ok(mut bus) => bus.read_mag(),
            Err(_) => Err(SensorError::Busy),
        };
        if let Ok(mut run) = run.lock() {
            match sample {
                Ok(mag) => run.include(mag),
                Err(e) => {
                    run.read_errors += 1;
                    log::debug!("[calibration] read failed: {}", e);
                }
            }
        }

        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                log::info!("[calibration] stopped early");
                break;
            }
        }
    }
}

/// Caller side of a running calibration
pub struct CalibrationHandle {
    stop_tx: Sender<()>,
    done_rx: Receiver<CalibrationRecord>,
    run: Arc<Mutex<CalibrationRun>>,
    join: Option<JoinHandle<()>>,
}

impl CalibrationHandle {
    /// Ask the sampling thread to finish now with what it has.
    pub fn stop(&self) {
        let _ = self.stop_tx.try_send(());
    }

    pub fn progress(&self) -> String {
        self.run
            .lock()
            .map(|run| run.progress())
            .unwrap_or_default()
    }

    /// Block until the run completes.
    pub fn wait(mut self) -> Option<CalibrationRecord> {
        let record = self.done_rx.recv().ok();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
        record
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<CalibrationRecord> {
        self.done_rx.recv_timeout(timeout).ok()
    }
}
