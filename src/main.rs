use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;

use marine_nav_rs::calibration::{
    CalibrationController, CalibrationMailbox, CalibrationRecord, DeclinationFetcher,
};
use marine_nav_rs::clock::{ClockSync, HostClock, SharedTimeSink};
use marine_nav_rs::collectors::{NetworkCollector, OrientationCollector, RunFlag, SerialCollector};
use marine_nav_rs::health::HealthMonitor;
use marine_nav_rs::live_status::LiveStatus;
use marine_nav_rs::nav_state::{current_timestamp, NavState, SharedNavState};
use marine_nav_rs::retry::CollectorPhase;
use marine_nav_rs::sensor::{self, Lsm9dsBus, SharedBus};
use marine_nav_rs::{publish, NavConfig};

#[derive(Parser, Debug)]
#[command(name = "marine_nav")]
#[command(about = "Fuses serial GPS, networked instruments and a local IMU into one navigation state", long_about = None)]
struct Args {
    /// Duration in seconds (0 = continuous)
    #[arg(value_name = "SECONDS", default_value = "0")]
    duration: u64,

    /// JSON file overriding tunables
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serial GPS device
    #[arg(long)]
    serial_device: Option<String>,

    #[arg(long)]
    baud: Option<u32>,

    /// Instrument feed host
    #[arg(long)]
    host: Option<String>,

    /// Instrument feed port
    #[arg(long)]
    port: Option<u16>,

    /// I2C bus number of the IMU
    #[arg(long)]
    i2c_bus: Option<u8>,

    /// Seconds before a value counts as stale
    #[arg(long)]
    stale_after: Option<f64>,

    /// Output directory for live_status.json and calibration.json
    #[arg(long, default_value = "marine_nav_status")]
    status_dir: PathBuf,

    /// Serve /state and /ws on this port
    #[arg(long)]
    http_port: Option<u16>,

    /// Calibration record to load (default: <status-dir>/calibration.json)
    #[arg(long)]
    calibration_file: Option<PathBuf>,

    /// Magnetic declination in degrees, overrides the stored value
    #[arg(long)]
    declination: Option<f64>,

    /// Manual heading offset in degrees
    #[arg(long)]
    heading_offset: Option<f64>,

    /// Manual roll offset in degrees
    #[arg(long)]
    roll_offset: Option<f64>,

    /// Run a compass calibration right after startup
    #[arg(long)]
    calibrate: bool,

    #[arg(long)]
    no_serial: bool,

    #[arg(long)]
    no_network: bool,

    #[arg(long)]
    no_orientation: bool,
}

impl Args {
    fn apply(&self, config: &mut NavConfig) {
        if let Some(device) = &self.serial_device {
            config.serial_device = device.clone();
        }
        if let Some(baud) = self.baud {
            config.serial_baud = baud;
        }
        if let Some(host) = &self.host {
            config.net_host = host.clone();
        }
        if let Some(port) = self.port {
            config.net_port = port;
        }
        if let Some(bus) = self.i2c_bus {
            config.i2c_bus = bus;
        }
        if let Some(stale) = self.stale_after {
            config.stale_after_secs = stale;
        }
    }

    fn apply_calibration(&self, record: &mut CalibrationRecord) {
        if let Some(declination) = self.declination {
            record.declination = declination;
        }
        if let Some(offset) = self.heading_offset {
            record.heading_offset = offset;
        }
        if let Some(offset) = self.roll_offset {
            record.roll_offset = offset;
        }
    }
}

fn load_calibration(path: &Path) -> CalibrationRecord {
    if !path.exists() {
        log::info!("[calibration] no {}, using defaults", path.display());
        return CalibrationRecord::default();
    }
    match CalibrationRecord::load(path) {
        Ok(record) => {
            log::info!("[calibration] loaded {}", path.display());
            record
        }
        Err(e) => {
            log::warn!("[calibration] {:#}, using defaults", e);
            CalibrationRecord::default()
        }
    }
}

/// Everything a calibration run needs, cloned into each run's task.
#[derive(Clone)]
struct CalibrationContext {
    controller: Arc<CalibrationController>,
    fetcher: Arc<DeclinationFetcher>,
    state: SharedNavState,
    latest: Arc<Mutex<CalibrationRecord>>,
    path: PathBuf,
}

impl CalibrationContext {
    fn spawn(&self) -> JoinHandle<()> {
        let ctx = self.clone();
        tokio::spawn(async move {
            if let Err(e) = ctx.run().await {
                log::warn!("[calibration] {:#}", e);
            }
        })
    }

    async fn run(self) -> Result<()> {
        let base = self
            .latest
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default();

        let now = current_timestamp();
        let position = self
            .state
            .position
            .fresh(now, self.state.stale_after())
            .and_then(|p| p.to_decimal_degrees());
        let declination = self.fetcher.resolve(position, base.declination).await;

        let handle = self
            .controller
            .start(base, Some(declination))
            .context("starting calibration")?;
        let record = tokio::task::spawn_blocking(move || handle.wait())
            .await
            .context("calibration thread")?
            .context("calibration finished without a result")?;

        record
            .save(&self.path)
            .with_context(|| format!("saving {}", self.path.display()))?;
        log::info!("[calibration] saved {}", self.path.display());
        if let Ok(mut latest) = self.latest.lock() {
            *latest = record;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => NavConfig::load(path)?,
        None => NavConfig::default(),
    };
    args.apply(&mut config);

    log::info!("Marine nav starting");
    log::info!("  Duration: {} seconds (0=continuous)", args.duration);
    log::info!("  Serial: {} @ {}", config.serial_device, config.serial_baud);
    log::info!("  Network: {}:{}", config.net_host, config.net_port);
    log::info!("  Status dir: {}", args.status_dir.display());

    std::fs::create_dir_all(&args.status_dir)
        .with_context(|| format!("creating {}", args.status_dir.display()))?;
    let calibration_path = args
        .calibration_file
        .clone()
        .unwrap_or_else(|| args.status_dir.join("calibration.json"));
    let mut calibration = load_calibration(&calibration_path);
    args.apply_calibration(&mut calibration);

    let state = NavState::shared(config.stale_after_secs);
    let health = Arc::new(HealthMonitor::new(Duration::from_secs_f64(
        config.stale_after_secs,
    )));
    let run = RunFlag::new();
    let mailbox = CalibrationMailbox::new();
    let clock: SharedTimeSink = Arc::new(ClockSync::new(
        HostClock,
        config.clock_max_attempts,
        config.clock_max_backward_secs,
    ));

    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    if args.no_serial {
        health.serial.set_phase(CollectorPhase::Failed);
    } else {
        let serial = SerialCollector::new(
            &config,
            state.clone(),
            health.serial.clone(),
            Some(clock.clone()),
        );
        let run = run.clone();
        tasks.push(tokio::task::spawn_blocking(move || serial.run(run)));
    }

    if args.no_network {
        health.network.set_phase(CollectorPhase::Failed);
    } else {
        let network = NetworkCollector::new(&config, state.clone(), health.network.clone());
        tasks.push(tokio::spawn(network.run(run.clone())));
    }

    let bus: Option<SharedBus> = if args.no_orientation {
        None
    } else {
        match Lsm9dsBus::open(config.i2c_bus) {
            Ok(bus) => Some(sensor::shared(Box::new(bus))),
            Err(e) => {
                log::error!("[orientation] no sensor on i2c-{}: {}", config.i2c_bus, e);
                None
            }
        }
    };

    let calibrator = match &bus {
        Some(bus) => {
            let orientation = OrientationCollector::new(
                &config,
                bus.clone(),
                calibration.clone(),
                mailbox.clone(),
                state.clone(),
                health.orientation.clone(),
            );
            let run = run.clone();
            tasks.push(tokio::task::spawn_blocking(move || orientation.run(run)));

            Some(CalibrationContext {
                controller: Arc::new(CalibrationController::new(
                    bus.clone(),
                    mailbox.clone(),
                    Duration::from_secs(config.calibration_window_secs),
                    Duration::from_millis(config.calibration_sample_ms),
                )),
                fetcher: Arc::new(DeclinationFetcher::new(
                    &config.declination_url,
                    config.declination_key.clone(),
                    Duration::from_secs(config.declination_timeout_secs),
                )),
                state: state.clone(),
                latest: Arc::new(Mutex::new(calibration.clone())),
                path: calibration_path.clone(),
            })
        }
        None => {
            health.orientation.set_phase(CollectorPhase::Failed);
            None
        }
    };

    if let Some(port) = args.http_port {
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = publish::serve(state, port).await {
                log::error!("[publish] {:#}", e);
            }
        });
    }

    let request_calibration = || match &calibrator {
        Some(ctx) => {
            ctx.spawn();
        }
        None => log::warn!("[calibration] no orientation sensor, ignoring request"),
    };

    if args.calibrate {
        request_calibration();
    }

    let mut usr1 = signal(SignalKind::user_defined1()).context("installing SIGUSR1 handler")?;
    let mut status_tick = tokio::time::interval(Duration::from_secs(2));
    let status_path = args.status_dir.join("live_status.json");
    let start = Instant::now();

    loop {
        tokio::select! {
            _ = status_tick.tick() => {
                let status = LiveStatus::collect(
                    &state,
                    &health,
                    start.elapsed().as_secs(),
                    mailbox.is_active(),
                );
                if let Err(e) = status.save(&status_path) {
                    log::warn!("Failed to write {}: {}", status_path.display(), e);
                }
                log::info!("{}", health.format_status());

                if args.duration > 0 && start.elapsed().as_secs() >= args.duration {
                    log::info!("Duration reached, stopping...");
                    break;
                }
            }
            _ = usr1.recv() => {
                log::info!("[calibration] SIGUSR1 received");
                request_calibration();
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted, stopping...");
                break;
            }
        }
    }

    run.stop();
    for task in tasks {
        if tokio::time::timeout(Duration::from_secs(5), task).await.is_err() {
            log::warn!("A collector did not stop within 5s");
        }
    }
    log::info!("Stopped");
    Ok(())
}
