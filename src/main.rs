//! CLI Entry Point for pixium-status
//!
//! Drives the status controller against simulated device models, for checking the
//! display pipeline without an IOC:
//! - `snapshot`: print every initial value, then a bulk-refreshed snapshot
//! - `simulate`: run a simulated acquisition with live status logging
//!
//! # Usage
//!
//! ```bash
//! pixium-status snapshot --json
//! pixium-status --config config/pixium.toml simulate --frames 10 --period-ms 100
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pixium_status::config::StatusConfig;
use pixium_status::epics::sim::{SimAdBase, SimFfMpeg, SimFileSaver};
use pixium_status::view::{SnapshotView, StatusSnapshot, TracingView};
use pixium_status::{logging, PixiumStatusController};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::{timeout, Duration};

#[derive(Parser)]
#[command(name = "pixium-status")]
#[command(about = "Pixium detector status controller", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print initial values and a refreshed status snapshot
    Snapshot {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a simulated acquisition and report status updates
    Simulate {
        /// Number of frames to acquire
        #[arg(long, default_value = "10")]
        frames: u32,

        /// Frame period in milliseconds
        #[arg(long, default_value = "100")]
        period_ms: u64,
    },
}

/// Simulated detector built from the configured PV prefixes.
struct SimDetector {
    cam: Arc<SimAdBase>,
    hdf: Arc<SimFileSaver>,
    mjpg: Arc<SimFfMpeg>,
}

impl SimDetector {
    fn from_config(config: &StatusConfig) -> Self {
        Self {
            cam: Arc::new(SimAdBase::new(config.detector.ad_base_prefix.clone())),
            hdf: Arc::new(SimFileSaver::new(config.detector.file_saver_prefix.clone())),
            mjpg: Arc::new(SimFfMpeg::new(config.detector.mjpeg_prefix.clone())),
        }
    }

    fn controller(&self) -> Result<PixiumStatusController> {
        PixiumStatusController::builder()
            .ad_base_model(self.cam.clone())
            .file_saver_model(self.hdf.clone())
            .ff_mpeg_model(self.mjpg.clone())
            .build()
            .context("Failed to wire status controller")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => StatusConfig::load_from(path),
        None => StatusConfig::load(),
    }
    .context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    logging::init_from_config(&config).context("Failed to initialize logging")?;

    tracing::info!(
        application = %config.application.name,
        detector = %config.detector.name,
        "Starting status controller"
    );

    match cli.command {
        Commands::Snapshot { json } => snapshot(&config, json).await,
        Commands::Simulate { frames, period_ms } => {
            simulate(&config, frames, Duration::from_millis(period_ms)).await
        }
    }
}

async fn snapshot(config: &StatusConfig, json: bool) -> Result<()> {
    let detector = SimDetector::from_config(config);
    let controller = detector.controller()?;

    println!("Initial values ({})", config.detector.name);
    println!("  Array counter      {}", controller.initial_array_counter().await?);
    println!("  Array rate         {}", controller.initial_array_rate().await?);
    println!("  Time remaining     {}", controller.initial_time_remaining().await?);
    println!("  Exposures          {}", controller.initial_remaining_exposures().await?);
    println!("  Images             {}", controller.initial_remaining_images().await?);
    println!("  Exposure (s)       {}", controller.initial_acq_exposure().await?);
    println!("  Period (s)         {}", controller.initial_acq_period().await?);
    println!("  Acquire            {}", controller.initial_acq_status().await?);
    println!("  Capture            {}", controller.initial_file_saver_capture_status().await?);
    println!("  File X             {}", controller.initial_file_saver_x().await?);
    println!("  File Y             {}", controller.initial_file_saver_y().await?);
    println!("  File timestamp     {}", controller.initial_file_saver_timestamp().await?);
    println!("  MJPEG X            {}", controller.initial_mjpeg_x().await?);
    println!("  MJPEG Y            {}", controller.initial_mjpeg_y().await?);
    println!("  MJPEG timestamp    {}", controller.initial_mjpeg_timestamp().await?);
    println!();

    let view = Arc::new(SnapshotView::new());
    controller.add_view(view.clone());
    refresh(&controller, config).await?;

    print_snapshot(&view.snapshot(), json)
}

async fn simulate(config: &StatusConfig, frames: u32, period: Duration) -> Result<()> {
    let detector = SimDetector::from_config(config);
    let controller = detector.controller()?;

    let view = Arc::new(SnapshotView::new());
    controller.add_view(view.clone());
    controller.add_view(Arc::new(TracingView::new(config.detector.name.clone())));

    detector
        .cam
        .acquire_frames(frames, period, Some(&detector.hdf))
        .await;
    refresh(&controller, config).await?;

    tracing::info!(updates = view.update_count(), "Simulation finished");
    print_snapshot(&view.snapshot(), false)
}

async fn refresh(controller: &PixiumStatusController, config: &StatusConfig) -> Result<()> {
    let handle = controller.update_all_fields();
    let abort = handle.abort_handle();
    match timeout(config.refresh_timeout(), handle.wait()).await {
        Ok(result) => result.context("Bulk refresh failed"),
        Err(_) => {
            abort.abort();
            tracing::warn!(timeout_ms = config.refresh.timeout_ms, "Bulk refresh cancelled");
            bail!("Bulk refresh exceeded {} ms", config.refresh.timeout_ms)
        }
    }
}

fn print_snapshot(snapshot: &StatusSnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
    } else {
        println!("Status");
        for (label, value) in snapshot.rows() {
            println!("  {label:<18} {value}");
        }
    }
    Ok(())
}
