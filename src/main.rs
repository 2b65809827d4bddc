//! Posture Calibrator - command line entry point.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use posture_calibrator::api::BackendClient;
use posture_calibrator::storage::MeasurementStore;
use posture_calibrator::{AgentConfig, Workflow};

#[derive(Parser)]
#[command(
    name = "posture-calibrator",
    version,
    about = "Webcam capture agent for posture measurement calibration"
)]
struct Cli {
    /// Path to a JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Backend base URL override
    #[arg(long)]
    backend: Option<String>,

    /// Camera index override
    #[arg(long)]
    camera: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the calibration flow (shoulder width entry + capture loop)
    Calibrate,
    /// Run the measurement flow (marker overlay + capture loop)
    Measure {
        /// Reading ID to submit afterwards; prompted for when omitted
        #[arg(long)]
        id: Option<String>,
    },
    /// Submit a reading ID without capturing
    SubmitReading { id: String },
    /// Clear the locally stored measurement
    Reset,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config =
        AgentConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(backend) = cli.backend {
        config.backend_url = backend;
    }
    if let Some(camera) = cli.camera {
        config.camera_index = camera;
    }

    log::info!("Posture Calibrator, backend {}", config.backend_url);

    let client = BackendClient::new(config.backend_url.clone());
    let store = MeasurementStore::open_default().context("failed to open measurement store")?;
    let mut workflow = Workflow::new(config, client, store);

    match cli.command {
        Command::Calibrate => workflow.calibrate().await?,
        Command::Measure { id } => workflow.measure(id).await?,
        Command::SubmitReading { id } => workflow.submit_reading(&id).await?,
        Command::Reset => workflow.reset()?,
    }

    Ok(())
}
