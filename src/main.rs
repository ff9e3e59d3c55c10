use anyhow::Context;
use clap::Parser;
use ecosync::collectors::{CsvReadingSource, ReadingSimulator};
use ecosync::config::{preset_config, Config, Environment, Industry};
use ecosync::error::{ConfigError, WorkerError};
use ecosync::monitoring::PipelineMonitor;
use ecosync::pipeline::Pipeline;
use ecosync::publisher::{PublisherService, SnapshotPublisher, StateHandle, SubscriberRegistry};
use ecosync::server::{self, AppState};
use log::{error, info, warn};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;

/// How long open connections may delay shutdown after Ctrl+C
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Command-line arguments for EcoSync
#[derive(Parser)]
#[command(
    name = "ecosync",
    about = "EcoSync - streaming sensor aggregation and anomaly detection",
    long_about = "Aggregates per-machine temperature, vibration and energy readings from an \
                  append-only CSV store, detects anomalies, estimates cumulative CO2 emissions \
                  and publishes live updates over HTTP and Server-Sent Events."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Configuration file path (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(
        short,
        long,
        help = "Enable verbose logging output (sets RUST_LOG=debug)"
    )]
    verbose: bool,

    /// Deployment environment preset
    #[arg(
        short,
        long,
        default_value = "development",
        help = "Environment preset: development, staging or production"
    )]
    environment: String,

    /// Industry threshold preset
    #[arg(long, help = "Industry preset, e.g. textile or automotive_assembly")]
    industry: Option<String>,

    /// Grid region for the CO2 factor
    #[arg(long, help = "Grid region for the CO2 factor, e.g. \"Europe\"")]
    region: Option<String>,

    /// Override the CSV data file
    #[arg(long, value_name = "FILE")]
    data_file: Option<PathBuf>,

    /// Override the HTTP port
    #[arg(short, long)]
    port: Option<u16>,

    /// Do not start the reading simulator
    #[arg(long)]
    no_simulator: bool,
}

impl Cli {
    /// Validate the CLI arguments
    ///
    /// # Returns
    ///
    /// `Ok(())` if all arguments are valid, `Err(String)` with error message otherwise
    fn validate(&self) -> Result<(), String> {
        if let Some(ref config_path) = self.config {
            if !config_path.exists() {
                return Err(format!(
                    "Configuration file not found: {}",
                    config_path.display()
                ));
            }
            if !config_path.is_file() {
                return Err(format!(
                    "Configuration path is not a file: {}",
                    config_path.display()
                ));
            }
        }

        self.environment
            .parse::<Environment>()
            .map_err(|e| e.to_string())?;

        if let Some(ref industry) = self.industry {
            industry.parse::<Industry>().map_err(|e| e.to_string())?;
        }

        if self.port == Some(0) {
            return Err("Port must not be 0".to_string());
        }

        Ok(())
    }

    /// Build the configuration: preset, then file, then flags
    fn load_config(&self) -> Result<Config, ConfigError> {
        let environment: Environment = self.environment.parse()?;
        let industry = self
            .industry
            .as_deref()
            .map(str::parse::<Industry>)
            .transpose()?;
        let base = preset_config(environment, industry, self.region.as_deref());

        let mut config = match self.config {
            Some(ref path) => Config::from_file_with_base(path, &base)?,
            None => base,
        };

        if let Some(ref data_file) = self.data_file {
            config.source.data_file = data_file.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if self.no_simulator {
            config.simulator.enabled = false;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Owns the background workers and the state they share with the HTTP layer
struct EcoSync {
    config: Config,
    state: StateHandle,
    subscribers: SubscriberRegistry,
    monitor: PipelineMonitor,
    simulator: Option<ReadingSimulator>,
    publisher: Option<PublisherService>,
}

impl EcoSync {
    fn new(config: Config) -> Self {
        Self {
            config,
            state: StateHandle::new(),
            subscribers: SubscriberRegistry::new(),
            monitor: PipelineMonitor::new(),
            simulator: None,
            publisher: None,
        }
    }

    /// Start the simulator (if enabled) and the publisher thread
    fn start(&mut self) -> Result<(), WorkerError> {
        if self.config.simulator.enabled {
            let mut simulator = ReadingSimulator::new(
                self.config.source.data_file.clone(),
                self.config.simulator_interval(),
                self.config.simulator.machines.clone(),
            );
            simulator.start()?;
            self.simulator = Some(simulator);
        } else {
            info!("Reading simulator disabled");
        }

        let publisher = SnapshotPublisher::new(
            Box::new(CsvReadingSource::new(self.config.source.data_file.clone())),
            Pipeline::from_config(&self.config),
            self.state.clone(),
            self.subscribers.clone(),
            self.monitor.clone(),
        );
        self.publisher = Some(PublisherService::start(
            publisher,
            self.config.poll_interval(),
        )?);

        Ok(())
    }

    fn app_state(&self) -> AppState {
        AppState {
            state: self.state.clone(),
            subscribers: self.subscribers.clone(),
            monitor: self.monitor.clone(),
            dashboard_path: self.config.server.dashboard_path.clone(),
            static_dir: self.config.server.static_dir.clone(),
        }
    }

    fn stop(&mut self) {
        if let Some(mut publisher) = self.publisher.take() {
            if let Err(e) = publisher.stop() {
                error!("Failed to stop publisher: {}", e);
            }
        }
        if let Some(mut simulator) = self.simulator.take() {
            if let Err(e) = simulator.stop() {
                error!("Failed to stop simulator: {}", e);
            }
        }
    }
}

fn init_logging(verbose: bool, default_level: &str) {
    if verbose {
        std::env::set_var("RUST_LOG", "debug");
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Err(e) = cli.validate() {
        anyhow::bail!("Invalid arguments: {}", e);
    }

    let config = cli.load_config().context("Failed to load configuration")?;
    init_logging(cli.verbose, &config.log_level);

    info!(
        "Starting EcoSync ({} environment), reading {}",
        cli.environment,
        config.source.data_file.display()
    );
    info!(
        "Thresholds: temperature x{}, vibration {}, CO2 factor {} kg/kWh",
        config.detection.temperature_multiplier,
        config.detection.vibration_threshold,
        config.emissions.co2_emission_factor
    );

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;

    let mut app = EcoSync::new(config.clone());
    app.start().context("Failed to start background workers")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        info!("Received interrupt signal (SIGINT), shutting down gracefully...");
        let _ = shutdown_tx.send(true);
    })
    .context("Error setting SIGINT handler")?;

    let addr = config.bind_address();
    let mut server_shutdown = shutdown_rx.clone();
    let mut grace_shutdown = shutdown_rx;

    let subscribers = app.subscribers.clone();

    let result = runtime.block_on(async {
        let server = server::serve(&addr, app.app_state(), async move {
            let _ = server_shutdown.wait_for(|stop| *stop).await;
            // ends open SSE streams so their connections can finish
            subscribers.close_all();
        });

        // clients may still hold connections open; do not wait on them forever
        let grace = async {
            let _ = grace_shutdown.wait_for(|stop| *stop).await;
            tokio::time::sleep(SHUTDOWN_GRACE).await;
        };

        tokio::select! {
            result = server => result,
            _ = grace => {
                warn!("Open connections did not close within {:?}", SHUTDOWN_GRACE);
                Ok(())
            }
        }
    });

    app.stop();

    match result {
        Ok(()) => {
            info!("EcoSync shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("HTTP server failed: {}", e);
            Err(e.into())
        }
    }
}
