use crate::collectors::reading_parser::CSV_HEADERS;
use crate::error::WorkerError;
use crate::events::Reading;
use chrono::Utc;
use log::{debug, error, info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Probability that a generated reading is anomalous
const ANOMALY_PROBABILITY: f64 = 0.1;

/// Synthetic sensor data producer
///
/// Appends one reading per interval to a CSV file, standing in for the plant
/// floor during development. Roughly one reading in ten is anomalous (hot and
/// shaking) so the alert path has something to do.
pub struct ReadingSimulator {
    /// CSV file the readings are appended to
    path: PathBuf,
    /// Delay between two readings
    interval: Duration,
    /// Machine identifiers to pick from
    machines: Vec<String>,
    /// Handle to the background thread
    thread_handle: Option<JoinHandle<()>>,
    /// Shared state for controlling the simulator
    running: Arc<AtomicBool>,
}

impl ReadingSimulator {
    /// Create a new simulator
    ///
    /// # Arguments
    ///
    /// * `path` - CSV file to append to (created with a header row if missing)
    /// * `interval` - Time between readings
    /// * `machines` - Machine identifiers; an empty list falls back to `M1..M3`
    pub fn new(path: impl Into<PathBuf>, interval: Duration, machines: Vec<String>) -> Self {
        let machines = if machines.is_empty() {
            vec!["M1".to_string(), "M2".to_string(), "M3".to_string()]
        } else {
            machines
        };

        Self {
            path: path.into(),
            interval,
            machines,
            thread_handle: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start appending readings in a background thread
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::IoError` if the data file cannot be prepared, and
    /// `WorkerError::SpawnFailed` if the thread cannot be created.
    pub fn start(&mut self) -> Result<(), WorkerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            info!("ReadingSimulator already running, skipping start");
            return Ok(());
        }

        if let Err(e) = ensure_header(&self.path) {
            self.running.store(false, Ordering::SeqCst);
            return Err(e.into());
        }

        let path = self.path.clone();
        let interval = self.interval;
        let machines = self.machines.clone();
        let running = Arc::clone(&self.running);

        let handle = thread::Builder::new()
            .name("reading-simulator".to_string())
            .spawn(move || Self::simulator_thread(path, interval, machines, running))
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                WorkerError::SpawnFailed(e.to_string())
            })?;

        self.thread_handle = Some(handle);
        info!(
            "ReadingSimulator started: {} every {:?}",
            self.path.display(),
            self.interval
        );
        Ok(())
    }

    /// Stop the simulator and wait for the thread to exit
    pub fn stop(&mut self) -> Result<(), WorkerError> {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            handle
                .join()
                .map_err(|_| WorkerError::JoinFailed("reading-simulator".to_string()))?;
        }

        info!("ReadingSimulator stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn simulator_thread(
        path: PathBuf,
        interval: Duration,
        machines: Vec<String>,
        running: Arc<AtomicBool>,
    ) {
        let mut rng = rand::thread_rng();
        let sleep_interval = Duration::from_millis(100);

        while running.load(Ordering::SeqCst) {
            let reading = generate_reading(&mut rng, &machines);
            match append_reading(&path, &reading) {
                Ok(()) => debug!(
                    "Simulated reading: {} temp={:?} vib={:?}",
                    reading.machine_id, reading.temperature, reading.vibration
                ),
                Err(e) => error!("Failed to append simulated reading: {}", e),
            }

            // Sleep in short steps so stop() stays responsive
            let mut remaining = interval;
            while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
                let step = std::cmp::min(remaining, sleep_interval);
                thread::sleep(step);
                remaining = remaining.saturating_sub(step);
            }
        }
    }
}

impl Drop for ReadingSimulator {
    fn drop(&mut self) {
        if self.is_running() {
            if let Err(e) = self.stop() {
                warn!("Failed to stop ReadingSimulator on drop: {}", e);
            }
        }
    }
}

/// Generate one synthetic reading for a random machine
pub fn generate_reading<R: Rng>(rng: &mut R, machines: &[String]) -> Reading {
    let is_anomaly = rng.gen::<f64>() < ANOMALY_PROBABILITY;

    let (temperature, vibration) = if is_anomaly {
        (rng.gen_range(95.0..=110.0), rng.gen_range(0.8..=1.0))
    } else {
        (rng.gen_range(60.0..=80.0), rng.gen_range(0.1..=0.4))
    };

    let machine_id = machines
        .choose(rng)
        .cloned()
        .unwrap_or_else(|| "M1".to_string());

    Reading {
        timestamp: Some(Utc::now().timestamp_micros() as f64 / 1_000_000.0),
        machine_id,
        temperature: Some(round2(temperature)),
        vibration: Some(round2(vibration)),
        energy_consumption: Some(round2(rng.gen_range(10.0..=30.0))),
    }
}

/// Create the data file with a header row unless it already has content
pub fn ensure_header(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let needs_header = match fs::metadata(path) {
        Ok(meta) => meta.len() == 0,
        Err(_) => true,
    };

    if needs_header {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(CSV_HEADERS)?;
        writer.flush()?;
    }
    Ok(())
}

/// Append one reading as a CSV row
pub fn append_reading(path: &Path, reading: &Reading) -> std::io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);

    let format_opt = |value: Option<f64>| value.map(|v| v.to_string()).unwrap_or_default();
    writer.write_record([
        format_opt(reading.timestamp),
        reading.machine_id.clone(),
        format_opt(reading.temperature),
        format_opt(reading.vibration),
        format_opt(reading.energy_consumption),
    ])?;
    writer.flush()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
