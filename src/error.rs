use thiserror::Error;

/// Reasons a raw record cannot become a reading
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IngestError {
    #[error("Record has no machine_id")]
    MissingMachineId,
}

/// Errors that can occur while reading the input store
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Reading source unavailable: {0}")]
    Unavailable(String),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Errors that can occur in the HTTP transport
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("Server terminated: {0}")]
    Serve(#[from] std::io::Error),
}

/// Errors raised by the background workers (publisher, simulator)
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker thread: {0}")]
    SpawnFailed(String),

    #[error("Worker thread panicked: {0}")]
    JoinFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
