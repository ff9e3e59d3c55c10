/// Configuration structures and TOML loading
#[allow(clippy::module_inception)]
pub mod config;

/// Environment, industry and region presets
pub mod presets;

pub use config::{
    Config, DetectionConfig, EmissionsConfig, PublisherConfig, ServerConfig, SimulatorConfig,
    SourceConfig,
};
pub use presets::{preset_config, region_co2_factor, Environment, Industry};
