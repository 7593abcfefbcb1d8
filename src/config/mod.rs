#[cfg(feature = "cli")]
pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use cli::{CacheAction, Cli, Command, RunArgs};
pub use toml_config::{
    ConnectorConfig, EnrichmentConfig, ExportConfig, PipelineConfig, ProviderConfig,
};
