pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::loader::CsvSource;
pub use adapters::storage::LocalStorage;
pub use config::ConnectorConfig;
#[cfg(feature = "cli")]
pub use config::Cli;
pub use crate::core::cache::EnrichmentCache;
pub use crate::core::cancel::Cancellation;
pub use crate::core::cascade::{BatchEnrichment, EnrichmentCascade};
pub use crate::core::connector::{ConnectorRun, RunOptions, RunReport};
pub use crate::core::matcher::{Matcher, MatcherConfig};
pub use domain::model::{EnrichmentResult, Match, NormalizedRecord, Provider};
pub use utils::error::{ConnectorError, Result};
