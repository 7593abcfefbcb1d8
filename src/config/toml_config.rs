use crate::core::cascade::{DEFAULT_CONCURRENCY, DEFAULT_PROVIDER_TIMEOUT};
use crate::core::matcher::MatcherConfig;
use crate::domain::model::Provider;
use crate::utils::error::{ConnectorError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Environment variables consulted when no provider is configured, in
/// cascade order.
pub const PROVIDER_ENV_KEYS: &[(Provider, &str)] = &[
    (Provider::Apollo, "APOLLO_API_KEY"),
    (Provider::Anymail, "ANYMAIL_API_KEY"),
    (Provider::ConnectorAgent, "CONNECTOR_AGENT_API_KEY"),
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    pub pipeline: PipelineConfig,
    pub matching: MatcherConfig,
    pub enrichment: EnrichmentConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub name: String,
    pub supply_file: Option<String>,
    pub demand_file: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "signal-connector".to_string(),
            supply_file: None,
            demand_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub enabled: bool,
    /// Concurrent cascades.
    pub concurrency: usize,
    /// Per provider call.
    pub timeout_seconds: u64,
    /// Defaults to `~/.signalis/enrichment_cache`.
    pub cache_dir: Option<PathBuf>,
    /// Records appearing in a demand's best `top_n` matches are enriched.
    pub top_n: usize,
    pub enrich_supply: bool,
    pub providers: Vec<ProviderConfig>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            concurrency: DEFAULT_CONCURRENCY,
            timeout_seconds: DEFAULT_PROVIDER_TIMEOUT.as_secs(),
            cache_dir: None,
            top_n: 1,
            enrich_supply: true,
            providers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: Provider,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl ProviderConfig {
    pub fn new(name: Provider, api_key: impl Into<String>) -> Self {
        Self {
            name,
            api_key: Some(api_key.into()),
            base_url: None,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub output_dir: String,
    pub matches_file: String,
    pub summary_file: String,
    /// Keep at most this many matches per demand record.
    pub max_per_demand: Option<usize>,
    pub min_score: f64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: "./output".to_string(),
            matches_file: "matches.csv".to_string(),
            summary_file: "run_summary.json".to_string(),
            max_per_demand: None,
            min_score: 0.0,
        }
    }
}

fn env_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("static regex"))
}

fn is_placeholder(value: &str) -> bool {
    env_pattern().is_match(value)
}

impl ConnectorConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// Parses TOML after replacing `${VAR}` with the environment's value.
    /// Variables that are not set stay as written, and an API key left as a
    /// placeholder counts as missing.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content);

        let mut config: Self =
            toml::from_str(&processed).map_err(|e| ConnectorError::ConfigValidationError {
                field: "toml_parsing".to_string(),
                message: format!("TOML parsing error: {}", e),
            })?;

        for provider in &mut config.enrichment.providers {
            let unresolved = provider
                .api_key
                .as_deref()
                .is_some_and(|key| key.trim().is_empty() || is_placeholder(key));
            if unresolved {
                provider.api_key = None;
            }
        }
        Ok(config)
    }

    fn substitute_env_vars(content: &str) -> String {
        env_pattern()
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    /// Providers from the environment, in default cascade order.
    pub fn providers_from_env() -> Vec<ProviderConfig> {
        PROVIDER_ENV_KEYS
            .iter()
            .filter_map(|(provider, var)| {
                std::env::var(var)
                    .ok()
                    .filter(|key| !key.trim().is_empty())
                    .map(|key| ProviderConfig::new(*provider, key))
            })
            .collect()
    }

    /// Falls back to environment keys when the file names no providers.
    pub fn fill_providers_from_env(&mut self) {
        if self.enrichment.providers.is_empty() {
            self.enrichment.providers = Self::providers_from_env();
        }
    }

    pub fn output_dir(&self) -> &str {
        &self.export.output_dir
    }

    pub fn provider_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.enrichment.timeout_seconds)
    }

    /// Every enabled provider must have a key. Runs before any batch so a
    /// missing key never surfaces halfway through a run.
    pub fn validate_credentials(&self) -> Result<()> {
        if !self.enrichment.enabled {
            return Ok(());
        }
        let enabled: Vec<&ProviderConfig> = self
            .enrichment
            .providers
            .iter()
            .filter(|p| p.enabled)
            .collect();
        if enabled.is_empty() {
            return Err(ConnectorError::MissingConfigError {
                field: format!(
                    "enrichment.providers (or one of {})",
                    PROVIDER_ENV_KEYS
                        .iter()
                        .map(|(_, var)| *var)
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            });
        }
        for provider in enabled {
            if provider.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
                return Err(ConnectorError::MissingCredentials {
                    provider: provider.name.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn validate_config(&self) -> Result<()> {
        let supply = self
            .pipeline
            .supply_file
            .as_deref()
            .ok_or_else(|| ConnectorError::MissingConfigError {
                field: "pipeline.supply_file".to_string(),
            })?;
        let demand = self
            .pipeline
            .demand_file
            .as_deref()
            .ok_or_else(|| ConnectorError::MissingConfigError {
                field: "pipeline.demand_file".to_string(),
            })?;
        validation::validate_file_extension("pipeline.supply_file", supply, &["csv"])?;
        validation::validate_file_extension("pipeline.demand_file", demand, &["csv"])?;

        self.matching.validate()?;

        validation::validate_path("export.output_dir", &self.export.output_dir)?;
        validation::validate_non_empty_string("export.matches_file", &self.export.matches_file)?;
        validation::validate_non_empty_string("export.summary_file", &self.export.summary_file)?;
        validation::validate_range("export.min_score", self.export.min_score, 0.0, 100.0)?;
        if let Some(max) = self.export.max_per_demand {
            validation::validate_positive_number("export.max_per_demand", max, 1)?;
        }

        if self.enrichment.enabled {
            validation::validate_positive_number(
                "enrichment.concurrency",
                self.enrichment.concurrency,
                1,
            )?;
            validation::validate_positive_number(
                "enrichment.timeout_seconds",
                self.enrichment.timeout_seconds as usize,
                1,
            )?;
            validation::validate_positive_number("enrichment.top_n", self.enrichment.top_n, 1)?;
            for (i, provider) in self.enrichment.providers.iter().enumerate() {
                if provider.name == Provider::None {
                    return Err(ConnectorError::InvalidConfigValueError {
                        field: format!("enrichment.providers[{}].name", i),
                        value: "none".to_string(),
                        reason: "not an email provider".to_string(),
                    });
                }
                if let Some(url) = &provider.base_url {
                    validation::validate_url(&format!("enrichment.providers[{}].base_url", i), url)?;
                }
            }
            self.validate_credentials()?;
        }

        Ok(())
    }
}

impl Validate for ConnectorConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FULL: &str = r#"
[pipeline]
name = "q3-intros"
supply_file = "supply.csv"
demand_file = "demand.csv"

[matching]
mode = "recruiting"
strong_threshold = 75.0

[matching.weights]
industry = 0.4
signal = 0.3
size = 0.1
hint = 0.2

[enrichment]
concurrency = 2
timeout_seconds = 10

[[enrichment.providers]]
name = "anymail"
api_key = "any-key"

[[enrichment.providers]]
name = "apollo"
api_key = "apollo-key"
base_url = "http://127.0.0.1:9999"

[export]
output_dir = "./out"
max_per_demand = 3
"#;

    #[test]
    fn test_parse_full_config() {
        let config = ConnectorConfig::from_toml_str(FULL).unwrap();

        assert_eq!(config.pipeline.name, "q3-intros");
        assert_eq!(config.matching.weights.industry, 0.4);
        assert_eq!(config.matching.strong_threshold, 75.0);
        assert_eq!(config.matching.good_threshold, 45.0);
        assert_eq!(config.enrichment.concurrency, 2);
        assert_eq!(config.enrichment.providers[0].name, Provider::Anymail);
        assert_eq!(config.enrichment.providers[1].name, Provider::Apollo);
        assert_eq!(config.export.max_per_demand, Some(3));
        assert_eq!(config.export.matches_file, "matches.csv");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ConnectorConfig::from_toml_str("").unwrap();
        assert!(config.enrichment.enabled);
        assert_eq!(config.enrichment.concurrency, 3);
        assert_eq!(config.enrichment.timeout_seconds, 30);
        assert_eq!(config.export.summary_file, "run_summary.json");
        assert!(matches!(
            config.validate(),
            Err(ConnectorError::MissingConfigError { .. })
        ));
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("SIGNAL_CONNECTOR_TEST_KEY", "from-env");

        let config = ConnectorConfig::from_toml_str(
            r#"
[[enrichment.providers]]
name = "apollo"
api_key = "${SIGNAL_CONNECTOR_TEST_KEY}"

[[enrichment.providers]]
name = "anymail"
api_key = "${SIGNAL_CONNECTOR_UNSET_KEY}"
"#,
        )
        .unwrap();

        assert_eq!(config.enrichment.providers[0].api_key.as_deref(), Some("from-env"));
        assert_eq!(config.enrichment.providers[1].api_key, None);

        std::env::remove_var("SIGNAL_CONNECTOR_TEST_KEY");
    }

    #[test]
    fn test_missing_key_is_reported_before_run() {
        let mut config = ConnectorConfig::from_toml_str(FULL).unwrap();
        config.enrichment.providers[1].api_key = None;

        match config.validate() {
            Err(ConnectorError::MissingCredentials { provider }) => assert_eq!(provider, "apollo"),
            other => panic!("unexpected result: {:?}", other),
        }

        config.enrichment.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let mut config = ConnectorConfig::from_toml_str(FULL).unwrap();
        config.matching.weights.hint = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(FULL.as_bytes()).unwrap();

        let config = ConnectorConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.pipeline.supply_file.as_deref(), Some("supply.csv"));
    }
}
