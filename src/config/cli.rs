use crate::config::toml_config::ConnectorConfig;
use crate::core::buyer_seller::ConnectorMode;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "connector")]
#[command(version)]
#[command(about = "Match supply to demand, find the contacts' emails and export the intros")]
pub struct Cli {
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Log as JSON lines")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Score, enrich and export one supply/demand run
    Run(RunArgs),
    /// Inspect or reset the enrichment cache
    Cache {
        #[arg(long, help = "Cache directory (default ~/.signalis/enrichment_cache)")]
        cache_dir: Option<PathBuf>,

        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum CacheAction {
    /// Entry counts by freshness and provider
    Stats,
    /// Every entry with its expiry
    List {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Delete every entry
    Clear,
}

#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    #[arg(short, long, help = "TOML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub supply: Option<String>,

    #[arg(long)]
    pub demand: Option<String>,

    #[arg(short, long)]
    pub output_dir: Option<String>,

    #[arg(long, help = "Connector mode for buyer/seller checks, e.g. recruiting")]
    pub mode: Option<ConnectorMode>,

    #[arg(long, help = "Concurrent enrichment lookups")]
    pub concurrency: Option<usize>,

    #[arg(long, help = "Per-provider timeout in seconds")]
    pub timeout_secs: Option<u64>,

    #[arg(long, help = "Enrich records in each demand's best N matches")]
    pub top_n: Option<usize>,

    #[arg(long, help = "Keep at most N matches per demand record in the export")]
    pub max_per_demand: Option<usize>,

    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    #[arg(long, help = "Skip email enrichment")]
    pub no_enrich: bool,
}

impl RunArgs {
    /// Loads the configuration file when given, falls back to environment
    /// provider keys, then applies the flags on top.
    pub fn load_config(&self) -> crate::utils::error::Result<ConnectorConfig> {
        let mut config = match &self.config {
            Some(path) => {
                tracing::info!("Loading configuration from {}", path.display());
                ConnectorConfig::from_file(path)?
            }
            None => ConnectorConfig::default(),
        };
        config.fill_providers_from_env();
        self.apply(&mut config);
        Ok(config)
    }

    pub fn apply(&self, config: &mut ConnectorConfig) {
        if let Some(supply) = &self.supply {
            config.pipeline.supply_file = Some(supply.clone());
        }
        if let Some(demand) = &self.demand {
            config.pipeline.demand_file = Some(demand.clone());
        }
        if let Some(output_dir) = &self.output_dir {
            config.export.output_dir = output_dir.clone();
        }
        if let Some(mode) = self.mode {
            config.matching.mode = Some(mode);
        }
        if let Some(concurrency) = self.concurrency {
            config.enrichment.concurrency = concurrency;
        }
        if let Some(timeout) = self.timeout_secs {
            config.enrichment.timeout_seconds = timeout;
        }
        if let Some(top_n) = self.top_n {
            config.enrichment.top_n = top_n;
        }
        if let Some(max) = self.max_per_demand {
            config.export.max_per_demand = Some(max);
        }
        if let Some(dir) = &self.cache_dir {
            config.enrichment.cache_dir = Some(dir.clone());
        }
        if self.no_enrich {
            config.enrichment.enabled = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::parse_from([
            "connector",
            "run",
            "--supply",
            "s.csv",
            "--demand",
            "d.csv",
            "--mode",
            "biotech-licensing",
            "--concurrency",
            "5",
            "--no-enrich",
            "-v",
        ]);

        assert!(cli.verbose);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        let mut config = ConnectorConfig::default();
        args.apply(&mut config);

        assert_eq!(config.pipeline.supply_file.as_deref(), Some("s.csv"));
        assert_eq!(config.matching.mode, Some(ConnectorMode::BiotechLicensing));
        assert_eq!(config.enrichment.concurrency, 5);
        assert!(!config.enrichment.enabled);
    }

    #[test]
    fn test_parse_cache_commands() {
        let cli = Cli::parse_from(["connector", "cache", "--cache-dir", "/tmp/c", "list", "--limit", "5"]);
        match cli.command {
            Command::Cache { cache_dir, action } => {
                assert_eq!(cache_dir, Some(PathBuf::from("/tmp/c")));
                assert!(matches!(action, CacheAction::List { limit: Some(5) }));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
