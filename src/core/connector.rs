//! One connector run: load both sides, normalize, rank, enrich, export.

use crate::adapters::export::{self, EnrichmentSummary, MatchExport, RunSummary, TierCounts};
use crate::adapters::loader::CsvSource;
use crate::adapters::providers;
use crate::adapters::storage::LocalStorage;
use crate::config::toml_config::ConnectorConfig;
use crate::core::cache::EnrichmentCache;
use crate::core::cancel::Cancellation;
use crate::core::cascade::{BatchEnrichment, EnrichmentCascade};
use crate::core::matcher::Matcher;
use crate::core::normalizer::{self, NormalizeOutcome};
use crate::domain::model::{Match, NormalizedRecord, RawRow, RecordIssue, Side};
use crate::domain::ports::{RecordSource, Storage};
use crate::utils::error::{ConnectorError, Result};
use crate::utils::validation::Validate;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Knobs that shape what gets enriched and exported.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub top_n: usize,
    pub enrich_supply: bool,
    pub max_per_demand: Option<usize>,
    pub min_score: f64,
    pub matches_file: String,
    pub summary_file: String,
}

impl RunOptions {
    pub fn from_config(config: &ConnectorConfig) -> Self {
        Self {
            top_n: config.enrichment.top_n,
            enrich_supply: config.enrichment.enrich_supply,
            max_per_demand: config.export.max_per_demand,
            min_score: config.export.min_score,
            matches_file: config.export.matches_file.clone(),
            summary_file: config.export.summary_file.clone(),
        }
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from_config(&ConnectorConfig::default())
    }
}

/// Normalized inputs and their ranking.
pub struct Ranked {
    pub supplies: Vec<NormalizedRecord>,
    pub demands: Vec<NormalizedRecord>,
    pub rejected: Vec<RecordIssue>,
    pub matches: Vec<Match>,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub summary: RunSummary,
    pub outputs: Vec<String>,
}

pub struct ConnectorRun<R: RecordSource, S: Storage> {
    supply: R,
    demand: R,
    storage: S,
    matcher: Matcher,
    cascade: Option<Arc<EnrichmentCascade>>,
    options: RunOptions,
    cancel: Cancellation,
}

impl<R: RecordSource, S: Storage> ConnectorRun<R, S> {
    pub fn new(supply: R, demand: R, storage: S, matcher: Matcher) -> Self {
        Self {
            supply,
            demand,
            storage,
            matcher,
            cascade: None,
            options: RunOptions::default(),
            cancel: Cancellation::new(),
        }
    }

    pub fn with_cascade(mut self, cascade: Arc<EnrichmentCascade>) -> Self {
        self.cascade = Some(cascade);
        self
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancel
    }

    pub async fn extract(&self) -> Result<(Vec<RawRow>, Vec<RawRow>)> {
        tokio::try_join!(self.supply.load_rows(), self.demand.load_rows())
    }

    /// Normalizes both sides and ranks every pair. Rows that cannot be
    /// matched are reported and left out.
    pub fn transform(&self, supply_rows: &[RawRow], demand_rows: &[RawRow]) -> Result<Ranked> {
        let NormalizeOutcome {
            records: supplies,
            rejected: mut rejected,
        } = normalizer::normalize_rows(supply_rows, Side::Supply);
        let demand_outcome = normalizer::normalize_rows(demand_rows, Side::Demand);
        rejected.extend(demand_outcome.rejected);
        let demands = demand_outcome.records;

        if supplies.is_empty() || demands.is_empty() {
            return Err(ConnectorError::ProcessingError {
                message: format!(
                    "nothing to match: {} usable supply and {} usable demand records",
                    supplies.len(),
                    demands.len()
                ),
            });
        }

        let matches = self.matcher.rank(&supplies, &demands)?;
        Ok(Ranked {
            supplies,
            demands,
            rejected,
            matches,
        })
    }

    /// Records that appear in some demand's best `top_n` matches and still
    /// need an email, each listed once.
    pub fn enrichment_targets(&self, ranked: &Ranked) -> Vec<NormalizedRecord> {
        let mut seen = BTreeSet::new();
        let mut targets = Vec::new();
        for m in ranked
            .matches
            .iter()
            .filter(|m| m.rank() <= self.options.top_n && m.score() >= self.options.min_score)
        {
            let demand = &ranked.demands[m.demand_index()];
            if demand.needs_email() && seen.insert(demand.record_key.clone()) {
                targets.push(demand.clone());
            }
            if self.options.enrich_supply {
                let supply = &ranked.supplies[m.supply_index()];
                if supply.needs_email() && seen.insert(supply.record_key.clone()) {
                    targets.push(supply.clone());
                }
            }
        }
        targets
    }

    pub async fn enrich(&self, ranked: &Ranked) -> Option<BatchEnrichment> {
        let cascade = self.cascade.as_ref()?;
        let targets = self.enrichment_targets(ranked);
        tracing::info!("🔎 Enriching {} records", targets.len());
        Some(Arc::clone(cascade).enrich_batch(targets, &self.cancel).await)
    }

    /// Matches kept for export, in ranked order.
    pub fn exported_matches(&self, matches: &[Match]) -> Vec<Match> {
        let mut per_demand: HashMap<usize, usize> = HashMap::new();
        matches
            .iter()
            .filter(|m| m.score() >= self.options.min_score)
            .filter(|m| {
                let count = per_demand.entry(m.demand_index()).or_insert(0);
                *count += 1;
                self.options.max_per_demand.map_or(true, |max| *count <= max)
            })
            .cloned()
            .collect()
    }

    pub async fn load(
        &self,
        ranked: &Ranked,
        enrichment: Option<&BatchEnrichment>,
        mut summary: RunSummary,
    ) -> Result<RunReport> {
        let exported = self.exported_matches(&ranked.matches);
        let empty = BatchEnrichment::default();
        let export = MatchExport {
            supplies: &ranked.supplies,
            demands: &ranked.demands,
            matches: &exported,
            enrichment: enrichment.unwrap_or(&empty),
        };

        summary.matches_exported = exported.len();
        summary.finished_at = Utc::now();
        let outputs = export::write_outputs(
            &self.storage,
            &export,
            &mut summary,
            &self.options.matches_file,
            &self.options.summary_file,
        )
        .await?;
        Ok(RunReport { summary, outputs })
    }

    pub async fn run(&self) -> Result<RunReport> {
        let started_at = Utc::now();
        tracing::info!("🚀 Starting connector run");

        tracing::info!("Loading supply and demand...");
        let (supply_rows, demand_rows) = self.extract().await?;
        tracing::info!(
            "Loaded {} supply and {} demand rows",
            supply_rows.len(),
            demand_rows.len()
        );

        tracing::info!("Scoring matches...");
        let ranked = self.transform(&supply_rows, &demand_rows)?;
        let tiers = TierCounts::from_matches(&ranked.matches);
        tracing::info!(
            "Ranked {} pairs: {} strong, {} good, {} open",
            ranked.matches.len(),
            tiers.strong,
            tiers.good,
            tiers.open
        );

        let enrichment = self.enrich(&ranked).await;
        if enrichment.as_ref().is_some_and(|batch| batch.cancelled) {
            tracing::warn!("Enrichment was cancelled, exporting what was resolved");
        }

        let summary = RunSummary {
            started_at,
            finished_at: started_at,
            supply_records: ranked.supplies.len(),
            demand_records: ranked.demands.len(),
            rejected: ranked.rejected.clone(),
            matches_total: ranked.matches.len(),
            matches_exported: 0,
            tiers,
            mode: self.matcher.config().mode.map(|m| m.to_string()),
            enrichment: enrichment.as_ref().map(|batch| {
                let providers = self
                    .cascade
                    .as_ref()
                    .map(|c| c.providers().iter().map(|p| p.to_string()).collect())
                    .unwrap_or_default();
                EnrichmentSummary::from_batch(batch, providers)
            }),
            outputs: Vec::new(),
        };

        let report = self.load(&ranked, enrichment.as_ref(), summary).await?;
        tracing::info!("✅ Output saved to: {}", report.outputs.join(", "));
        Ok(report)
    }
}

impl ConnectorRun<CsvSource, LocalStorage> {
    /// Wires a run from validated configuration: CSV inputs, local output
    /// directory, and the configured provider cascade.
    pub fn from_config(config: &ConnectorConfig) -> Result<Self> {
        config.validate()?;

        let supply_file = config.pipeline.supply_file.clone().unwrap_or_default();
        let demand_file = config.pipeline.demand_file.clone().unwrap_or_default();
        let mut run = Self::new(
            CsvSource::new(supply_file),
            CsvSource::new(demand_file),
            LocalStorage::new(config.output_dir()),
            Matcher::new(config.matching.clone()),
        )
        .with_options(RunOptions::from_config(config));

        if config.enrichment.enabled {
            let client = providers::http_client(config.provider_timeout())?;
            let email_providers =
                providers::build_providers(&config.enrichment.providers, &client)?;
            let cache = match &config.enrichment.cache_dir {
                Some(dir) => EnrichmentCache::new(dir),
                None => EnrichmentCache::open_default()?,
            };
            let cascade = EnrichmentCascade::new(email_providers, Arc::new(cache))
                .with_provider_timeout(config.provider_timeout())
                .with_concurrency(config.enrichment.concurrency);
            run = run.with_cascade(Arc::new(cascade));
        }

        Ok(run)
    }
}
