use crate::core::cascade::BatchEnrichment;
use crate::domain::model::{Match, MatchTier, NormalizedRecord, RecordIssue};
use crate::domain::ports::Storage;
use crate::utils::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

const MATCH_COLUMNS: &[&str] = &[
    "Demand Rank",
    "Score",
    "Tier",
    "Demand Company",
    "Demand Domain",
    "Demand Contact",
    "Demand Title",
    "Demand Email",
    "Demand Signal",
    "Supply Company",
    "Supply Domain",
    "Supply Contact",
    "Supply Email",
    "Industry Score",
    "Signal Score",
    "Size Score",
    "Hint Score",
    "Buyer Seller Valid",
    "Demand Email Source",
    "Supply Email Source",
];

/// Ranked matches with the records they point into and the enrichment that
/// filled in missing emails.
pub struct MatchExport<'a> {
    pub supplies: &'a [NormalizedRecord],
    pub demands: &'a [NormalizedRecord],
    pub matches: &'a [Match],
    pub enrichment: &'a BatchEnrichment,
}

impl MatchExport<'_> {
    fn email_of(&self, record: &NormalizedRecord) -> (String, String) {
        if let Some(email) = record.email.as_deref().filter(|e| !e.is_empty()) {
            return (email.to_string(), "input".to_string());
        }
        match self.enrichment.results.get(&record.record_key) {
            Some(result) if result.is_resolved() => {
                let source = if result.from_cache {
                    format!("{} (cached)", result.provider)
                } else {
                    result.provider.to_string()
                };
                (result.email.clone().unwrap_or_default(), source)
            }
            _ => (String::new(), String::new()),
        }
    }
}

fn score_cell(value: f64) -> String {
    format!("{:.1}", value)
}

/// Renders `matches.csv`. Rows follow the order of `export.matches`.
pub fn matches_csv(export: &MatchExport<'_>) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(MATCH_COLUMNS)?;

    for m in export.matches {
        let supply = &export.supplies[m.supply_index()];
        let demand = &export.demands[m.demand_index()];
        let breakdown = m.breakdown();
        let (demand_email, demand_source) = export.email_of(demand);
        let (supply_email, supply_source) = export.email_of(supply);

        writer.write_record([
            m.rank().to_string(),
            score_cell(m.score()),
            m.tier().as_str().to_string(),
            demand.company.clone(),
            demand.domain.clone(),
            demand.full_name.clone(),
            demand.title.clone().unwrap_or_default(),
            demand_email,
            demand.signal.clone(),
            supply.company.clone(),
            supply.domain.clone(),
            supply.full_name.clone(),
            supply_email,
            score_cell(breakdown.industry),
            score_cell(breakdown.signal),
            breakdown.size.map(score_cell).unwrap_or_default(),
            score_cell(breakdown.hint),
            m.buyer_seller_valid()
                .map(|valid| valid.to_string())
                .unwrap_or_default(),
            demand_source,
            supply_source,
        ])?;
    }

    writer
        .into_inner()
        .map_err(|e| crate::utils::error::ConnectorError::ProcessingError {
            message: format!("failed to flush CSV output: {}", e),
        })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TierCounts {
    pub strong: usize,
    pub good: usize,
    pub open: usize,
}

impl TierCounts {
    pub fn from_matches(matches: &[Match]) -> Self {
        let mut counts = Self::default();
        for m in matches {
            match m.tier() {
                MatchTier::Strong => counts.strong += 1,
                MatchTier::Good => counts.good += 1,
                MatchTier::Open => counts.open += 1,
            }
        }
        counts
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentSummary {
    pub attempted: usize,
    pub resolved: usize,
    pub cache_hits: usize,
    pub skipped: usize,
    pub failures: Vec<RecordIssue>,
    pub cancelled: bool,
    pub providers: Vec<String>,
}

impl EnrichmentSummary {
    pub fn from_batch(batch: &BatchEnrichment, providers: Vec<String>) -> Self {
        Self {
            attempted: batch.results.len() + batch.failures.len(),
            resolved: batch.resolved_count(),
            cache_hits: batch.cache_hits(),
            skipped: batch.skipped.len(),
            failures: batch.failures.clone(),
            cancelled: batch.cancelled,
            providers,
        }
    }
}

/// Contents of `run_summary.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub supply_records: usize,
    pub demand_records: usize,
    pub rejected: Vec<RecordIssue>,
    pub matches_total: usize,
    pub matches_exported: usize,
    pub tiers: TierCounts,
    pub mode: Option<String>,
    pub enrichment: Option<EnrichmentSummary>,
    pub outputs: Vec<String>,
}

/// Writes `matches.csv` and `run_summary.json` through `storage` and
/// returns the paths written.
pub async fn write_outputs<S: Storage>(
    storage: &S,
    export: &MatchExport<'_>,
    summary: &mut RunSummary,
    matches_file: &str,
    summary_file: &str,
) -> Result<Vec<String>> {
    let csv = matches_csv(export)?;
    storage.write_file(matches_file, &csv).await?;
    tracing::info!("Wrote {} matches to {}", export.matches.len(), matches_file);

    summary.outputs = vec![matches_file.to_string(), summary_file.to_string()];
    let json = serde_json::to_vec_pretty(summary)?;
    storage.write_file(summary_file, &json).await?;
    tracing::info!("Wrote run summary to {}", summary_file);

    Ok(summary.outputs.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::matcher::{Matcher, MatcherConfig};
    use crate::domain::model::{EnrichmentResult, Provider, Side};

    fn record(side: Side, index: usize, company: &str, industry: &str) -> NormalizedRecord {
        let mut record = NormalizedRecord::new(side, index);
        record.company = company.to_string();
        record.domain = format!("{}.io", company.to_lowercase());
        record.industry = industry.to_string();
        record.full_name = "Jane Doe".to_string();
        record
    }

    #[test]
    fn test_matches_csv_fills_enriched_emails() {
        let supplies = vec![record(Side::Supply, 0, "Medstaff", "Healthcare staffing")];
        let mut demands = vec![record(Side::Demand, 0, "Carely", "Healthcare SaaS")];
        demands[0].title = Some("VP Sales".to_string());
        let matches = Matcher::new(MatcherConfig::default())
            .rank(&supplies, &demands)
            .unwrap();

        let mut enrichment = BatchEnrichment::default();
        let mut found = EnrichmentResult::not_found(vec![Provider::Apollo], Utc::now());
        found.email = Some("jane@carely.io".to_string());
        found.provider = Provider::Apollo;
        enrichment.results.insert("demand:0".to_string(), found);

        let export = MatchExport {
            supplies: &supplies,
            demands: &demands,
            matches: &matches,
            enrichment: &enrichment,
        };
        let csv = String::from_utf8(matches_csv(&export).unwrap()).unwrap();
        let mut lines = csv.lines();

        assert!(lines.next().unwrap().starts_with("Demand Rank,Score,Tier,Demand Company"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("1,"));
        assert!(row.contains("Carely,carely.io,Jane Doe,VP Sales,jane@carely.io"));
        assert!(row.ends_with("apollo,"));
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_tier_counts() {
        let supplies = vec![record(Side::Supply, 0, "A", "healthcare")];
        let demands = vec![
            record(Side::Demand, 0, "B", "hospital"),
            record(Side::Demand, 1, "C", "retail"),
        ];
        let matches = Matcher::new(MatcherConfig::default())
            .rank(&supplies, &demands)
            .unwrap();

        let counts = TierCounts::from_matches(&matches);
        assert_eq!(counts.strong + counts.good + counts.open, 2);
        assert!(counts.open >= 1);
    }
}
