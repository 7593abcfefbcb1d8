//! Pairwise supply x demand scoring and ranking.
//!
//! Every pair gets four sub-scores on a 0-100 scale. They are combined with a
//! weight table that is rebuilt for each pair: when a sub-score does not
//! apply (size is missing on either side) it is dropped from the table and
//! the remaining weights are rescaled so they still sum to 1.0.

use crate::core::buyer_seller::{self, ConnectorMode};
use crate::core::semantic;
use crate::domain::model::{Match, MatchTier, NormalizedRecord, RecordIssue, ScoreBreakdown, SubScore};
use crate::utils::error::{ConnectorError, Result};
use crate::utils::validation::{validate_range, Validate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

pub const MAX_SCORE: f64 = 100.0;
const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Relative importance of each sub-score. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub industry: f64,
    pub signal: f64,
    pub size: f64,
    pub hint: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            industry: 0.35,
            signal: 0.30,
            size: 0.15,
            hint: 0.20,
        }
    }
}

impl ScoringWeights {
    pub fn get(&self, sub_score: SubScore) -> f64 {
        match sub_score {
            SubScore::Industry => self.industry,
            SubScore::Signal => self.signal,
            SubScore::Size => self.size,
            SubScore::Hint => self.hint,
        }
    }

    /// Weight table for one pair, restricted to the applicable sub-scores and
    /// rescaled to sum to 1.0.
    pub fn applied(&self, applicable: &[SubScore]) -> Vec<(SubScore, f64)> {
        let total: f64 = applicable.iter().map(|s| self.get(*s)).sum();
        if total <= 0.0 {
            let even = 1.0 / applicable.len().max(1) as f64;
            return applicable.iter().map(|s| (*s, even)).collect();
        }
        applicable
            .iter()
            .map(|s| (*s, self.get(*s) / total))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub weights: ScoringWeights,
    /// Size score when the two bands are adjacent.
    pub size_partial_score: f64,
    /// Hint score when both records carry the same category.
    pub hint_bonus: f64,
    pub strong_threshold: f64,
    pub good_threshold: f64,
    pub mode: Option<ConnectorMode>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            size_partial_score: 50.0,
            hint_bonus: MAX_SCORE,
            strong_threshold: 70.0,
            good_threshold: 45.0,
            mode: None,
        }
    }
}

impl Validate for MatcherConfig {
    fn validate(&self) -> Result<()> {
        for sub_score in SubScore::ALL {
            validate_range(
                &format!("matching.weights.{}", sub_score.as_str()),
                self.weights.get(sub_score),
                0.0,
                1.0,
            )?;
        }

        let sum: f64 = SubScore::ALL.iter().map(|s| self.weights.get(*s)).sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ConnectorError::ConfigValidationError {
                field: "matching.weights".to_string(),
                message: format!("weights must sum to 1.0, got {:.4}", sum),
            });
        }

        validate_range("matching.size_partial_score", self.size_partial_score, 0.0, MAX_SCORE)?;
        validate_range("matching.hint_bonus", self.hint_bonus, 0.0, MAX_SCORE)?;
        validate_range("matching.good_threshold", self.good_threshold, 0.0, MAX_SCORE)?;
        validate_range(
            "matching.strong_threshold",
            self.strong_threshold,
            self.good_threshold,
            MAX_SCORE,
        )?;
        Ok(())
    }
}

pub struct Matcher {
    config: MatcherConfig,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(MatcherConfig::default())
    }
}

struct Scored {
    supply_index: usize,
    demand_index: usize,
    score: f64,
    breakdown: ScoreBreakdown,
    buyer_seller_valid: Option<bool>,
}

impl Matcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    pub fn industry_score(&self, supply: &NormalizedRecord, demand: &NormalizedRecord) -> f64 {
        let supply_focus = join_text(&supply.industry, &supply.context);
        let demand_focus = join_text(&demand.industry, &demand.context);
        semantic::overlap_score(&supply_focus, &demand_focus)
    }

    pub fn signal_score(&self, supply: &NormalizedRecord, demand: &NormalizedRecord) -> f64 {
        semantic::overlap_score(&supply.signal, &demand.signal)
    }

    /// `None` when either side has no size indicator.
    pub fn size_score(&self, supply: &NormalizedRecord, demand: &NormalizedRecord) -> Option<f64> {
        let (supply_size, demand_size) = (supply.size?, demand.size?);
        Some(match supply_size.distance(demand_size) {
            0 => MAX_SCORE,
            1 => self.config.size_partial_score,
            _ => 0.0,
        })
    }

    pub fn hint_score(&self, supply: &NormalizedRecord, demand: &NormalizedRecord) -> f64 {
        match (supply.category.as_deref(), demand.category.as_deref()) {
            (Some(a), Some(b)) if a.trim().eq_ignore_ascii_case(b.trim()) => self.config.hint_bonus,
            _ => 0.0,
        }
    }

    fn breakdown(&self, supply: &NormalizedRecord, demand: &NormalizedRecord) -> (f64, ScoreBreakdown) {
        let industry = self.industry_score(supply, demand);
        let signal = self.signal_score(supply, demand);
        let size = self.size_score(supply, demand);
        let hint = self.hint_score(supply, demand);

        let applicable: Vec<SubScore> = SubScore::ALL
            .into_iter()
            .filter(|s| *s != SubScore::Size || size.is_some())
            .collect();
        let weights = self.config.weights.applied(&applicable);

        let total: f64 = weights
            .iter()
            .map(|(sub_score, weight)| {
                let value = match sub_score {
                    SubScore::Industry => industry,
                    SubScore::Signal => signal,
                    SubScore::Size => size.unwrap_or(0.0),
                    SubScore::Hint => hint,
                };
                value * weight
            })
            .sum();

        (
            total.clamp(0.0, MAX_SCORE),
            ScoreBreakdown {
                industry,
                signal,
                size,
                hint,
                weights,
            },
        )
    }

    pub fn tier_for(&self, score: f64) -> MatchTier {
        if score >= self.config.strong_threshold {
            MatchTier::Strong
        } else if score >= self.config.good_threshold {
            MatchTier::Good
        } else {
            MatchTier::Open
        }
    }

    fn score_indexed(
        &self,
        supply_index: usize,
        supply: &NormalizedRecord,
        demand_index: usize,
        demand: &NormalizedRecord,
    ) -> Scored {
        let (score, breakdown) = self.breakdown(supply, demand);
        let buyer_seller_valid = self
            .config
            .mode
            .map(|mode| buyer_seller::validate_match(supply, demand, mode).is_valid());
        Scored {
            supply_index,
            demand_index,
            score,
            breakdown,
            buyer_seller_valid,
        }
    }

    /// Scores a single pair. Indices are positions in the caller's input
    /// slices; a lone pair is rank 1 among its candidates.
    pub fn score(
        &self,
        supply: (usize, &NormalizedRecord),
        demand: (usize, &NormalizedRecord),
    ) -> Match {
        let scored = self.score_indexed(supply.0, supply.1, demand.0, demand.1);
        self.into_match(scored, 1)
    }

    fn into_match(&self, scored: Scored, rank: usize) -> Match {
        let tier = self.tier_for(scored.score);
        Match::new(
            scored.supply_index,
            scored.demand_index,
            scored.score,
            scored.breakdown,
            rank,
            tier,
            scored.buyer_seller_valid,
        )
    }

    /// Scores every supply x demand pair and returns them best first.
    ///
    /// Ties on overall score go to the higher industry sub-score, then to the
    /// pair seen first (demand order, then supply order). Nothing is
    /// filtered out. Records without a company name or domain fail the whole
    /// call before any scoring happens.
    pub fn rank(
        &self,
        supplies: &[NormalizedRecord],
        demands: &[NormalizedRecord],
    ) -> Result<Vec<Match>> {
        let offenders: Vec<RecordIssue> = supplies
            .iter()
            .chain(demands.iter())
            .filter(|record| !record.is_matchable())
            .map(|record| RecordIssue::new(record.record_key.clone(), "no company name or domain"))
            .collect();
        if !offenders.is_empty() {
            return Err(ConnectorError::InvalidRecords { records: offenders });
        }

        let mut scored = Vec::with_capacity(supplies.len() * demands.len());
        for (demand_index, demand) in demands.iter().enumerate() {
            for (supply_index, supply) in supplies.iter().enumerate() {
                scored.push(self.score_indexed(supply_index, supply, demand_index, demand));
            }
        }

        scored.sort_by(compare_scored);

        let mut next_rank: HashMap<usize, usize> = HashMap::new();
        let matches: Vec<Match> = scored
            .into_iter()
            .map(|s| {
                let rank = next_rank.entry(s.demand_index).or_insert(0);
                *rank += 1;
                let rank = *rank;
                self.into_match(s, rank)
            })
            .collect();

        tracing::info!(
            "Ranked {} candidate pairs ({} supply x {} demand)",
            matches.len(),
            supplies.len(),
            demands.len()
        );
        Ok(matches)
    }
}

fn compare_scored(a: &Scored, b: &Scored) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.breakdown.industry.total_cmp(&a.breakdown.industry))
        .then_with(|| a.demand_index.cmp(&b.demand_index))
        .then_with(|| a.supply_index.cmp(&b.supply_index))
}

fn join_text(a: &str, b: &str) -> String {
    format!("{} {}", a, b).trim().to_string()
}
