use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// One row as read from a CSV file, keyed by header.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRow {
    pub data: HashMap<String, String>,
}

impl RawRow {
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            data: pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Supply,
    Demand,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Supply => "supply",
            Self::Demand => "demand",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalKind {
    HiringRole,
    Growth,
    ContactRole,
}

/// Headcount bands, ordered from smallest to largest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SizeBand {
    Micro,
    Small,
    Mid,
    Large,
    Enterprise,
}

impl SizeBand {
    pub fn from_headcount(headcount: u64) -> Self {
        match headcount {
            0..=10 => Self::Micro,
            11..=50 => Self::Small,
            51..=200 => Self::Mid,
            201..=1000 => Self::Large,
            _ => Self::Enterprise,
        }
    }

    /// Accepts a headcount ("120"), a range ("51-200", "1,001-5,000", "10000+")
    /// or a label ("startup", "smb", "mid-market", "enterprise").
    pub fn parse(raw: &str) -> Option<Self> {
        let text = raw.trim().to_lowercase().replace(',', "");
        if text.is_empty() {
            return None;
        }

        let label = match text.as_str() {
            "micro" | "solo" | "startup" | "seed" => Some(Self::Micro),
            "small" | "smb" | "small business" => Some(Self::Small),
            "mid" | "medium" | "mid-market" | "midmarket" | "mid market" => Some(Self::Mid),
            "large" => Some(Self::Large),
            "enterprise" | "corporate" => Some(Self::Enterprise),
            _ => None,
        };
        if label.is_some() {
            return label;
        }

        // For ranges the lower bound decides the band.
        let lower: String = text
            .trim_start_matches(|c: char| !c.is_ascii_digit())
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        lower.parse::<u64>().ok().map(Self::from_headcount)
    }

    pub fn distance(self, other: SizeBand) -> usize {
        (self as isize - other as isize).unsigned_abs()
    }
}

/// Canonical record shape shared by supply and demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub record_key: String,
    pub side: Side,
    pub row_index: usize,

    pub full_name: String,
    pub first_name: String,
    pub last_name: String,
    pub title: Option<String>,
    pub email: Option<String>,

    pub company: String,
    pub domain: String,

    pub industry: String,
    pub signal: String,
    pub signal_kind: SignalKind,
    pub context: String,

    pub size: Option<SizeBand>,
    /// Manually assigned match bucket.
    pub category: Option<String>,
}

impl NormalizedRecord {
    pub fn new(side: Side, row_index: usize) -> Self {
        Self {
            record_key: format!("{}:{}", side, row_index),
            side,
            row_index,
            full_name: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            title: None,
            email: None,
            company: String::new(),
            domain: String::new(),
            industry: String::new(),
            signal: String::new(),
            signal_kind: SignalKind::ContactRole,
            context: String::new(),
            size: None,
            category: None,
        }
    }

    pub fn is_matchable(&self) -> bool {
        !self.company.trim().is_empty() || !self.domain.trim().is_empty()
    }

    pub fn needs_email(&self) -> bool {
        self.email.as_deref().map(str::trim).unwrap_or("").is_empty()
    }
}

/// A record that was refused, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordIssue {
    pub record_key: String,
    pub reason: String,
}

impl RecordIssue {
    pub fn new(record_key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            record_key: record_key.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubScore {
    Industry,
    Signal,
    Size,
    Hint,
}

impl SubScore {
    pub const ALL: [SubScore; 4] = [Self::Industry, Self::Signal, Self::Size, Self::Hint];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Industry => "industry",
            Self::Signal => "signal",
            Self::Size => "size",
            Self::Hint => "hint",
        }
    }
}

/// Per-pair sub-scores on the 0-100 scale, plus the weights that combined them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub industry: f64,
    pub signal: f64,
    /// `None` when either record has no size indicator.
    pub size: Option<f64>,
    pub hint: f64,
    pub weights: Vec<(SubScore, f64)>,
}

impl ScoreBreakdown {
    pub fn weight_sum(&self) -> f64 {
        self.weights.iter().map(|(_, w)| w).sum()
    }

    pub fn weight_of(&self, sub_score: SubScore) -> Option<f64> {
        self.weights
            .iter()
            .find(|(name, _)| *name == sub_score)
            .map(|(_, w)| *w)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchTier {
    Strong,
    Good,
    Open,
}

impl MatchTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strong => "strong",
            Self::Good => "good",
            Self::Open => "open",
        }
    }
}

/// A scored supply x demand pair. Records are referenced by their index in
/// the slices passed to the matcher.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Match {
    supply_index: usize,
    demand_index: usize,
    score: f64,
    breakdown: ScoreBreakdown,
    rank: usize,
    tier: MatchTier,
    buyer_seller_valid: Option<bool>,
}

impl Match {
    pub(crate) fn new(
        supply_index: usize,
        demand_index: usize,
        score: f64,
        breakdown: ScoreBreakdown,
        rank: usize,
        tier: MatchTier,
        buyer_seller_valid: Option<bool>,
    ) -> Self {
        Self {
            supply_index,
            demand_index,
            score,
            breakdown,
            rank,
            tier,
            buyer_seller_valid,
        }
    }

    pub fn supply_index(&self) -> usize {
        self.supply_index
    }

    pub fn demand_index(&self) -> usize {
        self.demand_index
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn breakdown(&self) -> &ScoreBreakdown {
        &self.breakdown
    }

    /// 1-based position among all matches for the same demand record.
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn tier(&self) -> MatchTier {
        self.tier
    }

    pub fn buyer_seller_valid(&self) -> Option<bool> {
        self.buyer_seller_valid
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Apollo,
    Anymail,
    ConnectorAgent,
    None,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Apollo => "apollo",
            Self::Anymail => "anymail",
            Self::ConnectorAgent => "connector_agent",
            Self::None => "none",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "apollo" => Ok(Self::Apollo),
            "anymail" | "anymailfinder" => Ok(Self::Anymail),
            "connector_agent" | "connector-agent" | "ssm" => Ok(Self::ConnectorAgent),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub email: Option<String>,
    pub provider: Provider,
    pub verified: Option<bool>,
    pub confidence: Option<u8>,
    pub resolved_at: DateTime<Utc>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub providers_attempted: Vec<Provider>,
    /// Set on results served from the enrichment cache; never persisted.
    #[serde(skip)]
    pub from_cache: bool,
}

impl EnrichmentResult {
    pub fn not_found(providers_attempted: Vec<Provider>, resolved_at: DateTime<Utc>) -> Self {
        Self {
            email: None,
            provider: Provider::None,
            verified: None,
            confidence: None,
            resolved_at,
            first_name: String::new(),
            last_name: String::new(),
            title: String::new(),
            providers_attempted,
            from_cache: false,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.email.is_some()
    }
}

/// Persisted form of a cached enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub result: EnrichmentResult,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
