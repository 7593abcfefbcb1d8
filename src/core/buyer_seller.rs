//! Buyer/seller overlap checks per connector mode.
//!
//! Industry overlap alone is not enough for an intro: the supply side has to
//! sell to the kind of company the demand side is. A supply record that is a
//! peer of its would-be buyers (a staffing agency pitched to other staffing
//! agencies) is flagged.

use crate::domain::model::NormalizedRecord;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorMode {
    Recruiting,
    BiotechLicensing,
    WealthManagement,
    RealEstateCapital,
    Logistics,
    Crypto,
    EnterprisePartnerships,
    Custom,
}

struct ModeTokens {
    supply_buyer: &'static [&'static str],
    demand_type: &'static [&'static str],
    disallowed_peers: &'static [&'static str],
}

const EMPTY: ModeTokens = ModeTokens {
    supply_buyer: &[],
    demand_type: &[],
    disallowed_peers: &[],
};

impl ConnectorMode {
    pub const ALL: [ConnectorMode; 8] = [
        Self::Recruiting,
        Self::BiotechLicensing,
        Self::WealthManagement,
        Self::RealEstateCapital,
        Self::Logistics,
        Self::Crypto,
        Self::EnterprisePartnerships,
        Self::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recruiting => "recruiting",
            Self::BiotechLicensing => "biotech_licensing",
            Self::WealthManagement => "wealth_management",
            Self::RealEstateCapital => "real_estate_capital",
            Self::Logistics => "logistics",
            Self::Crypto => "crypto",
            Self::EnterprisePartnerships => "enterprise_partnerships",
            Self::Custom => "custom",
        }
    }

    fn tokens(self) -> ModeTokens {
        match self {
            Self::Recruiting => ModeTokens {
                supply_buyer: &[
                    "hiring", "talent acquisition", "headcount", "open roles", "recruiting",
                    "staffing", "placement", "executive search", "hr", "human resources",
                ],
                demand_type: &[
                    "hiring", "growing team", "scaling", "open positions", "headcount",
                    "talent", "recruiting", "job posting",
                ],
                disallowed_peers: &[
                    "staffing agency", "recruitment firm", "headhunter", "talent agency",
                ],
            },
            Self::BiotechLicensing => ModeTokens {
                supply_buyer: &[
                    "pharma", "biotech", "licensing", "bd", "business development",
                    "partnership", "clinical", "pipeline", "therapeutic", "molecule",
                ],
                demand_type: &[
                    "biotech", "pharma", "clinical stage", "therapeutics", "drug", "molecule",
                    "pipeline", "fda", "trial",
                ],
                disallowed_peers: &["cro", "contract research", "clinical trial services"],
            },
            Self::WealthManagement => ModeTokens {
                supply_buyer: &[
                    "hnw", "high net worth", "uhnw", "family office", "wealth",
                    "private client", "affluent", "investor", "estate",
                ],
                demand_type: &[
                    "ria", "wealth", "advisory", "financial planning", "fiduciary", "cfp",
                    "family office", "private wealth",
                ],
                disallowed_peers: &[
                    "wealth advisor", "ria", "financial planner", "cfp",
                    "wealth management firm",
                ],
            },
            Self::RealEstateCapital => ModeTokens {
                supply_buyer: &[
                    "developer", "sponsor", "operator", "gp", "real estate", "property", "cre",
                    "commercial", "multifamily", "acquisition",
                ],
                demand_type: &[
                    "developer", "sponsor", "real estate", "property", "cre", "commercial",
                    "multifamily", "development",
                ],
                disallowed_peers: &["lender", "debt fund", "capital provider", "equity fund"],
            },
            Self::Logistics => ModeTokens {
                supply_buyer: &[
                    "shipper", "manufacturer", "retailer", "ecommerce", "brand", "fulfillment",
                    "warehouse", "distribution",
                ],
                demand_type: &[
                    "shipper", "logistics", "supply chain", "3pl", "freight", "warehouse",
                    "fulfillment", "distribution",
                ],
                disallowed_peers: &[
                    "3pl", "freight broker", "logistics provider", "warehouse operator",
                ],
            },
            Self::Crypto => ModeTokens {
                supply_buyer: &[
                    "product", "engineering", "fintech", "platform", "exchange", "defi",
                    "protocol", "web3", "blockchain", "crypto", "payments", "compliance", "kyc",
                    "aml",
                ],
                demand_type: &[
                    "crypto", "blockchain", "web3", "defi", "protocol", "exchange", "token",
                    "nft", "dao", "fintech platform",
                ],
                disallowed_peers: &[
                    "wealth", "ria", "financial advisor", "wealth management", "family office",
                    "private wealth", "investment advisor",
                ],
            },
            Self::EnterprisePartnerships => ModeTokens {
                supply_buyer: &[
                    "enterprise", "b2b", "saas", "platform", "integration", "partnership",
                    "vendor", "solution", "software",
                ],
                demand_type: &[
                    "enterprise", "b2b", "saas", "platform", "software", "solution", "vendor",
                ],
                disallowed_peers: &["consultant", "agency", "implementation partner"],
            },
            Self::Custom => EMPTY,
        }
    }
}

impl std::fmt::Display for ConnectorMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConnectorMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == wanted)
            .ok_or_else(|| {
                format!(
                    "unknown mode '{}', expected one of: {}",
                    s,
                    Self::ALL.map(|m| m.as_str()).join(", ")
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuyerSellerVerdict {
    Valid,
    Mismatch,
}

impl BuyerSellerVerdict {
    pub fn is_valid(self) -> bool {
        self == Self::Valid
    }
}

fn searchable(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn matched<'a>(tokens: &[&'a str], text: &str) -> Vec<&'a str> {
    tokens.iter().copied().filter(|t| text.contains(t)).collect()
}

fn cross_contaminated(supply: &[&str], demand: &[&str], mode: ConnectorMode) -> bool {
    match mode {
        ConnectorMode::Crypto => {
            const WEALTH: &[&str] = &["wealth", "ria", "advisor", "family office", "private wealth"];
            supply.iter().any(|t| WEALTH.contains(t))
        }
        ConnectorMode::WealthManagement => {
            const PLATFORM: &[&str] = &["crypto", "blockchain", "fintech platform", "exchange"];
            demand.iter().any(|t| PLATFORM.contains(t))
        }
        _ => false,
    }
}

/// Checks whether `supply` plausibly sells to `demand` under `mode`.
///
/// Custom mode always passes. When neither side mentions any of the mode's
/// tokens there is not enough signal to block, so the pair passes too.
pub fn validate_match(
    supply: &NormalizedRecord,
    demand: &NormalizedRecord,
    mode: ConnectorMode,
) -> BuyerSellerVerdict {
    if mode == ConnectorMode::Custom {
        return BuyerSellerVerdict::Valid;
    }
    let tokens = mode.tokens();

    let supply_text = searchable(&[
        &supply.context,
        &supply.industry,
        supply.title.as_deref().unwrap_or_default(),
    ]);
    let demand_text = searchable(&[&demand.context, &demand.industry, &demand.signal]);

    if tokens
        .disallowed_peers
        .iter()
        .any(|peer| supply_text.contains(peer))
    {
        return BuyerSellerVerdict::Mismatch;
    }

    let supply_matched = matched(tokens.supply_buyer, &supply_text);
    let demand_matched = matched(tokens.demand_type, &demand_text);
    if supply_matched.is_empty() && demand_matched.is_empty() {
        return BuyerSellerVerdict::Valid;
    }

    if cross_contaminated(&supply_matched, &demand_matched, mode) {
        return BuyerSellerVerdict::Mismatch;
    }

    BuyerSellerVerdict::Valid
}
