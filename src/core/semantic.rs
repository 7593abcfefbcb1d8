//! Keyword expansion over a fixed thesaurus.
//!
//! Each group lists terms that should be treated as the same topic when
//! comparing a supply record's focus against a demand record's industry or
//! signal. A term may sit in several groups; it expands to their union.

use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

const GROUPS: &[&[&str]] = &[
    &[
        "healthcare", "health", "medical", "medicine", "hospital", "hospitals", "clinic",
        "clinical", "patient", "patients", "care", "healthtech", "medtech", "physician",
    ],
    &[
        "biotech", "biotechnology", "pharma", "pharmaceutical", "therapeutics", "drug",
        "molecule", "clinical", "trial", "fda", "lifesciences", "life sciences",
    ],
    &[
        "it", "tech", "technology", "software", "saas", "platform", "cloud", "digital",
        "engineering", "developer", "devops", "data", "ai",
    ],
    &[
        "staffing", "recruiting", "recruitment", "recruiter", "hiring", "talent", "headcount",
        "placement", "executive search", "hr", "human resources", "jobs", "roles",
        "open roles", "open positions", "job posting",
    ],
    &[
        "sales", "buyer", "buyers", "revenue", "pipeline", "leads", "deals", "customers",
        "clients", "intros", "introductions", "demand generation", "business development",
        "bd", "account executive", "sdr",
    ],
    &[
        "marketing", "growth", "brand", "advertising", "content", "seo", "demand generation",
        "campaigns", "agency",
    ],
    &[
        "engineer", "engineers", "engineering", "developer", "developers", "technical",
        "architect",
    ],
    &[
        "finance", "financial", "fintech", "banking", "payments", "accounting", "lending",
        "insurance", "insurtech",
    ],
    &[
        "wealth", "family office", "hnw", "high net worth", "uhnw", "private wealth", "ria",
        "advisory", "financial planning", "investor", "investors",
    ],
    &[
        "real estate", "property", "cre", "commercial", "multifamily", "developer",
        "proptech", "construction", "sponsor",
    ],
    &[
        "logistics", "supply chain", "freight", "shipping", "shipper", "3pl", "warehouse",
        "fulfillment", "distribution", "transportation",
    ],
    &[
        "crypto", "blockchain", "web3", "defi", "token", "exchange", "protocol", "nft", "dao",
    ],
    &[
        "retail", "ecommerce", "consumer", "cpg", "dtc", "store", "stores", "shopping",
        "merchandise",
    ],
    &[
        "manufacturing", "industrial", "factory", "production", "hardware", "machinery",
    ],
    &["education", "edtech", "school", "schools", "university", "learning", "training"],
    &["legal", "law", "legaltech", "compliance", "regulatory", "kyc", "aml"],
    &["security", "cybersecurity", "infosec", "identity", "privacy"],
    &[
        "funding", "raised", "series", "seed", "venture", "vc", "capital", "investment",
        "scaling", "expansion",
    ],
    &[
        "enterprise", "b2b", "vendor", "solution", "solutions", "integration", "partnership",
        "partnerships",
    ],
];

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "have", "in",
    "into", "is", "of", "on", "or", "our", "the", "their", "to", "we", "with", "who", "that",
    "this", "new", "more", "all",
];

struct Thesaurus {
    index: HashMap<&'static str, Vec<usize>>,
    phrases: Vec<&'static str>,
}

fn thesaurus() -> &'static Thesaurus {
    static THESAURUS: OnceLock<Thesaurus> = OnceLock::new();
    THESAURUS.get_or_init(|| {
        let mut index: HashMap<&'static str, Vec<usize>> = HashMap::new();
        let mut phrases = Vec::new();
        for (group_id, group) in GROUPS.iter().enumerate() {
            for term in group.iter() {
                let groups = index.entry(*term).or_default();
                if !groups.contains(&group_id) {
                    groups.push(group_id);
                }
                if term.contains(' ') && !phrases.contains(term) {
                    phrases.push(*term);
                }
            }
        }
        Thesaurus { index, phrases }
    })
}

fn normalize_term(term: &str) -> String {
    term.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Maps a token to the form the thesaurus knows, dropping a plural `s`
/// when only the singular is listed.
fn canonical(token: &str) -> String {
    let table = &thesaurus().index;
    if table.contains_key(token) {
        return token.to_string();
    }
    if let Some(singular) = token.strip_suffix('s') {
        if singular.len() > 1 && table.contains_key(singular) {
            return singular.to_string();
        }
    }
    token.to_string()
}

/// Expands a keyword, phrase or industry label into its related terms.
/// The normalized input is always part of the result.
pub fn expand(term: &str) -> BTreeSet<String> {
    let normalized = normalize_term(term);
    let mut expanded = BTreeSet::new();
    if normalized.is_empty() {
        expanded.insert(term.to_string());
        return expanded;
    }

    let table = &thesaurus().index;
    let key = canonical(&normalized);
    if let Some(groups) = table.get(key.as_str()) {
        for &group_id in groups {
            expanded.extend(GROUPS[group_id].iter().map(|t| t.to_string()));
        }
    } else if normalized.contains(' ') {
        for token in tokenize(&normalized) {
            if let Some(groups) = table.get(token.as_str()) {
                for &group_id in groups {
                    expanded.extend(GROUPS[group_id].iter().map(|t| t.to_string()));
                }
            }
        }
    }

    expanded.insert(normalized);
    expanded
}

/// A token from free text and everything it expands to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermExpansion {
    pub term: String,
    pub related: BTreeSet<String>,
}

/// Splits free text into lowercase terms. Known multi-word phrases stay
/// together; stop words, digits and one-letter fragments are dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    let words: Vec<String> = text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();

    let phrases = &thesaurus().phrases;
    let mut tokens = Vec::new();
    let mut i = 0;
    'words: while i < words.len() {
        // Longest known phrase first.
        for len in [3, 2] {
            if i + len <= words.len() {
                let phrase = words[i..i + len].join(" ");
                if phrases.contains(&phrase.as_str()) {
                    tokens.push(phrase);
                    i += len;
                    continue 'words;
                }
            }
        }

        let word = &words[i];
        i += 1;
        if word.len() < 2 || STOP_WORDS.contains(&word.as_str()) {
            continue;
        }
        if word.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let token = canonical(word);
        if !tokens.contains(&token) {
            tokens.push(token);
        }
    }
    tokens
}

pub fn expand_text(text: &str) -> Vec<TermExpansion> {
    tokenize(text)
        .into_iter()
        .map(|term| TermExpansion {
            related: expand(&term),
            term,
        })
        .collect()
}

/// Symmetric overlap on 0-100: the share of tokens on either side whose
/// expansion meets the other side's expanded terms.
pub fn overlap_score(left: &str, right: &str) -> f64 {
    let left = expand_text(left);
    let right = expand_text(right);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let left_all: BTreeSet<&str> = left
        .iter()
        .flat_map(|t| t.related.iter().map(String::as_str))
        .collect();
    let right_all: BTreeSet<&str> = right
        .iter()
        .flat_map(|t| t.related.iter().map(String::as_str))
        .collect();

    let hits = |side: &[TermExpansion], other: &BTreeSet<&str>| {
        side.iter()
            .filter(|t| t.related.iter().any(|r| other.contains(r.as_str())))
            .count()
    };

    let matched = hits(&left, &right_all) + hits(&right, &left_all);
    let total = left.len() + right.len();
    (matched as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}
