use crate::domain::model::{NormalizedRecord, RawRow, RecordIssue, Side, SignalKind, SizeBand};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use url::Url;

const FULL_NAME: &[&str] = &["full name", "name", "contact", "contact name"];
const FIRST_NAME: &[&str] = &["first name", "firstname"];
const LAST_NAME: &[&str] = &["last name", "lastname", "surname"];
const COMPANY: &[&str] = &["company name", "company", "organization", "organisation", "account"];
const DOMAIN: &[&str] = &["domain", "website", "company website", "company domain", "url"];
const EMAIL: &[&str] = &["email", "work email", "email address"];
const TITLE: &[&str] = &["title", "job title", "position"];
const INDUSTRY: &[&str] = &["industry", "focus", "vertical", "sector"];
const SIGNAL: &[&str] = &["signal", "hiring signal", "need", "intent"];
const CONTEXT: &[&str] = &[
    "context",
    "service description",
    "company description",
    "description",
    "about",
    "summary",
    "notes",
];
const SIZE: &[&str] = &["size", "company size", "employees", "employee count", "headcount"];
const CATEGORY: &[&str] = &["category", "match bucket", "bucket", "segment"];

/// Records that passed normalization, plus the rows that could not be matched.
#[derive(Debug, Clone, Default)]
pub struct NormalizeOutcome {
    pub records: Vec<NormalizedRecord>,
    pub rejected: Vec<RecordIssue>,
}

struct Columns<'a> {
    by_header: HashMap<String, &'a str>,
}

impl<'a> Columns<'a> {
    fn new(row: &'a RawRow) -> Self {
        let by_header = row
            .data
            .iter()
            .map(|(header, value)| (header_key(header), value.as_str()))
            .collect();
        Self { by_header }
    }

    /// First non-empty value among the aliases, whitespace collapsed.
    fn pick(&self, aliases: &[&str]) -> String {
        aliases
            .iter()
            .filter_map(|alias| self.by_header.get(*alias))
            .map(|value| normalize_field(value))
            .find(|value| !value.is_empty())
            .unwrap_or_default()
    }
}

fn header_key(header: &str) -> String {
    normalize_field(&header.replace(['_', '-'], " ")).to_lowercase()
}

/// Trims and collapses internal whitespace. Placeholder values such as
/// "null" or "N/A" become empty.
pub fn normalize_field(value: &str) -> String {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.to_lowercase().as_str() {
        "null" | "none" | "nan" | "n/a" | "-" => String::new(),
        _ => collapsed,
    }
}

/// Title-cases names that arrive all upper or all lower case.
fn normalize_name(value: &str) -> String {
    let value = normalize_field(value);
    let has_lower = value.chars().any(char::is_lowercase);
    let has_upper = value.chars().any(char::is_uppercase);
    if has_lower && has_upper {
        return value;
    }
    value
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Reduces a URL or bare hostname to `example.com`: no scheme, `www.`,
/// port, path, query or fragment. Returns an empty string when nothing
/// domain-like is left.
pub fn clean_domain(raw: &str) -> String {
    let trimmed = raw.trim().to_lowercase();
    if trimmed.is_empty() {
        return String::new();
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.clone()
    } else {
        format!("http://{}", trimmed.trim_start_matches("//"))
    };

    let host = match Url::parse(&with_scheme) {
        Ok(url) => url.host_str().unwrap_or_default().to_string(),
        Err(_) => trimmed
            .split("://")
            .last()
            .unwrap_or_default()
            .split(['/', '?', '#', ':'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };

    let host = host.trim_start_matches("www.").trim_end_matches('.');
    if !host.contains('.') {
        return String::new();
    }

    host.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '-')
        .collect()
}

/// First word and the remainder.
pub fn split_name(full_name: &str) -> (String, String) {
    let mut parts = full_name.split_whitespace();
    let first = parts.next().unwrap_or_default().to_string();
    let last = parts.collect::<Vec<_>>().join(" ");
    (first, last)
}

fn normalize_email(raw: &str) -> Option<String> {
    let email = normalize_field(raw).to_lowercase();
    match email.split_once('@') {
        Some((local, host)) if !local.is_empty() && host.contains('.') => Some(email),
        _ => None,
    }
}

fn hiring_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)^hiring[:\s]").expect("static regex"))
}

pub fn classify_signal(signal: &str) -> SignalKind {
    if hiring_pattern().is_match(signal) {
        SignalKind::HiringRole
    } else if !signal.is_empty() {
        SignalKind::Growth
    } else {
        SignalKind::ContactRole
    }
}

pub fn normalize_row(row: &RawRow, side: Side, row_index: usize) -> NormalizedRecord {
    let columns = Columns::new(row);
    let mut record = NormalizedRecord::new(side, row_index);

    let full_name = normalize_name(&columns.pick(FULL_NAME));
    let first_name = normalize_name(&columns.pick(FIRST_NAME));
    let last_name = normalize_name(&columns.pick(LAST_NAME));
    if full_name.is_empty() {
        record.full_name = format!("{} {}", first_name, last_name).trim().to_string();
        record.first_name = first_name;
        record.last_name = last_name;
    } else {
        let (first, last) = split_name(&full_name);
        record.first_name = if first_name.is_empty() { first } else { first_name };
        record.last_name = if last_name.is_empty() { last } else { last_name };
        record.full_name = full_name;
    }

    let title = columns.pick(TITLE);
    record.title = (!title.is_empty()).then_some(title);
    record.email = normalize_email(&columns.pick(EMAIL));
    record.company = columns.pick(COMPANY);
    record.domain = clean_domain(&columns.pick(DOMAIN));
    record.industry = columns.pick(INDUSTRY);
    record.context = columns.pick(CONTEXT);

    let explicit_signal = columns.pick(SIGNAL);
    record.signal_kind = classify_signal(&explicit_signal);
    record.signal = if explicit_signal.is_empty() {
        record.title.clone().unwrap_or_default()
    } else {
        explicit_signal
    };

    record.size = SizeBand::parse(&columns.pick(SIZE));
    let category = columns.pick(CATEGORY);
    record.category = (!category.is_empty()).then_some(category);

    record
}

/// Normalizes every row; rows without a company name or domain are reported
/// in `rejected` and left out of `records`.
pub fn normalize_rows(rows: &[RawRow], side: Side) -> NormalizeOutcome {
    let mut outcome = NormalizeOutcome::default();
    for (row_index, row) in rows.iter().enumerate() {
        let record = normalize_row(row, side, row_index);
        if record.is_matchable() {
            outcome.records.push(record);
        } else {
            tracing::debug!("Skipping {}: no company or domain", record.record_key);
            outcome.rejected.push(RecordIssue::new(
                record.record_key,
                "no company name or domain",
            ));
        }
    }

    tracing::info!(
        "Normalized {} {} records ({} rejected)",
        outcome.records.len(),
        side,
        outcome.rejected.len()
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_domain() {
        assert_eq!(clean_domain("https://www.Example.com/path?q=1"), "example.com");
        assert_eq!(clean_domain("HTTP://Example.COM"), "example.com");
        assert_eq!(clean_domain("www.example.com/"), "example.com");
        assert_eq!(clean_domain("example.com:8080"), "example.com");
        assert_eq!(clean_domain("sub.acme.co.uk#about"), "sub.acme.co.uk");
        assert_eq!(clean_domain("localhost"), "");
        assert_eq!(clean_domain("   "), "");
    }

    #[test]
    fn test_split_name() {
        assert_eq!(split_name("Jane Mary Smith"), ("Jane".to_string(), "Mary Smith".to_string()));
        assert_eq!(split_name("Madonna"), ("Madonna".to_string(), String::new()));
        assert_eq!(split_name(""), (String::new(), String::new()));
    }

    #[test]
    fn test_normalize_row_with_aliases() {
        let row = RawRow::from_pairs([
            ("Full Name", "  jane   DOE "),
            ("company_name", "Acme Health"),
            ("Website", "https://www.acmehealth.com/careers"),
            ("Email", ""),
            ("Industry", "Healthcare SaaS"),
            ("Hiring Signal", "Hiring: 3 Senior Sales Engineers"),
            ("Company Size", "51-200"),
            ("Match Bucket", "health-sales"),
        ]);

        let record = normalize_row(&row, Side::Demand, 4);

        assert_eq!(record.record_key, "demand:4");
        assert_eq!(record.full_name, "jane DOE");
        assert_eq!(record.first_name, "jane");
        assert_eq!(record.last_name, "DOE");
        assert_eq!(record.domain, "acmehealth.com");
        assert_eq!(record.email, None);
        assert_eq!(record.signal_kind, SignalKind::HiringRole);
        assert_eq!(record.size, Some(SizeBand::Mid));
        assert_eq!(record.category.as_deref(), Some("health-sales"));
    }

    #[test]
    fn test_signal_falls_back_to_title() {
        let row = RawRow::from_pairs([
            ("Company", "Bolt Staffing"),
            ("Title", "Founder"),
            ("Email", "JANE@BOLT.IO"),
        ]);

        let record = normalize_row(&row, Side::Supply, 0);
        assert_eq!(record.signal, "Founder");
        assert_eq!(record.signal_kind, SignalKind::ContactRole);
        assert_eq!(record.email.as_deref(), Some("jane@bolt.io"));
    }

    #[test]
    fn test_normalize_rows_rejects_unmatchable() {
        let rows = vec![
            RawRow::from_pairs([("Full Name", "No Company")]),
            RawRow::from_pairs([("Domain", "acme.io")]),
        ];

        let outcome = normalize_rows(&rows, Side::Supply);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].row_index, 1);
        assert_eq!(outcome.rejected, vec![RecordIssue::new("supply:0", "no company name or domain")]);
    }
}
