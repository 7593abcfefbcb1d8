use super::{send_json, trim_base};
use crate::domain::model::Provider;
use crate::domain::ports::{EmailProvider, LookupQuery, ProviderAttempt, ProviderHit};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

pub const DEFAULT_BASE_URL: &str = "https://api.apollo.io";

/// Title keywords, most senior first. Candidates whose title matches none
/// rank below all of these.
const SENIORITY: &[(&str, u8)] = &[
    ("founder", 100),
    ("co-founder", 99),
    ("owner", 98),
    ("partner", 95),
    ("principal", 94),
    ("managing director", 92),
    ("ceo", 90),
    ("cfo", 89),
    ("cto", 88),
    ("coo", 87),
    ("cmo", 86),
    ("cro", 85),
    ("president", 84),
    ("vice president", 70),
    ("vp", 70),
    ("director", 60),
    ("head", 55),
    ("manager", 40),
    ("lead", 35),
    ("senior", 30),
];
const UNRANKED: u8 = 10;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    people: Vec<Person>,
}

#[derive(Debug, Clone, Deserialize)]
struct Person {
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_status: Option<String>,
}

impl Person {
    fn full_name(&self) -> String {
        match &self.name {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => format!(
                "{} {}",
                self.first_name.as_deref().unwrap_or_default(),
                self.last_name.as_deref().unwrap_or_default()
            )
            .trim()
            .to_string(),
        }
    }
}

fn seniority(title: Option<&str>) -> u8 {
    let title = title.unwrap_or_default().to_lowercase();
    SENIORITY
        .iter()
        .filter(|(keyword, _)| title.contains(keyword))
        .map(|(_, rank)| *rank)
        .max()
        .unwrap_or(UNRANKED)
}

/// Picks the candidate to use: the one whose name equals the record's
/// contact, otherwise the most senior. Candidates without an email are
/// never picked.
fn pick_candidate(people: Vec<Person>, wanted_name: &str) -> Option<Person> {
    let wanted = wanted_name.trim().to_lowercase();
    // Reversed so that ties go to the candidate listed first.
    people
        .into_iter()
        .rev()
        .filter(|p| p.email.as_deref().is_some_and(|e| !e.trim().is_empty()))
        .max_by_key(|p| {
            let exact = !wanted.is_empty() && p.full_name().to_lowercase() == wanted;
            (exact, seniority(p.title.as_deref()))
        })
}

/// People search by company domain (or company name when there is no
/// domain), ranked locally.
pub struct ApolloProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl ApolloProvider {
    pub fn new(client: Client, api_key: String, base_url: Option<&str>) -> Self {
        Self {
            client,
            api_key,
            base_url: trim_base(base_url.unwrap_or(DEFAULT_BASE_URL)),
        }
    }
}

#[async_trait]
impl EmailProvider for ApolloProvider {
    fn provider(&self) -> Provider {
        Provider::Apollo
    }

    async fn attempt(&self, query: &LookupQuery) -> ProviderAttempt {
        let mut payload = json!({
            "contact_email_status": ["verified", "likely to engage"],
            "person_seniorities": ["founder", "c_suite", "owner", "partner", "vp", "director", "manager"],
        });
        if !query.domain.is_empty() {
            payload["q_organization_domains_list"] = json!([query.domain]);
        } else if !query.company.is_empty() {
            payload["q_keywords"] = json!(query.company);
        } else {
            return ProviderAttempt::MissingInput("domain");
        }

        let request = self
            .client
            .post(format!("{}/v1/mixed_people/search", self.base_url))
            .header("X-Api-Key", &self.api_key)
            .json(&payload);

        let response: SearchResponse = match send_json(Provider::Apollo, request).await {
            Ok(response) => response,
            Err(attempt) => return attempt,
        };
        tracing::debug!("Apollo returned {} candidates", response.people.len());

        let Some(person) = pick_candidate(response.people, &query.full_name) else {
            return ProviderAttempt::NotFound;
        };

        // A missing status counts as verified; any other status does not.
        let verified = person
            .email_status
            .as_deref()
            .map_or(true, |status| status.eq_ignore_ascii_case("verified"));
        let mut hit = ProviderHit::new(person.email.clone().unwrap_or_default());
        hit.verified = Some(verified);
        hit.first_name = person.first_name.unwrap_or_default();
        hit.last_name = person.last_name.unwrap_or_default();
        hit.title = person.title.unwrap_or_default();
        if verified {
            ProviderAttempt::Found(hit)
        } else {
            ProviderAttempt::Unverified(hit)
        }
    }
}
