use super::{send_json, trim_base};
use crate::core::normalizer::split_name;
use crate::domain::model::Provider;
use crate::domain::ports::{EmailProvider, LookupQuery, ProviderAttempt, ProviderHit};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

pub const DEFAULT_BASE_URL: &str = "https://api.anymailfinder.com";
pub const MIN_CONFIDENCE: u8 = 50;

#[derive(Debug, Deserialize)]
struct PersonResponse {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Person lookup by domain and name. Needs both.
pub struct AnymailProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnymailProvider {
    pub fn new(client: Client, api_key: String, base_url: Option<&str>) -> Self {
        Self {
            client,
            api_key,
            base_url: trim_base(base_url.unwrap_or(DEFAULT_BASE_URL)),
        }
    }
}

/// First and last name from the query, falling back to the full name.
pub(crate) fn person_name(query: &LookupQuery) -> (String, String) {
    let (first_guess, last_guess) = split_name(&query.full_name);
    let first = if query.first_name.is_empty() {
        first_guess
    } else {
        query.first_name.clone()
    };
    let last = if query.last_name.is_empty() {
        last_guess
    } else {
        query.last_name.clone()
    };
    (first, last)
}

#[async_trait]
impl EmailProvider for AnymailProvider {
    fn provider(&self) -> Provider {
        Provider::Anymail
    }

    async fn attempt(&self, query: &LookupQuery) -> ProviderAttempt {
        if query.domain.is_empty() {
            return ProviderAttempt::MissingInput("domain");
        }
        let (first_name, last_name) = person_name(query);
        if first_name.is_empty() {
            return ProviderAttempt::MissingInput("person_name");
        }

        let request = self
            .client
            .get(format!("{}/v5.0/search/person.json", self.base_url))
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("email_domain", query.domain.as_str()),
                ("first_name", first_name.as_str()),
                ("last_name", last_name.as_str()),
            ]);

        let response: PersonResponse = match send_json(Provider::Anymail, request).await {
            Ok(response) => response,
            Err(attempt) => return attempt,
        };

        let Some(email) = response.email.filter(|e| !e.trim().is_empty()) else {
            return ProviderAttempt::NotFound;
        };
        let confidence = response.confidence.unwrap_or(0.0).clamp(0.0, 100.0).round() as u8;

        let mut hit = ProviderHit::new(email);
        hit.confidence = Some(confidence);
        hit.first_name = first_name;
        hit.last_name = last_name;
        hit.title = query.title.clone().unwrap_or_default();
        if confidence < MIN_CONFIDENCE {
            hit.verified = Some(false);
            return ProviderAttempt::Unverified(hit);
        }
        hit.verified = Some(true);
        ProviderAttempt::Found(hit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn query() -> LookupQuery {
        LookupQuery {
            domain: "acme.io".to_string(),
            company: "Acme".to_string(),
            full_name: "Jane Mary Doe".to_string(),
            ..LookupQuery::default()
        }
    }

    fn provider_for(server: &MockServer) -> AnymailProvider {
        AnymailProvider::new(Client::new(), "any-key".to_string(), Some(&server.base_url()))
    }

    #[test]
    fn test_person_name_falls_back_to_full_name() {
        assert_eq!(
            person_name(&query()),
            ("Jane".to_string(), "Mary Doe".to_string())
        );
    }

    #[tokio::test]
    async fn test_confident_hit_is_found() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v5.0/search/person.json")
                    .query_param("api_key", "any-key")
                    .query_param("email_domain", "acme.io")
                    .query_param("first_name", "Jane")
                    .query_param("last_name", "Mary Doe");
                then.status(200)
                    .json_body(serde_json::json!({"email": "jane@acme.io", "confidence": 87}));
            })
            .await;

        let attempt = provider_for(&server).attempt(&query()).await;

        mock.assert_async().await;
        match attempt {
            ProviderAttempt::Found(hit) => {
                assert_eq!(hit.email, "jane@acme.io");
                assert_eq!(hit.confidence, Some(87));
            }
            other => panic!("unexpected attempt: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_low_confidence_is_unverified() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v5.0/search/person.json");
                then.status(200)
                    .json_body(serde_json::json!({"email": "j@acme.io", "confidence": 49}));
            })
            .await;

        let attempt = provider_for(&server).attempt(&query()).await;
        assert_eq!(attempt.label(), "unverified");
    }

    #[tokio::test]
    async fn test_rate_limit_and_missing_name() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v5.0/search/person.json");
                then.status(429);
            })
            .await;
        let provider = provider_for(&server);

        assert_eq!(provider.attempt(&query()).await, ProviderAttempt::RateLimited);

        let nameless = LookupQuery {
            domain: "acme.io".to_string(),
            ..LookupQuery::default()
        };
        assert_eq!(
            provider.attempt(&nameless).await,
            ProviderAttempt::MissingInput("person_name")
        );
    }
}
