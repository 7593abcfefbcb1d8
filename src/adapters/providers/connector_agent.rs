use super::anymail::person_name;
use super::{send_json, trim_base};
use crate::domain::model::Provider;
use crate::domain::ports::{EmailProvider, LookupQuery, ProviderAttempt, ProviderHit};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://api.connector-os.com";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FindRequest<'a> {
    first_name: &'a str,
    last_name: &'a str,
    domain: &'a str,
}

#[derive(Debug, Deserialize)]
struct FindResponse {
    #[serde(default)]
    email: Option<String>,
}

/// Email finder that needs a domain plus first and last name. Returned
/// addresses are verified by the service.
pub struct ConnectorAgentProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl ConnectorAgentProvider {
    pub fn new(client: Client, api_key: String, base_url: Option<&str>) -> Self {
        Self {
            client,
            api_key,
            base_url: trim_base(base_url.unwrap_or(DEFAULT_BASE_URL)),
        }
    }
}

#[async_trait]
impl EmailProvider for ConnectorAgentProvider {
    fn provider(&self) -> Provider {
        Provider::ConnectorAgent
    }

    async fn attempt(&self, query: &LookupQuery) -> ProviderAttempt {
        if query.domain.is_empty() {
            return ProviderAttempt::MissingInput("domain");
        }
        let (first_name, last_name) = person_name(query);
        if first_name.is_empty() || last_name.is_empty() {
            return ProviderAttempt::MissingInput("person_name");
        }

        let request = self
            .client
            .post(format!("{}/api/email/v2/find", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&FindRequest {
                first_name: &first_name,
                last_name: &last_name,
                domain: &query.domain,
            });

        let response: FindResponse = match send_json(Provider::ConnectorAgent, request).await {
            Ok(response) => response,
            Err(attempt) => return attempt,
        };

        match response.email.filter(|e| !e.trim().is_empty()) {
            Some(email) => {
                let mut hit = ProviderHit::new(email);
                hit.verified = Some(true);
                hit.first_name = first_name;
                hit.last_name = last_name;
                hit.title = query.title.clone().unwrap_or_default();
                ProviderAttempt::Found(hit)
            }
            None => ProviderAttempt::NotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn query() -> LookupQuery {
        LookupQuery {
            domain: "acme.io".to_string(),
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            full_name: "Jane Doe".to_string(),
            ..LookupQuery::default()
        }
    }

    #[tokio::test]
    async fn test_find_uses_bearer_auth_and_camel_case_body() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/email/v2/find")
                    .header("Authorization", "Bearer agent-key")
                    .json_body(serde_json::json!({
                        "firstName": "Jane",
                        "lastName": "Doe",
                        "domain": "acme.io"
                    }));
                then.status(200).json_body(serde_json::json!({"email": "jane@acme.io"}));
            })
            .await;

        let provider =
            ConnectorAgentProvider::new(Client::new(), "agent-key".to_string(), Some(&server.base_url()));
        let attempt = provider.attempt(&query()).await;

        mock.assert_async().await;
        assert_eq!(attempt.label(), "found");
    }

    #[tokio::test]
    async fn test_unauthorized_and_empty_email() {
        let server = MockServer::start_async().await;
        let provider =
            ConnectorAgentProvider::new(Client::new(), "bad".to_string(), Some(&server.base_url()));

        let mut unauthorized = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/email/v2/find");
                then.status(401);
            })
            .await;
        assert_eq!(provider.attempt(&query()).await, ProviderAttempt::Unauthorized);
        unauthorized.delete_async().await;

        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/email/v2/find");
                then.status(200).json_body(serde_json::json!({"email": null}));
            })
            .await;
        assert_eq!(provider.attempt(&query()).await, ProviderAttempt::NotFound);
    }

    #[tokio::test]
    async fn test_requires_last_name() {
        let provider =
            ConnectorAgentProvider::new(Client::new(), "k".to_string(), Some("http://127.0.0.1:9"));
        let mut partial = query();
        partial.last_name.clear();
        partial.full_name = "Jane".to_string();
        assert_eq!(
            provider.attempt(&partial).await,
            ProviderAttempt::MissingInput("person_name")
        );
    }
}
