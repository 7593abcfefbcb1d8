//! HTTP clients for the email-finding services.
//!
//! Every client turns its service's response into a [`ProviderAttempt`]; no
//! HTTP or decoding failure escapes as an error.

pub mod anymail;
pub mod apollo;
pub mod connector_agent;

pub use anymail::AnymailProvider;
pub use apollo::ApolloProvider;
pub use connector_agent::ConnectorAgentProvider;

use crate::config::toml_config::ProviderConfig;
use crate::domain::model::Provider;
use crate::domain::ports::{EmailProvider, ProviderAttempt};
use crate::utils::error::{ConnectorError, Result};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

/// Maps a non-success status to the attempt it stands for. `None` for 2xx.
pub fn status_attempt(status: StatusCode) -> Option<ProviderAttempt> {
    if status.is_success() {
        return None;
    }
    Some(match status.as_u16() {
        401 | 403 => ProviderAttempt::Unauthorized,
        422 => ProviderAttempt::CreditsExhausted,
        429 => ProviderAttempt::RateLimited,
        _ => ProviderAttempt::NotFound,
    })
}

/// Sends `request` and decodes a JSON body, or returns the attempt that
/// ends this provider's turn.
pub(crate) async fn send_json<T: DeserializeOwned>(
    provider: Provider,
    request: reqwest::RequestBuilder,
) -> std::result::Result<T, ProviderAttempt> {
    let response: Response = request
        .send()
        .await
        .map_err(|e| ProviderAttempt::Transient(e.to_string()))?;
    tracing::debug!("{} response status: {}", provider, response.status());

    if let Some(attempt) = status_attempt(response.status()) {
        return Err(attempt);
    }
    response
        .json::<T>()
        .await
        .map_err(|e| ProviderAttempt::Transient(format!("invalid response body: {}", e)))
}

pub(crate) fn trim_base(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

pub fn http_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder()
        .timeout(timeout)
        .user_agent(concat!("signal-connector/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Instantiates the enabled providers in configured order.
///
/// An enabled provider without an API key is a configuration error, reported
/// before any lookup runs.
pub fn build_providers(
    configs: &[ProviderConfig],
    client: &Client,
) -> Result<Vec<Arc<dyn EmailProvider>>> {
    let mut providers: Vec<Arc<dyn EmailProvider>> = Vec::new();
    for config in configs.iter().filter(|c| c.enabled) {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConnectorError::MissingCredentials {
                provider: config.name.to_string(),
            })?;

        let provider: Arc<dyn EmailProvider> = match config.name {
            Provider::Apollo => Arc::new(ApolloProvider::new(
                client.clone(),
                api_key,
                config.base_url.as_deref(),
            )),
            Provider::Anymail => Arc::new(AnymailProvider::new(
                client.clone(),
                api_key,
                config.base_url.as_deref(),
            )),
            Provider::ConnectorAgent => Arc::new(ConnectorAgentProvider::new(
                client.clone(),
                api_key,
                config.base_url.as_deref(),
            )),
            Provider::None => {
                return Err(ConnectorError::InvalidConfigValueError {
                    field: "enrichment.providers.name".to_string(),
                    value: "none".to_string(),
                    reason: "not an email provider".to_string(),
                })
            }
        };
        providers.push(provider);
    }

    tracing::debug!(
        "Enrichment providers: {}",
        providers
            .iter()
            .map(|p| p.provider().to_string())
            .collect::<Vec<_>>()
            .join(" -> ")
    );
    Ok(providers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: Provider, api_key: Option<&str>, enabled: bool) -> ProviderConfig {
        ProviderConfig {
            name,
            api_key: api_key.map(str::to_string),
            base_url: None,
            enabled,
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_attempt(StatusCode::OK), None);
        assert_eq!(status_attempt(StatusCode::UNAUTHORIZED), Some(ProviderAttempt::Unauthorized));
        assert_eq!(status_attempt(StatusCode::FORBIDDEN), Some(ProviderAttempt::Unauthorized));
        assert_eq!(
            status_attempt(StatusCode::UNPROCESSABLE_ENTITY),
            Some(ProviderAttempt::CreditsExhausted)
        );
        assert_eq!(
            status_attempt(StatusCode::TOO_MANY_REQUESTS),
            Some(ProviderAttempt::RateLimited)
        );
        assert_eq!(
            status_attempt(StatusCode::INTERNAL_SERVER_ERROR),
            Some(ProviderAttempt::NotFound)
        );
    }

    #[test]
    fn test_build_providers_keeps_order_and_skips_disabled() {
        let client = Client::new();
        let providers = build_providers(
            &[
                config(Provider::ConnectorAgent, Some("c"), true),
                config(Provider::Apollo, None, false),
                config(Provider::Anymail, Some("a"), true),
            ],
            &client,
        )
        .unwrap();

        let names: Vec<Provider> = providers.iter().map(|p| p.provider()).collect();
        assert_eq!(names, vec![Provider::ConnectorAgent, Provider::Anymail]);
    }

    #[test]
    fn test_build_providers_requires_keys() {
        let client = Client::new();
        let err = build_providers(&[config(Provider::Apollo, Some("  "), true)], &client)
            .err()
            .unwrap();
        assert!(matches!(err, ConnectorError::MissingCredentials { provider } if provider == "apollo"));
    }
}
