use anyhow::Result;
use httpmock::prelude::*;
use signal_connector::adapters::providers::{build_providers, http_client};
use signal_connector::config::ProviderConfig;
use signal_connector::domain::model::Side;
use signal_connector::{
    Cancellation, EnrichmentCache, EnrichmentCascade, NormalizedRecord, Provider,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn provider(name: Provider, server: &MockServer) -> ProviderConfig {
    ProviderConfig {
        name,
        api_key: Some(format!("{}-key", name)),
        base_url: Some(server.base_url()),
        enabled: true,
    }
}

fn cascade_for(server: &MockServer, cache_dir: &TempDir) -> Result<EnrichmentCascade> {
    let client = http_client(Duration::from_secs(5))?;
    let providers = build_providers(
        &[
            provider(Provider::Apollo, server),
            provider(Provider::Anymail, server),
            provider(Provider::ConnectorAgent, server),
        ],
        &client,
    )?;
    Ok(EnrichmentCascade::new(
        providers,
        Arc::new(EnrichmentCache::new(cache_dir.path())),
    ))
}

fn contact(index: usize, domain: &str) -> NormalizedRecord {
    let mut record = NormalizedRecord::new(Side::Demand, index);
    record.company = "Carely".to_string();
    record.domain = domain.to_string();
    record.full_name = "Dana Scully".to_string();
    record.first_name = "Dana".to_string();
    record.last_name = "Scully".to_string();
    record
}

#[tokio::test]
async fn test_falls_through_to_anymail_then_serves_from_cache() -> Result<()> {
    let server = MockServer::start_async().await;
    let cache_dir = TempDir::new()?;

    let apollo = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/mixed_people/search");
            then.status(200).json_body(serde_json::json!({"people": []}));
        })
        .await;
    let anymail = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v5.0/search/person.json")
                .query_param("email_domain", "carely.com");
            then.status(200)
                .json_body(serde_json::json!({"email": "dana@carely.com", "confidence": 92}));
        })
        .await;
    let agent = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/email/v2/find");
            then.status(200).json_body(serde_json::json!({"email": "other@carely.com"}));
        })
        .await;

    let cascade = cascade_for(&server, &cache_dir)?;
    let record = contact(0, "carely.com");

    let first = cascade.resolve(&record, &Cancellation::new()).await?;
    assert_eq!(first.email.as_deref(), Some("dana@carely.com"));
    assert_eq!(first.provider, Provider::Anymail);
    assert_eq!(first.confidence, Some(92));
    assert!(!first.from_cache);

    let second = cascade.resolve(&record, &Cancellation::new()).await?;
    assert!(second.from_cache);
    assert_eq!(second.email, first.email);

    apollo.assert_hits_async(1).await;
    anymail.assert_hits_async(1).await;
    agent.assert_hits_async(0).await;
    Ok(())
}

#[tokio::test]
async fn test_exhausted_cascade_is_cached_as_negative() -> Result<()> {
    let server = MockServer::start_async().await;
    let cache_dir = TempDir::new()?;

    let apollo = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/mixed_people/search");
            then.status(429);
        })
        .await;
    let anymail = server
        .mock_async(|when, then| {
            when.method(GET).path("/v5.0/search/person.json");
            then.status(404);
        })
        .await;
    let agent = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/email/v2/find");
            then.status(401);
        })
        .await;

    let cascade = cascade_for(&server, &cache_dir)?;
    let record = contact(0, "ghost.io");

    let result = cascade.resolve(&record, &Cancellation::new()).await?;
    assert_eq!(result.email, None);
    assert_eq!(result.provider, Provider::None);
    assert_eq!(result.providers_attempted.len(), 3);

    let again = cascade.resolve(&record, &Cancellation::new()).await?;
    assert!(again.from_cache);
    assert_eq!(again.provider, Provider::None);

    apollo.assert_hits_async(1).await;
    anymail.assert_hits_async(1).await;
    agent.assert_hits_async(1).await;
    Ok(())
}

#[tokio::test]
async fn test_cache_survives_a_new_cascade() -> Result<()> {
    let server = MockServer::start_async().await;
    let cache_dir = TempDir::new()?;

    let apollo = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/mixed_people/search");
            then.status(200).json_body(serde_json::json!({
                "people": [{"first_name": "Dana", "last_name": "Scully", "title": "CEO",
                            "email": "dana@carely.com", "email_status": "verified"}]
            }));
        })
        .await;

    let record = contact(0, "carely.com");
    cascade_for(&server, &cache_dir)?
        .resolve(&record, &Cancellation::new())
        .await?;

    let fresh_process = cascade_for(&server, &cache_dir)?;
    let hit = fresh_process.resolve(&record, &Cancellation::new()).await?;

    assert!(hit.from_cache);
    assert_eq!(hit.provider, Provider::Apollo);
    assert_eq!(hit.title, "CEO");
    apollo.assert_hits_async(1).await;
    Ok(())
}

#[tokio::test]
async fn test_batch_runs_all_records_and_collects_results() -> Result<()> {
    let server = MockServer::start_async().await;
    let cache_dir = TempDir::new()?;

    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/mixed_people/search");
            then.status(200).json_body(serde_json::json!({
                "people": [{"first_name": "Dana", "last_name": "Scully",
                            "email": "dana@example.com", "email_status": "verified"}]
            }));
        })
        .await;

    let cascade = Arc::new(cascade_for(&server, &cache_dir)?.with_concurrency(2));
    let records: Vec<NormalizedRecord> = (0..6)
        .map(|i| contact(i, &format!("company{}.io", i)))
        .collect();

    let batch = cascade.enrich_batch(records, &Cancellation::new()).await;

    assert_eq!(batch.results.len(), 6);
    assert_eq!(batch.resolved_count(), 6);
    assert!(batch.failures.is_empty());
    assert!(batch.results.contains_key("demand:5"));
    Ok(())
}

#[tokio::test]
async fn test_unverified_apollo_guess_yields_to_anymail() -> Result<()> {
    let server = MockServer::start_async().await;
    let cache_dir = TempDir::new()?;

    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/mixed_people/search");
            then.status(200).json_body(serde_json::json!({
                "people": [{"first_name": "Dana", "last_name": "Scully",
                            "email": "guess@carely.com", "email_status": "likely to engage"}]
            }));
        })
        .await;
    let anymail = server
        .mock_async(|when, then| {
            when.method(GET).path("/v5.0/search/person.json");
            then.status(200)
                .json_body(serde_json::json!({"email": "dana@carely.com", "confidence": 95}));
        })
        .await;

    let cascade = cascade_for(&server, &cache_dir)?;
    let record = contact(0, "carely.com");

    let result = cascade.resolve(&record, &Cancellation::new()).await?;
    assert_eq!(result.provider, Provider::Anymail);
    assert_eq!(result.email.as_deref(), Some("dana@carely.com"));
    anymail.assert_hits_async(1).await;

    let cached = cascade.resolve(&record, &Cancellation::new()).await?;
    assert!(cached.from_cache);
    assert_eq!(cached.email.as_deref(), Some("dana@carely.com"));
    Ok(())
}
