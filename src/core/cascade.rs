//! Email enrichment across an ordered list of providers.
//!
//! A record is looked up in the cache first. On a miss the providers are
//! tried in order until one returns a vouched-for email; anything else
//! (not found, rate limited, timeouts, unverified hits) moves on to the next
//! provider without retrying. The outcome, positive or negative, is cached.

use crate::core::cache::{cache_key, EnrichmentCache};
use crate::core::cancel::Cancellation;
use crate::domain::model::{EnrichmentResult, NormalizedRecord, Provider, RecordIssue};
use crate::domain::ports::{EmailProvider, LookupQuery, ProviderAttempt, ProviderHit};
use crate::utils::error::{ConnectorError, Result};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

pub const DEFAULT_CONCURRENCY: usize = 3;
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of enriching a batch of records.
#[derive(Debug, Clone, Default)]
pub struct BatchEnrichment {
    /// Keyed by `NormalizedRecord::record_key`.
    pub results: BTreeMap<String, EnrichmentResult>,
    /// Records that already carried an email.
    pub skipped: Vec<String>,
    pub failures: Vec<RecordIssue>,
    pub cancelled: bool,
}

impl BatchEnrichment {
    pub fn resolved_count(&self) -> usize {
        self.results.values().filter(|r| r.is_resolved()).count()
    }

    pub fn cache_hits(&self) -> usize {
        self.results.values().filter(|r| r.from_cache).count()
    }
}

pub struct EnrichmentCascade {
    providers: Vec<Arc<dyn EmailProvider>>,
    cache: Arc<EnrichmentCache>,
    provider_timeout: Duration,
    concurrency: usize,
}

impl EnrichmentCascade {
    pub fn new(providers: Vec<Arc<dyn EmailProvider>>, cache: Arc<EnrichmentCache>) -> Self {
        Self {
            providers,
            cache,
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn providers(&self) -> Vec<Provider> {
        self.providers.iter().map(|p| p.provider()).collect()
    }

    pub fn cache(&self) -> &EnrichmentCache {
        &self.cache
    }

    /// Resolves an email for `record`.
    ///
    /// Records that already have an email get it back unchanged and nothing
    /// is looked up. Records with neither domain nor company cannot be routed
    /// to any provider and get an uncached negative result.
    pub async fn resolve(
        &self,
        record: &NormalizedRecord,
        cancel: &Cancellation,
    ) -> Result<EnrichmentResult> {
        if !record.needs_email() {
            let mut result = EnrichmentResult::not_found(Vec::new(), Utc::now());
            result.email = record.email.clone();
            return Ok(result);
        }
        if !record.is_matchable() {
            tracing::debug!("{} has no domain or company, not enriching", record.record_key);
            return Ok(EnrichmentResult::not_found(Vec::new(), Utc::now()));
        }

        let key = cache_key(record);
        if let Some(hit) = self.cache.get(&key).await {
            tracing::debug!("Cache hit for {} ({})", record.record_key, key);
            return Ok(hit);
        }

        let lock = self.cache.key_lock(&key);
        let outcome = {
            let _guard = lock.lock().await;
            self.resolve_locked(record, &key, cancel).await
        };
        drop(lock);
        self.cache.release_key_lock(&key);
        outcome
    }

    /// Runs the providers for `record` while holding the lock for `key`.
    async fn resolve_locked(
        &self,
        record: &NormalizedRecord,
        key: &str,
        cancel: &Cancellation,
    ) -> Result<EnrichmentResult> {
        // Another worker may have filled the entry while we waited.
        if let Some(hit) = self.cache.get(key).await {
            tracing::debug!("Cache hit for {} after wait ({})", record.record_key, key);
            return Ok(hit);
        }

        let query = lookup_query(record);
        let mut attempted = Vec::new();
        for provider in &self.providers {
            if cancel.is_cancelled() {
                tracing::info!("Enrichment of {} cancelled", record.record_key);
                return Err(ConnectorError::Cancelled);
            }

            let name = provider.provider();
            let attempt =
                match tokio::time::timeout(self.provider_timeout, provider.attempt(&query)).await {
                    Ok(attempt) => attempt,
                    Err(_) => ProviderAttempt::Transient(format!(
                        "timed out after {}s",
                        self.provider_timeout.as_secs_f64()
                    )),
                };
            let label = attempt.label();
            tracing::debug!("{} -> {}: {}", record.record_key, name, label);

            match attempt {
                ProviderAttempt::MissingInput(field) => {
                    tracing::debug!("{} skipped for {}: missing {}", name, record.record_key, field);
                }
                ProviderAttempt::Found(hit) if hit.verified != Some(false) => {
                    attempted.push(name);
                    let result = resolved(record, hit, name, attempted);
                    self.store(key, &result).await;
                    return Ok(result);
                }
                ProviderAttempt::Found(hit) | ProviderAttempt::Unverified(hit) => {
                    attempted.push(name);
                    tracing::debug!(
                        "{} returned {} for {} without verification, trying next provider",
                        name,
                        hit.email,
                        record.record_key
                    );
                }
                ProviderAttempt::Unauthorized | ProviderAttempt::CreditsExhausted => {
                    attempted.push(name);
                    tracing::warn!("{} rejected the request: {}", name, label);
                }
                ProviderAttempt::Transient(reason) => {
                    attempted.push(name);
                    tracing::warn!("{} failed for {}: {}", name, record.record_key, reason);
                }
                ProviderAttempt::NotFound | ProviderAttempt::RateLimited => {
                    attempted.push(name);
                }
            }
        }

        let result = EnrichmentResult::not_found(attempted, Utc::now());
        tracing::debug!("No email found for {}", record.record_key);
        self.store(key, &result).await;
        Ok(result)
    }

    async fn store(&self, key: &str, result: &EnrichmentResult) {
        if let Err(e) = self.cache.put(key, result).await {
            tracing::warn!("Dropping cache write for {}: {}", key, e);
        }
    }

    /// Enriches every record that lacks an email, at most `concurrency`
    /// cascades at a time. Per-record failures are collected rather than
    /// aborting the batch.
    pub async fn enrich_batch(
        self: Arc<Self>,
        records: Vec<NormalizedRecord>,
        cancel: &Cancellation,
    ) -> BatchEnrichment {
        let mut batch = BatchEnrichment::default();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::new();

        for record in records {
            if !record.needs_email() {
                batch.skipped.push(record.record_key);
                continue;
            }

            let cascade = Arc::clone(&self);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let record_key = record.record_key.clone();
            let handle = tokio::spawn(async move {
                let _permit = tokio::select! {
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return Err(ConnectorError::Cancelled),
                    },
                    _ = cancel.cancelled() => return Err(ConnectorError::Cancelled),
                };
                if cancel.is_cancelled() {
                    return Err(ConnectorError::Cancelled);
                }
                cascade.resolve(&record, &cancel).await
            });
            handles.push((record_key, handle));
        }

        for (record_key, handle) in handles {
            match handle.await {
                Ok(Ok(result)) => {
                    batch.results.insert(record_key, result);
                }
                Ok(Err(ConnectorError::Cancelled)) => {
                    batch.cancelled = true;
                    batch.failures.push(RecordIssue::new(record_key, "cancelled"));
                }
                Ok(Err(e)) => {
                    tracing::warn!("Enrichment failed for {}: {}", record_key, e);
                    batch.failures.push(RecordIssue::new(record_key, e.to_string()));
                }
                Err(e) => {
                    tracing::error!("Enrichment task for {} panicked: {}", record_key, e);
                    batch.failures.push(RecordIssue::new(record_key, e.to_string()));
                }
            }
        }

        tracing::info!(
            "Enriched {} records: {} resolved, {} from cache, {} skipped, {} failed",
            batch.results.len(),
            batch.resolved_count(),
            batch.cache_hits(),
            batch.skipped.len(),
            batch.failures.len()
        );
        batch
    }
}

fn lookup_query(record: &NormalizedRecord) -> LookupQuery {
    LookupQuery {
        domain: record.domain.clone(),
        company: record.company.clone(),
        full_name: record.full_name.clone(),
        first_name: record.first_name.clone(),
        last_name: record.last_name.clone(),
        title: record.title.clone(),
    }
}

fn resolved(
    record: &NormalizedRecord,
    hit: ProviderHit,
    provider: Provider,
    attempted: Vec<Provider>,
) -> EnrichmentResult {
    let or_record = |value: String, fallback: &str| {
        if value.is_empty() {
            fallback.to_string()
        } else {
            value
        }
    };
    EnrichmentResult {
        email: Some(hit.email.to_lowercase()),
        provider,
        verified: hit.verified,
        confidence: hit.confidence,
        resolved_at: Utc::now(),
        first_name: or_record(hit.first_name, &record.first_name),
        last_name: or_record(hit.last_name, &record.last_name),
        title: or_record(hit.title, record.title.as_deref().unwrap_or_default()),
        providers_attempted: attempted,
        from_cache: false,
    }
}
