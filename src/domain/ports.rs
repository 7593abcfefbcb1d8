use crate::domain::model::{Provider, RawRow};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Source of raw supply/demand rows.
pub trait RecordSource: Send + Sync {
    fn load_rows(&self) -> impl std::future::Future<Output = Result<Vec<RawRow>>> + Send;
}

/// What a provider is asked to resolve.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupQuery {
    pub domain: String,
    pub company: String,
    pub full_name: String,
    pub first_name: String,
    pub last_name: String,
    pub title: Option<String>,
}

/// Email found by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderHit {
    pub email: String,
    pub verified: Option<bool>,
    pub confidence: Option<u8>,
    pub first_name: String,
    pub last_name: String,
    pub title: String,
}

impl ProviderHit {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            verified: None,
            confidence: None,
            first_name: String::new(),
            last_name: String::new(),
            title: String::new(),
        }
    }
}

/// Outcome of a single provider attempt. Every variant except `Found`
/// sends the cascade on to the next provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderAttempt {
    Found(ProviderHit),
    /// An email came back but the provider did not vouch for it.
    Unverified(ProviderHit),
    NotFound,
    MissingInput(&'static str),
    RateLimited,
    Unauthorized,
    CreditsExhausted,
    Transient(String),
}

impl ProviderAttempt {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Found(_) => "found",
            Self::Unverified(_) => "unverified",
            Self::NotFound => "not_found",
            Self::MissingInput(_) => "missing_input",
            Self::RateLimited => "rate_limited",
            Self::Unauthorized => "unauthorized",
            Self::CreditsExhausted => "credits_exhausted",
            Self::Transient(_) => "transient",
        }
    }
}

#[async_trait]
pub trait EmailProvider: Send + Sync {
    fn provider(&self) -> Provider;
    async fn attempt(&self, query: &LookupQuery) -> ProviderAttempt;
}
