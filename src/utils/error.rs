use crate::domain::model::RecordIssue;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Missing API key for provider '{provider}'")]
    MissingCredentials { provider: String },

    #[error("{} record(s) cannot be matched: {}", records.len(), summarize(records))]
    InvalidRecords { records: Vec<RecordIssue> },

    #[error("Enrichment cache error: {message}")]
    CacheError { message: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },

    #[error("Operation cancelled")]
    Cancelled,
}

fn summarize(records: &[RecordIssue]) -> String {
    records
        .iter()
        .take(5)
        .map(|issue| format!("{} ({})", issue.record_key, issue.reason))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Provider,
    Cache,
    Configuration,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ConnectorError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    pub fn cache(message: impl Into<String>) -> Self {
        Self::CacheError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidRecords { .. } | Self::CsvError(_) | Self::ProcessingError { .. } => {
                ErrorCategory::Input
            }
            Self::HttpError(_) => ErrorCategory::Provider,
            Self::CacheError { .. } => ErrorCategory::Cache,
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::ConfigValidationError { .. }
            | Self::MissingCredentials { .. } => ErrorCategory::Configuration,
            Self::IoError(_) | Self::SerializationError(_) | Self::Cancelled => {
                ErrorCategory::System
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Cancelled | Self::CacheError { .. } => ErrorSeverity::Low,
            Self::HttpError(_) => ErrorSeverity::Medium,
            Self::InvalidRecords { .. }
            | Self::CsvError(_)
            | Self::ProcessingError { .. }
            | Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::ConfigValidationError { .. }
            | Self::MissingCredentials { .. } => ErrorSeverity::High,
            Self::IoError(_) | Self::SerializationError(_) => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            Self::MissingCredentials { provider } => format!(
                "Set the API key for '{}' in the config file or its environment variable",
                provider
            ),
            Self::InvalidRecords { .. } => {
                "Every record needs a company name or a domain; fix or drop the listed rows"
                    .to_string()
            }
            Self::MissingConfigError { field } | Self::ConfigValidationError { field, .. } => {
                format!("Check the '{}' entry of the configuration file", field)
            }
            Self::InvalidConfigValueError { field, reason, .. } => {
                format!("Fix '{}': {}", field, reason)
            }
            Self::ConfigError { .. } => "Review the configuration file".to_string(),
            Self::CsvError(_) => "Make sure the input is a valid CSV file with a header row".to_string(),
            Self::HttpError(_) => "Check network connectivity and provider status".to_string(),
            Self::CacheError { .. } => {
                "Run `connector cache clear` if the cache directory is corrupted".to_string()
            }
            Self::IoError(_) => "Check file paths and permissions".to_string(),
            Self::SerializationError(_) | Self::ProcessingError { .. } => {
                "Re-run with --verbose for details".to_string()
            }
            Self::Cancelled => "Re-run to continue; resolved emails are already cached".to_string(),
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Input => format!("Input problem: {}", self),
            ErrorCategory::Provider => format!("Provider problem: {}", self),
            ErrorCategory::Cache => format!("Cache problem: {}", self),
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::System => format!("System problem: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConnectorError>;
