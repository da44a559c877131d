// src/error.rs
use thiserror::Error;

/// Classified failure of one upstream feed query.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Upstream throttling signature detected; back off instead of retrying.
    #[error("rate limited by upstream: {0}")]
    RateLimited(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl SourceError {
    /// Short label used in logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::RateLimited(_) => "rate_limited",
            SourceError::Transport(_) => "transport",
            SourceError::Malformed(_) => "malformed",
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SourceError::RateLimited(_))
    }
}

/// A sink rejected one notification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("delivery to {channel} failed: {reason}")]
    DeliveryFailed { channel: String, reason: String },
}

/// Startup configuration errors. These are the only fatal errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),
}
