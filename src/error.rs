// ABOUTME: Error types interpreted by the monitoring core
// ABOUTME: Collector failures are isolated per platform, normalization drops per record

use std::fmt;

/// A platform status fetch failed. This is the only error kind the collector
/// layer interprets; it is recorded on the platform's result and never
/// propagated past the collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectorError {
    Connection(String),
    Authentication(String),
    RateLimited(String),
    Response(String),
    Timeout,
}

impl fmt::Display for CollectorError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CollectorError::Connection(msg) => write!(f, "Connection error: {}", msg),
            CollectorError::Authentication(msg) => write!(f, "Authentication error: {}", msg),
            CollectorError::RateLimited(msg) => write!(f, "Rate limited: {}", msg),
            CollectorError::Response(msg) => write!(f, "Response error: {}", msg),
            CollectorError::Timeout => write!(f, "timeout"),
        }
    }
}

impl std::error::Error for CollectorError {}

/// A single raw record could not be turned into a canonical record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizationDrop {
    pub reason: String,
}

impl NormalizationDrop {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for NormalizationDrop {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Normalization dropped record: {}", self.reason)
    }
}

impl std::error::Error for NormalizationDrop {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Invalid(String),
    DuplicatePlatform(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
            ConfigError::DuplicatePlatform(name) => {
                write!(f, "Invalid configuration: platform '{}' is listed more than once", name)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_renders_as_bare_keyword() {
        assert_eq!(CollectorError::Timeout.to_string(), "timeout");
    }

    #[test]
    fn test_collector_error_prefixes() {
        let err = CollectorError::Authentication("token expired".to_string());
        assert_eq!(err.to_string(), "Authentication error: token expired");
    }
}
