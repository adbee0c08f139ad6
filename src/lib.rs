// ABOUTME: Library root for the pipeline health monitor
// ABOUTME: Collects job statuses per platform, seals a session and assesses overall risk

pub mod aggregator;
pub mod assessor;
pub mod collector;
pub mod config;
pub mod cycle;
pub mod error;
pub mod gateway;
pub mod models;
pub mod normalize;
pub mod remote;

#[cfg(test)]
mod test_support;

pub use aggregator::{SessionAggregator, SessionBuilder};
pub use assessor::{AssessmentThresholds, HealthAssessor};
pub use collector::StatusSource;
pub use config::MonitorConfig;
pub use cycle::{CycleOutcome, Monitor};
pub use error::{CollectorError, ConfigError, NormalizationDrop};
pub use models::{
    JobStatus, JobStatusRecord, MonitoringSession, OverallHealthAssessment, Platform,
    PlatformHealthSummary, PlatformResult, RiskLevel,
};
pub use normalize::normalize;
