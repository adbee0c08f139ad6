// ABOUTME: Health assessor: ordered severity rules over a sealed MonitoringSession
// ABOUTME: Produces the overall risk level, notification decision and triggering platforms

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::info;

use crate::error::ConfigError;
use crate::models::{
    MonitoringSession, OverallHealthAssessment, Platform, PlatformHealthSummary, RiskLevel,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssessmentThresholds {
    /// CRITICAL when the failed-job count across all platforms exceeds this.
    pub critical_threshold: usize,
    /// HIGH when the failed-job count across all platforms exceeds this.
    pub high_threshold: usize,
    /// HIGH when any single platform's failure rate reaches this.
    pub failure_rate_threshold: f64,
}

impl Default for AssessmentThresholds {
    fn default() -> Self {
        Self {
            critical_threshold: 10,
            high_threshold: 5,
            failure_rate_threshold: 0.5,
        }
    }
}

impl AssessmentThresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.high_threshold > self.critical_threshold {
            return Err(ConfigError::Invalid(format!(
                "high_threshold ({}) must not exceed critical_threshold ({})",
                self.high_threshold, self.critical_threshold
            )));
        }
        if !(self.failure_rate_threshold > 0.0 && self.failure_rate_threshold <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "failure_rate_threshold must be in (0, 1], got {}",
                self.failure_rate_threshold
            )));
        }
        Ok(())
    }
}

/// Totals derived once from the sealed session; every rule reads these.
struct SessionFacts<'a> {
    summaries: Vec<&'a PlatformHealthSummary>,
    jobs_analyzed: usize,
    failed_jobs: usize,
    dropped_out: BTreeSet<Platform>,
    collected: usize,
}

impl<'a> SessionFacts<'a> {
    fn from_session(session: &'a MonitoringSession) -> Self {
        let summaries: Vec<_> = session.summaries().values().collect();
        let dropped_out = summaries
            .iter()
            .filter(|s| !s.collection_succeeded)
            .map(|s| s.platform)
            .collect::<BTreeSet<_>>();

        Self {
            jobs_analyzed: summaries.iter().map(|s| s.total).sum(),
            failed_jobs: summaries.iter().map(|s| s.failed).sum(),
            collected: summaries.len() - dropped_out.len(),
            dropped_out,
            summaries,
        }
    }

    fn platforms_with_failures(&self) -> impl Iterator<Item = Platform> + '_ {
        self.summaries.iter().filter(|s| s.failed > 0).map(|s| s.platform)
    }

    fn issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.summaries.is_empty() {
            issues.push("No platform reported job status".to_string());
        }
        for summary in &self.summaries {
            let name = summary.platform.display_name();
            if !summary.collection_succeeded {
                issues.push(format!(
                    "{} monitoring failed: {}",
                    name,
                    summary.collection_error.as_deref().unwrap_or("unknown error")
                ));
            }
            if summary.failed > 0 {
                issues.push(format!(
                    "{} has {} failed job(s) ({:.0}% failure rate)",
                    name,
                    summary.failed,
                    summary.failure_rate * 100.0
                ));
            }
            if summary.dropped_records > 0 {
                issues.push(format!(
                    "{} returned {} record(s) that could not be normalized",
                    name, summary.dropped_records
                ));
            }
            if summary.duplicate_records > 0 {
                issues.push(format!(
                    "{} repeated {} job id(s) in one batch; only the first of each was kept",
                    name, summary.duplicate_records
                ));
            }
        }
        issues
    }
}

/// A severity rule yields the platforms that triggered it, or `None` when it
/// does not match.
type Rule = fn(&SessionFacts, &AssessmentThresholds) -> Option<BTreeSet<Platform>>;

/// Evaluated in order; the first match decides the risk level.
const RULES: &[(RiskLevel, Rule)] = &[
    (RiskLevel::Critical, critical_rule),
    (RiskLevel::High, high_rule),
    (RiskLevel::Medium, medium_rule),
];

fn critical_rule(facts: &SessionFacts, thresholds: &AssessmentThresholds) -> Option<BTreeSet<Platform>> {
    let mut triggering = BTreeSet::new();
    let mut matched = false;

    if facts.failed_jobs > thresholds.critical_threshold {
        matched = true;
        triggering.extend(facts.platforms_with_failures());
    }

    // Nothing collected at all (no platforms, or every one dropped out) is a
    // monitoring blackout.
    if facts.dropped_out.len() >= 2 || facts.collected == 0 {
        matched = true;
        triggering.extend(facts.dropped_out.iter().copied());
    }

    matched.then_some(triggering)
}

fn high_rule(facts: &SessionFacts, thresholds: &AssessmentThresholds) -> Option<BTreeSet<Platform>> {
    let mut triggering = BTreeSet::new();
    let mut matched = false;

    if facts.failed_jobs > thresholds.high_threshold {
        matched = true;
        triggering.extend(facts.platforms_with_failures());
    }

    for summary in &facts.summaries {
        if summary.total > 0 && summary.failure_rate >= thresholds.failure_rate_threshold {
            matched = true;
            triggering.insert(summary.platform);
        }
    }

    matched.then_some(triggering)
}

fn medium_rule(facts: &SessionFacts, _thresholds: &AssessmentThresholds) -> Option<BTreeSet<Platform>> {
    (facts.failed_jobs > 0).then(|| facts.platforms_with_failures().collect())
}

#[derive(Debug, Clone, Default)]
pub struct HealthAssessor {
    thresholds: AssessmentThresholds,
}

impl HealthAssessor {
    pub fn new(thresholds: AssessmentThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &AssessmentThresholds {
        &self.thresholds
    }

    pub fn assess(&self, session: &MonitoringSession) -> OverallHealthAssessment {
        let facts = SessionFacts::from_session(session);

        let (risk_level, triggering_platforms) = RULES
            .iter()
            .find_map(|(level, rule)| rule(&facts, &self.thresholds).map(|t| (*level, t)))
            .unwrap_or((RiskLevel::Low, BTreeSet::new()));

        let summary_text = if facts.collected == 0 {
            format!(
                "{}: no job status collected from {} configured platform(s)",
                risk_level,
                facts.summaries.len()
            )
        } else {
            format!(
                "{}: {} failed of {} job(s) across {} platform(s), {} collection failure(s)",
                risk_level,
                facts.failed_jobs,
                facts.jobs_analyzed,
                facts.summaries.len(),
                facts.dropped_out.len()
            )
        };

        info!(
            session_id = %session.session_id(),
            risk_level = %risk_level,
            failed_jobs = facts.failed_jobs,
            failed_collections = facts.dropped_out.len(),
            "Session assessed"
        );

        OverallHealthAssessment {
            risk_level,
            requires_notification: risk_level.requires_notification(),
            notification_priority: risk_level.priority(),
            triggering_platforms,
            summary_text,
            jobs_analyzed: facts.jobs_analyzed,
            failed_jobs_count: facts.failed_jobs,
            failed_collections: facts.dropped_out.len(),
            issues: facts.issues(),
            assessed_at: session.completed_at(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobStatus, NotificationPriority, PlatformResult};
    use crate::test_support::{collected, dropped_out, session};

    fn assess(results: Vec<PlatformResult>) -> OverallHealthAssessment {
        HealthAssessor::default().assess(&session(results))
    }

    #[test]
    fn test_eleven_failures_on_one_platform_is_critical() {
        let assessment = assess(vec![
            collected(Platform::Airbyte, &[(JobStatus::Failed, 11), (JobStatus::Success, 20)]),
            collected(Platform::Databricks, &[(JobStatus::Success, 5)]),
        ]);
        assert_eq!(assessment.risk_level, RiskLevel::Critical);
        assert_eq!(assessment.failed_jobs_count, 11);
        assert_eq!(assessment.notification_priority, NotificationPriority::Urgent);
        assert_eq!(assessment.triggering_platforms, BTreeSet::from([Platform::Airbyte]));
    }

    #[test]
    fn test_two_dropouts_without_failures_is_critical() {
        let assessment = assess(vec![
            dropped_out(Platform::Databricks),
            dropped_out(Platform::PowerAutomate),
            collected(Platform::Airbyte, &[(JobStatus::Success, 3)]),
        ]);
        assert_eq!(assessment.risk_level, RiskLevel::Critical);
        assert_eq!(assessment.failed_collections, 2);
        assert_eq!(
            assessment.triggering_platforms,
            BTreeSet::from([Platform::Databricks, Platform::PowerAutomate])
        );
    }

    #[test]
    fn test_six_failures_is_high() {
        let assessment = assess(vec![
            collected(Platform::Airbyte, &[(JobStatus::Failed, 3), (JobStatus::Success, 10)]),
            collected(Platform::SnowflakeTask, &[(JobStatus::Failed, 3), (JobStatus::Success, 10)]),
        ]);
        assert_eq!(assessment.risk_level, RiskLevel::High);
        assert!(assessment.requires_notification);
        assert_eq!(assessment.notification_priority, NotificationPriority::High);
        assert_eq!(
            assessment.triggering_platforms,
            BTreeSet::from([Platform::Airbyte, Platform::SnowflakeTask])
        );
    }

    #[test]
    fn test_half_failure_rate_on_one_platform_is_high() {
        let assessment = assess(vec![
            collected(Platform::Databricks, &[(JobStatus::Failed, 2), (JobStatus::Success, 2)]),
            collected(Platform::Airbyte, &[(JobStatus::Failed, 1), (JobStatus::Success, 9)]),
        ]);
        assert_eq!(assessment.risk_level, RiskLevel::High);
        assert_eq!(assessment.triggering_platforms, BTreeSet::from([Platform::Databricks]));
    }

    #[test]
    fn test_one_failure_among_twenty_successes_is_medium() {
        let assessment = assess(vec![collected(
            Platform::PowerAutomate,
            &[(JobStatus::Failed, 1), (JobStatus::Success, 20)],
        )]);
        assert_eq!(assessment.risk_level, RiskLevel::Medium);
        assert!(assessment.requires_notification);
        assert_eq!(assessment.notification_priority, NotificationPriority::Normal);
    }

    #[test]
    fn test_healthy_session_is_low_without_notification() {
        let assessment = assess(vec![
            collected(Platform::Airbyte, &[(JobStatus::Success, 4), (JobStatus::Running, 2)]),
            collected(Platform::SnowflakeTask, &[(JobStatus::Pending, 1)]),
        ]);
        assert_eq!(assessment.risk_level, RiskLevel::Low);
        assert!(!assessment.requires_notification);
        assert!(assessment.triggering_platforms.is_empty());
        assert!(assessment.issues.is_empty());
    }

    #[test]
    fn test_single_dropout_alone_stays_low() {
        let assessment = assess(vec![
            dropped_out(Platform::Databricks),
            collected(Platform::Airbyte, &[(JobStatus::Success, 3)]),
        ]);
        assert_eq!(assessment.risk_level, RiskLevel::Low);
        assert_eq!(assessment.issues.len(), 1);
    }

    #[test]
    fn test_empty_session_is_critical() {
        let assessment = assess(Vec::new());
        assert_eq!(assessment.risk_level, RiskLevel::Critical);
        assert!(assessment.requires_notification);
        assert!(assessment.summary_text.contains("no job status collected"));
    }

    #[test]
    fn test_total_dropout_of_a_single_platform_is_critical() {
        let assessment = assess(vec![dropped_out(Platform::Airbyte)]);
        assert_eq!(assessment.risk_level, RiskLevel::Critical);
        assert_eq!(assessment.triggering_platforms, BTreeSet::from([Platform::Airbyte]));
    }

    #[test]
    fn test_unknown_and_running_are_not_failures() {
        let assessment = assess(vec![collected(
            Platform::Databricks,
            &[(JobStatus::Unknown, 5), (JobStatus::Running, 5)],
        )]);
        assert_eq!(assessment.risk_level, RiskLevel::Low);
        assert_eq!(assessment.jobs_analyzed, 10);
    }

    #[test]
    fn test_thresholds_are_configurable() {
        let assessor = HealthAssessor::new(AssessmentThresholds {
            critical_threshold: 2,
            high_threshold: 1,
            failure_rate_threshold: 0.9,
        });
        let assessment = assessor.assess(&session(vec![collected(
            Platform::Airbyte,
            &[(JobStatus::Failed, 3), (JobStatus::Success, 10)],
        )]));
        assert_eq!(assessment.risk_level, RiskLevel::Critical);
    }

    #[test]
    fn test_duplicates_and_drops_are_reported_separately() {
        let result =
            PlatformResult::collected(Platform::SnowflakeTask, Vec::new(), 1).with_duplicates(2);
        let assessment = assess(vec![result]);

        assert_eq!(assessment.issues.len(), 2);
        assert!(assessment.issues[0].contains("1 record(s) that could not be normalized"));
        assert!(assessment.issues[1].contains("repeated 2 job id(s)"));
    }

    #[test]
    fn test_threshold_validation() {
        assert!(AssessmentThresholds::default().validate().is_ok());
        let inverted = AssessmentThresholds {
            critical_threshold: 3,
            high_threshold: 5,
            ..Default::default()
        };
        assert!(inverted.validate().is_err());
        let bad_rate = AssessmentThresholds {
            failure_rate_threshold: 1.5,
            ..Default::default()
        };
        assert!(bad_rate.validate().is_err());
    }
}
