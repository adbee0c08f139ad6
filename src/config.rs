// ABOUTME: TOML configuration for the monitor: thresholds, deadline, store and platform endpoints
// ABOUTME: Validated once at load; everything has a default

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::aggregator::{DEFAULT_COLLECTOR_TIMEOUT, MAX_COLLECTOR_TIMEOUT};
use crate::assessor::AssessmentThresholds;
use crate::collector::StatusSource;
use crate::error::ConfigError;
use crate::models::Platform;
use crate::remote::{HttpStatusSource, DEFAULT_REQUEST_TIMEOUT};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub collector_timeout_secs: u64,
    pub assessment: AssessmentThresholds,
    pub store: StoreConfig,
    pub platforms: Vec<PlatformConfig>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            collector_timeout_secs: DEFAULT_COLLECTOR_TIMEOUT.as_secs(),
            assessment: AssessmentThresholds::default(),
            store: StoreConfig::default(),
            platforms: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSON store file; records are kept in memory only when unset.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub platform: Platform,
    pub url: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    pub request_timeout_secs: Option<u64>,
}

fn enabled_by_default() -> bool {
    true
}

impl PlatformConfig {
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT)
    }
}

impl MonitorConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: MonitorConfig = toml::from_str(contents).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.collector_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "collector_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.collector_timeout_secs > MAX_COLLECTOR_TIMEOUT.as_secs() {
            return Err(ConfigError::Invalid(format!(
                "collector_timeout_secs must be at most {}",
                MAX_COLLECTOR_TIMEOUT.as_secs()
            )));
        }

        self.assessment.validate()?;

        let mut seen = HashSet::new();
        for platform in self.enabled_platforms() {
            if !seen.insert(platform.platform) {
                return Err(ConfigError::DuplicatePlatform(platform.platform.to_string()));
            }
            if !(platform.url.starts_with("http://") || platform.url.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!(
                    "{} url must be http(s), got '{}'",
                    platform.platform, platform.url
                )));
            }
            if let Some(secs) = platform.request_timeout_secs {
                if secs == 0 || secs > MAX_COLLECTOR_TIMEOUT.as_secs() {
                    return Err(ConfigError::Invalid(format!(
                        "{} request_timeout_secs must be between 1 and {}",
                        platform.platform,
                        MAX_COLLECTOR_TIMEOUT.as_secs()
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn collector_timeout(&self) -> Duration {
        Duration::from_secs(self.collector_timeout_secs)
    }

    pub fn enabled_platforms(&self) -> impl Iterator<Item = &PlatformConfig> {
        self.platforms.iter().filter(|p| p.enabled)
    }

    pub fn build_sources(&self) -> Result<Vec<(Platform, Arc<dyn StatusSource>)>> {
        self.enabled_platforms()
            .map(|p| {
                let source = HttpStatusSource::new(p.platform, p.url.clone(), p.request_timeout())
                    .with_context(|| format!("Failed to build status source for {}", p.platform))?;
                Ok((p.platform, Arc::new(source) as Arc<dyn StatusSource>))
            })
            .collect()
    }
}
