use crate::{AnalyzerError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const ENV_BATCH_SIZE: &str = "CONTEXT_IMPACT_BATCH_SIZE";
const ENV_ANALYSIS_DELAY_MS: &str = "CONTEXT_IMPACT_ANALYSIS_DELAY_MS";
const ENV_REALTIME: &str = "CONTEXT_IMPACT_REALTIME";
const ENV_PATTERN_LEARNING: &str = "CONTEXT_IMPACT_PATTERN_LEARNING";

/// Cutoffs used by impact scoring and cross-file correlation.
///
/// The dependent-count cutoffs are heuristics; they are kept configurable rather
/// than tuned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpactThresholds {
    /// More dependents than this escalates to module scope.
    pub module_dependents: usize,
    /// More dependents than this escalates to project scope.
    pub project_dependents: usize,
    /// More unique concepts than this across a batch marks it architectural.
    pub architectural_concepts: usize,
}

impl Default for ImpactThresholds {
    fn default() -> Self {
        Self {
            module_dependents: 1,
            project_dependents: 5,
            architectural_concepts: 3,
        }
    }
}

/// Process-wide analyzer configuration. Read-only once the analyzer is started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerOptions {
    pub enable_real_time_analysis: bool,
    pub enable_pattern_learning: bool,
    pub batch_size: usize,
    pub analysis_delay_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_timeout_ms: Option<u64>,
    pub thresholds: ImpactThresholds,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            enable_real_time_analysis: true,
            enable_pattern_learning: true,
            batch_size: 10,
            analysis_delay_ms: 1000,
            batch_timeout_ms: None,
            thresholds: ImpactThresholds::default(),
        }
    }
}

impl AnalyzerOptions {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let options: Self = toml::from_str(raw)?;
        options.validate()?;
        Ok(options)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    /// Applies `CONTEXT_IMPACT_*` environment overrides on top of `self`.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(value) = env_value(ENV_BATCH_SIZE) {
            self.batch_size = value
                .parse()
                .map_err(|e| AnalyzerError::Config(format!("{ENV_BATCH_SIZE}={value}: {e}")))?;
        }
        if let Some(value) = env_value(ENV_ANALYSIS_DELAY_MS) {
            self.analysis_delay_ms = value.parse().map_err(|e| {
                AnalyzerError::Config(format!("{ENV_ANALYSIS_DELAY_MS}={value}: {e}"))
            })?;
        }
        if let Some(value) = env_value(ENV_REALTIME) {
            self.enable_real_time_analysis = parse_flag(ENV_REALTIME, &value)?;
        }
        if let Some(value) = env_value(ENV_PATTERN_LEARNING) {
            self.enable_pattern_learning = parse_flag(ENV_PATTERN_LEARNING, &value)?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(AnalyzerError::Config(
                "batch_size must be a positive integer".to_string(),
            ));
        }
        if self.thresholds.project_dependents < self.thresholds.module_dependents {
            return Err(AnalyzerError::Config(format!(
                "thresholds.project_dependents ({}) must not be below thresholds.module_dependents ({})",
                self.thresholds.project_dependents, self.thresholds.module_dependents
            )));
        }
        if self.batch_timeout_ms == Some(0) {
            return Err(AnalyzerError::Config(
                "batch_timeout_ms must be positive when set".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub const fn analysis_delay(&self) -> Duration {
        Duration::from_millis(self.analysis_delay_ms)
    }

    #[must_use]
    pub fn batch_timeout(&self) -> Option<Duration> {
        self.batch_timeout_ms.map(Duration::from_millis)
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(AnalyzerError::Config(format!(
            "{key}={other}: expected a boolean"
        ))),
    }
}
