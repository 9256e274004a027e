use crate::types::ChangeAnalysis;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::SystemTime;

/// Everything the analyzer publishes to subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AnalyzerEvent {
    /// One change finished its full analysis.
    AnalysisComplete { analysis: Arc<ChangeAnalysis> },

    /// A batch was drained, analyzed and correlated.
    BatchComplete {
        count: usize,
        insights: Vec<String>,
        duration_ms: u64,
    },

    /// A whole batch cycle was lost.
    AnalysisError {
        error: String,
        queue_remaining: usize,
    },

    /// A learning write-back call failed after its batch had completed.
    LearningError { path: String, error: String },
}

impl AnalyzerEvent {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AnalysisComplete { .. } => "analysis:complete",
            Self::BatchComplete { .. } => "batch:complete",
            Self::AnalysisError { .. } => "analysis:error",
            Self::LearningError { .. } => "learning:error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzerHealth {
    pub pending_changes: usize,
    pub analyzing: bool,
    pub real_time_enabled: bool,
    pub batches_completed: u64,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_success: Option<SystemTime>,
    pub last_batch_ms: Option<u64>,
    pub p95_batch_ms: Option<u64>,
}

impl AnalyzerHealth {
    pub(crate) const fn initial(real_time_enabled: bool) -> Self {
        Self {
            pending_changes: 0,
            analyzing: false,
            real_time_enabled,
            batches_completed: 0,
            consecutive_failures: 0,
            last_error: None,
            last_success: None,
            last_batch_ms: None,
            p95_batch_ms: None,
        }
    }
}

/// Rolling window of recent batch durations.
#[derive(Debug, Default)]
pub(crate) struct DurationHistory {
    samples: VecDeque<u64>,
}

impl DurationHistory {
    const MAX_HISTORY: usize = 20;

    pub(crate) fn record(&mut self, duration_ms: u64) {
        self.samples.push_back(duration_ms);
        if self.samples.len() > Self::MAX_HISTORY {
            self.samples.pop_front();
        }
    }

    pub(crate) fn p95(&self) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<u64> = self.samples.iter().copied().collect();
        sorted.sort_unstable();
        let idx = ((sorted.len().saturating_sub(1) * 95) + 50) / 100;
        sorted.get(idx).copied()
    }
}
