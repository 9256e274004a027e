//! Contracts of the external services the analyzer orchestrates.
//!
//! Implementations are black boxes; every error they return is caught by the
//! analyzer and degraded according to where the call happened.

use crate::types::{ChangeAnalysis, FileChange};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A semantic concept reported by the extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl Concept {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: None,
        }
    }
}

/// One row of the persisted concept table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptRecord {
    pub concept_name: String,
    pub file_path: String,
}

impl ConceptRecord {
    pub fn new(concept_name: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self {
            concept_name: concept_name.into(),
            file_path: file_path.into(),
        }
    }
}

/// Result of the pattern engine's change analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternAnalysis {
    pub detected: Vec<String>,
    pub violations: Vec<String>,
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learned: Option<Vec<String>>,
}

#[async_trait]
pub trait ConceptExtractor: Send + Sync {
    async fn analyze_file_content(&self, path: &str, content: &str) -> anyhow::Result<Vec<Concept>>;

    /// One-way write-back of a confirmed analysis.
    async fn update_from_analysis(&self, analysis: &ChangeAnalysis) -> anyhow::Result<()>;
}

#[async_trait]
pub trait PatternEngine: Send + Sync {
    async fn analyze_file_change(&self, change: &FileChange) -> anyhow::Result<PatternAnalysis>;

    /// One-way write-back of a confirmed analysis.
    async fn learn_from_analysis(&self, analysis: &ChangeAnalysis) -> anyhow::Result<()>;
}

#[async_trait]
pub trait ConceptStore: Send + Sync {
    /// Concepts recorded against `path`, or the full table when `path` is `None`.
    async fn get_concepts(&self, path: Option<&str>) -> anyhow::Result<Vec<ConceptRecord>>;
}

/// The services injected into an analyzer at construction.
#[derive(Clone)]
pub struct Collaborators {
    pub extractor: Arc<dyn ConceptExtractor>,
    pub patterns: Arc<dyn PatternEngine>,
    pub store: Arc<dyn ConceptStore>,
}

impl Collaborators {
    pub fn new(
        extractor: Arc<dyn ConceptExtractor>,
        patterns: Arc<dyn PatternEngine>,
        store: Arc<dyn ConceptStore>,
    ) -> Self {
        Self {
            extractor,
            patterns,
            store,
        }
    }
}
