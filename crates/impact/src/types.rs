use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

/// Kind of file mutation reported by the change source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Change,
    Unlink,
}

impl ChangeKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Change => "change",
            Self::Unlink => "unlink",
        }
    }
}

/// A single file mutation event. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,

    #[serde(rename = "type")]
    pub kind: ChangeKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl FileChange {
    pub fn new(path: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            content: None,
            language: None,
        }
    }

    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Language tag supplied with the event, or one inferred from the file extension.
    #[must_use]
    pub fn effective_language(&self) -> Option<String> {
        if let Some(lang) = self.language.as_deref().map(str::trim) {
            if !lang.is_empty() {
                return Some(lang.to_ascii_lowercase());
            }
        }
        let ext = Path::new(&self.path).extension()?.to_str()?;
        language_for_extension(&ext.to_ascii_lowercase()).map(str::to_string)
    }
}

fn language_for_extension(ext: &str) -> Option<&'static str> {
    let lang = match ext {
        "rs" => "rust",
        "ts" | "tsx" | "mts" | "cts" => "typescript",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "py" | "pyi" => "python",
        "go" => "go",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "cs" => "csharp",
        "c" | "h" => "c",
        "cc" | "cpp" | "cxx" | "hpp" | "hh" => "cpp",
        "swift" => "swift",
        "scala" => "scala",
        "rb" => "ruby",
        "php" => "php",
        _ => return None,
    };
    Some(lang)
}

/// Estimated blast radius of a change. Ordered `File < Module < Project`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    File,
    Module,
    Project,
}

impl Scope {
    /// Raises `self` to `target` if `target` is wider. Never narrows.
    pub fn escalate(&mut self, target: Self) {
        if target > *self {
            *self = target;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Impact {
    pub scope: Scope,
    pub confidence: f64,
    pub affected_concepts: BTreeSet<String>,
    pub suggested_actions: Vec<String>,
}

impl Impact {
    #[must_use]
    pub fn new(scope: Scope, confidence: f64) -> Self {
        Self {
            scope,
            confidence: clamp_confidence(confidence),
            affected_concepts: BTreeSet::new(),
            suggested_actions: Vec::new(),
        }
    }

    /// Raises confidence to at least `floor`, keeping it inside `[0, 1]`.
    pub fn raise_confidence(&mut self, floor: f64) {
        self.confidence = clamp_confidence(self.confidence.max(floor));
    }
}

/// Confidence values are always kept inside `[0, 1]`; NaN collapses to zero.
#[must_use]
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternFindings {
    pub detected: Vec<String>,
    pub violations: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntelligenceSummary {
    pub concepts_updated: usize,
    pub patterns_learned: usize,
    pub insights: Vec<String>,
}

/// Scored, explainable analysis of one change.
///
/// Listeners receive it as `Arc<ChangeAnalysis>`; once emitted it is never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeAnalysis {
    pub change: Arc<FileChange>,
    pub impact: Impact,
    pub patterns: PatternFindings,
    pub intelligence: IntelligenceSummary,
    pub timestamp: SystemTime,
}

impl ChangeAnalysis {
    #[must_use]
    pub fn new(change: Arc<FileChange>, impact: Impact) -> Self {
        Self {
            change,
            impact,
            patterns: PatternFindings::default(),
            intelligence: IntelligenceSummary::default(),
            timestamp: SystemTime::now(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.change.path
    }
}
