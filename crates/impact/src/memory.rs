//! In-memory implementations of the collaborator contracts.
//!
//! Enough to run the pipeline end to end (the CLI uses them); production hosts
//! inject their own extractor, pattern engine and store.

use crate::services::{
    Concept, ConceptExtractor, ConceptRecord, ConceptStore, PatternAnalysis, PatternEngine,
};
use crate::types::{ChangeAnalysis, ChangeKind, FileChange};
use crate::{AnalyzerError, Result};
use async_trait::async_trait;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

const DECLARATION_PATTERN: &str = r"(?m)\b(?:fn|struct|enum|trait|class|interface|def|function|type)\s+([A-Za-z_][A-Za-z0-9_]*)";

/// Concept table keyed by file path.
#[derive(Debug, Default)]
pub struct InMemoryConceptStore {
    records: RwLock<Vec<ConceptRecord>>,
}

impl InMemoryConceptStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: ConceptRecord) {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        if !records.contains(&record) {
            records.push(record);
        }
    }

    pub fn insert_all(&self, records: impl IntoIterator<Item = ConceptRecord>) {
        for record in records {
            self.insert(record);
        }
    }

    /// Replaces everything recorded for `path` with `concepts`.
    pub fn replace_file<I, S>(&self, path: &str, concepts: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.retain(|r| r.file_path != path);
        let mut seen = BTreeSet::new();
        for concept in concepts {
            let concept = concept.into();
            if seen.insert(concept.clone()) {
                records.push(ConceptRecord::new(concept, path));
            }
        }
    }

    pub fn remove_file(&self, path: &str) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|r| r.file_path != path);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ConceptStore for InMemoryConceptStore {
    async fn get_concepts(&self, path: Option<&str>) -> anyhow::Result<Vec<ConceptRecord>> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(match path {
            Some(path) => records
                .iter()
                .filter(|r| r.file_path == path)
                .cloned()
                .collect(),
            None => records.clone(),
        })
    }
}

/// Treats declared names (`fn foo`, `class Bar`, ...) as concepts and records
/// confirmed ones in a shared [`InMemoryConceptStore`].
pub struct KeywordConceptExtractor {
    declaration: Regex,
    store: Arc<InMemoryConceptStore>,
}

impl KeywordConceptExtractor {
    pub fn new(store: Arc<InMemoryConceptStore>) -> Result<Self> {
        let declaration = Regex::new(DECLARATION_PATTERN)
            .map_err(|e| AnalyzerError::Config(format!("declaration pattern: {e}")))?;
        Ok(Self { declaration, store })
    }

    fn declared_names(&self, content: &str) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.declaration
            .captures_iter(content)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            .filter(|name| seen.insert(name.clone()))
            .collect()
    }
}

#[async_trait]
impl ConceptExtractor for KeywordConceptExtractor {
    async fn analyze_file_content(&self, _path: &str, content: &str) -> anyhow::Result<Vec<Concept>> {
        Ok(self
            .declared_names(content)
            .into_iter()
            .map(Concept::named)
            .collect())
    }

    async fn update_from_analysis(&self, analysis: &ChangeAnalysis) -> anyhow::Result<()> {
        match analysis.change.kind {
            ChangeKind::Unlink => self.store.remove_file(analysis.path()),
            ChangeKind::Add | ChangeKind::Change => self.store.replace_file(
                analysis.path(),
                analysis.impact.affected_concepts.iter().cloned(),
            ),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Pattern,
    Violation,
}

#[derive(Debug, Clone)]
pub struct PatternRule {
    pub name: String,
    pub kind: RuleKind,
    pub matcher: Regex,
    pub recommendation: Option<String>,
}

impl PatternRule {
    pub fn new(name: impl Into<String>, kind: RuleKind, pattern: &str) -> Result<Self> {
        let name = name.into();
        let matcher = Regex::new(pattern)
            .map_err(|e| AnalyzerError::Config(format!("pattern rule {name}: {e}")))?;
        Ok(Self {
            name,
            kind,
            matcher,
            recommendation: None,
        })
    }

    #[must_use]
    pub fn recommending(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendation = Some(recommendation.into());
        self
    }
}

/// Regex rule engine that remembers which patterns it has already seen.
pub struct RulePatternEngine {
    rules: Vec<PatternRule>,
    seen: Mutex<BTreeSet<String>>,
    frequencies: Mutex<HashMap<String, usize>>,
    learn_calls: AtomicUsize,
}

impl RulePatternEngine {
    #[must_use]
    pub fn new(rules: Vec<PatternRule>) -> Self {
        Self {
            rules,
            seen: Mutex::new(BTreeSet::new()),
            frequencies: Mutex::new(HashMap::new()),
            learn_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_default_rules() -> Result<Self> {
        let rules = vec![
            PatternRule::new("async_functions", RuleKind::Pattern, r"\basync\s+(?:fn|function|def)\b")?,
            PatternRule::new("error_propagation", RuleKind::Pattern, r"\)\?[;.)]")?,
            PatternRule::new("builder", RuleKind::Pattern, r"\b(?:fn\s+build|\.build\(\))")?,
            PatternRule::new("dependency_injection", RuleKind::Pattern, r"\bconstructor\s*\(\s*(?:private|readonly)\b")?,
            PatternRule::new("unchecked_unwrap", RuleKind::Violation, r"\.unwrap\(\)")?
                .recommending("Propagate errors instead of unwrapping"),
            PatternRule::new("console_logging", RuleKind::Violation, r"\bconsole\.log\(")?
                .recommending("Route diagnostics through the project logger"),
            PatternRule::new("bare_except", RuleKind::Violation, r"(?m)^\s*except\s*:")?
                .recommending("Catch specific exception types"),
        ];
        Ok(Self::new(rules))
    }

    /// How many times a pattern was confirmed through learning.
    #[must_use]
    pub fn frequency(&self, pattern: &str) -> usize {
        self.frequencies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(pattern)
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn learn_calls(&self) -> usize {
        self.learn_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PatternEngine for RulePatternEngine {
    async fn analyze_file_change(&self, change: &FileChange) -> anyhow::Result<PatternAnalysis> {
        let Some(content) = change.content.as_deref() else {
            return Ok(PatternAnalysis::default());
        };

        let mut analysis = PatternAnalysis::default();
        for rule in self.rules.iter().filter(|r| r.matcher.is_match(content)) {
            match rule.kind {
                RuleKind::Pattern => analysis.detected.push(rule.name.clone()),
                RuleKind::Violation => {
                    analysis.violations.push(rule.name.clone());
                    if let Some(rec) = &rule.recommendation {
                        analysis.recommendations.push(rec.clone());
                    }
                }
            }
        }

        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        let learned: Vec<String> = analysis
            .detected
            .iter()
            .filter(|name| seen.insert((*name).clone()))
            .cloned()
            .collect();
        analysis.learned = Some(learned);
        Ok(analysis)
    }

    async fn learn_from_analysis(&self, analysis: &ChangeAnalysis) -> anyhow::Result<()> {
        self.learn_calls.fetch_add(1, Ordering::SeqCst);
        let mut frequencies = self.frequencies.lock().unwrap_or_else(PoisonError::into_inner);
        for pattern in &analysis.patterns.detected {
            *frequencies.entry(pattern.clone()).or_insert(0) += 1;
        }
        Ok(())
    }
}
