//! # Context Impact
//!
//! Incremental change-impact analysis for a watched codebase.
//!
//! ## Pipeline
//!
//! ```text
//! FileChange
//!     │
//!     ├──> analyze_change (heuristics, immediate)
//!     │      └─> ChangeAnalysis returned to the caller
//!     │
//!     ├──> Queue ──> debounce timer ──> batch drain (≤ batch_size)
//!     │                                  ├─ Concept extractor
//!     │                                  ├─ Pattern engine
//!     │                                  ├─ Dependent lookup (concept store)
//!     │                                  └─ Impact scoring + insights
//!     │
//!     ├──> Cross-file correlation (whole batch)
//!     │
//!     └──> Events (analysis / batch / error) + learning write-back
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use context_impact::memory::{InMemoryConceptStore, KeywordConceptExtractor, RulePatternEngine};
//! use context_impact::{AnalyzerOptions, ChangeAnalyzer, ChangeKind, Collaborators, FileChange};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(InMemoryConceptStore::new());
//!     let collaborators = Collaborators::new(
//!         Arc::new(KeywordConceptExtractor::new(store.clone())?),
//!         Arc::new(RulePatternEngine::with_default_rules()?),
//!         store,
//!     );
//!     let analyzer = ChangeAnalyzer::start(collaborators, AnalyzerOptions::default())?;
//!     let mut events = analyzer.subscribe();
//!
//!     let quick = analyzer.analyze_change(FileChange::new("Cargo.toml", ChangeKind::Change));
//!     println!("{:?} at {:.2}", quick.impact.scope, quick.impact.confidence);
//!
//!     while let Ok(event) = events.recv().await {
//!         println!("{}", event.name());
//!     }
//!     Ok(())
//! }
//! ```

mod analyzer;
mod config;
mod correlation;
mod dependents;
mod error;
mod events;
mod heuristics;
pub mod memory;
mod scheduler;
mod scoring;
mod services;
mod types;

pub use analyzer::{BatchSummary, ChangeAnalyzer};
pub use config::{AnalyzerOptions, ImpactThresholds};
pub use correlation::{correlate_batch, Correlation};
pub use dependents::find_dependent_files;
pub use error::{AnalyzerError, Result};
pub use events::{AnalyzerEvent, AnalyzerHealth};
pub use heuristics::{
    classify_path, is_statically_typed, lightweight_analysis, minimal_analysis, suggested_actions,
};
pub use scoring::{generate_insights, score_impact, ScoringInput};
pub use services::{
    Collaborators, Concept, ConceptExtractor, ConceptRecord, ConceptStore, PatternAnalysis,
    PatternEngine,
};
pub use types::{
    clamp_confidence, ChangeAnalysis, ChangeKind, FileChange, Impact, IntelligenceSummary,
    PatternFindings, Scope,
};
