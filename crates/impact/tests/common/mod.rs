#![allow(dead_code)]

use async_trait::async_trait;
use context_impact::memory::InMemoryConceptStore;
use context_impact::{
    AnalyzerEvent, AnalyzerOptions, ChangeAnalysis, ChangeAnalyzer, ChangeKind, Collaborators,
    Concept, ConceptExtractor, FileChange, PatternAnalysis, PatternEngine,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Semaphore};

/// Returns scripted concepts per path; fails for paths in `failing`.
#[derive(Default)]
pub struct ScriptedExtractor {
    pub concepts: Mutex<HashMap<String, Vec<String>>>,
    pub failing: Mutex<HashSet<String>>,
    pub fail_updates: AtomicBool,
    pub update_calls: AtomicUsize,
}

impl ScriptedExtractor {
    pub fn with_concepts(self, path: &str, names: &[&str]) -> Self {
        self.concepts.lock().unwrap().insert(
            path.to_string(),
            names.iter().map(|n| (*n).to_string()).collect(),
        );
        self
    }

    pub fn failing_on(self, path: &str) -> Self {
        self.failing.lock().unwrap().insert(path.to_string());
        self
    }
}

#[async_trait]
impl ConceptExtractor for ScriptedExtractor {
    async fn analyze_file_content(&self, path: &str, _content: &str) -> anyhow::Result<Vec<Concept>> {
        if self.failing.lock().unwrap().contains(path) {
            anyhow::bail!("extractor crashed on {path}");
        }
        let names = self
            .concepts
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .unwrap_or_default();
        Ok(names.into_iter().map(Concept::named).collect())
    }

    async fn update_from_analysis(&self, _analysis: &ChangeAnalysis) -> anyhow::Result<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_updates.load(Ordering::SeqCst) {
            anyhow::bail!("concept table is read-only");
        }
        Ok(())
    }
}

/// Returns scripted findings; optionally blocks on a gate and tracks concurrency.
#[derive(Default)]
pub struct ScriptedPatterns {
    pub detected: Mutex<HashMap<String, Vec<String>>>,
    pub violations: Mutex<HashMap<String, Vec<String>>>,
    pub gate: Option<Arc<Semaphore>>,
    pub panic_on: Option<String>,
    pub fail_learning: AtomicBool,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub learn_calls: AtomicUsize,
}

impl ScriptedPatterns {
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn with_detected(self, path: &str, names: &[&str]) -> Self {
        self.detected.lock().unwrap().insert(
            path.to_string(),
            names.iter().map(|n| (*n).to_string()).collect(),
        );
        self
    }

    pub fn with_violations(self, path: &str, names: &[&str]) -> Self {
        self.violations.lock().unwrap().insert(
            path.to_string(),
            names.iter().map(|n| (*n).to_string()).collect(),
        );
        self
    }
}

#[async_trait]
impl PatternEngine for ScriptedPatterns {
    async fn analyze_file_change(&self, change: &FileChange) -> anyhow::Result<PatternAnalysis> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if self.panic_on.as_deref() == Some(change.path.as_str()) {
            panic!("pattern engine blew up on {}", change.path);
        }
        if let Some(gate) = &self.gate {
            gate.acquire().await?.forget();
        }

        let detected = self
            .detected
            .lock()
            .unwrap()
            .get(&change.path)
            .cloned()
            .unwrap_or_default();
        let violations = self
            .violations
            .lock()
            .unwrap()
            .get(&change.path)
            .cloned()
            .unwrap_or_default();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(PatternAnalysis {
            learned: Some(detected.clone()),
            detected,
            violations,
            recommendations: Vec::new(),
        })
    }

    async fn learn_from_analysis(&self, _analysis: &ChangeAnalysis) -> anyhow::Result<()> {
        self.learn_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_learning.load(Ordering::SeqCst) {
            anyhow::bail!("pattern table is read-only");
        }
        Ok(())
    }
}

pub struct Harness {
    pub analyzer: ChangeAnalyzer,
    pub extractor: Arc<ScriptedExtractor>,
    pub patterns: Arc<ScriptedPatterns>,
    pub store: Arc<InMemoryConceptStore>,
    pub events: broadcast::Receiver<AnalyzerEvent>,
}

pub fn options(batch_size: usize, delay_ms: u64) -> AnalyzerOptions {
    AnalyzerOptions {
        batch_size,
        analysis_delay_ms: delay_ms,
        ..AnalyzerOptions::default()
    }
}

pub fn harness(
    extractor: ScriptedExtractor,
    patterns: ScriptedPatterns,
    options: AnalyzerOptions,
) -> Harness {
    let extractor = Arc::new(extractor);
    let patterns = Arc::new(patterns);
    let store = Arc::new(InMemoryConceptStore::new());
    let analyzer = ChangeAnalyzer::start(
        Collaborators::new(extractor.clone(), patterns.clone(), store.clone()),
        options,
    )
    .expect("start analyzer");
    let events = analyzer.subscribe();
    Harness {
        analyzer,
        extractor,
        patterns,
        store,
        events,
    }
}

pub fn edit(path: &str) -> FileChange {
    FileChange::new(path, ChangeKind::Change).with_content(format!("// body of {path}"))
}

/// Completed analyses and the `batch:complete` count of the next batch.
pub struct BatchEvents {
    pub analyses: Vec<Arc<ChangeAnalysis>>,
    pub count: usize,
    pub insights: Vec<String>,
}

pub async fn next_batch(events: &mut broadcast::Receiver<AnalyzerEvent>) -> BatchEvents {
    let mut analyses = Vec::new();
    loop {
        match events.recv().await {
            Ok(AnalyzerEvent::AnalysisComplete { analysis }) => analyses.push(analysis),
            Ok(AnalyzerEvent::BatchComplete {
                count, insights, ..
            }) => {
                return BatchEvents {
                    analyses,
                    count,
                    insights,
                }
            }
            Ok(_) => {}
            Err(RecvError::Lagged(n)) => panic!("event receiver lagged by {n}"),
            Err(RecvError::Closed) => panic!("event channel closed"),
        }
    }
}

pub async fn next_matching<F>(events: &mut broadcast::Receiver<AnalyzerEvent>, mut pred: F) -> AnalyzerEvent
where
    F: FnMut(&AnalyzerEvent) -> bool,
{
    loop {
        let event = events.recv().await.expect("event stream open");
        if pred(&event) {
            return event;
        }
    }
}

/// Polls `cond` on virtual time until it holds or `limit` elapses.
pub async fn eventually<F: Fn() -> bool>(limit: Duration, cond: F) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}
