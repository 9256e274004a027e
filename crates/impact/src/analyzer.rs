use crate::{
    config::AnalyzerOptions,
    correlation::correlate_batch,
    dependents::find_dependent_files,
    events::{AnalyzerEvent, AnalyzerHealth, DurationHistory},
    heuristics::{lightweight_analysis, minimal_analysis},
    scheduler::{spawn_scheduler, SchedulerCommand},
    scoring::{generate_insights, score_impact, ScoringInput},
    services::Collaborators,
    types::{ChangeAnalysis, ChangeKind, FileChange, PatternFindings},
    AnalyzerError, Result,
};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Instant, SystemTime};
use tokio::sync::{broadcast, mpsc, watch};

const EVENT_CAPACITY: usize = 256;

/// Result of one drained batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub count: usize,
    pub insights: Vec<String>,
    pub duration_ms: u64,
    pub architectural: bool,
    pub queue_remaining: usize,
}

/// Incremental change-impact analyzer.
///
/// Every change gets an immediate heuristic analysis from [`analyze_change`];
/// queued changes are then debounced, drained in batches of at most
/// `batch_size`, fully analyzed in FIFO order and correlated across the batch.
/// Results are published through [`subscribe`].
///
/// Must be started from inside a tokio runtime.
///
/// [`analyze_change`]: ChangeAnalyzer::analyze_change
/// [`subscribe`]: ChangeAnalyzer::subscribe
#[derive(Clone)]
pub struct ChangeAnalyzer {
    inner: Arc<Shared>,
}

pub(crate) struct Shared {
    options: AnalyzerOptions,
    collaborators: Collaborators,
    real_time: AtomicBool,
    queue: Mutex<QueueState>,
    stats: Mutex<DurationHistory>,
    command_tx: mpsc::UnboundedSender<SchedulerCommand>,
    event_tx: broadcast::Sender<AnalyzerEvent>,
    health_tx: watch::Sender<AnalyzerHealth>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Arc<FileChange>>,
    analyzing: bool,
}

impl ChangeAnalyzer {
    pub fn start(collaborators: Collaborators, options: AnalyzerOptions) -> Result<Self> {
        options.validate()?;
        tokio::runtime::Handle::try_current().map_err(|e| {
            AnalyzerError::Other(format!("change analyzer needs a tokio runtime: {e}"))
        })?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (health_tx, _) =
            watch::channel(AnalyzerHealth::initial(options.enable_real_time_analysis));

        let inner = Arc::new(Shared {
            real_time: AtomicBool::new(options.enable_real_time_analysis),
            options,
            collaborators,
            queue: Mutex::new(QueueState::default()),
            stats: Mutex::new(DurationHistory::default()),
            command_tx,
            event_tx,
            health_tx,
        });
        spawn_scheduler(
            Arc::downgrade(&inner),
            inner.options.analysis_delay(),
            command_rx,
        );

        Ok(Self { inner })
    }

    /// Immediate heuristic analysis; queues the change for the batch pass.
    ///
    /// With real-time analysis switched off this returns a fixed minimal
    /// analysis and nothing is queued.
    pub fn analyze_change(&self, change: FileChange) -> ChangeAnalysis {
        let change = Arc::new(change);
        if !self.is_real_time_enabled() {
            return minimal_analysis(change);
        }
        let analysis = lightweight_analysis(Arc::clone(&change));
        self.inner.enqueue(change);
        analysis
    }

    /// Drains and analyzes one batch right now.
    ///
    /// Returns `Ok(None)` when the queue is empty or another batch is running.
    pub async fn process_batch(&self) -> Result<Option<BatchSummary>> {
        self.inner.process_batch().await
    }

    /// Full analysis of a single change without touching the queue.
    pub async fn analyze_now(&self, change: FileChange) -> ChangeAnalysis {
        self.inner.full_analysis(Arc::new(change)).await
    }

    /// Fires the debounce timer immediately. The busy guard still applies.
    pub fn flush(&self) -> Result<()> {
        self.inner.send(SchedulerCommand::FireNow)
    }

    pub fn set_real_time_analysis(&self, enabled: bool) {
        self.inner.real_time.store(enabled, Ordering::SeqCst);
        self.inner
            .health_tx
            .send_modify(|h| h.real_time_enabled = enabled);
        info!(
            "Real-time change analysis {}",
            if enabled { "enabled" } else { "disabled" }
        );
    }

    #[must_use]
    pub fn is_real_time_enabled(&self) -> bool {
        self.inner.real_time.load(Ordering::SeqCst)
    }

    /// Drops every pending change and disarms the timer. Returns how many were dropped.
    pub fn clear_queue(&self) -> usize {
        let dropped = {
            let mut queue = self.inner.lock_queue();
            let dropped = queue.pending.len();
            queue.pending.clear();
            dropped
        };
        self.inner.publish_pending(0);
        if let Err(err) = self.inner.send(SchedulerCommand::Disarm) {
            debug!("Queue cleared without a scheduler: {err}");
        }
        dropped
    }

    #[must_use]
    pub fn queue_size(&self) -> usize {
        self.inner.queue_size()
    }

    #[must_use]
    pub fn is_analyzing(&self) -> bool {
        self.inner.lock_queue().analyzing
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AnalyzerEvent> {
        self.inner.event_tx.subscribe()
    }

    #[must_use]
    pub fn health(&self) -> AnalyzerHealth {
        self.inner.health_tx.borrow().clone()
    }

    #[must_use]
    pub fn health_stream(&self) -> watch::Receiver<AnalyzerHealth> {
        self.inner.health_tx.subscribe()
    }

    #[must_use]
    pub fn options(&self) -> &AnalyzerOptions {
        &self.inner.options
    }

    /// Stops the scheduler. Queued changes stay queued and can still be
    /// drained with [`process_batch`](Self::process_batch).
    pub fn shutdown(&self) {
        let _ = self.inner.send(SchedulerCommand::Shutdown);
    }
}

impl Shared {
    fn send(&self, command: SchedulerCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|_| AnalyzerError::ChannelClosed)
    }

    fn lock_queue(&self) -> MutexGuard<'_, QueueState> {
        // Nothing panics while holding this lock; recover rather than wedge.
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn queue_size(&self) -> usize {
        self.lock_queue().pending.len()
    }

    fn publish_pending(&self, pending: usize) {
        self.health_tx.send_modify(|h| h.pending_changes = pending);
    }

    fn emit(&self, event: AnalyzerEvent) {
        // No subscribers is not an error.
        let _ = self.event_tx.send(event);
    }

    fn enqueue(&self, change: Arc<FileChange>) {
        let pending = {
            let mut queue = self.lock_queue();
            queue.pending.push_back(change);
            queue.pending.len()
        };
        self.publish_pending(pending);
        if let Err(err) = self.send(SchedulerCommand::Arm) {
            warn!("Change queued but not scheduled: {err}");
        }
    }

    /// Called by the scheduler when the debounce timer expires.
    pub(crate) fn on_timer_fired(self: Arc<Self>) {
        {
            let queue = self.lock_queue();
            if queue.analyzing {
                debug!("Debounce fired during a running batch; skipping");
                return;
            }
            if queue.pending.is_empty() {
                return;
            }
        }
        tokio::spawn(self.run_scheduled_batch());
    }

    async fn run_scheduled_batch(self: Arc<Self>) {
        let worker = Arc::clone(&self);
        // Timeouts are already recorded by `process_batch`; only panics surface here.
        if let Err(join_err) = tokio::spawn(async move { worker.process_batch().await }).await {
            self.record_failure(&AnalyzerError::BatchPanicked(join_err.to_string()));
        }
    }

    fn record_failure(&self, err: &AnalyzerError) {
        let queue_remaining = self.queue_size();
        error!("Change batch failed: {err} ({queue_remaining} change(s) still queued)");
        self.health_tx.send_modify(|h| {
            h.consecutive_failures += 1;
            h.last_error = Some(err.to_string());
        });
        self.emit(AnalyzerEvent::AnalysisError {
            error: err.to_string(),
            queue_remaining,
        });
    }

    /// Marks the analyzer busy and takes up to `batch_size` changes from the head.
    fn begin_batch(self: &Arc<Self>) -> Option<(Vec<Arc<FileChange>>, BusyGuard)> {
        let (batch, remaining) = {
            let mut queue = self.lock_queue();
            if queue.analyzing || queue.pending.is_empty() {
                return None;
            }
            queue.analyzing = true;
            let take = self.options.batch_size.min(queue.pending.len());
            let batch: Vec<_> = queue.pending.drain(..take).collect();
            (batch, queue.pending.len())
        };
        self.health_tx.send_modify(|h| {
            h.analyzing = true;
            h.pending_changes = remaining;
        });
        Some((
            batch,
            BusyGuard {
                shared: Arc::clone(self),
            },
        ))
    }

    /// Drains one batch. Every way out of here releases the busy flag and
    /// lets the scheduler re-arm for whatever is still queued.
    pub(crate) async fn process_batch(self: &Arc<Self>) -> Result<Option<BatchSummary>> {
        let Some((batch, _busy)) = self.begin_batch() else {
            return Ok(None);
        };
        match self.run_batch(batch).await {
            Ok(summary) => Ok(Some(summary)),
            Err(err) => {
                self.record_failure(&err);
                Err(err)
            }
        }
    }

    async fn run_batch(self: &Arc<Self>, batch: Vec<Arc<FileChange>>) -> Result<BatchSummary> {
        let started = Instant::now();
        let count = batch.len();
        info!("Analyzing batch of {count} change(s)");

        let outcome = match self.options.batch_timeout() {
            Some(limit) => tokio::time::timeout(limit, self.analyze_batch(batch))
                .await
                .map_err(|_| AnalyzerError::BatchTimeout {
                    changes: count,
                    timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                })?,
            None => self.analyze_batch(batch).await,
        };

        let architectural = outcome.architectural;
        let analyses: Vec<Arc<ChangeAnalysis>> =
            outcome.analyses.into_iter().map(Arc::new).collect();
        for analysis in &analyses {
            self.emit(AnalyzerEvent::AnalysisComplete {
                analysis: Arc::clone(analysis),
            });
        }

        let insights: Vec<String> = analyses
            .iter()
            .flat_map(|a| a.intelligence.insights.iter().cloned())
            .collect();
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let queue_remaining = self.queue_size();
        self.record_success(duration_ms);
        self.emit(AnalyzerEvent::BatchComplete {
            count,
            insights: insights.clone(),
            duration_ms,
        });
        info!("Batch of {count} change(s) analyzed in {duration_ms}ms, {queue_remaining} still queued");

        self.spawn_learning(&analyses, &outcome.concept_sync);

        Ok(BatchSummary {
            count,
            insights,
            duration_ms,
            architectural,
            queue_remaining,
        })
    }

    /// Full analysis of every change in FIFO order, then the cross-file pass.
    async fn analyze_batch(&self, batch: Vec<Arc<FileChange>>) -> BatchOutcome {
        let mut analyses = Vec::with_capacity(batch.len());
        let mut concept_sync = Vec::with_capacity(batch.len());
        for change in batch {
            let (analysis, sync) = self.tracked_analysis(change).await;
            analyses.push(analysis);
            concept_sync.push(sync);
        }
        let correlation =
            correlate_batch(&mut analyses, self.options.thresholds.architectural_concepts);
        if correlation.architectural {
            info!(
                "Architectural change: {} files touch {} concepts",
                analyses.len(),
                correlation.unique_concepts.len()
            );
        }
        BatchOutcome {
            analyses,
            concept_sync,
            architectural: correlation.architectural,
        }
    }

    pub(crate) async fn full_analysis(&self, change: Arc<FileChange>) -> ChangeAnalysis {
        self.tracked_analysis(change).await.0
    }

    /// Full analysis plus whether the concept table should be brought in line
    /// with it: deletions always, edits only once extraction has succeeded
    /// (even with zero concepts, so stale records get dropped).
    async fn tracked_analysis(&self, change: Arc<FileChange>) -> (ChangeAnalysis, bool) {
        let mut analysis = lightweight_analysis(change);
        let mut sync = analysis.change.kind == ChangeKind::Unlink;
        let outcome = match self.extract_concepts(&mut analysis).await {
            Ok(extracted) => {
                sync |= extracted;
                self.enrich(&mut analysis).await
            }
            Err(err) => Err(err),
        };
        if let Err(err) = outcome {
            warn!("Analysis of {} failed: {err}", analysis.path());
            analysis
                .intelligence
                .insights
                .push(format!("Analysis failed: {err}"));
        }
        (analysis, sync)
    }

    /// Runs the extractor over the new content. Returns whether it ran.
    async fn extract_concepts(&self, analysis: &mut ChangeAnalysis) -> Result<bool> {
        let change = Arc::clone(&analysis.change);
        if change.kind == ChangeKind::Unlink {
            return Ok(false);
        }
        let Some(content) = change.content.as_deref() else {
            return Ok(false);
        };
        let concepts = self
            .collaborators
            .extractor
            .analyze_file_content(&change.path, content)
            .await
            .map_err(|e| AnalyzerError::collaborator("concept extractor", e))?;
        analysis.intelligence.concepts_updated = concepts.len();
        analysis.impact.affected_concepts =
            concepts.into_iter().map(|c| c.name).collect::<BTreeSet<_>>();
        Ok(true)
    }

    /// Fills in patterns, impact and insights. Fields filled before an error
    /// stay in place.
    async fn enrich(&self, analysis: &mut ChangeAnalysis) -> Result<()> {
        let change = Arc::clone(&analysis.change);

        let patterns = self
            .collaborators
            .patterns
            .analyze_file_change(&change)
            .await
            .map_err(|e| AnalyzerError::collaborator("pattern engine", e))?;
        analysis.intelligence.patterns_learned = patterns.learned.as_ref().map_or(0, Vec::len);
        analysis.patterns = PatternFindings {
            detected: patterns.detected,
            violations: patterns.violations,
            recommendations: patterns.recommendations,
        };

        let thresholds = &self.options.thresholds;
        let dependents =
            find_dependent_files(self.collaborators.store.as_ref(), &change.path).await;
        let mut impact = score_impact(
            ScoringInput {
                affected_concepts: std::mem::take(&mut analysis.impact.affected_concepts),
                violation_count: analysis.patterns.violations.len(),
                dependent_count: dependents.len(),
            },
            thresholds,
        );
        impact.suggested_actions = std::mem::take(&mut analysis.impact.suggested_actions);
        if dependents.len() > thresholds.module_dependents {
            impact.suggested_actions.push(format!(
                "Review {} dependent file(s) that share concepts with this change",
                dependents.len()
            ));
        }
        analysis.impact = impact;

        let insights = generate_insights(analysis);
        analysis.intelligence.insights.extend(insights);
        Ok(())
    }

    fn record_success(&self, duration_ms: u64) {
        let p95 = {
            let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
            stats.record(duration_ms);
            stats.p95()
        };
        self.health_tx.send_modify(|h| {
            h.batches_completed += 1;
            h.consecutive_failures = 0;
            h.last_error = None;
            h.last_success = Some(SystemTime::now());
            h.last_batch_ms = Some(duration_ms);
            h.p95_batch_ms = p95;
        });
    }

    /// Fire-and-forget write-back of confirmed findings.
    fn spawn_learning(self: &Arc<Self>, analyses: &[Arc<ChangeAnalysis>], concept_sync: &[bool]) {
        if !self.options.enable_pattern_learning {
            return;
        }
        let targets: Vec<(Arc<ChangeAnalysis>, bool)> = analyses
            .iter()
            .cloned()
            .zip(concept_sync.iter().copied())
            .filter(|(a, sync)| !a.patterns.detected.is_empty() || *sync)
            .collect();
        if targets.is_empty() {
            return;
        }
        let shared = Arc::clone(self);
        tokio::spawn(async move { shared.write_back(targets).await });
    }

    async fn write_back(&self, targets: Vec<(Arc<ChangeAnalysis>, bool)>) {
        for (analysis, sync_concepts) in targets {
            if !analysis.patterns.detected.is_empty() {
                if let Err(err) = self
                    .collaborators
                    .patterns
                    .learn_from_analysis(&analysis)
                    .await
                {
                    self.report_learning_failure(&analysis, "pattern engine", &err);
                }
            }
            if sync_concepts {
                if let Err(err) = self
                    .collaborators
                    .extractor
                    .update_from_analysis(&analysis)
                    .await
                {
                    self.report_learning_failure(&analysis, "concept extractor", &err);
                }
            }
        }
    }

    fn report_learning_failure(
        &self,
        analysis: &ChangeAnalysis,
        service: &str,
        err: &anyhow::Error,
    ) {
        warn!("Learning write-back to {service} failed for {}: {err:#}", analysis.path());
        self.emit(AnalyzerEvent::LearningError {
            path: analysis.path().to_string(),
            error: format!("{service}: {err:#}"),
        });
    }
}

struct BatchOutcome {
    analyses: Vec<ChangeAnalysis>,
    /// Parallel to `analyses`: write the concept set back to the extractor.
    concept_sync: Vec<bool>,
    architectural: bool,
}

/// Releases the busy flag on every exit path, including panics and timeouts,
/// and tells the scheduler so a remaining backlog gets re-armed.
struct BusyGuard {
    shared: Arc<Shared>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.shared.lock_queue().analyzing = false;
        self.shared.health_tx.send_modify(|h| h.analyzing = false);
        if let Err(err) = self.shared.send(SchedulerCommand::BatchFinished) {
            debug!("Batch finished after scheduler shutdown: {err}");
        }
    }
}
