use crate::config::ImpactThresholds;
use crate::heuristics::BASELINE_CONFIDENCE;
use crate::types::{clamp_confidence, ChangeAnalysis, Impact, Scope};
use std::collections::BTreeSet;

const CONCEPT_WEIGHT: f64 = 0.1;
const CONCEPT_BONUS_CAP: f64 = 0.3;
const VIOLATION_BONUS: f64 = 0.2;
const PROJECT_DEPENDENTS_BONUS: f64 = 0.3;
const MODULE_DEPENDENTS_BONUS: f64 = 0.1;

/// Everything impact scoring looks at for one change.
#[derive(Debug, Clone, Default)]
pub struct ScoringInput {
    pub affected_concepts: BTreeSet<String>,
    pub violation_count: usize,
    pub dependent_count: usize,
}

/// Additive impact score starting from `file` scope at baseline confidence.
///
/// Rules only ever widen the scope; the result is clamped to `[0, 1]`.
#[must_use]
pub fn score_impact(input: ScoringInput, thresholds: &ImpactThresholds) -> Impact {
    let mut scope = Scope::File;
    let mut confidence = BASELINE_CONFIDENCE;

    #[allow(clippy::cast_precision_loss)]
    let concept_bonus = CONCEPT_WEIGHT * input.affected_concepts.len() as f64;
    confidence += concept_bonus.min(CONCEPT_BONUS_CAP);

    if input.violation_count > 0 {
        scope.escalate(Scope::Module);
        confidence += VIOLATION_BONUS;
    }

    if input.dependent_count > thresholds.project_dependents {
        scope.escalate(Scope::Project);
        confidence += PROJECT_DEPENDENTS_BONUS;
    } else if input.dependent_count > thresholds.module_dependents {
        scope.escalate(Scope::Module);
        confidence += MODULE_DEPENDENTS_BONUS;
    }

    let mut impact = Impact::new(scope, clamp_confidence(confidence));
    impact.affected_concepts = input.affected_concepts;
    impact
}

/// Human-readable summary lines derived from an already-scored analysis.
#[must_use]
pub fn generate_insights(analysis: &ChangeAnalysis) -> Vec<String> {
    let mut insights = Vec::new();

    let detected = analysis.patterns.detected.len();
    if detected > 0 {
        insights.push(format!("Detected {detected} pattern(s) in this change"));
    }

    let violations = analysis.patterns.violations.len();
    if violations > 0 {
        insights.push(format!(
            "Found {violations} pattern violation(s) that may need attention"
        ));
    }

    if analysis.impact.scope == Scope::Project {
        insights.push(
            "This change may have project-wide impact; consider running the full test suite"
                .to_string(),
        );
    }

    let concepts = analysis.intelligence.concepts_updated;
    if concepts > 0 {
        insights.push(format!("Updated {concepts} semantic concept(s)"));
    }

    insights
}
