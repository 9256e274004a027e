use crate::types::{ChangeAnalysis, Scope};
use std::collections::BTreeSet;

const ARCHITECTURAL_CONCEPT_WEIGHT: f64 = 0.1;

/// Outcome of the cross-file pass over one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correlation {
    pub unique_concepts: BTreeSet<String>,
    pub architectural: bool,
}

/// Reduction over a fully analyzed batch.
///
/// Batches of one are left untouched. When more than `concept_threshold` unique
/// concepts are touched across the batch every member is promoted to project
/// scope and receives the shared architectural insights.
pub fn correlate_batch(analyses: &mut [ChangeAnalysis], concept_threshold: usize) -> Correlation {
    if analyses.len() < 2 {
        return Correlation {
            unique_concepts: BTreeSet::new(),
            architectural: false,
        };
    }

    let unique_concepts: BTreeSet<String> = analyses
        .iter()
        .flat_map(|a| a.impact.affected_concepts.iter().cloned())
        .collect();
    let architectural = unique_concepts.len() > concept_threshold;

    if architectural {
        #[allow(clippy::cast_precision_loss)]
        let floor = (unique_concepts.len() as f64 * ARCHITECTURAL_CONCEPT_WEIGHT).min(1.0);
        let shared = architectural_insights(unique_concepts.len());
        for analysis in analyses.iter_mut() {
            analysis.impact.scope.escalate(Scope::Project);
            analysis.impact.raise_confidence(floor);
            analysis.intelligence.insights.extend(shared.iter().cloned());
        }
    }

    Correlation {
        unique_concepts,
        architectural,
    }
}

fn architectural_insights(concept_count: usize) -> Vec<String> {
    vec![
        format!("Architectural change detected across {concept_count} concepts"),
        "Review integration tests for the affected components".to_string(),
        "Update architecture documentation to reflect the change".to_string(),
    ]
}
