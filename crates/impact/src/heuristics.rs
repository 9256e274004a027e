use crate::types::{ChangeAnalysis, ChangeKind, FileChange, Impact, Scope};
use std::path::Path;
use std::sync::Arc;

pub(crate) const BASELINE_CONFIDENCE: f64 = 0.5;
pub(crate) const DISABLED_CONFIDENCE: f64 = 0.1;
pub(crate) const DISABLED_INSIGHT: &str = "Real-time analysis is disabled";

const PROJECT_MANIFESTS: &[&str] = &[
    "cargo.toml",
    "cargo.lock",
    "package.json",
    "package-lock.json",
    "pnpm-workspace.yaml",
    "tsconfig.json",
    "pyproject.toml",
    "setup.py",
    "setup.cfg",
    "requirements.txt",
    "pipfile",
    "go.mod",
    "pom.xml",
    "build.gradle",
    "build.gradle.kts",
    "settings.gradle",
    "gemfile",
    "composer.json",
    "cmakelists.txt",
    "makefile",
];

const TEST_MARKERS: &[&str] = &["test", "tests", "spec", "specs", "__tests__", "__test__"];

const MODULE_ROOT_STEMS: &[&str] = &["index", "mod", "lib", "__init__"];

const STATICALLY_TYPED: &[&str] = &[
    "typescript",
    "rust",
    "java",
    "go",
    "kotlin",
    "csharp",
    "c",
    "cpp",
    "swift",
    "scala",
];

/// Purely syntactic scope estimate from the path alone.
#[must_use]
pub fn classify_path(path: &str) -> Scope {
    let file_name = Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if PROJECT_MANIFESTS.contains(&file_name.as_str()) {
        return Scope::Project;
    }
    if has_test_marker(path) {
        return Scope::Module;
    }
    let stem = file_name.split('.').next().unwrap_or_default();
    if MODULE_ROOT_STEMS.contains(&stem) {
        return Scope::Module;
    }
    Scope::File
}

fn has_test_marker(path: &str) -> bool {
    path.to_ascii_lowercase()
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .flat_map(|segment| {
            // `user_test`, `test_user` and `__tests__` all count.
            std::iter::once(segment).chain(segment.split('_').filter(|s| !s.is_empty()))
        })
        .any(|token| TEST_MARKERS.contains(&token))
}

#[must_use]
pub fn is_statically_typed(language: &str) -> bool {
    STATICALLY_TYPED.contains(&language.to_ascii_lowercase().as_str())
}

#[must_use]
pub fn suggested_actions(change: &FileChange) -> Vec<String> {
    let mut actions: Vec<String> = match change.kind {
        ChangeKind::Add => vec![
            "Update documentation to cover the new file".to_string(),
            "Add tests for the new functionality".to_string(),
        ],
        ChangeKind::Change => vec![
            "Review related tests".to_string(),
            "Check for breaking changes in dependent code".to_string(),
        ],
        ChangeKind::Unlink => vec![
            "Remove tests that covered the deleted file".to_string(),
            "Update imports that referenced the deleted file".to_string(),
        ],
    };
    if change
        .effective_language()
        .is_some_and(|lang| is_statically_typed(&lang))
    {
        actions.push("Run the type checker to verify type consistency".to_string());
    }
    actions
}

/// Fast path: local heuristics only, never fails.
#[must_use]
pub fn lightweight_analysis(change: Arc<FileChange>) -> ChangeAnalysis {
    let mut impact = Impact::new(classify_path(&change.path), BASELINE_CONFIDENCE);
    impact.suggested_actions = suggested_actions(&change);
    ChangeAnalysis::new(change, impact)
}

/// Fixed response used while real-time analysis is switched off.
#[must_use]
pub fn minimal_analysis(change: Arc<FileChange>) -> ChangeAnalysis {
    let mut analysis = ChangeAnalysis::new(change, Impact::new(Scope::File, DISABLED_CONFIDENCE));
    analysis
        .intelligence
        .insights
        .push(DISABLED_INSIGHT.to_string());
    analysis
}
