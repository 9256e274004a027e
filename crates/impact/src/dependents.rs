use crate::services::ConceptStore;
use log::warn;
use std::collections::{BTreeSet, HashSet};

/// Files that share at least one recorded concept with `path`.
///
/// Point-in-time read of the store; the queried path itself is excluded. A
/// failing store degrades to "no dependents".
pub async fn find_dependent_files(store: &dyn ConceptStore, path: &str) -> BTreeSet<String> {
    match lookup(store, path).await {
        Ok(files) => files,
        Err(err) => {
            warn!("Dependent lookup failed for {path}: {err:#}");
            BTreeSet::new()
        }
    }
}

async fn lookup(store: &dyn ConceptStore, path: &str) -> anyhow::Result<BTreeSet<String>> {
    let own: HashSet<String> = store
        .get_concepts(Some(path))
        .await?
        .into_iter()
        .map(|record| record.concept_name)
        .collect();
    if own.is_empty() {
        return Ok(BTreeSet::new());
    }

    let dependents = store
        .get_concepts(None)
        .await?
        .into_iter()
        .filter(|record| record.file_path != path && own.contains(&record.concept_name))
        .map(|record| record.file_path)
        .collect();
    Ok(dependents)
}
