//! Stage checkpointing.
//!
//! Each stage output is stored under `"{stage}_{source}"` so an interrupted
//! run resumes from the last completed stage.

use std::future::Future;

use regcorr_state::{get_json, put_json, CheckpointStore};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::SourceKind;
use crate::error::Result;
use crate::metrics::METRICS;
use crate::obs;

/// Stages persisted by a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Index,
    Matches,
    Correlations,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Index => "index",
            Stage::Matches => "matches",
            Stage::Correlations => "correlations",
        }
    }

    /// Store key for this stage of a run over `source`.
    pub fn key(&self, source: SourceKind) -> String {
        format!("{}_{}", self.as_str(), source.as_str())
    }
}

/// Load the value stored under `key`, or compute, store and return it.
pub async fn compute_or_load<T, F, Fut>(
    store: &dyn CheckpointStore,
    key: &str,
    compute: F,
) -> Result<T>
where
    T: Serialize + DeserializeOwned + Sync,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if let Some(value) = get_json::<T>(store, key).await? {
        METRICS.inc_checkpoint_hits();
        obs::emit_checkpoint_hit(key);
        return Ok(value);
    }
    let value = compute().await?;
    put_json(store, key, &value).await?;
    obs::emit_checkpoint_stored(key);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegressionError;
    use regcorr_state::fakes::MemoryCheckpointStore;

    #[test]
    fn stage_keys() {
        assert_eq!(Stage::Index.key(SourceKind::Output), "index_output");
        assert_eq!(Stage::Matches.key(SourceKind::Working), "matches_working");
        assert_eq!(
            Stage::Correlations.key(SourceKind::Output),
            "correlations_output"
        );
    }

    #[tokio::test]
    async fn computes_once_then_loads() {
        let store = MemoryCheckpointStore::new();
        let first: Vec<u32> = compute_or_load(&store, "index_output", || async {
            Ok::<_, RegressionError>(vec![1, 2])
        })
        .await
        .unwrap();
        assert_eq!(first, vec![1, 2]);

        let second: Vec<u32> = compute_or_load(&store, "index_output", || async {
            Err(RegressionError::Worker("stage must not be recomputed".to_string()))
        })
        .await
        .unwrap();
        assert_eq!(second, vec![1, 2]);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn failed_compute_stores_nothing() {
        let store = MemoryCheckpointStore::new();
        let result: Result<Vec<u32>> = compute_or_load(&store, "matches_output", || async {
            Err(RegressionError::Worker("boom".to_string()))
        })
        .await;
        assert!(result.is_err());
        assert!(store.keys().is_empty());
    }
}
