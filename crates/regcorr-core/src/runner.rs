//! Fan-out of matched pairs over a fixed-size worker pool.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use regcorr_state::{get_json, put_json, CheckpointStore, ContentDigest};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use crate::correlation::{CorrelationCalculator, CorrelationOutcome};
use crate::error::{RegressionError, Result};
use crate::matcher::MatchSet;
use crate::metrics::METRICS;
use crate::obs;
use crate::serde_util::{nan_as_null, nan_map};

/// High-value categories correlated in quick mode.
pub const QUICK_CATEGORIES: &[&str] = &[
    "desc-brain_T1w",
    "desc-preproc_T1w",
    "label-CSF_mask",
    "label-GM_mask",
    "label-WM_mask",
    "space-template_desc-brain_T1w",
    "desc-preproc_bold",
    "desc-brain_mask",
    "space-template_desc-preproc_bold",
    "desc-confounds_timeseries",
    "desc-Mean_timeseries",
];

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// A pair that could not be compared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub category: String,
    pub reason: String,
    pub paths: Vec<String>,
}

/// A pair below the threshold, kept for human review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubOptimalEntry {
    pub category: String,
    #[serde(with = "nan_as_null")]
    pub concordance: f64,
    #[serde(with = "nan_as_null")]
    pub pearson: f64,
    pub path_a: String,
    pub path_b: String,
}

/// Coefficients of every comparable pair, merged per category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrelationTable {
    #[serde(with = "nan_map")]
    pub concordance: BTreeMap<String, Vec<f64>>,
    #[serde(with = "nan_map")]
    pub pearson: BTreeMap<String, Vec<f64>>,
    pub sub_optimal: Vec<SubOptimalEntry>,
}

/// Everything the pool produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutput {
    pub outcomes: Vec<CorrelationOutcome>,
    pub table: CorrelationTable,
    pub failures: Vec<Failure>,
}

impl RunOutput {
    /// Split outcomes into the merged table and the failures list.
    pub fn from_outcomes(outcomes: Vec<CorrelationOutcome>) -> Self {
        let mut table = CorrelationTable::default();
        let mut failures = Vec::new();
        for outcome in &outcomes {
            match outcome {
                CorrelationOutcome::Success {
                    category,
                    concordance,
                    pearson,
                } => table.push(category, *concordance, *pearson),
                CorrelationOutcome::SubOptimal {
                    category,
                    concordance,
                    pearson,
                    path_a,
                    path_b,
                } => {
                    table.push(category, *concordance, *pearson);
                    table.sub_optimal.push(SubOptimalEntry {
                        category: category.clone(),
                        concordance: *concordance,
                        pearson: *pearson,
                        path_a: path_a.clone(),
                        path_b: path_b.clone(),
                    });
                }
                CorrelationOutcome::Error {
                    category,
                    reason,
                    paths,
                } => failures.push(Failure {
                    category: category.clone(),
                    reason: reason.clone(),
                    paths: paths.clone(),
                }),
            }
        }
        Self {
            outcomes,
            table,
            failures,
        }
    }
}

impl CorrelationTable {
    fn push(&mut self, category: &str, concordance: f64, pearson: f64) {
        self.concordance
            .entry(category.to_string())
            .or_default()
            .push(concordance);
        self.pearson
            .entry(category.to_string())
            .or_default()
            .push(pearson);
    }
}

/// Persisted outcome stage, tied to the match set it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeSet {
    pub match_digest: ContentDigest,
    pub outcomes: Vec<CorrelationOutcome>,
}

/// Digest identifying the work a match set describes.
pub fn match_digest(match_set: &MatchSet, quick: bool) -> Result<ContentDigest> {
    Ok(ContentDigest::of_json(&(match_set, quick))?)
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Correlates matched pairs on `worker_count` blocking workers.
#[derive(Debug, Clone)]
pub struct ParallelRunner {
    calculator: Arc<CorrelationCalculator>,
    worker_count: usize,
}

impl ParallelRunner {
    pub fn new(calculator: CorrelationCalculator, worker_count: usize) -> Self {
        Self {
            calculator: Arc::new(calculator),
            worker_count: worker_count.max(1),
        }
    }

    /// Correlate every matched pair, restricted to `quick_filter` if given.
    ///
    /// Outcomes come back in match-set order. A staging failure or a
    /// panicking worker aborts the whole batch.
    pub async fn correlate_all(
        &self,
        match_set: &MatchSet,
        quick_filter: Option<&[&str]>,
    ) -> Result<Vec<CorrelationOutcome>> {
        let pairs: Vec<_> = match_set
            .pairs()
            .into_iter()
            .filter(|pair| quick_filter.map_or(true, |allowed| allowed.contains(&pair.category.as_str())))
            .collect();
        let total = pairs.len();
        let started = Instant::now();

        let permits = Arc::new(Semaphore::new(self.worker_count));
        let mut join_set = JoinSet::new();
        for (idx, pair) in pairs.into_iter().enumerate() {
            let permits = Arc::clone(&permits);
            let calculator = Arc::clone(&self.calculator);
            join_set.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| RegressionError::Worker(e.to_string()))?;
                let label = format!("{} ({})", pair.category, pair.identity);
                let outcome = tokio::task::spawn_blocking(move || {
                    calculator.correlate(&pair.category, &pair.path_a, &pair.path_b)
                })
                .await
                .map_err(|e| RegressionError::Worker(format!("correlating {label}: {e}")))??;
                Ok::<(usize, CorrelationOutcome), RegressionError>((idx, outcome))
            });
        }

        let mut slots: Vec<Option<CorrelationOutcome>> = vec![None; total];
        while let Some(joined) = join_set.join_next().await {
            let (idx, outcome) =
                joined.map_err(|e| RegressionError::Worker(format!("task join error: {e}")))??;
            if outcome.is_error() {
                METRICS.inc_pairs_failed();
            } else {
                METRICS.inc_pairs_correlated();
            }
            slots[idx] = Some(outcome);
        }

        let outcomes: Vec<CorrelationOutcome> = slots.into_iter().flatten().collect();
        if outcomes.len() != total {
            return Err(RegressionError::Worker(format!(
                "{} of {total} correlation results missing",
                total - outcomes.len()
            )));
        }

        let failures = outcomes.iter().filter(|o| o.is_error()).count();
        let sub_optimal = outcomes
            .iter()
            .filter(|o| matches!(o, CorrelationOutcome::SubOptimal { .. }))
            .count();
        obs::emit_correlated(
            total,
            failures,
            sub_optimal,
            started.elapsed().as_millis() as u64,
        );
        Ok(outcomes)
    }

    /// [`correlate_all`](Self::correlate_all) behind a digest-checked checkpoint.
    ///
    /// A stored outcome set is reused only when it was computed from the same
    /// match set and quick setting.
    pub async fn run_all(
        &self,
        store: &dyn CheckpointStore,
        key: &str,
        match_set: &MatchSet,
        quick: bool,
    ) -> Result<RunOutput> {
        let digest = match_digest(match_set, quick)?;
        if let Some(stored) = get_json::<OutcomeSet>(store, key).await? {
            if stored.match_digest == digest {
                METRICS.inc_checkpoint_hits();
                obs::emit_checkpoint_hit(key);
                return Ok(RunOutput::from_outcomes(stored.outcomes));
            }
            obs::emit_checkpoint_stale(key, stored.match_digest.short(), digest.short());
        }

        let quick_filter = quick.then_some(QUICK_CATEGORIES);
        let outcomes = self.correlate_all(match_set, quick_filter).await?;
        let set = OutcomeSet {
            match_digest: digest,
            outcomes,
        };
        put_json(store, key, &set).await?;
        obs::emit_checkpoint_stored(key);
        debug!(key, outcomes = set.outcomes.len(), "stored outcome set");
        Ok(RunOutput::from_outcomes(set.outcomes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::nifti::NiftiImage;
    use crate::identity::Identity;
    use crate::index::IdentityMap;
    use crate::matcher::MatchedPair;
    use regcorr_state::fakes::MemoryCheckpointStore;
    use std::path::Path;

    fn write_volume(dir: &Path, name: &str, data: Vec<f64>) -> String {
        let path = dir.join(name);
        NiftiImage::new(vec![data.len()], data).write(&path).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn match_set(pairs: &[(&str, &str, &str)]) -> MatchSet {
        let mut matched: BTreeMap<String, IdentityMap<MatchedPair>> = BTreeMap::new();
        for (i, (category, a, b)) in pairs.iter().enumerate() {
            matched.entry(category.to_string()).or_default().insert(
                Identity {
                    category: category.to_string(),
                    location: "func".to_string(),
                    numeric_suffix: i.to_string(),
                },
                MatchedPair {
                    path_a: a.to_string(),
                    path_b: b.to_string(),
                },
            );
        }
        MatchSet {
            matched,
            missing_in_a: vec![],
            missing_in_b: vec![],
        }
    }

    #[tokio::test]
    async fn splits_outcomes_into_table_and_failures() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_volume(dir.path(), "a.nii", vec![1.0, 2.0, 3.0, 4.0]);
        let b = write_volume(dir.path(), "b.nii", vec![10.0, 20.0, 30.0, 40.0]);
        let gone = dir.path().join("gone.nii").to_string_lossy().into_owned();

        let set = match_set(&[
            ("desc-preproc_bold", &a, &a),
            ("desc-preproc_bold", &a, &b),
            ("label-CSF_mask", &a, &gone),
        ]);
        let runner = ParallelRunner::new(CorrelationCalculator::default(), 2);
        let outcomes = runner.correlate_all(&set, None).await.unwrap();
        let output = RunOutput::from_outcomes(outcomes);

        assert_eq!(output.outcomes.len(), 3);
        assert_eq!(output.table.concordance["desc-preproc_bold"].len(), 2);
        assert_eq!(output.table.sub_optimal.len(), 1);
        assert_eq!(output.table.sub_optimal[0].path_b, b);
        assert_eq!(output.failures.len(), 1);
        assert_eq!(output.failures[0].reason, "file doesn't exist");
        assert_eq!(output.failures[0].paths, vec![gone]);
    }

    #[tokio::test]
    async fn corrupt_header_fails_only_its_own_pair() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_volume(dir.path(), "good.nii", vec![1.0, 2.0, 3.0, 4.0]);
        let corrupt = dir.path().join("corrupt.nii");
        let mut bytes = NiftiImage::new(vec![4], vec![1.0, 2.0, 3.0, 4.0]).to_bytes();
        bytes[108..112].copy_from_slice(&3.0e38f32.to_le_bytes());
        std::fs::write(&corrupt, bytes).unwrap();
        let corrupt = corrupt.to_string_lossy().into_owned();

        let set = match_set(&[
            ("desc-preproc_bold", &good, &good),
            ("desc-brain_mask", &corrupt, &corrupt),
        ]);
        let runner = ParallelRunner::new(CorrelationCalculator::default(), 2);
        let outcomes = runner.correlate_all(&set, None).await.unwrap();
        let output = RunOutput::from_outcomes(outcomes);

        assert_eq!(output.outcomes.len(), 2);
        assert_eq!(output.failures.len(), 1);
        assert_eq!(output.failures[0].category, "desc-brain_mask");
        assert!(output.failures[0].reason.starts_with("file reading problem"));
        assert_eq!(output.table.concordance["desc-preproc_bold"].len(), 1);
    }

    #[tokio::test]
    async fn quick_filter_restricts_categories() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_volume(dir.path(), "a.nii", vec![1.0, 2.0, 3.0]);
        let set = match_set(&[("desc-preproc_bold", &a, &a), ("desc-reho_bold", &a, &a)]);
        let runner = ParallelRunner::new(CorrelationCalculator::default(), 1);
        let outcomes = runner
            .correlate_all(&set, Some(QUICK_CATEGORIES))
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].category(), "desc-preproc_bold");
    }

    #[tokio::test]
    async fn checkpoint_reused_until_match_set_changes() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_volume(dir.path(), "a.nii", vec![1.0, 2.0, 3.0]);
        let store = MemoryCheckpointStore::new();
        let runner = ParallelRunner::new(CorrelationCalculator::default(), 2);

        let set = match_set(&[("desc-preproc_bold", &a, &a)]);
        let first = runner
            .run_all(&store, "correlations_output", &set, false)
            .await
            .unwrap();
        assert_eq!(store.write_count(), 1);

        // Same match set: loaded, not recomputed.
        std::fs::remove_file(&a).unwrap();
        let second = runner
            .run_all(&store, "correlations_output", &set, false)
            .await
            .unwrap();
        assert_eq!(store.write_count(), 1);
        assert_eq!(second, first);

        // Different match set: recomputed against the now-missing file.
        let changed = match_set(&[("desc-preproc_bold", &a, &a), ("desc-brain_mask", &a, &a)]);
        let third = runner
            .run_all(&store, "correlations_output", &changed, false)
            .await
            .unwrap();
        assert_eq!(store.write_count(), 2);
        assert_eq!(third.failures.len(), 2);
    }
}
