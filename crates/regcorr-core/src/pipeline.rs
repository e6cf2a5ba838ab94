//! End-to-end regression run: index → match → correlate → aggregate.
//!
//! Every stage output is checkpointed, so rerunning after a crash resumes
//! from the last completed stage.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use regcorr_state::CheckpointStore;
use tracing::Instrument;

use crate::aggregate::{organize, AggregationMode, CoefficientKind};
use crate::checkpoint::{compute_or_load, Stage};
use crate::config::RegressionConfig;
use crate::correlation::CorrelationCalculator;
use crate::error::{RegressionError, Result};
use crate::index::{ArtifactIndexer, IndexPair};
use crate::matcher::{match_indexes, MatchSet};
use crate::metrics::METRICS;
use crate::obs;
use crate::reporting::{RegressionReport, ReportSink};
use crate::runner::ParallelRunner;
use crate::staging::{RemoteRetriever, Stager};

/// A configured regression run.
pub struct RegressionPipeline {
    config: RegressionConfig,
    store: Arc<dyn CheckpointStore>,
    retriever: Option<Arc<dyn RemoteRetriever>>,
    sink: Option<Arc<dyn ReportSink>>,
}

impl RegressionPipeline {
    /// Validate `config` and bind it to a checkpoint store.
    pub fn new(config: RegressionConfig, store: Arc<dyn CheckpointStore>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            retriever: None,
            sink: None,
        })
    }

    /// Retriever for `s3://` roots.
    pub fn with_retriever(mut self, retriever: Arc<dyn RemoteRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Where the finished report is published.
    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &RegressionConfig {
        &self.config
    }

    fn stager(&self) -> Option<Stager> {
        let retriever = self.retriever.as_ref()?;
        let credentials = self.config.remote_credentials.as_ref()?;
        Some(Stager::new(
            &self.config.cache_dir,
            Arc::clone(retriever),
            credentials.clone(),
        ))
    }

    fn roots(&self) -> Result<(String, String)> {
        let source = self.config.source;
        let root = |pipeline: &crate::config::PipelineConfig| {
            pipeline
                .root(source)
                .map(str::to_string)
                .ok_or_else(|| {
                    RegressionError::InvalidConfig(format!(
                        "pipeline {} has no {source} directory",
                        pipeline.name
                    ))
                })
        };
        Ok((root(&self.config.pipeline_a)?, root(&self.config.pipeline_b)?))
    }

    /// Run every stage and return the report.
    pub async fn run(&self) -> Result<RegressionReport> {
        self.run_stages()
            .instrument(obs::run_span(&self.config.run_name))
            .await
    }

    async fn run_stages(&self) -> Result<RegressionReport> {
        let started = Instant::now();
        let config = &self.config;
        let store = self.store.as_ref();
        let source = config.source;
        let (root_a, root_b) = self.roots()?;
        obs::emit_run_started(&config.run_name, &root_a, &root_b, config.worker_count);

        let indexes: IndexPair = compute_or_load(store, &Stage::Index.key(source), || {
            self.build_indexes(root_a.clone(), root_b.clone())
        })
        .await?;

        let matches: MatchSet = compute_or_load(store, &Stage::Matches.key(source), || async {
            match_indexes(&indexes.a, &indexes.b)
        })
        .await?;
        obs::emit_matched(
            matches.pair_count(),
            matches.missing_in_a.len(),
            matches.missing_in_b.len(),
        );

        let mut calculator =
            CorrelationCalculator::new(config.threshold).with_verbose(config.verbose);
        if let Some(stager) = self.stager() {
            calculator = calculator.with_stager(stager);
        }
        let runner = ParallelRunner::new(calculator, config.worker_count);
        let output = runner
            .run_all(
                store,
                &Stage::Correlations.key(source),
                &matches,
                config.quick,
            )
            .await?;

        let mode = AggregationMode::for_quick(config.quick);
        let reports = CoefficientKind::ALL
            .iter()
            .map(|kind| organize(&output.table, *kind, mode))
            .collect();

        let mut path_changes = indexes.a.path_changes.clone();
        path_changes.extend(indexes.b.path_changes.iter().cloned());

        let report = RegressionReport {
            run_name: config.run_name.clone(),
            generated_at: Utc::now(),
            root_a,
            root_b,
            pair_count: output.outcomes.len(),
            reports,
            failures: output.failures,
            missing_in_a: matches.missing_in_a,
            missing_in_b: matches.missing_in_b,
            path_changes,
        };

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.publish(&report).await {
                obs::emit_report_error(&config.run_name, &format!("{e:#}"));
            }
        }

        METRICS.flush();
        obs::emit_run_finished(
            &config.run_name,
            started.elapsed().as_millis() as u64,
            report.pair_count,
            report.failures.len(),
        );
        Ok(report)
    }

    async fn build_indexes(&self, root_a: String, root_b: String) -> Result<IndexPair> {
        let indexer = match self.stager() {
            Some(stager) => ArtifactIndexer::with_stager(stager),
            None => ArtifactIndexer::local(),
        };
        let replacements_a = self.config.pipeline_a.replacements.clone();
        let replacements_b = self.config.pipeline_b.replacements.clone();
        tokio::task::spawn_blocking(move || {
            Ok(IndexPair {
                a: indexer.index(&root_a, &replacements_a)?,
                b: indexer.index(&root_b, &replacements_b)?,
            })
        })
        .await
        .map_err(|e| RegressionError::Worker(format!("indexing task: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use regcorr_state::fakes::MemoryCheckpointStore;

    #[test]
    fn new_rejects_invalid_config() {
        let config = RegressionConfig::new(
            "run",
            PipelineConfig::new("pipeline_1", "/a"),
            PipelineConfig::new("pipeline_2", "/b"),
            "/tmp/c",
        )
        .with_worker_count(0);
        let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
        assert!(matches!(
            RegressionPipeline::new(config, store),
            Err(RegressionError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn empty_roots_fail_with_no_artifacts() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let config = RegressionConfig::new(
            "run",
            PipelineConfig::new("pipeline_1", a.path().to_string_lossy()),
            PipelineConfig::new("pipeline_2", b.path().to_string_lossy()),
            cache.path(),
        )
        .with_worker_count(1);
        let store = Arc::new(MemoryCheckpointStore::new());
        let pipeline = RegressionPipeline::new(config, store.clone()).unwrap();
        let err = pipeline.run().await.unwrap_err();
        assert!(matches!(err, RegressionError::NoArtifactsFound { .. }));
        assert!(store.keys().is_empty());
    }
}
