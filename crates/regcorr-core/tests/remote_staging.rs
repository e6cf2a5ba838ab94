mod common;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::*;
use regcorr_core::{
    PipelineConfig, RegressionConfig, RegressionError, RegressionPipeline, RemoteCredentials,
    RemoteRetriever,
};
use regcorr_state::fakes::MemoryCheckpointStore;
use walkdir::WalkDir;

/// Serves `s3://{key}` from `{bucket}/{key}`.
struct BucketRetriever {
    bucket: PathBuf,
    fetches: AtomicUsize,
}

impl BucketRetriever {
    fn object(&self, remote: &str) -> PathBuf {
        self.bucket.join(remote.trim_start_matches("s3://"))
    }
}

impl RemoteRetriever for BucketRetriever {
    fn list(&self, remote_root: &str, _: &RemoteCredentials) -> anyhow::Result<Vec<String>> {
        let dir = self.object(remote_root);
        let mut paths = Vec::new();
        for entry in WalkDir::new(&dir) {
            let entry = entry?;
            if entry.file_type().is_file() {
                let relative = entry.path().strip_prefix(&self.bucket)?;
                paths.push(format!("s3://{}", relative.display()));
            }
        }
        Ok(paths)
    }

    fn fetch(
        &self,
        remote_path: &str,
        local_dir: &Path,
        _: &RemoteCredentials,
    ) -> anyhow::Result<PathBuf> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let src = self.object(remote_path);
        let name = src
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("no file name in {remote_path}"))?;
        let dest = local_dir.join(name);
        std::fs::copy(&src, &dest)?;
        Ok(dest)
    }
}

fn remote_config(cache: &Path) -> RegressionConfig {
    RegressionConfig::new(
        "main_site-a",
        PipelineConfig::new("pipeline_1", "s3://bucket/v1"),
        PipelineConfig::new("pipeline_2", "s3://bucket/v2"),
        cache,
    )
    .with_worker_count(2)
    .with_remote_credentials(RemoteCredentials {
        source: "default".to_string(),
    })
}

#[tokio::test]
async fn remote_roots_are_listed_then_staged_lazily() {
    let bucket = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    write_run(&bucket.path().join("bucket/v1"));
    write_run(&bucket.path().join("bucket/v2"));
    let retriever = Arc::new(BucketRetriever {
        bucket: bucket.path().to_path_buf(),
        fetches: AtomicUsize::new(0),
    });

    let report = RegressionPipeline::new(
        remote_config(cache.path()),
        Arc::new(MemoryCheckpointStore::new()),
    )
    .unwrap()
    .with_retriever(retriever.clone())
    .run()
    .await
    .expect("run");

    assert_eq!(report.pair_count, 3);
    assert!(report.failures.is_empty());
    assert_eq!(retriever.fetches.load(Ordering::SeqCst), 6);
    assert!(cache
        .path()
        .join("s3_input_files/bucket/v1")
        .join(SESSION)
        .join(BOLD)
        .exists());
}

#[tokio::test]
async fn remote_root_without_retriever_is_fatal() {
    let cache = tempfile::tempdir().unwrap();
    let err = RegressionPipeline::new(
        remote_config(cache.path()),
        Arc::new(MemoryCheckpointStore::new()),
    )
    .unwrap()
    .run()
    .await
    .unwrap_err();
    assert!(matches!(err, RegressionError::MissingRetriever { .. }));
}
