//! Run configuration.
//!
//! A single immutable [`RegressionConfig`] is handed to every component. It
//! derives `Deserialize` so whatever loads the run description (YAML, JSON,
//! environment) can produce it directly; nothing in this crate reads settings
//! from ambient state.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RegressionError, Result};

/// Default concordance at or above which a pair is considered unchanged.
pub const DEFAULT_THRESHOLD: f64 = 0.980;

/// Prefix marking a root or artifact that lives in remote object storage.
pub const REMOTE_PREFIX: &str = "s3://";

/// Whether `path` names a remote object.
pub fn is_remote(path: &str) -> bool {
    path.starts_with(REMOTE_PREFIX)
}

// ---------------------------------------------------------------------------
// Replacement rules
// ---------------------------------------------------------------------------

/// An `old → new` substring rewrite applied to artifact paths before their
/// identity is derived. Normalizes naming differences between versions.
///
/// Textual form is `"old,new"`; the first comma separates the two halves.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReplacementRule {
    pub old: String,
    pub new: String,
}

impl ReplacementRule {
    pub fn new(old: impl Into<String>, new: impl Into<String>) -> Self {
        Self {
            old: old.into(),
            new: new.into(),
        }
    }

    /// Parse `"old,new"`.
    pub fn parse(rule: &str) -> Result<Self> {
        match rule.split_once(',') {
            Some((old, new)) if !old.is_empty() => Ok(Self::new(old, new)),
            _ => Err(RegressionError::MalformedReplacement {
                rule: rule.to_string(),
            }),
        }
    }

    /// Parse a list of textual rules, failing on the first malformed one.
    pub fn parse_all<S: AsRef<str>>(rules: &[S]) -> Result<Vec<Self>> {
        rules.iter().map(|r| Self::parse(r.as_ref())).collect()
    }
}

impl FromStr for ReplacementRule {
    type Err = RegressionError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ReplacementRule {
    type Error = RegressionError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<ReplacementRule> for String {
    fn from(rule: ReplacementRule) -> Self {
        format!("{},{}", rule.old, rule.new)
    }
}

impl fmt::Display for ReplacementRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.old, self.new)
    }
}

// ---------------------------------------------------------------------------
// Pipeline and run settings
// ---------------------------------------------------------------------------

/// Which tree of a pipeline run to compare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    Output,
    Working,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Output => "output",
            SourceKind::Working => "working",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credentials handed to the remote retriever. Opaque to this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCredentials {
    /// Path to a credentials file, or a named profile understood by the retriever.
    pub source: String,
}

/// Locations produced by one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Label used in logs and reports (e.g. `"pipeline_1"`).
    pub name: String,
    pub output_dir: Option<String>,
    #[serde(default)]
    pub work_dir: Option<String>,
    #[serde(default)]
    pub log_dir: Option<String>,
    /// The pipeline configuration file the run was launched with, if found.
    #[serde(default)]
    pub pipeline_config: Option<String>,
    #[serde(default)]
    pub replacements: Vec<ReplacementRule>,
}

impl PipelineConfig {
    pub fn new(name: impl Into<String>, output_dir: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            output_dir: Some(output_dir.into()),
            work_dir: None,
            log_dir: None,
            pipeline_config: None,
            replacements: Vec::new(),
        }
    }

    pub fn with_replacements(mut self, replacements: Vec<ReplacementRule>) -> Self {
        self.replacements = replacements;
        self
    }

    /// Root directory for `source`, trailing separators removed.
    pub fn root(&self, source: SourceKind) -> Option<&str> {
        let root = match source {
            SourceKind::Output => self.output_dir.as_deref(),
            SourceKind::Working => self.work_dir.as_deref(),
        }?;
        let trimmed = root.trim_end_matches('/');
        Some(if trimmed.is_empty() { root } else { trimmed })
    }
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

/// Everything a regression run needs, fixed for the lifetime of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionConfig {
    /// Identifies the run; names checkpoint and report directories.
    pub run_name: String,
    pub pipeline_a: PipelineConfig,
    pub pipeline_b: PipelineConfig,
    /// Size of the correlation worker pool.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Root for checkpoints, staged remote artifacts and reports.
    pub cache_dir: PathBuf,
    #[serde(default)]
    pub remote_credentials: Option<RemoteCredentials>,
    /// Restrict correlation to the quick allow-list.
    #[serde(default)]
    pub quick: bool,
    /// Log every pair at `info` instead of `debug`.
    #[serde(default)]
    pub verbose: bool,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default)]
    pub source: SourceKind,
}

impl RegressionConfig {
    /// Configuration with defaults for everything except the two pipelines.
    pub fn new(
        run_name: impl Into<String>,
        pipeline_a: PipelineConfig,
        pipeline_b: PipelineConfig,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            run_name: run_name.into(),
            pipeline_a,
            pipeline_b,
            worker_count: default_worker_count(),
            cache_dir: cache_dir.into(),
            remote_credentials: None,
            quick: false,
            verbose: false,
            threshold: DEFAULT_THRESHOLD,
            source: SourceKind::Output,
        }
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_quick(mut self, quick: bool) -> Self {
        self.quick = quick;
        self
    }

    pub fn with_source(mut self, source: SourceKind) -> Self {
        self.source = source;
        self
    }

    pub fn with_remote_credentials(mut self, credentials: RemoteCredentials) -> Self {
        self.remote_credentials = Some(credentials);
        self
    }

    /// Check the configuration before any stage runs.
    pub fn validate(&self) -> Result<()> {
        if self.run_name.trim().is_empty() {
            return Err(RegressionError::InvalidConfig(
                "run_name must not be empty".to_string(),
            ));
        }
        if self.worker_count == 0 {
            return Err(RegressionError::InvalidConfig(
                "worker_count must be at least 1".to_string(),
            ));
        }
        if !self.threshold.is_finite() || !(-1.0..=1.0).contains(&self.threshold) {
            return Err(RegressionError::InvalidConfig(format!(
                "threshold must lie in [-1, 1], got {}",
                self.threshold
            )));
        }
        for pipeline in [&self.pipeline_a, &self.pipeline_b] {
            let root = pipeline.root(self.source).ok_or_else(|| {
                RegressionError::InvalidConfig(format!(
                    "pipeline {} has no {} directory",
                    pipeline.name, self.source
                ))
            })?;
            match (&self.remote_credentials, is_remote(root)) {
                (Some(_), false) => {
                    return Err(RegressionError::InvalidConfig(format!(
                        "remote credentials were provided but pipeline {} root {root} is not an {REMOTE_PREFIX} path",
                        pipeline.name
                    )))
                }
                (None, true) => {
                    return Err(RegressionError::InvalidConfig(format!(
                        "pipeline {} root {root} is an {REMOTE_PREFIX} path but no remote credentials were provided",
                        pipeline.name
                    )))
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// `{cache_dir}/{run_name}`: reports for this run.
    pub fn run_dir(&self) -> PathBuf {
        self.cache_dir.join(&self.run_name)
    }

    /// `{cache_dir}/{run_name}/checkpoints`.
    pub fn checkpoint_dir(&self) -> PathBuf {
        self.run_dir().join("checkpoints")
    }

    /// `{cache_dir}/s3_input_files`: staged copies of remote artifacts.
    pub fn staging_dir(&self) -> PathBuf {
        staging_root(&self.cache_dir)
    }
}

/// Staging root for a cache directory.
pub fn staging_root(cache_dir: &Path) -> PathBuf {
    cache_dir.join("s3_input_files")
}
