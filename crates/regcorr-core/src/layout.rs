//! Discovery of the directories produced by one pipeline run.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::PipelineConfig;
use crate::error::{RegressionError, Result};

/// Marker in the name of a pipeline's own directory.
const PIPELINE_MARKER: &str = "pipeline_";
/// Suffix of the timestamped pipeline configuration file in the log tree.
const CONFIG_SUFFIX: &str = "Z.yml";

/// `"{branch}_{data_source}"`, the conventional run name.
pub fn run_name(branch: &str, data_source: &str) -> String {
    format!("{branch}_{data_source}")
}

/// Directories found under a pipeline run directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineLayout {
    pub log_dir: Option<PathBuf>,
    pub work_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub pipeline_config: Option<PathBuf>,
}

impl PipelineLayout {
    /// Inspect `run_dir` (containing `log/`, `working/` and `output/`).
    pub fn scan(run_dir: &Path) -> Result<Self> {
        let log_dir = pipeline_dir(&run_dir.join("log"))?;
        let work_dir = pipeline_dir(&run_dir.join("working"))?;
        let output_dir = pipeline_dir(&run_dir.join("output"))?;
        let pipeline_config = match &log_dir {
            Some(dir) => last_file_with_suffix(dir, CONFIG_SUFFIX)?,
            None => None,
        };
        Ok(Self {
            log_dir,
            work_dir,
            output_dir,
            pipeline_config,
        })
    }

    /// Pipeline configuration named `name` for the run at `run_dir`.
    pub fn discover(run_dir: &Path, name: &str) -> Result<PipelineConfig> {
        Ok(Self::scan(run_dir)?.into_config(name))
    }

    pub fn into_config(self, name: &str) -> PipelineConfig {
        let text = |p: Option<PathBuf>| p.map(|p| p.to_string_lossy().into_owned());
        PipelineConfig {
            name: name.to_string(),
            output_dir: text(self.output_dir),
            work_dir: text(self.work_dir),
            log_dir: text(self.log_dir),
            pipeline_config: text(self.pipeline_config),
            replacements: Vec::new(),
        }
    }
}

fn walk_error(root: &Path, e: walkdir::Error) -> RegressionError {
    RegressionError::Walk {
        root: root.display().to_string(),
        detail: e.to_string(),
    }
}

/// The last `pipeline_*` directory below `dir` in a sorted walk, or `dir`
/// itself when there is none. `None` when `dir` does not exist.
fn pipeline_dir(dir: &Path) -> Result<Option<PathBuf>> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let mut found = dir.to_path_buf();
    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| walk_error(dir, e))?;
        if entry.file_type().is_dir()
            && entry.file_name().to_string_lossy().contains(PIPELINE_MARKER)
        {
            found = entry.into_path();
        }
    }
    Ok(Some(found))
}

fn last_file_with_suffix(dir: &Path, suffix: &str) -> Result<Option<PathBuf>> {
    let mut found = None;
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| walk_error(dir, e))?;
        if entry.file_type().is_file() && entry.file_name().to_string_lossy().ends_with(suffix) {
            found = Some(entry.into_path());
        }
    }
    Ok(found)
}
