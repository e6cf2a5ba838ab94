//! Correlation of one matched pair.
//!
//! [`CorrelationCalculator::correlate`] loads both artifacts, checks they are
//! comparable and computes the concordance and Pearson coefficients. Problems
//! confined to the pair come back as [`CorrelationOutcome::Error`]; only
//! staging failures abort the run.

pub mod nifti;
pub mod stats;
pub mod tabular;

use std::path::{Path, PathBuf};

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::DEFAULT_THRESHOLD;
use crate::error::Result;
use crate::identity::ArtifactKind;
use crate::serde_util::nan_as_null;
use crate::staging::Stager;

pub use stats::Coefficients;

/// Result of correlating one pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CorrelationOutcome {
    /// Concordance at or above the threshold.
    Success {
        category: String,
        #[serde(with = "nan_as_null")]
        concordance: f64,
        #[serde(with = "nan_as_null")]
        pearson: f64,
    },
    /// Concordance below the threshold, or undefined.
    SubOptimal {
        category: String,
        #[serde(with = "nan_as_null")]
        concordance: f64,
        #[serde(with = "nan_as_null")]
        pearson: f64,
        path_a: String,
        path_b: String,
    },
    /// The pair could not be compared.
    Error {
        category: String,
        reason: String,
        paths: Vec<String>,
    },
}

impl CorrelationOutcome {
    pub fn category(&self) -> &str {
        match self {
            CorrelationOutcome::Success { category, .. }
            | CorrelationOutcome::SubOptimal { category, .. }
            | CorrelationOutcome::Error { category, .. } => category,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CorrelationOutcome::Error { .. })
    }

    /// Coefficients of a non-error outcome.
    pub fn coefficients(&self) -> Option<Coefficients> {
        match self {
            CorrelationOutcome::Success {
                concordance,
                pearson,
                ..
            }
            | CorrelationOutcome::SubOptimal {
                concordance,
                pearson,
                ..
            } => Some(Coefficients {
                concordance: *concordance,
                pearson: *pearson,
            }),
            CorrelationOutcome::Error { .. } => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            CorrelationOutcome::Success { .. } => "success",
            CorrelationOutcome::SubOptimal { .. } => "sub_optimal",
            CorrelationOutcome::Error { .. } => "error",
        }
    }
}

/// Why a single pair could not be compared.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ArtifactError {
    #[error("file doesn't exist")]
    Missing { paths: Vec<String> },

    #[error("different shape")]
    ShapeMismatch,

    #[error("file reading problem: {path}: {detail}")]
    Read { path: String, detail: String },

    #[error("correlating problem: {0}")]
    Compute(String),
}

/// Computes and classifies the similarity of matched pairs.
#[derive(Debug, Clone)]
pub struct CorrelationCalculator {
    stager: Option<Stager>,
    threshold: f64,
    verbose: bool,
}

impl Default for CorrelationCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl CorrelationCalculator {
    pub fn new(threshold: f64) -> Self {
        Self {
            stager: None,
            threshold,
            verbose: false,
        }
    }

    /// Stage remote artifacts through `stager` before reading them.
    pub fn with_stager(mut self, stager: Stager) -> Self {
        self.stager = Some(stager);
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Correlate one matched pair.
    ///
    /// Returns `Err` only when a remote artifact cannot be staged.
    pub fn correlate(
        &self,
        category: &str,
        path_a: &str,
        path_b: &str,
    ) -> Result<CorrelationOutcome> {
        let local_a = self.resolve(path_a)?;
        let local_b = self.resolve(path_b)?;

        let outcome = match compare(&local_a, &local_b, path_a, path_b) {
            Ok(coefficients) => self.classify(category, coefficients, path_a, path_b),
            Err(err) => {
                let paths = match &err {
                    ArtifactError::Missing { paths } => paths.clone(),
                    _ => vec![path_a.to_string(), path_b.to_string()],
                };
                CorrelationOutcome::Error {
                    category: category.to_string(),
                    reason: err.to_string(),
                    paths,
                }
            }
        };

        if self.verbose {
            info!(category, path_a, path_b, outcome = outcome.label(), "correlated pair");
        } else {
            debug!(category, path_a, path_b, outcome = outcome.label(), "correlated pair");
        }
        Ok(outcome)
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        match &self.stager {
            Some(stager) => stager.stage(path),
            None => Ok(PathBuf::from(path)),
        }
    }

    fn classify(
        &self,
        category: &str,
        coefficients: Coefficients,
        path_a: &str,
        path_b: &str,
    ) -> CorrelationOutcome {
        let Coefficients {
            concordance,
            pearson,
        } = coefficients;
        if concordance >= self.threshold {
            CorrelationOutcome::Success {
                category: category.to_string(),
                concordance,
                pearson,
            }
        } else {
            CorrelationOutcome::SubOptimal {
                category: category.to_string(),
                concordance,
                pearson,
                path_a: path_a.to_string(),
                path_b: path_b.to_string(),
            }
        }
    }
}

fn is_table(path: &Path) -> bool {
    matches!(
        ArtifactKind::of(&path.to_string_lossy()),
        Some(ArtifactKind::Table(_))
    )
}

fn load(path: &Path, tabular: bool) -> std::result::Result<Array2<f64>, ArtifactError> {
    if tabular {
        Ok(tabular::read_table(path)?.values)
    } else {
        nifti::read_volume(path)?
            .sample_matrix()
            .map_err(ArtifactError::Compute)
    }
}

/// Load both artifacts and correlate them.
fn compare(
    local_a: &Path,
    local_b: &Path,
    path_a: &str,
    path_b: &str,
) -> std::result::Result<Coefficients, ArtifactError> {
    let missing: Vec<String> = [(local_a, path_a), (local_b, path_b)]
        .into_iter()
        .filter(|(local, _)| !local.exists())
        .map(|(_, logical)| logical.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ArtifactError::Missing { paths: missing });
    }

    let tabular = is_table(local_a) && is_table(local_b);
    let a = load(local_a, tabular)?;
    let b = load(local_b, tabular)?;

    if a.len() != b.len() {
        return Err(ArtifactError::ShapeMismatch);
    }
    stats::batch_correlate(&a, &b).ok_or_else(|| {
        ArtifactError::Compute(format!(
            "layouts {:?} and {:?} differ",
            a.dim(),
            b.dim()
        ))
    })
}
