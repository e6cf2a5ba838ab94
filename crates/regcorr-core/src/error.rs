//! Run-level error taxonomy.
//!
//! Everything here aborts a regression run. Problems confined to a single
//! matched pair are [`ArtifactError`](crate::correlation::ArtifactError)s and
//! end up in the failures listing instead.

use std::path::PathBuf;

use regcorr_state::StorageError;

/// Fatal errors: misconfiguration, missing inputs, storage or pool failures.
#[derive(Debug, thiserror::Error)]
pub enum RegressionError {
    #[error(
        "no output filepaths found under {root}: expected .nii, .nii.gz, .csv, .tsv, .txt or .1D artifacts"
    )]
    NoArtifactsFound { root: String },

    #[error(
        "no output paths were successfully matched between {root_a} and {root_b}; \
         check that both roots point at outputs of the same pipeline"
    )]
    NoMatchesFound { root_a: String, root_b: String },

    #[error(
        "malformed replacement rule {rule:?}: the old substring and its replacement must be separated by a comma"
    )]
    MalformedReplacement { rule: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("could not create the local staging directory {path:?}: {source}")]
    StagingDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not retrieve {remote} into {local_dir:?}: {detail}")]
    StagingFailed {
        remote: String,
        local_dir: PathBuf,
        detail: String,
    },

    #[error("could not list remote root {root}: {detail}")]
    RemoteListing { root: String, detail: String },

    #[error("remote root {root} requires a remote retriever but none was configured")]
    MissingRetriever { root: String },

    #[error("failed to walk {root}: {detail}")]
    Walk { root: String, detail: String },

    #[error("checkpoint store error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("worker pool failure: {0}")]
    Worker(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for regression runs.
pub type Result<T> = std::result::Result<T, RegressionError>;
