//! regcorr-core: regression correlation between two pipeline runs
//!
//! Indexes the artifacts each run produced, pairs them by identity, scores
//! every pair with concordance and Pearson coefficients, and aggregates the
//! scores into per-category reports. Each stage is checkpointed through
//! `regcorr-state`.

pub mod aggregate;
pub mod checkpoint;
pub mod config;
pub mod correlation;
pub mod error;
pub mod identity;
pub mod index;
pub mod layout;
pub mod matcher;
pub mod metrics;
pub mod obs;
pub mod pipeline;
pub mod reporting;
pub mod runner;
mod serde_util;
pub mod staging;
pub mod telemetry;

pub use aggregate::{
    classify, organize, AggregatedReport, AggregationMode, CoefficientKind, Group,
    SubOptimalMatch, GROUP_RULES,
};
pub use checkpoint::{compute_or_load, Stage};
pub use config::{
    PipelineConfig, RegressionConfig, RemoteCredentials, ReplacementRule, SourceKind,
    DEFAULT_THRESHOLD,
};
pub use correlation::{ArtifactError, Coefficients, CorrelationCalculator, CorrelationOutcome};
pub use error::{RegressionError, Result};
pub use identity::{derive, ArtifactKind, Derived, Identity, PathChange, TableFormat};
pub use index::{ArtifactIndex, ArtifactIndexer, IdentityMap, IndexPair};
pub use layout::{run_name, PipelineLayout};
pub use matcher::{match_indexes, MatchSet, MatchedPair, MissingArtifact, MissingCategory};
pub use pipeline::RegressionPipeline;
pub use reporting::{DirectoryReportSink, HeatmapRow, RegressionReport, ReportSink};
pub use runner::{
    CorrelationTable, Failure, OutcomeSet, ParallelRunner, RunOutput, SubOptimalEntry,
    QUICK_CATEGORIES,
};
pub use staging::{RemoteRetriever, Stager};

pub use regcorr_state::{CheckpointStore, ContentDigest, FsCheckpointStore, StorageError};
