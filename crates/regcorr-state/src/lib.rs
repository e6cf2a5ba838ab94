//! regcorr-state: checkpoint persistence for regression correlation runs
//!
//! ## Layer 0 - Data/Persistence
//!
//! Every stage of a regression run (artifact index, match set, correlation
//! outcomes) is persisted under a string key so an interrupted run resumes
//! from the last completed stage.
//!
//! ## Key Components
//!
//! - `CheckpointStore`: async key → bytes store contract
//! - `FsCheckpointStore`: one JSON file per key, atomic replace on write
//! - `ContentDigest`: SHA-256 fingerprint tying a checkpoint to its inputs

mod error;
pub mod fakes;
mod fs_store;
pub mod storage_traits;

pub use error::StorageError;
pub use fs_store::FsCheckpointStore;
pub use storage_traits::{
    get_json, put_json, validate_key, CheckpointStore, ContentDigest, StorageResult,
};
