//! Local staging of remote artifacts.
//!
//! The transfer protocol belongs to an injected [`RemoteRetriever`]; this
//! module only decides where a remote artifact lands locally and when it has
//! to be fetched.
//!
//! Staged files are keyed by their own remote path. Two workers staging the
//! same remote object at once both write the same destination; callers that
//! cannot tolerate the duplicate write should pre-stage shared artifacts.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::config::{is_remote, staging_root, RemoteCredentials, REMOTE_PREFIX};
use crate::error::{RegressionError, Result};

/// Collaborator that talks to remote object storage.
pub trait RemoteRetriever: Send + Sync {
    /// Every object path (with the `s3://` prefix) below `remote_root`.
    fn list(&self, remote_root: &str, credentials: &RemoteCredentials) -> anyhow::Result<Vec<String>>;

    /// Download `remote_path` into `local_dir`, returning the local file path.
    fn fetch(
        &self,
        remote_path: &str,
        local_dir: &Path,
        credentials: &RemoteCredentials,
    ) -> anyhow::Result<PathBuf>;
}

/// Resolves logical artifact paths to local files, downloading on demand.
#[derive(Clone)]
pub struct Stager {
    root: PathBuf,
    retriever: Arc<dyn RemoteRetriever>,
    credentials: RemoteCredentials,
}

impl std::fmt::Debug for Stager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stager").field("root", &self.root).finish()
    }
}

impl Stager {
    /// Stage into `{cache_dir}/s3_input_files`.
    pub fn new(
        cache_dir: &Path,
        retriever: Arc<dyn RemoteRetriever>,
        credentials: RemoteCredentials,
    ) -> Self {
        Self {
            root: staging_root(cache_dir),
            retriever,
            credentials,
        }
    }

    /// Where `remote_path` is (or will be) staged.
    pub fn local_path(&self, remote_path: &str) -> PathBuf {
        let key = remote_path
            .strip_prefix(REMOTE_PREFIX)
            .unwrap_or(remote_path)
            .trim_start_matches('/');
        self.root.join(key)
    }

    /// Local file for `path`.
    ///
    /// Local paths pass through untouched; remote paths are fetched unless a
    /// staged copy already exists. Failing to create the staging directory or
    /// to retrieve the object is fatal for the run.
    pub fn stage(&self, path: &str) -> Result<PathBuf> {
        if !is_remote(path) {
            return Ok(PathBuf::from(path));
        }
        let local_file = self.local_path(path);
        if local_file.exists() {
            debug!(remote = %path, local = ?local_file, "reusing staged artifact");
            return Ok(local_file);
        }
        let local_dir = local_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        std::fs::create_dir_all(&local_dir).map_err(|source| {
            RegressionError::StagingDirectory {
                path: local_dir.clone(),
                source,
            }
        })?;
        let fetched = self
            .retriever
            .fetch(path, &local_dir, &self.credentials)
            .map_err(|e| RegressionError::StagingFailed {
                remote: path.to_string(),
                local_dir: local_dir.clone(),
                detail: format!("{e:#}"),
            })?;
        debug!(remote = %path, local = ?fetched, "staged remote artifact");
        Ok(fetched)
    }

    /// List the objects under a remote root.
    pub fn list(&self, remote_root: &str) -> Result<Vec<String>> {
        self.retriever
            .list(remote_root, &self.credentials)
            .map_err(|e| RegressionError::RemoteListing {
                root: remote_root.to_string(),
                detail: format!("{e:#}"),
            })
    }
}
