//! Artifact indexing: one run's output tree as `category → identity → path`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::{is_remote, ReplacementRule};
use crate::error::{RegressionError, Result};
use crate::identity::{derive, ArtifactKind, Identity, PathChange};
use crate::staging::Stager;

// ---------------------------------------------------------------------------
// IdentityMap
// ---------------------------------------------------------------------------

/// Ordered `Identity → V` map.
///
/// JSON object keys must be strings, so this serializes as a sequence of
/// `[identity, value]` pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityMap<V>(BTreeMap<Identity, V>);

impl<V> IdentityMap<V> {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, identity: Identity, value: V) -> Option<V> {
        self.0.insert(identity, value)
    }

    pub fn get(&self, identity: &Identity) -> Option<&V> {
        self.0.get(identity)
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.0.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Identity, &V)> {
        self.0.iter()
    }

    pub fn identities(&self) -> impl Iterator<Item = &Identity> {
        self.0.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.0.values()
    }
}

impl<V> Default for IdentityMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> FromIterator<(Identity, V)> for IdentityMap<V> {
    fn from_iter<I: IntoIterator<Item = (Identity, V)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<V: Serialize> Serialize for IdentityMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter())
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for IdentityMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let pairs = Vec::<(Identity, V)>::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// ArtifactIndex
// ---------------------------------------------------------------------------

/// Every recognized artifact of one run, keyed by category then identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactIndex {
    /// Root the index was built from.
    pub root: String,
    pub categories: BTreeMap<String, IdentityMap<String>>,
    /// Rewrites applied by replacement rules while indexing.
    #[serde(default)]
    pub path_changes: Vec<PathChange>,
}

impl ArtifactIndex {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            categories: BTreeMap::new(),
            path_changes: Vec::new(),
        }
    }

    /// Record `path` under `identity`, returning the path it displaced.
    pub fn insert(&mut self, identity: Identity, path: String) -> Option<String> {
        self.categories
            .entry(identity.category.clone())
            .or_default()
            .insert(identity, path)
    }

    pub fn artifact_count(&self) -> usize {
        self.categories.values().map(IdentityMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.artifact_count() == 0
    }

    pub fn path(&self, identity: &Identity) -> Option<&str> {
        self.categories
            .get(&identity.category)?
            .get(identity)
            .map(String::as_str)
    }
}

/// Indexes of both runs, checkpointed together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexPair {
    pub a: ArtifactIndex,
    pub b: ArtifactIndex,
}

// ---------------------------------------------------------------------------
// Indexer
// ---------------------------------------------------------------------------

/// Builds [`ArtifactIndex`]es from local trees or remote listings.
#[derive(Debug, Clone, Default)]
pub struct ArtifactIndexer {
    stager: Option<Stager>,
}

impl ArtifactIndexer {
    /// Indexer for local roots only.
    pub fn local() -> Self {
        Self { stager: None }
    }

    /// Indexer that lists remote roots through `stager`'s retriever.
    pub fn with_stager(stager: Stager) -> Self {
        Self {
            stager: Some(stager),
        }
    }

    /// Index every recognized artifact under `run_root`.
    ///
    /// Remote roots are listed, never downloaded; the index records their
    /// logical paths. Fails with `NoArtifactsFound` when nothing recognized is
    /// present.
    pub fn index(&self, run_root: &str, replacements: &[ReplacementRule]) -> Result<ArtifactIndex> {
        let files = if is_remote(run_root) {
            let stager = self
                .stager
                .as_ref()
                .ok_or_else(|| RegressionError::MissingRetriever {
                    root: run_root.to_string(),
                })?;
            let mut listed = stager.list(run_root)?;
            listed.sort();
            listed
        } else {
            list_local(run_root)?
        };

        let mut index = ArtifactIndex::new(run_root);
        for path in files
            .into_iter()
            .filter(|path| ArtifactKind::of(path).is_some())
        {
            let Some(derived) = derive(&path, run_root, replacements) else {
                debug!(path = %path, "excluded artifact");
                continue;
            };
            index.path_changes.extend(derived.changes);
            let identity = derived.identity;
            if let Some(previous) = index.insert(identity.clone(), path.clone()) {
                warn!(
                    event = "index.identity_collision",
                    identity = %identity,
                    kept = %path,
                    dropped = %previous,
                    "two artifacts share an identity; keeping the later one"
                );
            }
        }

        if index.is_empty() {
            return Err(RegressionError::NoArtifactsFound {
                root: run_root.to_string(),
            });
        }
        debug!(
            root = %run_root,
            artifacts = index.artifact_count(),
            categories = index.categories.len(),
            "indexed run"
        );
        Ok(index)
    }
}

/// Every file under `root`, visited in file-name order.
fn list_local(root: &str) -> Result<Vec<String>> {
    if !Path::new(root).is_dir() {
        return Err(RegressionError::NoArtifactsFound {
            root: root.to_string(),
        });
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| RegressionError::Walk {
            root: root.to_string(),
            detail: e.to_string(),
        })?;
        if entry.file_type().is_file() {
            files.push(entry.path().to_string_lossy().into_owned());
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn indexes_recognized_files_only() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "sub-1/anat/sub-1_desc-brain_T1w.nii.gz");
        touch(dir.path(), "sub-1/func/sub-1_desc-confounds_timeseries.tsv");
        touch(dir.path(), "sub-1/func/sub-1_bold.json");
        touch(dir.path(), "sub-1/anat/from-T1w_to-MNI_xfm.nii.gz");

        let root = dir.path().to_str().unwrap();
        let index = ArtifactIndexer::local().index(root, &[]).unwrap();
        assert_eq!(index.artifact_count(), 2);
        assert!(index.categories.contains_key("desc-brain_T1w"));
        assert!(index.categories.contains_key("desc-confounds_timeseries"));
        assert_eq!(index.root, root);
    }

    #[test]
    fn empty_tree_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "notes/readme.md");
        let err = ArtifactIndexer::local()
            .index(dir.path().to_str().unwrap(), &[])
            .unwrap_err();
        assert!(matches!(err, RegressionError::NoArtifactsFound { .. }));
    }

    #[test]
    fn missing_root_is_no_artifacts() {
        let err = ArtifactIndexer::local()
            .index("/definitely/not/here", &[])
            .unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here"));
    }

    #[test]
    fn collision_keeps_later_file() {
        let dir = tempfile::tempdir().unwrap();
        // Both reduce to category "mask" at location "sub-1/anat" with suffix "1".
        touch(dir.path(), "sub-1/anat/sub-1_mask.nii");
        touch(dir.path(), "sub-1/anat/sub-1_mask.nii.gz");

        let index = ArtifactIndexer::local()
            .index(dir.path().to_str().unwrap(), &[])
            .unwrap();
        assert_eq!(index.artifact_count(), 1);
        let kept = index.categories["mask"].values().next().unwrap();
        assert!(kept.ends_with("sub-1_mask.nii.gz"));
    }

    #[test]
    fn replacements_recorded_in_index() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "sub-1/func/sub-1_desc-preproc_bold.nii.gz");
        let rules = vec![ReplacementRule::new("desc-preproc", "desc-cleaned")];
        let index = ArtifactIndexer::local()
            .index(dir.path().to_str().unwrap(), &rules)
            .unwrap();
        assert!(index.categories.contains_key("desc-cleaned_bold"));
        assert_eq!(index.path_changes.len(), 1);
        // The logical path is the file on disk, not the rewritten one.
        let path = index.categories["desc-cleaned_bold"].values().next().unwrap();
        assert!(path.ends_with("sub-1_desc-preproc_bold.nii.gz"));
    }

    #[test]
    fn remote_root_without_retriever_fails() {
        let err = ArtifactIndexer::local()
            .index("s3://bucket/run", &[])
            .unwrap_err();
        assert!(matches!(err, RegressionError::MissingRetriever { .. }));
    }

    #[test]
    fn index_survives_json() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "sub-1/anat/sub-1_desc-brain_T1w.nii.gz");
        let index = ArtifactIndexer::local()
            .index(dir.path().to_str().unwrap(), &[])
            .unwrap();
        let json = serde_json::to_string(&index).unwrap();
        let back: ArtifactIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(back, index);
    }
}
