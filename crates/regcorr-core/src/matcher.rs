//! Aligning two indexes into matched pairs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{RegressionError, Result};
use crate::identity::Identity;
use crate::index::{ArtifactIndex, IdentityMap};

/// Paths of the same identity in both runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedPair {
    pub path_a: String,
    pub path_b: String,
}

/// An artifact of run B with no counterpart in run A.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingArtifact {
    pub category: String,
    pub identity: Identity,
    pub path: String,
}

/// A whole category of run A that run B does not produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingCategory {
    pub category: String,
    pub paths: Vec<String>,
}

/// Result of matching run A against run B.
///
/// `missing_in_a` lists individual identities; `missing_in_b` lists only
/// categories absent from B. Identities of a shared category present in A but
/// not in B are not reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSet {
    pub matched: BTreeMap<String, IdentityMap<MatchedPair>>,
    pub missing_in_a: Vec<MissingArtifact>,
    pub missing_in_b: Vec<MissingCategory>,
}

/// One unit of correlation work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairTask {
    pub category: String,
    pub identity: Identity,
    pub path_a: String,
    pub path_b: String,
}

impl MatchSet {
    pub fn pair_count(&self) -> usize {
        self.matched.values().map(IdentityMap::len).sum()
    }

    /// Every matched pair, in category then identity order.
    pub fn pairs(&self) -> Vec<PairTask> {
        self.matched
            .iter()
            .flat_map(|(category, pairs)| {
                pairs.iter().map(move |(identity, pair)| PairTask {
                    category: category.clone(),
                    identity: identity.clone(),
                    path_a: pair.path_a.clone(),
                    path_b: pair.path_b.clone(),
                })
            })
            .collect()
    }
}

/// Match `index_a` against `index_b`.
pub fn match_indexes(index_a: &ArtifactIndex, index_b: &ArtifactIndex) -> Result<MatchSet> {
    let mut matched: BTreeMap<String, IdentityMap<MatchedPair>> = BTreeMap::new();
    let mut missing_in_a = Vec::new();

    for (category, identities_b) in &index_b.categories {
        let identities_a = index_a.categories.get(category);
        for (identity, path_b) in identities_b.iter() {
            match identities_a.and_then(|ids| ids.get(identity)) {
                Some(path_a) => {
                    matched.entry(category.clone()).or_default().insert(
                        identity.clone(),
                        MatchedPair {
                            path_a: path_a.clone(),
                            path_b: path_b.clone(),
                        },
                    );
                }
                None => missing_in_a.push(MissingArtifact {
                    category: category.clone(),
                    identity: identity.clone(),
                    path: path_b.clone(),
                }),
            }
        }
    }

    let missing_in_b = index_a
        .categories
        .iter()
        .filter(|(category, _)| !index_b.categories.contains_key(*category))
        .map(|(category, identities)| MissingCategory {
            category: category.clone(),
            paths: identities.values().cloned().collect(),
        })
        .collect();

    if matched.is_empty() {
        return Err(RegressionError::NoMatchesFound {
            root_a: index_a.root.clone(),
            root_b: index_b.root.clone(),
        });
    }

    Ok(MatchSet {
        matched,
        missing_in_a,
        missing_in_b,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(category: &str, location: &str, suffix: &str) -> Identity {
        Identity {
            category: category.to_string(),
            location: location.to_string(),
            numeric_suffix: suffix.to_string(),
        }
    }

    fn index(root: &str, entries: &[(&str, &str, &str)]) -> ArtifactIndex {
        let mut index = ArtifactIndex::new(root);
        for (category, location, suffix) in entries {
            index.insert(
                id(category, location, suffix),
                format!("{root}/{location}/{category}{suffix}.nii.gz"),
            );
        }
        index
    }

    #[test]
    fn self_match_has_no_missing() {
        let a = index("/a", &[("bold", "func", "1"), ("T1w", "anat", "1"), ("bold", "func", "2")]);
        let set = match_indexes(&a, &a).unwrap();
        assert!(set.missing_in_a.is_empty());
        assert!(set.missing_in_b.is_empty());
        assert_eq!(set.pair_count(), 3);
        for task in set.pairs() {
            assert_eq!(task.path_a, task.path_b);
        }
    }

    #[test]
    fn disjoint_categories_fail() {
        let a = index("/a", &[("bold", "func", "1")]);
        let b = index("/b", &[("T1w", "anat", "1")]);
        let err = match_indexes(&a, &b).unwrap_err();
        match err {
            RegressionError::NoMatchesFound { root_a, root_b } => {
                assert_eq!(root_a, "/a");
                assert_eq!(root_b, "/b");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn asymmetric_missing_lists() {
        let a = index(
            "/a",
            &[("bold", "func", "1"), ("bold", "func", "9"), ("mask", "anat", "1")],
        );
        let b = index(
            "/b",
            &[("bold", "func", "1"), ("bold", "func", "2"), ("T1w", "anat", "1")],
        );
        let set = match_indexes(&a, &b).unwrap();

        assert_eq!(set.pair_count(), 1);
        let missing_a: Vec<_> = set
            .missing_in_a
            .iter()
            .map(|m| (m.category.as_str(), m.identity.numeric_suffix.as_str()))
            .collect();
        assert_eq!(missing_a, vec![("T1w", "1"), ("bold", "2")]);

        // Only whole categories absent from B are reported; bold #9 is not.
        assert_eq!(set.missing_in_b.len(), 1);
        assert_eq!(set.missing_in_b[0].category, "mask");
        assert_eq!(set.missing_in_b[0].paths, vec!["/a/anat/mask1.nii.gz"]);
    }

    #[test]
    fn match_set_survives_json() {
        let a = index("/a", &[("bold", "func", "1")]);
        let set = match_indexes(&a, &a).unwrap();
        let json = serde_json::to_string(&set).unwrap();
        let back: MatchSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }
}
