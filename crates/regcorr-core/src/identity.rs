//! Artifact identity derivation.
//!
//! Two versions of a pipeline rarely name their outputs identically, and the
//! two runs live under different roots. An [`Identity`] keeps only what is
//! stable across versions: the semantic kind of the file (its *category*),
//! where it sits below the run root, and the digits that distinguish
//! repeated acquisitions.
//!
//! Category derivation is driven by [`TAG_RULES`], an ordered list of
//! [`TagRule`]s interpreted by [`strip_tags`].

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ReplacementRule;

/// Stable identity of one artifact within a run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Filename with extension and run-variable tags stripped.
    pub category: String,
    /// Directory between the run root and the file, `/`-separated.
    pub location: String,
    /// Digits of the parent folder name followed by digits of the filename.
    pub numeric_suffix: String,
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @ {}/ #{}",
            self.category, self.location, self.numeric_suffix
        )
    }
}

// ---------------------------------------------------------------------------
// Artifact kinds
// ---------------------------------------------------------------------------

/// Delimited-text family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableFormat {
    Csv,
    Tsv,
    Txt,
    OneD,
}

/// What an artifact holds, judged by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// NIfTI volume (`.nii`, `.nii.gz`).
    Volume,
    Table(TableFormat),
}

const EXTENSIONS: &[(&str, ArtifactKind)] = &[
    (".nii.gz", ArtifactKind::Volume),
    (".nii", ArtifactKind::Volume),
    (".csv", ArtifactKind::Table(TableFormat::Csv)),
    (".tsv", ArtifactKind::Table(TableFormat::Tsv)),
    (".txt", ArtifactKind::Table(TableFormat::Txt)),
    (".1D", ArtifactKind::Table(TableFormat::OneD)),
];

impl ArtifactKind {
    /// Kind of the file at `path`, or `None` if the extension is not recognized.
    pub fn of(path: &str) -> Option<Self> {
        EXTENSIONS
            .iter()
            .find(|(ext, _)| path.ends_with(ext))
            .map(|(_, kind)| *kind)
    }
}

/// `filename` without its recognized extension.
pub fn strip_extension(filename: &str) -> &str {
    EXTENSIONS
        .iter()
        .find_map(|(ext, _)| filename.strip_suffix(ext))
        .unwrap_or(filename)
}

// ---------------------------------------------------------------------------
// Tag rules
// ---------------------------------------------------------------------------

/// A rule deciding whether one `_`-separated filename segment is a
/// run-variable tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagRule {
    /// Segment starts with the given entity prefix (`sub-`, `ses-`, ...).
    Prefix(&'static str),
    /// Segment is at most this many characters long. Catches the remnant of
    /// a broken or missing tag such as a lone `1`.
    MaxLen(usize),
}

impl TagRule {
    pub fn matches(&self, segment: &str) -> bool {
        match self {
            TagRule::Prefix(prefix) => segment.starts_with(prefix),
            TagRule::MaxLen(len) => segment.chars().count() <= *len,
        }
    }
}

/// Subject, session, task, run and acquisition entities, plus stray
/// single-character segments.
pub const TAG_RULES: &[TagRule] = &[
    TagRule::Prefix("sub-"),
    TagRule::Prefix("ses-"),
    TagRule::Prefix("task-"),
    TagRule::Prefix("run-"),
    TagRule::Prefix("acq-"),
    TagRule::MaxLen(1),
];

/// Remove every tag segment of `stem`.
///
/// A stem made only of tags (`sub-1_run-1`) is returned whole, so a
/// category is never empty for a non-empty stem.
pub fn strip_tags(stem: &str, rules: &[TagRule]) -> String {
    let kept: Vec<&str> = stem
        .split('_')
        .filter(|segment| !rules.iter().any(|rule| rule.matches(segment)))
        .collect();
    if kept.is_empty() {
        stem.to_string()
    } else {
        kept.join("_")
    }
}

/// Path substrings marking artifacts that are not meaningful to correlate:
/// transforms, stacked/montage QC renderings and mixing matrices.
pub const EXCLUSION_MARKERS: &[&str] = &["_stack", "itk", "xfm", "montage", "mixel"];

/// Whether `path` carries an exclusion marker.
pub fn is_excluded(path: &str) -> bool {
    EXCLUSION_MARKERS.iter().any(|marker| path.contains(marker))
}

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

/// One rewrite applied by a replacement rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathChange {
    pub old: String,
    pub new: String,
}

/// An identity plus the audit trail of rewrites that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Derived {
    pub identity: Identity,
    pub changes: Vec<PathChange>,
}

/// Part of `filepath` below `run_root`, without leading separators.
///
/// Paths outside the root are returned whole.
pub fn relative_to_root<'a>(filepath: &'a str, run_root: &str) -> &'a str {
    let root = run_root.trim_end_matches('/');
    let relative = if root.is_empty() {
        filepath
    } else {
        match filepath.strip_prefix(root) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
            _ => filepath,
        }
    };
    relative.trim_start_matches('/')
}

fn digits(s: &str) -> impl Iterator<Item = char> + '_ {
    s.chars().filter(|c| c.is_ascii_digit())
}

/// Derive the identity of `filepath`, an artifact under `run_root`.
///
/// Replacement rules are applied in order to the root-relative path; every
/// rewrite that changes the path is logged and recorded. Returns `None` when
/// the (rewritten) path carries an exclusion marker.
pub fn derive(filepath: &str, run_root: &str, replacements: &[ReplacementRule]) -> Option<Derived> {
    let mut relative = relative_to_root(filepath, run_root).to_string();
    let mut changes = Vec::new();

    for rule in replacements {
        if rule.old.is_empty() || !relative.contains(&rule.old) {
            continue;
        }
        let rewritten = relative.replace(&rule.old, &rule.new);
        info!(
            event = "identity.path_rewritten",
            old = %relative,
            new = %rewritten,
            rule = %rule,
        );
        changes.push(PathChange {
            old: std::mem::replace(&mut relative, rewritten.clone()),
            new: rewritten,
        });
    }

    if is_excluded(&relative) {
        return None;
    }

    let mut segments: Vec<&str> = relative.split('/').filter(|s| !s.is_empty()).collect();
    let filename = segments.pop()?;
    let folder = segments.last().copied().unwrap_or("");

    let identity = Identity {
        category: strip_tags(strip_extension(filename), TAG_RULES),
        location: segments.join("/"),
        numeric_suffix: digits(folder).chain(digits(filename)).collect(),
    };

    Some(Derived { identity, changes })
}
