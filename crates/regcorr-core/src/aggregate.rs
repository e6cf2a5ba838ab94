//! Grouping of per-category coefficients into report sections.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::correlation::stats::nanmean;
use crate::identity::is_excluded;
use crate::obs;
use crate::runner::CorrelationTable;
use crate::serde_util::{nan_as_null, nan_map};

/// Which coefficient a report summarizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoefficientKind {
    Concordance,
    Pearson,
}

impl CoefficientKind {
    pub const ALL: [CoefficientKind; 2] = [CoefficientKind::Concordance, CoefficientKind::Pearson];

    pub fn as_str(&self) -> &'static str {
        match self {
            CoefficientKind::Concordance => "concordance",
            CoefficientKind::Pearson => "pearson",
        }
    }
}

impl fmt::Display for CoefficientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How categories are bucketed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    /// Semantic groups from [`GROUP_RULES`].
    #[default]
    Grouped,
    /// Everything in one `core_outputs` group.
    Quick,
}

impl AggregationMode {
    pub fn for_quick(quick: bool) -> Self {
        if quick {
            AggregationMode::Quick
        } else {
            AggregationMode::Grouped
        }
    }
}

/// Ordered `(group, substrings)` rules; the first rule with a substring
/// contained in the category wins. Template-space markers are checked before
/// native ones since template outputs carry the same suffixes.
pub const GROUP_RULES: &[(&str, &[&str])] = &[
    (
        "registration_and_segmentation",
        &["label-CSF", "label-GM", "label-WM", "probseg", "dseg", "space-longitudinal"],
    ),
    (
        "template_space_outputs",
        &["space-template", "space-MNI", "space-EPItemplate"],
    ),
    (
        "native_space_outputs",
        &["space-T1w", "space-bold", "space-native", "_T1w", "_T2w", "desc-brain_mask"],
    ),
    (
        "timeseries_outputs",
        &["timeseries", "regressors", "motion", "confounds", "framewise"],
    ),
    (
        "functional_outputs",
        &["bold", "alff", "reho", "vmhc", "centrality", "sca", "dr_tempreg", "correlations"],
    ),
];

const QUICK_GROUP: &str = "core_outputs";

/// Group a category belongs to, or `None` if no rule matches.
pub fn classify(category: &str) -> Option<&'static str> {
    GROUP_RULES
        .iter()
        .find(|(_, markers)| markers.iter().any(|m| category.contains(m)))
        .map(|(group, _)| *group)
}

/// One report section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    /// `{kind}_{group}`, e.g. `concordance_functional_outputs`.
    pub name: String,
    #[serde(with = "nan_map")]
    pub categories: BTreeMap<String, Vec<f64>>,
}

/// A below-threshold pair as listed in a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubOptimalMatch {
    pub category: String,
    #[serde(with = "nan_as_null")]
    pub coefficient: f64,
    pub path_a: String,
    pub path_b: String,
}

/// Coefficients of one kind, grouped, plus the sub-optimal listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedReport {
    pub kind: CoefficientKind,
    /// Non-empty groups in rule order.
    pub groups: Vec<Group>,
    pub sub_optimal: Vec<SubOptimalMatch>,
}

impl AggregatedReport {
    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// `(category, mean)` across every group, NaN entries skipped.
    pub fn category_means(&self) -> Vec<(String, f64)> {
        self.groups
            .iter()
            .flat_map(|group| group.categories.iter())
            .map(|(category, values)| (category.clone(), nanmean(values.iter().copied())))
            .collect()
    }

    /// `"category: mean"` lines, one per category.
    pub fn summary_lines(&self) -> Vec<String> {
        self.category_means()
            .into_iter()
            .map(|(category, mean)| format!("{category}: {mean}"))
            .collect()
    }
}

/// Bucket the coefficients of `kind` from `table` into groups.
pub fn organize(
    table: &CorrelationTable,
    kind: CoefficientKind,
    mode: AggregationMode,
) -> AggregatedReport {
    let by_category = match kind {
        CoefficientKind::Concordance => &table.concordance,
        CoefficientKind::Pearson => &table.pearson,
    };

    let mut buckets: BTreeMap<&str, BTreeMap<String, Vec<f64>>> = BTreeMap::new();
    for (category, values) in by_category {
        if is_excluded(category) {
            continue;
        }
        let group = match mode {
            AggregationMode::Quick => QUICK_GROUP,
            AggregationMode::Grouped => match classify(category) {
                Some(group) => group,
                None => {
                    obs::emit_category_unassigned(category);
                    continue;
                }
            },
        };
        buckets
            .entry(group)
            .or_default()
            .insert(category.clone(), values.clone());
    }

    let order: Vec<&str> = match mode {
        AggregationMode::Quick => vec![QUICK_GROUP],
        AggregationMode::Grouped => GROUP_RULES.iter().map(|(group, _)| *group).collect(),
    };
    let groups = order
        .into_iter()
        .filter_map(|group| {
            buckets.remove(group).map(|categories| Group {
                name: format!("{kind}_{group}"),
                categories,
            })
        })
        .collect();

    let sub_optimal = table
        .sub_optimal
        .iter()
        .map(|entry| SubOptimalMatch {
            category: entry.category.clone(),
            coefficient: match kind {
                CoefficientKind::Concordance => entry.concordance,
                CoefficientKind::Pearson => entry.pearson,
            },
            path_a: entry.path_a.clone(),
            path_b: entry.path_b.clone(),
        })
        .collect();

    AggregatedReport {
        kind,
        groups,
        sub_optimal,
    }
}
