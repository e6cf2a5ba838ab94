//! Run reports: JSON artifact, markdown summary and heatmap rows.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::{AggregatedReport, CoefficientKind};
use crate::identity::PathChange;
use crate::matcher::{MissingArtifact, MissingCategory};
use crate::runner::Failure;

/// Final artifact of a regression run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionReport {
    pub run_name: String,
    pub generated_at: DateTime<Utc>,
    pub root_a: String,
    pub root_b: String,
    /// Matched pairs that were correlated.
    pub pair_count: usize,
    /// One report per coefficient kind.
    pub reports: Vec<AggregatedReport>,
    pub failures: Vec<Failure>,
    pub missing_in_a: Vec<MissingArtifact>,
    pub missing_in_b: Vec<MissingCategory>,
    /// Rewrites applied while indexing either run.
    #[serde(default)]
    pub path_changes: Vec<PathChange>,
}

impl RegressionReport {
    pub fn report(&self, kind: CoefficientKind) -> Option<&AggregatedReport> {
        self.reports.iter().find(|r| r.kind == kind)
    }
}

/// One heatmap cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeatmapRow {
    /// Category.
    pub rowid: String,
    /// Data source, usually the run name.
    pub columnid: String,
    pub value: String,
}

/// Heatmap rows built from the summary lines of `report`.
pub fn heatmap_rows(report: &AggregatedReport, data_source: &str) -> Vec<HeatmapRow> {
    report
        .summary_lines()
        .iter()
        .filter_map(|line| line.split_once(": "))
        .map(|(name, value)| HeatmapRow {
            rowid: name.to_string(),
            columnid: data_source.to_string(),
            value: value.to_string(),
        })
        .collect()
}

/// Write heatmap rows as pretty JSON.
pub fn write_heatmap_json(path: &Path, rows: &[HeatmapRow]) -> Result<()> {
    let content = serde_json::to_string_pretty(rows).context("serialize heatmap rows")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Render the `|feature|coefficient|` table for a PR comment.
pub fn render_summary_md(report: &AggregatedReport) -> String {
    let mut out = String::from("|feature|coefficient|\n|---|---|\n");
    for (category, mean) in report.category_means() {
        out.push_str(&format!("|{category}|{mean}|\n"));
    }
    out
}

/// Write the markdown summary of `report`.
pub fn write_summary_md(path: &Path, report: &AggregatedReport) -> Result<()> {
    std::fs::write(path, render_summary_md(report)).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Write the `"category: mean"` text summary of `report`.
pub fn write_summary_txt(path: &Path, report: &AggregatedReport) -> Result<()> {
    let mut text = report.summary_lines().join("\n");
    text.push('\n');
    std::fs::write(path, text).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Write the full report as pretty JSON.
pub fn write_report_json(path: &Path, report: &RegressionReport) -> Result<()> {
    let content = serde_json::to_string_pretty(report).context("serialize regression report")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Destination for finished reports.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn publish(&self, report: &RegressionReport) -> Result<()>;
}

/// Writes report files into a directory.
///
/// Layout: `report.json`, then per coefficient kind `{kind}.txt`,
/// `{kind}_summary.md` and `{kind}_heatmap.json`.
#[derive(Debug, Clone)]
pub struct DirectoryReportSink {
    dir: PathBuf,
}

impl DirectoryReportSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_all(&self, report: &RegressionReport) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("create report directory {:?}", self.dir))?;
        write_report_json(&self.dir.join("report.json"), report)?;
        for aggregated in &report.reports {
            let kind = aggregated.kind;
            write_summary_txt(&self.dir.join(format!("{kind}.txt")), aggregated)?;
            write_summary_md(&self.dir.join(format!("{kind}_summary.md")), aggregated)?;
            write_heatmap_json(
                &self.dir.join(format!("{kind}_heatmap.json")),
                &heatmap_rows(aggregated, &report.run_name),
            )?;
        }
        Ok(())
    }
}

#[async_trait]
impl ReportSink for DirectoryReportSink {
    async fn publish(&self, report: &RegressionReport) -> Result<()> {
        let sink = self.clone();
        let report = report.clone();
        tokio::task::spawn_blocking(move || sink.write_all(&report))
            .await
            .context("report writer task")?
    }
}
