//! Fixture builders shared by the integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use regcorr_core::correlation::nifti::NiftiImage;
use regcorr_core::telemetry::{init_tracing, LogFormat};
use regcorr_core::{CheckpointStore, PipelineConfig, RegressionConfig, RegressionPipeline};

pub const SESSION: &str = "sub-1_ses-1";
pub const BOLD: &str = "func/sub-1_ses-1_task-rest_desc-preproc_bold.nii.gz";
pub const T1W: &str = "anat/sub-1_ses-1_desc-brain_T1w.nii.gz";
pub const CONFOUNDS: &str = "func/sub-1_ses-1_task-rest_desc-confounds_timeseries.tsv";
pub const ALFF: &str = "func/sub-1_ses-1_task-rest_desc-alff_bold.nii.gz";

/// A 2x2x1 volume with five identical timepoints: every voxel holds still
/// over time, but each volume varies across voxels.
pub fn bold_data() -> Vec<f64> {
    (0..20).map(|i| ((i % 4) * 3 % 5 + 1) as f64).collect()
}

/// A 3x3x2 structural volume.
pub fn t1w_data() -> Vec<f64> {
    (0..18).map(|i| ((i * 5) % 13) as f64 + 1.0).collect()
}

pub fn confounds_tsv() -> String {
    let mut text = String::from("csf\twhite_matter\tframewise_displacement\n");
    for t in 0..6 {
        let t = t as f64;
        text.push_str(&format!(
            "{}\t{}\t{}\n",
            100.0 + t * 1.5,
            80.0 - t * t,
            0.1 * ((t as i64 * 3) % 5) as f64
        ));
    }
    text
}

pub fn write_volume(path: &Path, dims: Vec<usize>, data: Vec<f64>) {
    std::fs::create_dir_all(path.parent().expect("fixture has a parent")).unwrap();
    NiftiImage::new(dims, data).write(path).unwrap();
}

pub fn write_text(path: &Path, text: &str) {
    std::fs::create_dir_all(path.parent().expect("fixture has a parent")).unwrap();
    std::fs::write(path, text).unwrap();
}

/// Path of `relative` inside the session folder of `root`.
pub fn artifact(root: &Path, relative: &str) -> PathBuf {
    root.join(SESSION).join(relative)
}

/// Populate `root` with a bold series, a structural volume and a confounds table.
pub fn write_run(root: &Path) {
    write_volume(&artifact(root, BOLD), vec![2, 2, 1, 5], bold_data());
    write_volume(&artifact(root, T1W), vec![3, 3, 2], t1w_data());
    write_text(&artifact(root, CONFOUNDS), &confounds_tsv());
}

/// Two pipeline runs plus a cache directory, removed on drop.
pub struct Fixture {
    pub run_a: tempfile::TempDir,
    pub run_b: tempfile::TempDir,
    pub cache: tempfile::TempDir,
}

impl Fixture {
    /// Two identical runs.
    pub fn identical() -> Self {
        let fixture = Self::empty();
        write_run(fixture.root_a());
        write_run(fixture.root_b());
        fixture
    }

    pub fn empty() -> Self {
        Self {
            run_a: tempfile::tempdir().unwrap(),
            run_b: tempfile::tempdir().unwrap(),
            cache: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root_a(&self) -> &Path {
        self.run_a.path()
    }

    pub fn root_b(&self) -> &Path {
        self.run_b.path()
    }

    pub fn config(&self) -> RegressionConfig {
        RegressionConfig::new(
            "main_site-a",
            PipelineConfig::new("pipeline_1", self.root_a().to_string_lossy()),
            PipelineConfig::new("pipeline_2", self.root_b().to_string_lossy()),
            self.cache.path(),
        )
        .with_worker_count(2)
    }

    pub fn pipeline(
        &self,
        config: RegressionConfig,
        store: Arc<dyn CheckpointStore>,
    ) -> RegressionPipeline {
        init_tracing(&config, LogFormat::Text);
        RegressionPipeline::new(config, store).expect("valid config")
    }
}
