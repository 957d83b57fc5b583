use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::Result;

/// Alignment strategy requested by the caller.
///
/// `Auto` walks the full fallback chain, `Feature` restricts it to the
/// ORB/homography method, `Center` skips straight to centroid centering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Auto,
    Center,
    Feature,
}

impl FromStr for Strategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(Strategy::Auto),
            "center" => Ok(Strategy::Center),
            "feature" => Ok(Strategy::Feature),
            other => Err(anyhow::anyhow!(
                "unknown alignment strategy: {} (expected auto, center or feature)",
                other
            )),
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Auto => write!(f, "auto"),
            Strategy::Center => write!(f, "center"),
            Strategy::Feature => write!(f, "feature"),
        }
    }
}

/// ORB detector parameters used by the feature alignment method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrbParams {
    pub max_features: i32,
    pub scale_factor: f32,
    pub n_levels: i32,
    pub max_matches: usize,
    pub ransac_reproj_threshold: f64,
}

impl Default for OrbParams {
    fn default() -> Self {
        Self {
            max_features: 2000,
            scale_factor: 1.2,
            n_levels: 8,
            max_matches: 100,
            ransac_reproj_threshold: 5.0,
        }
    }
}

/// ECC refinement parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EccParams {
    pub max_iterations: i32,
    pub termination_eps: f64,
    pub gauss_filter_size: i32,
}

impl Default for EccParams {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            termination_eps: 1e-8,
            gauss_filter_size: 5,
        }
    }
}

/// Tunable pipeline parameters, loadable from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    pub orb: OrbParams,
    pub ecc: EccParams,
    /// Minimum SSIM (0-1) a candidate alignment must reach to be accepted.
    pub acceptance_floor: f64,
    /// Log-Hu distance ceiling for the shape alignment method.
    pub max_shape_distance: f64,
    /// Contours at or below this area (px^2) are ignored by contour matching.
    pub min_contour_area: f64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            orb: OrbParams::default(),
            ecc: EccParams::default(),
            acceptance_floor: 0.3,
            max_shape_distance: 1.0,
            min_contour_area: 100.0,
        }
    }
}

impl Tuning {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {}", path.display(), e))?;
        let tuning: Tuning = toml::from_str(&content)?;
        Ok(tuning)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// Options for a single comparison run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareOptions {
    pub output_dir: PathBuf,
    /// Similarity threshold (0-100) for the similar/different verdict.
    pub threshold: f64,
    pub strategy: Strategy,
    /// Pixels with absolute grayscale difference above this value are marked
    /// in the red diff visualization.
    pub diff_threshold: i32,
    pub cad: bool,
    pub cad_enhance: bool,
    pub contour_mode: bool,
    /// Contour match acceptance threshold (0-1).
    pub contour_threshold: f64,
    pub show_result: bool,
    pub tuning: Tuning,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            threshold: 90.0,
            strategy: Strategy::Auto,
            diff_threshold: 30,
            cad: false,
            cad_enhance: false,
            contour_mode: false,
            contour_threshold: 0.8,
            show_result: false,
            tuning: Tuning::default(),
        }
    }
}

/// Maximum diff threshold allowed in line-art mode; fine line work needs a
/// stricter difference cutoff than photographic content.
const CAD_MAX_DIFF_THRESHOLD: i32 = 15;

impl CompareOptions {
    /// Applies the line-art policy coupling: CAD input rarely carries enough
    /// texture for feature matching, so the strategy is forced to centroid
    /// centering and the diff threshold is clamped.
    pub fn apply_cad_policy(&mut self) {
        if !self.cad {
            return;
        }
        if self.diff_threshold > CAD_MAX_DIFF_THRESHOLD {
            tracing::info!(
                from = self.diff_threshold,
                to = CAD_MAX_DIFF_THRESHOLD,
                "clamping diff threshold for line-art input"
            );
            self.diff_threshold = CAD_MAX_DIFF_THRESHOLD;
        }
        if self.strategy != Strategy::Center {
            tracing::info!(
                requested = %self.strategy,
                "forcing centroid alignment for line-art input"
            );
            self.strategy = Strategy::Center;
        }
    }
}
