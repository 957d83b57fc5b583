pub mod centroid;
pub mod ecc;
pub mod feature;
pub mod shape;

use crate::config::{Strategy, Tuning};
use crate::metrics::ssim;
use crate::preprocess::grayscale;
use crate::Result;
use opencv::core::Mat;
use serde::Serialize;

pub use centroid::center_on_mass;
pub use ecc::EccAlign;
pub use feature::FeatureAlign;
pub use shape::ShapeAlign;

/// Which alignment method produced the accepted result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignKind {
    Feature,
    Ecc,
    Shape,
    Centroid,
}

impl std::fmt::Display for AlignKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlignKind::Feature => write!(f, "feature"),
            AlignKind::Ecc => write!(f, "ecc"),
            AlignKind::Shape => write!(f, "shape"),
            AlignKind::Centroid => write!(f, "centroid"),
        }
    }
}

/// The aligned pair: image 1 warped into image 2's frame, image 2 unchanged
/// except under the centroid fallback, which recenters both.
pub struct AlignedPair {
    pub image1: Mat,
    pub image2: Mat,
    pub kind: AlignKind,
    /// SSIM (0-1) of the accepted candidate against image 2.
    pub confidence: f64,
}

/// A single geometric alignment method. `attempt` returns the warped version
/// of image 1, or `None` when the method cannot produce a transform; real
/// errors (not recoverable method failures) propagate.
pub trait AlignmentMethod {
    fn name(&self) -> &str;

    fn kind(&self) -> AlignKind;

    fn attempt(&self, img1: &Mat, img2: &Mat, gray1: &Mat, gray2: &Mat) -> Result<Option<Mat>>;
}

/// Ordered fallback chain over the alignment methods: feature matching,
/// then ECC refinement, then Hu-moment shapes, with centroid centering as
/// the unconditional last resort.
pub struct Aligner {
    acceptance_floor: f64,
    methods_auto: Vec<Box<dyn AlignmentMethod>>,
    methods_feature: Vec<Box<dyn AlignmentMethod>>,
}

impl Aligner {
    pub fn new(tuning: &Tuning) -> Self {
        let feature = || -> Box<dyn AlignmentMethod> {
            Box::new(FeatureAlign::new(tuning.orb.clone()))
        };
        Self {
            acceptance_floor: tuning.acceptance_floor,
            methods_auto: vec![
                feature(),
                Box::new(EccAlign::new(tuning.ecc.clone())),
                Box::new(ShapeAlign::new(tuning.max_shape_distance)),
            ],
            methods_feature: vec![feature()],
        }
    }

    /// Run the fallback chain for the requested strategy. Never fails to
    /// produce an aligned pair: the centroid fallback always succeeds.
    pub fn align(&self, img1: &Mat, img2: &Mat, strategy: Strategy) -> Result<AlignedPair> {
        let gray1 = grayscale(img1)?;
        let gray2 = grayscale(img2)?;

        let methods = match strategy {
            Strategy::Auto => &self.methods_auto[..],
            Strategy::Feature => &self.methods_feature[..],
            Strategy::Center => &[],
        };

        for method in methods {
            match method.attempt(img1, img2, &gray1, &gray2)? {
                Some(warped) => {
                    let confidence = ssim(&grayscale(&warped)?, &gray2)?;
                    if confidence > self.acceptance_floor {
                        tracing::info!(
                            method = method.name(),
                            confidence,
                            "alignment accepted"
                        );
                        return Ok(AlignedPair {
                            image1: warped,
                            image2: img2.clone(),
                            kind: method.kind(),
                            confidence,
                        });
                    }
                    tracing::debug!(
                        method = method.name(),
                        confidence,
                        floor = self.acceptance_floor,
                        "alignment rejected below acceptance floor"
                    );
                }
                None => {
                    tracing::debug!(method = method.name(), "method produced no transform");
                }
            }
        }

        // Centroid fallback: the only method that transforms both images.
        let centered1 = center_on_mass(img1)?;
        let centered2 = center_on_mass(img2)?;
        let confidence = ssim(&grayscale(&centered1)?, &grayscale(&centered2)?)?;
        tracing::info!(confidence, "falling back to centroid alignment");

        Ok(AlignedPair {
            image1: centered1,
            image2: centered2,
            kind: AlignKind::Centroid,
            confidence,
        })
    }
}
