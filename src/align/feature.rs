use super::{AlignKind, AlignmentMethod};
use crate::config::OrbParams;
use crate::Result;
use opencv::core::{no_array, DMatch, KeyPoint, Mat, Point2f, Scalar, Vector};
use opencv::features2d::{BFMatcher, ORB_ScoreType, ORB};
use opencv::prelude::*;
use opencv::{calib3d, imgproc};

/// ORB keypoints matched with cross-checked Hamming distance, homography
/// fitted with RANSAC. Handles translation, rotation, scale and perspective
/// but needs textured input.
pub struct FeatureAlign {
    params: OrbParams,
}

impl FeatureAlign {
    pub fn new(params: OrbParams) -> Self {
        Self { params }
    }

    fn detect_and_compute(&self, image: &Mat) -> Result<(Vector<KeyPoint>, Mat)> {
        let mut detector = ORB::create(
            self.params.max_features,
            self.params.scale_factor,
            self.params.n_levels,
            31,
            0,
            2,
            ORB_ScoreType::HARRIS_SCORE,
            31,
            20,
        )?;

        let mut keypoints = Vector::<KeyPoint>::new();
        let mut descriptors = Mat::default();
        detector.detect_and_compute(image, &no_array(), &mut keypoints, &mut descriptors, false)?;

        Ok((keypoints, descriptors))
    }

    fn match_descriptors(&self, desc1: &Mat, desc2: &Mat) -> Result<Vec<DMatch>> {
        let matcher = BFMatcher::create(opencv::core::NORM_HAMMING, true)?;
        let mut matches = Vector::<DMatch>::new();
        matcher.train_match(desc1, desc2, &mut matches, &no_array())?;

        let mut matches = matches.to_vec();
        matches.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(self.params.max_matches);

        Ok(matches)
    }

    fn try_homography(
        &self,
        img1: &Mat,
        img2: &Mat,
        gray1: &Mat,
        gray2: &Mat,
    ) -> Result<Option<Mat>> {
        let (kp1, desc1) = self.detect_and_compute(gray1)?;
        let (kp2, desc2) = self.detect_and_compute(gray2)?;

        // A homography needs at least 4 correspondences.
        if desc1.rows() < 4 || desc2.rows() < 4 {
            return Ok(None);
        }

        let matches = self.match_descriptors(&desc1, &desc2)?;
        if matches.len() < 4 {
            return Ok(None);
        }

        let mut src_pts = Vector::<Point2f>::new();
        let mut dst_pts = Vector::<Point2f>::new();
        for m in &matches {
            src_pts.push(kp1.get(m.query_idx as usize)?.pt());
            dst_pts.push(kp2.get(m.train_idx as usize)?.pt());
        }

        let homography = calib3d::find_homography(
            &src_pts,
            &dst_pts,
            &mut Mat::default(),
            calib3d::RANSAC,
            self.params.ransac_reproj_threshold,
        )?;

        if homography.empty()
            || homography.rows() != 3
            || homography.cols() != 3
            || opencv::core::determinant(&homography)?.abs() < 1e-6
        {
            return Ok(None);
        }

        let mut warped = Mat::default();
        imgproc::warp_perspective(
            img1,
            &mut warped,
            &homography,
            img2.size()?,
            imgproc::INTER_LINEAR,
            opencv::core::BORDER_CONSTANT,
            Scalar::all(0.0),
        )?;

        Ok(Some(warped))
    }
}

impl AlignmentMethod for FeatureAlign {
    fn name(&self) -> &str {
        "orb-homography"
    }

    fn kind(&self) -> AlignKind {
        AlignKind::Feature
    }

    fn attempt(&self, img1: &Mat, img2: &Mat, gray1: &Mat, gray2: &Mat) -> Result<Option<Mat>> {
        // OpenCV failures here (too few keypoints, degenerate fits) mean the
        // method failed, not the run.
        match self.try_homography(img1, img2, gray1, gray2) {
            Ok(result) => Ok(result),
            Err(e) => {
                tracing::debug!(error = %e, "feature matching failed");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrbParams;
    use crate::utils::grayimage_to_mat;
    use image::{GrayImage, Luma};

    #[test]
    fn test_uniform_image_yields_no_transform() {
        let flat = grayimage_to_mat(&GrayImage::from_pixel(64, 64, Luma([77]))).unwrap();
        let method = FeatureAlign::new(OrbParams::default());

        let result = method.attempt(&flat, &flat, &flat, &flat).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_identical_textured_pair_warps_to_target_size() {
        let textured = grayimage_to_mat(&GrayImage::from_fn(128, 128, |x, y| {
            Luma([((x * x + y * 3 * y) % 251) as u8])
        }))
        .unwrap();
        let method = FeatureAlign::new(OrbParams::default());

        if let Some(warped) = method
            .attempt(&textured, &textured, &textured, &textured)
            .unwrap()
        {
            assert_eq!(warped.size().unwrap(), textured.size().unwrap());
        }
    }
}
