use super::{AlignKind, AlignmentMethod};
use crate::config::EccParams;
use crate::Result;
use opencv::core::{no_array, Mat, Scalar, TermCriteria};
use opencv::prelude::*;
use opencv::{imgproc, video};

/// Iterative enhanced-correlation-coefficient refinement of an affine warp.
/// Works on texture-poor images where feature matching finds nothing, but
/// needs a reasonable initial overlap to converge.
pub struct EccAlign {
    params: EccParams,
}

impl EccAlign {
    pub fn new(params: EccParams) -> Self {
        Self { params }
    }
}

impl AlignmentMethod for EccAlign {
    fn name(&self) -> &str {
        "ecc-affine"
    }

    fn kind(&self) -> AlignKind {
        AlignKind::Ecc
    }

    fn attempt(&self, img1: &Mat, img2: &Mat, gray1: &Mat, gray2: &Mat) -> Result<Option<Mat>> {
        let mut warp = Mat::eye(2, 3, opencv::core::CV_32F)?.to_mat()?;
        let criteria = TermCriteria::new(
            opencv::core::TermCriteria_Type::COUNT as i32
                + opencv::core::TermCriteria_Type::EPS as i32,
            self.params.max_iterations,
            self.params.termination_eps,
        )?;

        // The warp maps gray1 onto gray2, so the warp is applied inverted.
        let ecc_result = video::find_transform_ecc(
            gray2,
            gray1,
            &mut warp,
            video::MOTION_AFFINE,
            criteria,
            &no_array(),
            self.params.gauss_filter_size,
        );

        if let Err(e) = ecc_result {
            tracing::debug!(error = %e, "ECC did not converge");
            return Ok(None);
        }

        let mut warped = Mat::default();
        imgproc::warp_affine(
            img1,
            &mut warped,
            &warp,
            img2.size()?,
            imgproc::INTER_LINEAR + imgproc::WARP_INVERSE_MAP,
            opencv::core::BORDER_CONSTANT,
            Scalar::all(0.0),
        )?;

        Ok(Some(warped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::grayimage_to_mat;
    use image::{GrayImage, Luma};

    fn gradient_pattern(width: u32, height: u32) -> Mat {
        let img = GrayImage::from_fn(width, height, |x, y| {
            Luma([((x + y) * 255 / (width + height)) as u8])
        });
        grayimage_to_mat(&img).unwrap()
    }

    #[test]
    fn test_identical_gradient_converges() {
        let img = gradient_pattern(64, 64);
        let method = EccAlign::new(EccParams::default());

        let result = method.attempt(&img, &img, &img, &img).unwrap();
        assert!(result.is_some());
        assert_eq!(
            result.unwrap().size().unwrap(),
            img.size().unwrap()
        );
    }

    #[test]
    fn test_uniform_image_recovered_as_failure() {
        let flat = grayimage_to_mat(&GrayImage::from_pixel(64, 64, Luma([128]))).unwrap();
        let method = EccAlign::new(EccParams::default());

        // Zero-gradient input cannot converge; that must not be an error.
        let result = method.attempt(&flat, &flat, &flat, &flat).unwrap();
        assert!(result.is_none());
    }
}
