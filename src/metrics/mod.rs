use crate::Result;
use opencv::core::{self, no_array, Mat, Size};
use opencv::imgproc;
use opencv::prelude::*;

// Standard SSIM constants for 8-bit dynamic range: (K * 255)^2 with
// K1 = 0.01, K2 = 0.03.
const C1: f64 = 6.5025;
const C2: f64 = 58.5225;

// Score weights; contour variants are (contour, ssim, pixel).
const W_SSIM: f64 = 0.7;
const W_PIXEL: f64 = 0.3;
const W_CAD_CONTOUR: (f64, f64, f64) = (0.5, 0.3, 0.2);
const W_GENERAL_CONTOUR: (f64, f64, f64) = (0.2, 0.5, 0.3);

fn gaussian(src: &Mat) -> Result<Mat> {
    let mut dst = Mat::default();
    imgproc::gaussian_blur(
        src,
        &mut dst,
        Size::new(11, 11),
        1.5,
        1.5,
        core::BORDER_DEFAULT,
    )?;
    Ok(dst)
}

fn elementwise_mul(a: &Mat, b: &Mat) -> Result<Mat> {
    let mut out = Mat::default();
    core::multiply(a, b, &mut out, 1.0, -1)?;
    Ok(out)
}

fn subtract(a: &Mat, b: &Mat) -> Result<Mat> {
    let mut out = Mat::default();
    core::subtract(a, b, &mut out, &no_array(), -1)?;
    Ok(out)
}

/// Single-scale SSIM over two equally sized grayscale images, returned on a
/// 0-1 scale. Windowed with an 11x11 Gaussian as in the original SSIM paper.
pub fn ssim(gray1: &Mat, gray2: &Mat) -> Result<f64> {
    anyhow::ensure!(
        gray1.size()? == gray2.size()?,
        "SSIM inputs differ in size: {:?} vs {:?}",
        gray1.size()?,
        gray2.size()?
    );

    let mut i1 = Mat::default();
    let mut i2 = Mat::default();
    gray1.convert_to(&mut i1, core::CV_32F, 1.0, 0.0)?;
    gray2.convert_to(&mut i2, core::CV_32F, 1.0, 0.0)?;

    let i1_sq = elementwise_mul(&i1, &i1)?;
    let i2_sq = elementwise_mul(&i2, &i2)?;
    let i1_i2 = elementwise_mul(&i1, &i2)?;

    let mu1 = gaussian(&i1)?;
    let mu2 = gaussian(&i2)?;
    let mu1_sq = elementwise_mul(&mu1, &mu1)?;
    let mu2_sq = elementwise_mul(&mu2, &mu2)?;
    let mu1_mu2 = elementwise_mul(&mu1, &mu2)?;

    let sigma1_sq = subtract(&gaussian(&i1_sq)?, &mu1_sq)?;
    let sigma2_sq = subtract(&gaussian(&i2_sq)?, &mu2_sq)?;
    let sigma12 = subtract(&gaussian(&i1_i2)?, &mu1_mu2)?;

    // t1 = 2*mu1*mu2 + C1, t2 = 2*sigma12 + C2
    let mut t1 = Mat::default();
    mu1_mu2.convert_to(&mut t1, -1, 2.0, C1)?;
    let mut t2 = Mat::default();
    sigma12.convert_to(&mut t2, -1, 2.0, C2)?;
    let numerator = elementwise_mul(&t1, &t2)?;

    // b1 = mu1^2 + mu2^2 + C1, b2 = sigma1^2 + sigma2^2 + C2
    let mut mu_sum = Mat::default();
    core::add(&mu1_sq, &mu2_sq, &mut mu_sum, &no_array(), -1)?;
    let mut b1 = Mat::default();
    mu_sum.convert_to(&mut b1, -1, 1.0, C1)?;

    let mut sigma_sum = Mat::default();
    core::add(&sigma1_sq, &sigma2_sq, &mut sigma_sum, &no_array(), -1)?;
    let mut b2 = Mat::default();
    sigma_sum.convert_to(&mut b2, -1, 1.0, C2)?;

    let denominator = elementwise_mul(&b1, &b2)?;

    let mut ssim_map = Mat::default();
    core::divide2(&numerator, &denominator, &mut ssim_map, 1.0, -1)?;

    let mean = core::mean(&ssim_map, &no_array())?;
    Ok(mean[0])
}

/// Absolute per-pixel difference of two grayscale images.
pub fn absolute_diff(gray1: &Mat, gray2: &Mat) -> Result<Mat> {
    let mut diff = Mat::default();
    core::absdiff(gray1, gray2, &mut diff)?;
    Ok(diff)
}

/// Fraction of pixels with any nonzero difference, inverted to a 0-100
/// similarity. The diff-visualization threshold plays no part here.
pub fn pixel_similarity(diff: &Mat) -> Result<f64> {
    let total = (diff.rows() as i64) * (diff.cols() as i64);
    if total == 0 {
        return Ok(100.0);
    }

    let non_zero = core::count_non_zero(diff)? as f64;
    Ok((1.0 - non_zero / total as f64) * 100.0)
}

/// Combined score without contour input.
pub fn combine(ssim_pct: f64, pixel_pct: f64) -> f64 {
    W_SSIM * ssim_pct + W_PIXEL * pixel_pct
}

/// Combined score with contour similarity, weighted by domain: line-art
/// content leans on shape agreement, general content on structure.
pub fn combine_with_contours(contour_pct: f64, ssim_pct: f64, pixel_pct: f64, cad: bool) -> f64 {
    let (wc, ws, wp) = if cad { W_CAD_CONTOUR } else { W_GENERAL_CONTOUR };
    wc * contour_pct + ws * ssim_pct + wp * pixel_pct
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::grayimage_to_mat;
    use image::{GrayImage, Luma};

    fn textured(width: u32, height: u32) -> Mat {
        let img = GrayImage::from_fn(width, height, |x, y| {
            Luma([((x * 7 + y * 11) % 256) as u8])
        });
        grayimage_to_mat(&img).unwrap()
    }

    #[test]
    fn test_ssim_identity_is_one() {
        let img = textured(64, 64);
        let score = ssim(&img, &img).unwrap();
        assert!((score - 1.0).abs() < 1e-9, "ssim = {}", score);
    }

    #[test]
    fn test_ssim_inverted_is_low() {
        let img = textured(64, 64);
        let mut inverted = Mat::default();
        core::bitwise_not(&img, &mut inverted, &no_array()).unwrap();

        let score = ssim(&img, &inverted).unwrap();
        assert!(score < 0.5, "ssim = {}", score);
    }

    #[test]
    fn test_ssim_size_mismatch_is_error() {
        let a = textured(64, 64);
        let b = textured(32, 32);
        assert!(ssim(&a, &b).is_err());
    }

    #[test]
    fn test_pixel_similarity_identity() {
        let img = textured(40, 40);
        let diff = absolute_diff(&img, &img).unwrap();
        assert_eq!(pixel_similarity(&diff).unwrap(), 100.0);
    }

    #[test]
    fn test_pixel_similarity_counts_any_nonzero_difference() {
        // 100x100 zeros with one quadrant off by a single intensity level:
        // small differences count fully, thresholding plays no part here.
        let a = grayimage_to_mat(&GrayImage::from_pixel(100, 100, Luma([50]))).unwrap();
        let b = grayimage_to_mat(&GrayImage::from_fn(100, 100, |x, y| {
            if x < 50 && y < 50 {
                Luma([51])
            } else {
                Luma([50])
            }
        }))
        .unwrap();

        let diff = absolute_diff(&a, &b).unwrap();
        let similarity = pixel_similarity(&diff).unwrap();
        assert!((similarity - 75.0).abs() < 1e-9, "similarity = {}", similarity);
    }

    #[test]
    fn test_combine_weights() {
        assert!((combine(100.0, 100.0) - 100.0).abs() < 1e-12);
        assert!((combine(100.0, 0.0) - 70.0).abs() < 1e-12);
        assert!((combine(0.0, 100.0) - 30.0).abs() < 1e-12);
    }

    #[test]
    fn test_combine_with_contours_by_domain() {
        let cad = combine_with_contours(100.0, 0.0, 0.0, true);
        assert!((cad - 50.0).abs() < 1e-12);

        let general = combine_with_contours(100.0, 0.0, 0.0, false);
        assert!((general - 20.0).abs() < 1e-12);
    }
}
