use crate::preprocess::grayscale;
use crate::Result;
use opencv::core::{Mat, Scalar};
use opencv::imgproc;
use opencv::prelude::*;

/// Translate an image so its intensity centroid sits at the image center.
/// Always succeeds; an empty mask falls back to the geometric center (a
/// zero shift).
pub fn center_on_mass(img: &Mat) -> Result<Mat> {
    let gray = grayscale(img)?;

    // Local thresholding so gradient backgrounds still yield a usable mask.
    let mut mask = Mat::default();
    imgproc::adaptive_threshold(
        &gray,
        &mut mask,
        255.0,
        imgproc::ADAPTIVE_THRESH_GAUSSIAN_C,
        imgproc::THRESH_BINARY,
        11,
        2.0,
    )?;

    let moments = imgproc::moments(&mask, false)?;
    let (cx, cy) = if moments.m00 == 0.0 {
        (img.cols() / 2, img.rows() / 2)
    } else {
        (
            (moments.m10 / moments.m00) as i32,
            (moments.m01 / moments.m00) as i32,
        )
    };

    let dx = img.cols() / 2 - cx;
    let dy = img.rows() / 2 - cy;

    let mut translation = Mat::eye(2, 3, opencv::core::CV_32F)?.to_mat()?;
    *translation.at_2d_mut::<f32>(0, 2)? = dx as f32;
    *translation.at_2d_mut::<f32>(1, 2)? = dy as f32;

    let mut shifted = Mat::default();
    imgproc::warp_affine(
        img,
        &mut shifted,
        &translation,
        img.size()?,
        imgproc::INTER_LINEAR,
        opencv::core::BORDER_CONSTANT,
        Scalar::all(0.0),
    )?;

    Ok(shifted)
}
