use crate::Result;
use opencv::core::{no_array, Mat, Point, Scalar};
use opencv::imgproc;
use opencv::prelude::*;

/// Convert a BGR image to single-channel intensity. Single-channel input
/// passes through unchanged.
pub fn grayscale(img: &Mat) -> Result<Mat> {
    if img.channels() == 1 {
        return Ok(img.clone());
    }
    let mut gray = Mat::default();
    imgproc::cvt_color(
        img,
        &mut gray,
        imgproc::COLOR_BGR2GRAY,
        0,
    )?;
    Ok(gray)
}

/// Binarize line-art (CAD) input.
///
/// The clarity-preserving mode uses a global Otsu split and leaves line work
/// untouched. The enhance mode trades fidelity for emphasis: adaptive local
/// thresholding, a small dilation and a Canny pass whose edges are OR-merged
/// back into the mask.
pub fn preprocess_line_art(img: &Mat, enhance: bool) -> Result<Mat> {
    let gray = grayscale(img)?;

    let binary = if enhance {
        let mut adaptive = Mat::default();
        imgproc::adaptive_threshold(
            &gray,
            &mut adaptive,
            255.0,
            imgproc::ADAPTIVE_THRESH_GAUSSIAN_C,
            imgproc::THRESH_BINARY,
            9,
            2.0,
        )?;

        let kernel = Mat::ones(2, 2, opencv::core::CV_8U)?.to_mat()?;
        let mut dilated = Mat::default();
        imgproc::dilate(
            &adaptive,
            &mut dilated,
            &kernel,
            Point::new(-1, -1),
            1,
            opencv::core::BORDER_CONSTANT,
            Scalar::all(0.0),
        )?;

        let mut edges = Mat::default();
        imgproc::canny(&dilated, &mut edges, 50.0, 150.0, 3, false)?;

        let mut merged = Mat::default();
        opencv::core::bitwise_or(&adaptive, &edges, &mut merged, &no_array())?;
        merged
    } else {
        let mut otsu = Mat::default();
        imgproc::threshold(
            &gray,
            &mut otsu,
            0.0,
            255.0,
            imgproc::THRESH_BINARY + imgproc::THRESH_OTSU,
        )?;
        otsu
    };

    // Keep the caller's channel count so later stages see a uniform pipeline.
    if img.channels() == 3 {
        let mut color = Mat::default();
        imgproc::cvt_color(
            &binary,
            &mut color,
            imgproc::COLOR_GRAY2BGR,
            0,
        )?;
        Ok(color)
    } else {
        Ok(binary)
    }
}
