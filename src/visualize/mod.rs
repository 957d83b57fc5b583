use crate::contour::{ContourDescriptor, ContourMatch};
use crate::Result;
use opencv::core::{self, no_array, Mat, Point, Rect, Scalar, Vector};
use opencv::imgproc;
use opencv::prelude::*;
use rand::Rng;
use std::path::Path;

fn to_bgr(img: &Mat) -> Result<Mat> {
    if img.channels() == 3 {
        return Ok(img.clone());
    }
    let mut bgr = Mat::default();
    imgproc::cvt_color(
        img,
        &mut bgr,
        imgproc::COLOR_GRAY2BGR,
        0,
    )?;
    Ok(bgr)
}

/// Black background with pure red wherever the absolute difference exceeds
/// the threshold.
pub fn difference_image(diff: &Mat, threshold: i32) -> Result<Mat> {
    let mut mask = Mat::default();
    imgproc::threshold(
        diff,
        &mut mask,
        threshold as f64,
        255.0,
        imgproc::THRESH_BINARY,
    )?;

    let zeros = Mat::zeros(diff.rows(), diff.cols(), core::CV_8UC1)?.to_mat()?;
    let mut channels = Vector::<Mat>::new();
    channels.push(zeros.clone());
    channels.push(zeros);
    channels.push(mask);

    let mut out = Mat::default();
    core::merge(&channels, &mut out)?;
    Ok(out)
}

/// Jet-colormapped rendering of the raw difference for intensity analysis.
pub fn heatmap_image(diff: &Mat) -> Result<Mat> {
    let mut colored = Mat::default();
    imgproc::apply_color_map(diff, &mut colored, imgproc::COLORMAP_JET)?;
    Ok(colored)
}

/// Horizontal [aligned 1 | image 2 | red diff] composite with the verdict
/// overlaid in green.
pub fn comparison_image(
    gray1: &Mat,
    gray2: &Mat,
    diff_red: &Mat,
    combined: f64,
    similar: bool,
    ssim_pct: f64,
) -> Result<Mat> {
    let h = gray1.rows();
    let w = gray1.cols();

    let mut canvas = Mat::zeros(h, w * 3, core::CV_8UC3)?.to_mat()?;
    for (i, panel) in [to_bgr(gray1)?, to_bgr(gray2)?, diff_red.clone()]
        .iter()
        .enumerate()
    {
        let mut roi = Mat::roi_mut(&mut canvas, Rect::new(i as i32 * w, 0, w, h))?;
        panel.copy_to(&mut roi)?;
    }

    let status = if similar { "SIMILAR" } else { "DIFFERENT" };
    let green = Scalar::new(0.0, 255.0, 0.0, 0.0);
    imgproc::put_text(
        &mut canvas,
        &format!("Similarity: {:.2}% ({})", combined, status),
        Point::new(10, 30),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.8,
        green,
        2,
        imgproc::LINE_8,
        false,
    )?;
    imgproc::put_text(
        &mut canvas,
        &format!("SSIM: {:.2}%", ssim_pct),
        Point::new(10, 60),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.8,
        green,
        2,
        imgproc::LINE_8,
        false,
    )?;

    Ok(canvas)
}

/// Side-by-side view with every matched contour pair drawn in one random
/// color and the centroids connected.
pub fn contour_matches_image(
    img1: &Mat,
    img2: &Mat,
    set1: &[ContourDescriptor],
    set2: &[ContourDescriptor],
    matches: &[ContourMatch],
) -> Result<Mat> {
    let (h1, w1) = (img1.rows(), img1.cols());
    let (h2, w2) = (img2.rows(), img2.cols());

    let mut canvas = Mat::zeros(h1.max(h2), w1 + w2, core::CV_8UC3)?.to_mat()?;
    {
        let mut left = Mat::roi_mut(&mut canvas, Rect::new(0, 0, w1, h1))?;
        to_bgr(img1)?.copy_to(&mut left)?;
    }
    {
        let mut right = Mat::roi_mut(&mut canvas, Rect::new(w1, 0, w2, h2))?;
        to_bgr(img2)?.copy_to(&mut right)?;
    }

    let mut rng = rand::thread_rng();
    for m in matches {
        let color = Scalar::new(
            rng.gen_range(0..256) as f64,
            rng.gen_range(0..256) as f64,
            rng.gen_range(0..256) as f64,
            0.0,
        );

        let mut single = Vector::<Vector<Point>>::new();
        single.push(set1[m.index1].points.clone());
        imgproc::draw_contours(
            &mut canvas,
            &single,
            -1,
            color,
            2,
            imgproc::LINE_8,
            &no_array(),
            0,
            Point::new(0, 0),
        )?;

        let mut single = Vector::<Vector<Point>>::new();
        single.push(set2[m.index2].points.clone());
        imgproc::draw_contours(
            &mut canvas,
            &single,
            -1,
            color,
            2,
            imgproc::LINE_8,
            &no_array(),
            0,
            Point::new(w1, 0),
        )?;

        let c1 = set1[m.index1].centroid;
        let c2 = set2[m.index2].centroid;
        imgproc::line(
            &mut canvas,
            c1,
            Point::new(c2.x + w1, c2.y),
            color,
            1,
            imgproc::LINE_AA,
            0,
        )?;
    }

    Ok(canvas)
}

/// Human-readable report. Contour-mode runs get an appended section.
pub fn render_report(report: &crate::compare::SimilarityReport) -> String {
    let verdict = if report.similar { "similar" } else { "different" };
    let mut text = format!(
        "Image 1: {}\nImage 2: {}\nSSIM similarity: {:.2}%\nPixel similarity: {:.2}%\nCombined similarity: {:.2}%\nVerdict: {} (threshold: {}%)\n",
        report.image1.display(),
        report.image2.display(),
        report.ssim,
        report.pixel,
        report.combined,
        verdict,
        report.threshold,
    );

    if let (Some(contour), Some(count)) = (report.contour, report.matched_contours) {
        text.push_str(&format!(
            "\nContour similarity: {:.2}%\nMatched contours: {}\n",
            contour, count
        ));
    }

    text
}

/// Write one artifact, logging instead of failing: one unwritable artifact
/// must not stop the others.
pub fn persist(path: &Path, mat: &Mat, artifacts: &mut Vec<std::path::PathBuf>) {
    let write = || -> Result<()> {
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("artifact path is not valid UTF-8"))?;
        // imwrite reports an unopenable destination as `false`, not an error.
        let written = opencv::imgcodecs::imwrite(path_str, mat, &Vector::new())?;
        anyhow::ensure!(written, "encoder could not write {}", path.display());
        Ok(())
    };

    match write() {
        Ok(()) => artifacts.push(path.to_path_buf()),
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to write artifact"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::absolute_diff;
    use crate::utils::grayimage_to_mat;
    use image::{GrayImage, Luma};

    #[test]
    fn test_difference_image_marks_only_above_threshold() {
        let a = grayimage_to_mat(&GrayImage::from_pixel(20, 20, Luma([100]))).unwrap();
        let b = grayimage_to_mat(&GrayImage::from_fn(20, 20, |x, _| {
            if x < 10 {
                Luma([100])
            } else {
                Luma([180])
            }
        }))
        .unwrap();

        let diff = absolute_diff(&a, &b).unwrap();
        let red = difference_image(&diff, 30).unwrap();
        assert_eq!(red.channels(), 3);

        // Matching half stays black, differing half is pure red (BGR).
        let black = red.at_2d::<opencv::core::Vec3b>(10, 2).unwrap();
        assert_eq!(black.0, [0, 0, 0]);
        let red_px = red.at_2d::<opencv::core::Vec3b>(10, 15).unwrap();
        assert_eq!(red_px.0, [0, 0, 255]);
    }

    #[test]
    fn test_comparison_composite_dimensions() {
        let img = grayimage_to_mat(&GrayImage::from_pixel(40, 30, Luma([128]))).unwrap();
        let diff = absolute_diff(&img, &img).unwrap();
        let red = difference_image(&diff, 30).unwrap();

        let composite = comparison_image(&img, &img, &red, 100.0, true, 100.0).unwrap();
        assert_eq!(composite.rows(), 30);
        assert_eq!(composite.cols(), 120);
        assert_eq!(composite.channels(), 3);
    }
}
