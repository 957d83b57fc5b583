use super::{AlignKind, AlignmentMethod};
use crate::Result;
use opencv::core::{Mat, Point, Scalar, Vector};
use opencv::imgproc;
use opencv::prelude::*;

/// Hu-moment shape alignment: compares the largest external contour of both
/// images by rotation/scale/translation-invariant moments and, when the
/// shapes agree, derives a similarity transform from their minimum-area
/// bounding rectangles.
pub struct ShapeAlign {
    max_distance: f64,
}

impl ShapeAlign {
    pub fn new(max_distance: f64) -> Self {
        Self { max_distance }
    }

    fn largest_contour(gray: &Mat) -> Result<Option<Vector<Point>>> {
        let mut binary = Mat::default();
        imgproc::threshold(gray, &mut binary, 127.0, 255.0, imgproc::THRESH_BINARY)?;

        let mut contours = Vector::<Vector<Point>>::new();
        imgproc::find_contours(
            &binary,
            &mut contours,
            imgproc::RETR_EXTERNAL,
            imgproc::CHAIN_APPROX_SIMPLE,
            Point::new(0, 0),
        )?;

        let mut best: Option<(f64, Vector<Point>)> = None;
        for contour in &contours {
            let area = imgproc::contour_area(&contour, false)?;
            if best.as_ref().map_or(true, |(a, _)| area > *a) {
                best = Some((area, contour));
            }
        }

        Ok(best.map(|(_, c)| c))
    }

    fn try_shape_transform(
        &self,
        img1: &Mat,
        img2: &Mat,
        gray1: &Mat,
        gray2: &Mat,
    ) -> Result<Option<Mat>> {
        let (c1, c2) = match (Self::largest_contour(gray1)?, Self::largest_contour(gray2)?) {
            (Some(c1), Some(c2)) => (c1, c2),
            _ => return Ok(None),
        };

        let distance = log_hu_distance(&c1, &c2)?;
        if !(distance < self.max_distance) {
            tracing::debug!(distance, "shapes too dissimilar for moment alignment");
            return Ok(None);
        }

        let rect1 = imgproc::min_area_rect(&c1)?;
        let rect2 = imgproc::min_area_rect(&c2)?;

        let size1 = rect1.size;
        let size2 = rect2.size;
        let scale_x = if size1.width > 0.0 { size2.width / size1.width } else { 1.0 };
        let scale_y = if size1.height > 0.0 { size2.height / size1.height } else { 1.0 };
        let scale = ((scale_x + scale_y) / 2.0) as f64;

        let angle_diff = (rect2.angle - rect1.angle) as f64;
        let dx = (rect2.center.x - rect1.center.x) as f64;
        let dy = (rect2.center.y - rect1.center.y) as f64;

        // Rotate and scale about contour 1's center, then translate onto
        // contour 2's center.
        let mut transform = imgproc::get_rotation_matrix_2d(rect1.center, angle_diff, scale)?;
        *transform.at_2d_mut::<f64>(0, 2)? += dx;
        *transform.at_2d_mut::<f64>(1, 2)? += dy;

        let mut warped = Mat::default();
        imgproc::warp_affine(
            img1,
            &mut warped,
            &transform,
            img2.size()?,
            imgproc::INTER_LINEAR,
            opencv::core::BORDER_CONSTANT,
            Scalar::all(0.0),
        )?;

        Ok(Some(warped))
    }
}

impl AlignmentMethod for ShapeAlign {
    fn name(&self) -> &str {
        "hu-moment-shape"
    }

    fn kind(&self) -> AlignKind {
        AlignKind::Shape
    }

    fn attempt(&self, img1: &Mat, img2: &Mat, gray1: &Mat, gray2: &Mat) -> Result<Option<Mat>> {
        match self.try_shape_transform(img1, img2, gray1, gray2) {
            Ok(result) => Ok(result),
            Err(e) => {
                tracing::debug!(error = %e, "shape alignment failed");
                Ok(None)
            }
        }
    }
}

/// Summed absolute distance between the log-scaled Hu moments of two
/// contours. Small values mean similar shape regardless of pose.
pub fn log_hu_distance(c1: &Vector<Point>, c2: &Vector<Point>) -> Result<f64> {
    let hu1 = contour_hu_moments(c1)?;
    let hu2 = contour_hu_moments(c2)?;

    let mut distance = 0.0;
    for (h1, h2) in hu1.iter().zip(hu2.iter()) {
        distance += ((h1.abs() + 1e-10).ln() - (h2.abs() + 1e-10).ln()).abs();
    }
    Ok(distance)
}

pub fn contour_hu_moments(contour: &Vector<Point>) -> Result<[f64; 7]> {
    let moments = imgproc::moments(contour, false)?;
    let mut hu = [0f64; 7];
    imgproc::hu_moments(moments, &mut hu)?;
    Ok(hu)
}
