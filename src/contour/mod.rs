use crate::align::shape::contour_hu_moments;
use crate::preprocess::grayscale;
use crate::Result;
use opencv::core::{Mat, Point, Vector};
use opencv::imgproc;
use opencv::prelude::*;

/// One foreground region boundary with its derived scalar descriptors.
pub struct ContourDescriptor {
    pub points: Vector<Point>,
    pub area: f64,
    pub perimeter: f64,
    pub centroid: Point,
    pub hu: [f64; 7],
}

impl ContourDescriptor {
    fn from_points(points: Vector<Point>) -> Result<Self> {
        let area = imgproc::contour_area(&points, false)?;
        let perimeter = imgproc::arc_length(&points, true)?;
        let moments = imgproc::moments(&points, false)?;
        let centroid = if moments.m00 != 0.0 {
            Point::new(
                (moments.m10 / moments.m00) as i32,
                (moments.m01 / moments.m00) as i32,
            )
        } else {
            Point::new(0, 0)
        };
        let hu = contour_hu_moments(&points)?;

        Ok(Self {
            points,
            area,
            perimeter,
            centroid,
            hu,
        })
    }
}

/// A matched pair of contours (indices into the two descriptor slices) with
/// the combined similarity score that accepted it.
#[derive(Debug, Clone, Copy)]
pub struct ContourMatch {
    pub index1: usize,
    pub index2: usize,
    pub score: f64,
}

/// Extract external foreground contours above the minimum area. Input is
/// Otsu-binarized so the caller can pass either grayscale or color images.
pub fn extract_contours(img: &Mat, min_area: f64) -> Result<Vec<ContourDescriptor>> {
    let gray = grayscale(img)?;

    let mut binary = Mat::default();
    imgproc::threshold(
        &gray,
        &mut binary,
        127.0,
        255.0,
        imgproc::THRESH_BINARY + imgproc::THRESH_OTSU,
    )?;

    let mut raw = Vector::<Vector<Point>>::new();
    imgproc::find_contours(
        &binary,
        &mut raw,
        imgproc::RETR_EXTERNAL,
        imgproc::CHAIN_APPROX_SIMPLE,
        Point::new(0, 0),
    )?;

    let mut descriptors = Vec::new();
    for points in &raw {
        if imgproc::contour_area(&points, false)? > min_area {
            descriptors.push(ContourDescriptor::from_points(points)?);
        }
    }

    Ok(descriptors)
}

/// Combined pair score: mean of the negated log-Hu distance and the min/max
/// area and perimeter ratios. Higher is more alike; identical contours score
/// 2/3 because the Hu term contributes zero.
pub fn pair_score(a: &ContourDescriptor, b: &ContourDescriptor) -> f64 {
    let mut hu_distance = 0.0;
    for (h1, h2) in a.hu.iter().zip(b.hu.iter()) {
        hu_distance += ((h1.abs() + 1e-10).ln() - (h2.abs() + 1e-10).ln()).abs();
    }

    let area_ratio = if a.area.max(b.area) > 0.0 {
        a.area.min(b.area) / a.area.max(b.area)
    } else {
        0.0
    };
    let perimeter_ratio = if a.perimeter.max(b.perimeter) > 0.0 {
        a.perimeter.min(b.perimeter) / a.perimeter.max(b.perimeter)
    } else {
        0.0
    };

    (-hu_distance + area_ratio + perimeter_ratio) / 3.0
}

/// Greedy bipartite matching: for each contour of image 1 in order, take the
/// best-scoring unused contour of image 2, accepting only scores above the
/// threshold. The result is injective but not globally optimal.
pub fn match_contours(
    set1: &[ContourDescriptor],
    set2: &[ContourDescriptor],
    threshold: f64,
) -> Vec<ContourMatch> {
    let mut matches = Vec::new();
    let mut used = vec![false; set2.len()];

    for (i, a) in set1.iter().enumerate() {
        let mut best: Option<(usize, f64)> = None;
        for (j, b) in set2.iter().enumerate() {
            if used[j] {
                continue;
            }
            let score = pair_score(a, b);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((j, score));
            }
        }

        if let Some((j, score)) = best {
            if score > threshold {
                used[j] = true;
                matches.push(ContourMatch {
                    index1: i,
                    index2: j,
                    score,
                });
            }
        }
    }

    matches
}

/// Average accepted match score scaled to 0-100; zero when nothing matched.
pub fn contour_similarity(matches: &[ContourMatch]) -> f64 {
    if matches.is_empty() {
        return 0.0;
    }
    let total: f64 = matches.iter().map(|m| m.score).sum();
    (total / matches.len() as f64) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::grayimage_to_mat;
    use image::{GrayImage, Luma};

    fn shapes_image(rects: &[(u32, u32, u32, u32)]) -> Mat {
        let img = GrayImage::from_fn(200, 200, |x, y| {
            for &(left, top, w, h) in rects {
                if x >= left && x < left + w && y >= top && y < top + h {
                    return Luma([255]);
                }
            }
            Luma([0])
        });
        grayimage_to_mat(&img).unwrap()
    }

    #[test]
    fn test_small_speckles_are_filtered() {
        // One large shape plus a speckle well below the area floor.
        let img = shapes_image(&[(50, 50, 60, 60), (10, 10, 3, 3)]);
        let contours = extract_contours(&img, 100.0).unwrap();
        assert_eq!(contours.len(), 1);
        assert!(contours[0].area > 100.0);
    }

    #[test]
    fn test_identical_contours_score_two_thirds() {
        let img = shapes_image(&[(50, 50, 60, 60)]);
        let contours = extract_contours(&img, 100.0).unwrap();
        let score = pair_score(&contours[0], &contours[0]);
        assert!((score - 2.0 / 3.0).abs() < 1e-9, "score = {}", score);
    }

    #[test]
    fn test_greedy_matching_is_injective() {
        let set1 = extract_contours(
            &shapes_image(&[(10, 10, 40, 40), (80, 10, 40, 40), (10, 80, 40, 40)]),
            100.0,
        )
        .unwrap();
        let set2 = extract_contours(
            &shapes_image(&[(20, 20, 40, 40), (100, 30, 40, 40)]),
            100.0,
        )
        .unwrap();
        assert_eq!(set1.len(), 3);
        assert_eq!(set2.len(), 2);

        // Low threshold so every candidate is eligible.
        let matches = match_contours(&set1, &set2, 0.1);
        assert!(matches.len() <= set2.len());

        let mut seen = std::collections::HashSet::new();
        for m in &matches {
            assert!(seen.insert(m.index2), "contour {} matched twice", m.index2);
        }
    }

    #[test]
    fn test_high_threshold_rejects_all_matches() {
        let set1 = extract_contours(&shapes_image(&[(10, 10, 40, 40)]), 100.0).unwrap();
        let set2 = extract_contours(&shapes_image(&[(20, 20, 40, 40)]), 100.0).unwrap();

        // Even identical shapes top out at 2/3.
        let matches = match_contours(&set1, &set2, 0.8);
        assert!(matches.is_empty());
        assert_eq!(contour_similarity(&matches), 0.0);
    }

    #[test]
    fn test_contour_similarity_averages_scores() {
        let matches = vec![
            ContourMatch {
                index1: 0,
                index2: 0,
                score: 0.6,
            },
            ContourMatch {
                index1: 1,
                index2: 1,
                score: 0.4,
            },
        ];
        assert!((contour_similarity(&matches) - 50.0).abs() < 1e-9);
    }
}
