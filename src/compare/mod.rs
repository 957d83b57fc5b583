use crate::align::{AlignKind, Aligner};
use crate::config::CompareOptions;
use crate::preprocess::{grayscale, preprocess_line_art};
use crate::{contour, metrics, utils, visualize};
use crate::Result;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Final output of one comparison run. Immutable once produced.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarityReport {
    pub image1: PathBuf,
    pub image2: PathBuf,
    /// Structural similarity, 0-100.
    pub ssim: f64,
    /// Pixel-difference similarity, 0-100.
    pub pixel: f64,
    /// Contour similarity, 0-100; present only in contour mode.
    pub contour: Option<f64>,
    pub matched_contours: Option<usize>,
    pub combined: f64,
    pub similar: bool,
    pub threshold: f64,
    pub strategy: AlignKind,
    pub alignment_confidence: f64,
    pub artifacts: Vec<PathBuf>,
}

/// Compare two images end to end: preprocess, align, score, emit artifacts.
///
/// Input errors (missing or undecodable files) abort before anything is
/// written. Alignment-method failures are recovered internally; artifact
/// write failures are logged per file and skipped.
pub fn compare_images(
    img1_path: &Path,
    img2_path: &Path,
    options: &CompareOptions,
) -> Result<SimilarityReport> {
    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("compare", run_id = %run_id);
    let _guard = span.enter();

    let mut options = options.clone();
    options.apply_cad_policy();

    let img1 = utils::load_image(img1_path)?;
    let img2 = utils::load_image(img2_path)?;
    tracing::info!(
        image1 = %img1_path.display(),
        image2 = %img2_path.display(),
        strategy = %options.strategy,
        "starting comparison"
    );

    fs::create_dir_all(&options.output_dir)?;

    let (img1, img2) = if options.cad {
        tracing::info!(enhance = options.cad_enhance, "preprocessing line-art input");
        (
            preprocess_line_art(&img1, options.cad_enhance)?,
            preprocess_line_art(&img2, options.cad_enhance)?,
        )
    } else {
        (img1, img2)
    };

    let (img1, img2) = utils::resize_to_common(&img1, &img2)?;

    let aligner = Aligner::new(&options.tuning);
    let pair = aligner.align(&img1, &img2, options.strategy)?;
    tracing::info!(
        strategy = %pair.kind,
        confidence = pair.confidence,
        "alignment complete"
    );

    let gray1 = grayscale(&pair.image1)?;
    let gray2 = grayscale(&pair.image2)?;

    let ssim_pct = metrics::ssim(&gray1, &gray2)? * 100.0;
    let diff = metrics::absolute_diff(&gray1, &gray2)?;
    let pixel_pct = metrics::pixel_similarity(&diff)?;

    let contour_result = if options.contour_mode {
        let set1 = contour::extract_contours(&pair.image1, options.tuning.min_contour_area)?;
        let set2 = contour::extract_contours(&pair.image2, options.tuning.min_contour_area)?;
        let matches = contour::match_contours(&set1, &set2, options.contour_threshold);
        let similarity = contour::contour_similarity(&matches);
        tracing::info!(
            contours1 = set1.len(),
            contours2 = set2.len(),
            matched = matches.len(),
            similarity,
            "contour matching complete"
        );
        Some((set1, set2, matches, similarity))
    } else {
        None
    };

    let combined = match &contour_result {
        Some((_, _, _, contour_pct)) => {
            metrics::combine_with_contours(*contour_pct, ssim_pct, pixel_pct, options.cad)
        }
        None => metrics::combine(ssim_pct, pixel_pct),
    };
    let similar = combined >= options.threshold;

    let stem1 = utils::file_stem(img1_path);
    let stem2 = utils::file_stem(img2_path);
    let pair_name = format!("{}_{}", stem1, stem2);

    let mut artifacts = Vec::new();
    visualize::persist(
        &options.output_dir.join(format!("{}_aligned.png", stem1)),
        &pair.image1,
        &mut artifacts,
    );
    visualize::persist(
        &options.output_dir.join(format!("{}_aligned.png", stem2)),
        &pair.image2,
        &mut artifacts,
    );

    let diff_red = visualize::difference_image(&diff, options.diff_threshold)?;
    visualize::persist(
        &options.output_dir.join(format!("{}_diff_red.png", pair_name)),
        &diff_red,
        &mut artifacts,
    );
    visualize::persist(
        &options
            .output_dir
            .join(format!("{}_diff_heatmap.png", pair_name)),
        &visualize::heatmap_image(&diff)?,
        &mut artifacts,
    );

    let composite =
        visualize::comparison_image(&gray1, &gray2, &diff_red, combined, similar, ssim_pct)?;
    visualize::persist(
        &options
            .output_dir
            .join(format!("{}_comparison.png", pair_name)),
        &composite,
        &mut artifacts,
    );

    let (contour_pct, match_count) = match &contour_result {
        Some((set1, set2, matches, similarity)) => {
            if !matches.is_empty() {
                let vis = visualize::contour_matches_image(
                    &pair.image1,
                    &pair.image2,
                    set1,
                    set2,
                    matches,
                )?;
                visualize::persist(
                    &options
                        .output_dir
                        .join(format!("{}_contour_matches.png", pair_name)),
                    &vis,
                    &mut artifacts,
                );
            }
            (Some(*similarity), Some(matches.len()))
        }
        None => (None, None),
    };

    let mut report = SimilarityReport {
        image1: img1_path.to_path_buf(),
        image2: img2_path.to_path_buf(),
        ssim: ssim_pct,
        pixel: pixel_pct,
        contour: contour_pct,
        matched_contours: match_count,
        combined,
        similar,
        threshold: options.threshold,
        strategy: pair.kind,
        alignment_confidence: pair.confidence,
        artifacts,
    };

    let result_path = options.output_dir.join(format!("{}_result.txt", pair_name));
    match fs::write(&result_path, visualize::render_report(&report)) {
        Ok(()) => report.artifacts.push(result_path),
        Err(e) => {
            tracing::warn!(path = %result_path.display(), error = %e, "failed to write result file")
        }
    }

    tracing::info!(
        ssim = ssim_pct,
        pixel = pixel_pct,
        combined,
        similar,
        "comparison finished"
    );

    if options.show_result {
        opencv::highgui::imshow("Comparison Result", &composite)?;
        opencv::highgui::wait_key(0)?;
        opencv::highgui::destroy_all_windows()?;
    }

    Ok(report)
}
