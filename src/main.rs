use clap::Parser;
use image_similarity::config::Tuning;
use image_similarity::{compare_images, CompareOptions, Strategy};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "imsim")]
#[command(about = "Geometry-invariant image similarity comparison")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the first image
    img1: PathBuf,

    /// Path to the second image
    img2: PathBuf,

    /// Output directory for artifacts
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    /// Similarity threshold (0-100) for the similar verdict
    #[arg(short, long, default_value_t = 90.0)]
    threshold: f64,

    /// Alignment strategy: auto, center or feature
    #[arg(short, long, default_value = "auto")]
    align: String,

    /// Pixels with absolute difference above this value are marked red
    #[arg(long = "diff-threshold", default_value_t = 30)]
    diff_threshold: i32,

    /// Enable line-art (CAD) preprocessing
    #[arg(short, long)]
    cad: bool,

    /// Enhance line work instead of preserving original clarity
    #[arg(long = "cad-enhance")]
    cad_enhance: bool,

    /// Enable contour-shape matching
    #[arg(long)]
    contour: bool,

    /// Contour match acceptance threshold (0-1)
    #[arg(long = "contour-threshold", default_value_t = 0.8)]
    contour_threshold: f64,

    /// Display the comparison composite in a window
    #[arg(short, long)]
    show: bool,

    /// Write the report as JSON to this path
    #[arg(long)]
    json: Option<PathBuf>,

    /// Load pipeline tuning parameters from a TOML file
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let strategy: Strategy = cli.align.parse()?;
    let tuning = match &cli.config {
        Some(path) => Tuning::from_file(path)?,
        None => Tuning::default(),
    };

    let options = CompareOptions {
        output_dir: cli.output,
        threshold: cli.threshold,
        strategy,
        diff_threshold: cli.diff_threshold,
        cad: cli.cad,
        cad_enhance: cli.cad_enhance,
        contour_mode: cli.contour,
        contour_threshold: cli.contour_threshold,
        show_result: cli.show,
        tuning,
    };

    let report = compare_images(&cli.img1, &cli.img2, &options)?;

    println!("Structural similarity (SSIM): {:.2}%", report.ssim);
    println!("Pixel similarity: {:.2}%", report.pixel);
    if let Some(contour) = report.contour {
        println!("Contour similarity: {:.2}%", contour);
        println!(
            "Matched contours: {}",
            report.matched_contours.unwrap_or(0)
        );
    }
    println!("Combined similarity: {:.2}%", report.combined);
    println!(
        "Verdict: {} (threshold: {}%)",
        if report.similar { "similar" } else { "different" },
        report.threshold
    );

    if let Some(json_path) = cli.json {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(&json_path, json)?;
        println!("Report saved to {}", json_path.display());
    }

    Ok(())
}
