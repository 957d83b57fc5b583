pub mod align;
pub mod compare;
pub mod config;
pub mod contour;
pub mod metrics;
pub mod preprocess;
pub mod utils;
pub mod visualize;

pub use align::{AlignKind, AlignedPair, Aligner};
pub use compare::{compare_images, SimilarityReport};
pub use config::{CompareOptions, Strategy};

pub type Result<T> = anyhow::Result<T>;
