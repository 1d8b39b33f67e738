//! Out-of-core builders for the pattern matrix Xᵗ and the intensity matrix Y.

pub mod checks;
pub mod concat;
pub mod intensity;
pub mod signed;
pub mod vectorize;

pub use concat::{concat_columns, ConcatOptions, ConcatSummary};
pub use intensity::{
    build_intensity_matrix, rebuild_from_temporaries, IntensityOptions, IntensityPaths,
    IntensitySummary,
};
pub use signed::{build_signed_matrix, verify_negation, NegationReport, PatternRows, SignedOptions};
pub use vectorize::{vectorize_dir, vectorize_images, SampleMode, VectorizeOptions};
