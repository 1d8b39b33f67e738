//! Correlation, reconstruction and the full transmission-matrix estimate.

pub mod image;
pub mod normalize;
pub mod transmission;

pub use image::{reconstruct_image, ReconstructOptions, ReconstructionInputs, ReconstructionOutcome};
pub use transmission::{
    apply_rvitm, correlate, estimate_rvitm, reconstruct_stage, reconstruct_vector, two_stage,
    BlockPlan, RvitmOptions, RvitmSummary,
};
