pub mod config;
mod orchestrator;
pub mod types;

pub use orchestrator::{
    collect_images, rebuild_intensity, reconstruct_with_rvitm, run_build, run_reconstruct,
    run_rvitm, BuildSummary, ReconstructionSummary,
};
pub use types::{Interrupt, NoOpReporter, PipelineStage, ProgressReporter, StageContext};
