use anyhow::Result;
use clap::Args;
use mmf_core::pipeline::{run_rvitm, Interrupt, StageContext};

use super::ExperimentArgs;
use crate::progress::BarReporter;
use crate::summary::print_artifact;

#[derive(Args)]
pub struct RvitmArgs {
    #[command(flatten)]
    pub experiment: ExperimentArgs,

    /// Raise the pixel limit of the full estimate
    #[arg(long)]
    pub max_pixels: Option<usize>,
}

pub fn run(args: &RvitmArgs, interrupt: &Interrupt) -> Result<()> {
    let mut config = args.experiment.load()?;
    if let Some(limit) = args.max_pixels {
        config.chunks.rvitm_max_pixels = limit;
    }

    let reporter = BarReporter::new();
    let summary = run_rvitm(&config, StageContext::new(&reporter, interrupt))?;

    println!();
    print_artifact("RVITM", &summary.path);
    println!(
        "  {0}x{0} f32 in {1} row blocks x {2} column blocks",
        summary.pixels, summary.row_blocks, summary.col_blocks
    );
    println!();

    Ok(())
}
