use anyhow::Result;
use clap::Args;
use mmf_core::pipeline::{rebuild_intensity, Interrupt, StageContext};

use super::ExperimentArgs;
use crate::progress::BarReporter;
use crate::summary::{print_artifact, print_warnings};

#[derive(Args)]
pub struct RecoverArgs {
    #[command(flatten)]
    pub experiment: ExperimentArgs,
}

pub fn run(args: &RecoverArgs, interrupt: &Interrupt) -> Result<()> {
    let config = args.experiment.load()?;
    let reporter = BarReporter::new();
    let summary = rebuild_intensity(&config, StageContext::new(&reporter, interrupt))?;

    println!();
    print_artifact("Intensity Y", &summary.path);
    println!(
        "  {}x{}, sampled range [{}, {}]",
        summary.rows, summary.cols, summary.range.0, summary.range.1
    );
    println!();
    print_warnings(&summary.warnings);

    Ok(())
}
