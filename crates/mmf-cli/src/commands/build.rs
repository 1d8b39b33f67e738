use anyhow::Result;
use clap::Args;
use mmf_core::pipeline::{run_build, Interrupt, StageContext};

use super::ExperimentArgs;
use crate::progress::BarReporter;
use crate::summary::{print_artifact, print_experiment_summary, print_warnings};

#[derive(Args)]
pub struct BuildArgs {
    #[command(flatten)]
    pub experiment: ExperimentArgs,

    /// Keep vectorized inputs and staged intensity halves
    #[arg(long)]
    pub keep_temporaries: bool,
}

pub fn run(args: &BuildArgs, interrupt: &Interrupt) -> Result<()> {
    let mut config = args.experiment.load()?;
    if args.keep_temporaries {
        config.storage.keep_temporaries = true;
    }
    print_experiment_summary("Matrix Build", &config);

    let reporter = BarReporter::new();
    let summary = run_build(&config, StageContext::new(&reporter, interrupt))?;

    println!();
    print_artifact("Pattern Xt", &summary.hadamard_xt);
    print_artifact("Intensity Y", &summary.intensity_y);
    print_artifact("Baseline", &summary.baseline);
    println!(
        "  N = {}, M = {}, negation check {}/{} passed, intensity range [{}, {}]",
        summary.patterns,
        summary.pixels,
        summary.negation.passed(),
        summary.negation.checked.len(),
        summary.intensity_range.0,
        summary.intensity_range.1
    );
    println!();
    print_warnings(&summary.warnings);

    Ok(())
}
