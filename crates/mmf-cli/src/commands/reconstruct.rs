use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use console::Style;
use mmf_core::pipeline::{
    collect_images, reconstruct_with_rvitm, run_reconstruct, Interrupt, StageContext,
};

use super::ExperimentArgs;
use crate::progress::BarReporter;
use crate::summary::print_warnings;

#[derive(Args)]
pub struct ReconstructArgs {
    /// Observed speckle images or directories of them
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    #[command(flatten)]
    pub experiment: ExperimentArgs,

    /// Use the stored full transmission matrix instead of the two-stage path
    #[arg(long)]
    pub rvitm: bool,

    /// Also save the real-valued reconstruction as a matrix
    #[arg(long)]
    pub save_raw: bool,
}

pub fn run(args: &ReconstructArgs, interrupt: &Interrupt) -> Result<()> {
    let mut config = args.experiment.load()?;
    if args.save_raw {
        config.storage.save_raw_reconstruction = true;
    }
    let images = collect_images(&args.inputs)?;

    let reporter = BarReporter::new();
    let ctx = StageContext::new(&reporter, interrupt);
    let summary = if args.rvitm {
        reconstruct_with_rvitm(&config, &images, ctx)?
    } else {
        run_reconstruct(&config, &images, ctx)?
    };

    let path = Style::new().underlined();
    println!();
    for outcome in &summary.outcomes {
        let range = outcome
            .range
            .map(|(lo, hi)| format!("[{lo:.3}, {hi:.3}]"))
            .unwrap_or_else(|| "n/a".into());
        println!(
            "  {} -> {}  range {}",
            outcome.source.display(),
            path.apply_to(outcome.image.display()),
            range
        );
        if let Some(ref raw) = outcome.raw {
            println!("      raw: {}", path.apply_to(raw.display()));
        }
    }
    println!();
    print_warnings(&summary.warnings);

    Ok(())
}
