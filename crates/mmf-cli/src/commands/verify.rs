use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use mmf_core::io::matrix::{MatrixFormat, MatrixReader};
use mmf_core::matrix::signed::verify_negation;
use mmf_core::pipeline::{Interrupt, StageContext};

use super::ExperimentArgs;
use crate::progress::BarReporter;
use crate::summary::print_warnings;

#[derive(Args)]
pub struct VerifyArgs {
    #[command(flatten)]
    pub experiment: ExperimentArgs,

    /// Pattern matrix to check (defaults to the build output)
    #[arg(long)]
    pub matrix: Option<PathBuf>,

    /// Random pattern indices sampled in addition to the quartiles
    #[arg(long)]
    pub samples: Option<usize>,

    /// Seed of the random sample
    #[arg(long)]
    pub seed: Option<u64>,
}

pub fn run(args: &VerifyArgs, interrupt: &Interrupt) -> Result<()> {
    let mut config = args.experiment.load()?;
    if let Some(samples) = args.samples {
        config.verification.random_samples = samples;
    }
    if let Some(seed) = args.seed {
        config.verification.seed = seed;
    }
    let path = args
        .matrix
        .clone()
        .unwrap_or_else(|| config.artifacts().hadamard_xt);

    let xt = match config.storage.format {
        MatrixFormat::Npy => MatrixReader::<i8>::open(&path),
        MatrixFormat::Raw => {
            MatrixReader::<i8>::open_raw(&path, 2 * config.pattern_count(), config.pixels())
        }
    }
    .with_context(|| format!("Failed to open pattern matrix {}", path.display()))?;

    let reporter = BarReporter::new();
    let report = verify_negation(
        &xt,
        config.frame,
        &config.verification,
        StageContext::new(&reporter, interrupt),
    )?;

    println!(
        "Checked {} pattern pairs over {} pixels: {} passed",
        report.checked.len(),
        report.window_pixels,
        report.passed()
    );
    if !report.failed.is_empty() {
        println!("  Failed indices: {:?}", report.failed);
    }
    print_warnings(&report.warnings);

    Ok(())
}
