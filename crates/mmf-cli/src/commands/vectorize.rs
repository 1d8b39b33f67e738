use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use mmf_core::matrix::vectorize::{vectorize_dir, SampleMode, VectorizeOptions};
use mmf_core::pipeline::{Interrupt, StageContext};

use super::{ExperimentArgs, FormatArg};
use crate::progress::BarReporter;
use crate::summary::print_warnings;

#[derive(Args)]
pub struct VectorizeArgs {
    /// Directory of PNG frames
    pub dir: PathBuf,

    /// Output matrix file
    pub output: PathBuf,

    #[command(flatten)]
    pub experiment: ExperimentArgs,

    /// Binarize samples at the config threshold (pattern images)
    #[arg(long)]
    pub binarize: bool,

    /// Treat the directory as a pattern set and check its count
    #[arg(long)]
    pub patterns: bool,

    /// Matrix format (defaults to the config's storage format)
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,
}

pub fn run(args: &VectorizeArgs, interrupt: &Interrupt) -> Result<()> {
    let config = args.experiment.load()?;
    let mode = if args.binarize {
        SampleMode::Binarize(config.threshold)
    } else {
        SampleMode::Raw
    };
    let opts = VectorizeOptions {
        shape: config.frame,
        mode,
        chunk_images: config.chunks.vectorize_images,
        expected_count: args.patterns.then(|| config.pattern_count()),
        format: args.format.map(Into::into).unwrap_or(config.storage.format),
        space_margin: config.storage.space_margin,
    };

    let reporter = BarReporter::new();
    let summary = vectorize_dir(
        &args.dir,
        &args.output,
        &opts,
        StageContext::new(&reporter, interrupt),
    )?;

    println!(
        "Vectorized {} images into a {}x{} matrix at {}",
        summary.cols,
        summary.rows,
        summary.cols,
        summary.path.display()
    );
    print_warnings(&summary.warnings);

    Ok(())
}
