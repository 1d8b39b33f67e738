use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, ValueEnum};
use mmf_core::hadamard::{save_patterns, PatternLayout, PatternSet};
use mmf_core::pipeline::{Interrupt, StageContext};

use super::ExperimentArgs;
use crate::progress::BarReporter;

#[derive(Clone, Copy, ValueEnum)]
pub enum SetArg {
    H1,
    H2,
    Both,
}

#[derive(Args)]
pub struct PatternsArgs {
    #[command(flatten)]
    pub experiment: ExperimentArgs,

    /// Which pattern set to render
    #[arg(long, value_enum, default_value = "both")]
    pub set: SetArg,

    /// Directory for H1 images (defaults to the config's pattern H1 dir)
    #[arg(long)]
    pub h1_dir: Option<PathBuf>,

    /// Directory for H2 images (defaults to the config's pattern H2 dir)
    #[arg(long)]
    pub h2_dir: Option<PathBuf>,
}

pub fn run(args: &PatternsArgs, interrupt: &Interrupt) -> Result<()> {
    let config = args.experiment.load()?;
    let layout = PatternLayout::new(config.pattern_size, config.frame)?;
    let reporter = BarReporter::new();
    let ctx = StageContext::new(&reporter, interrupt);

    let h1_dir = args.h1_dir.clone().unwrap_or(config.paths.patterns_h1.clone());
    let h2_dir = args.h2_dir.clone().unwrap_or(config.paths.patterns_h2.clone());
    let targets = match args.set {
        SetArg::H1 => vec![(PatternSet::H1, h1_dir)],
        SetArg::H2 => vec![(PatternSet::H2, h2_dir)],
        SetArg::Both => vec![(PatternSet::H1, h1_dir), (PatternSet::H2, h2_dir)],
    };

    println!(
        "Hadamard patterns: {0}x{0} cells, scale {1}, frame {2}",
        layout.size, layout.scale, config.frame
    );
    for (set, dir) in targets {
        let summary = save_patterns(&dir, set, &layout, ctx)?;
        println!(
            "  {}: {} patterns saved to {}",
            summary.set,
            summary.count,
            summary.dir.display()
        );
    }

    Ok(())
}
