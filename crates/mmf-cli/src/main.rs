mod commands;
mod progress;
mod summary;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mmf_core::pipeline::Interrupt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mmf", about = "Multimode-fiber Hadamard imaging tool")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print or save the default experiment config
    Config(commands::config::ConfigArgs),
    /// Render Hadamard H1/H2 pattern images
    Patterns(commands::patterns::PatternsArgs),
    /// Vectorize a directory of PNG frames into a matrix
    Vectorize(commands::vectorize::VectorizeArgs),
    /// Concatenate two matrices column-wise
    Concat(commands::concat::ConcatArgs),
    /// Build the pattern matrix and the intensity matrix
    Build(commands::build::BuildArgs),
    /// Rebuild the intensity matrix from kept temporaries
    Recover(commands::recover::RecoverArgs),
    /// Check that the H2 half of the pattern matrix negates H1
    Verify(commands::verify::VerifyArgs),
    /// Show shape and sampled statistics of a matrix file
    Inspect(commands::inspect::InspectArgs),
    /// Estimate the full transmission matrix
    Rvitm(commands::rvitm::RvitmArgs),
    /// Reconstruct input images from observed speckles
    Reconstruct(commands::reconstruct::ReconstructArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let interrupt = Interrupt::new();
    let handler = interrupt.clone();
    ctrlc::set_handler(move || handler.trigger()).context("Failed to install Ctrl-C handler")?;

    match &cli.command {
        Commands::Config(args) => commands::config::run(args),
        Commands::Patterns(args) => commands::patterns::run(args, &interrupt),
        Commands::Vectorize(args) => commands::vectorize::run(args, &interrupt),
        Commands::Concat(args) => commands::concat::run(args, &interrupt),
        Commands::Build(args) => commands::build::run(args, &interrupt),
        Commands::Recover(args) => commands::recover::run(args, &interrupt),
        Commands::Verify(args) => commands::verify::run(args, &interrupt),
        Commands::Inspect(args) => commands::inspect::run(args),
        Commands::Rvitm(args) => commands::rvitm::run(args, &interrupt),
        Commands::Reconstruct(args) => commands::reconstruct::run(args, &interrupt),
    }
}
