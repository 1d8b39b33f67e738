pub mod build;
pub mod concat;
pub mod config;
pub mod inspect;
pub mod patterns;
pub mod reconstruct;
pub mod recover;
pub mod rvitm;
pub mod vectorize;
pub mod verify;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use mmf_core::io::matrix::{DType, MatrixFormat};
use mmf_core::pipeline::config::ExperimentConfig;
use tracing::debug;

/// Where the experiment config comes from.
#[derive(Args)]
pub struct ExperimentArgs {
    /// Experiment config file (TOML); defaults apply when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the output directory
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}

impl ExperimentArgs {
    pub fn load(&self) -> Result<ExperimentConfig> {
        let mut config = match self.config {
            Some(ref path) => {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                debug!(path = %path.display(), "Loading experiment config");
                toml::from_str(&contents)
                    .with_context(|| format!("Invalid experiment config {}", path.display()))?
            }
            None => ExperimentConfig::default(),
        };
        if let Some(ref dir) = self.output_dir {
            config.paths.output_dir = dir.clone();
        }
        config.validate().context("Invalid experiment config")?;
        Ok(config)
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum FormatArg {
    Npy,
    Raw,
}

impl From<FormatArg> for MatrixFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Npy => MatrixFormat::Npy,
            FormatArg::Raw => MatrixFormat::Raw,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum DTypeArg {
    U8,
    I8,
    I16,
    F32,
}

impl From<DTypeArg> for DType {
    fn from(arg: DTypeArg) -> Self {
        match arg {
            DTypeArg::U8 => DType::U8,
            DTypeArg::I8 => DType::I8,
            DTypeArg::I16 => DType::I16,
            DTypeArg::F32 => DType::F32,
        }
    }
}
