use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use mmf_core::io::matrix::MatrixFormat;
use mmf_core::matrix::checks::{inspect_file, RawLayout};

use super::{DTypeArg, FormatArg};
use crate::summary::print_matrix_stats;

#[derive(Args)]
pub struct InspectArgs {
    /// Matrix files to inspect
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// File format
    #[arg(long, value_enum, default_value = "npy")]
    pub format: FormatArg,

    /// Element type of raw files
    #[arg(long, value_enum)]
    pub dtype: Option<DTypeArg>,

    /// Row count of raw files
    #[arg(long)]
    pub rows: Option<usize>,

    /// Column count of raw files
    #[arg(long)]
    pub cols: Option<usize>,
}

pub fn run(args: &InspectArgs) -> Result<()> {
    let format: MatrixFormat = args.format.into();
    let raw = match format {
        MatrixFormat::Npy => None,
        MatrixFormat::Raw => match (args.dtype, args.rows, args.cols) {
            (Some(dtype), Some(rows), Some(cols)) => Some(RawLayout {
                dtype: dtype.into(),
                rows,
                cols,
            }),
            _ => bail!("raw files need --dtype, --rows and --cols"),
        },
    };

    for file in &args.files {
        let stats = inspect_file(file, format, raw)
            .with_context(|| format!("Failed to inspect {}", file.display()))?;
        print_matrix_stats(&stats);
    }

    Ok(())
}
