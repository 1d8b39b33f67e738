use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::Args;
use mmf_core::io::matrix::{read_npy_header, DType, Element, MatrixFormat, MatrixReader};
use mmf_core::matrix::concat::{concat_columns, ConcatOptions, ConcatSummary};
use mmf_core::pipeline::{Interrupt, StageContext};

use super::{DTypeArg, ExperimentArgs, FormatArg};
use crate::progress::BarReporter;

#[derive(Args)]
pub struct ConcatArgs {
    /// Left matrix
    pub left: PathBuf,

    /// Right matrix
    pub right: PathBuf,

    /// Output matrix
    pub output: PathBuf,

    #[command(flatten)]
    pub experiment: ExperimentArgs,

    /// Input and output format
    #[arg(long, value_enum, default_value = "npy")]
    pub format: FormatArg,

    /// Element type of raw inputs
    #[arg(long, value_enum)]
    pub dtype: Option<DTypeArg>,

    /// Row count of raw inputs
    #[arg(long)]
    pub rows: Option<usize>,

    /// Column count of the left raw input
    #[arg(long)]
    pub left_cols: Option<usize>,

    /// Column count of the right raw input
    #[arg(long)]
    pub right_cols: Option<usize>,

    /// Rows copied per chunk (defaults to the config's concat chunk)
    #[arg(long)]
    pub chunk_rows: Option<usize>,
}

struct RawShapes {
    rows: usize,
    left_cols: usize,
    right_cols: usize,
}

fn concat_typed<T: Element>(
    args: &ConcatArgs,
    raw: Option<&RawShapes>,
    opts: &ConcatOptions,
    ctx: StageContext<'_>,
) -> Result<ConcatSummary> {
    let open = |path: &Path, cols: usize| match raw {
        Some(shape) => MatrixReader::<T>::open_raw(path, shape.rows, cols),
        None => MatrixReader::<T>::open(path),
    };
    let (left_cols, right_cols) = raw.map_or((0, 0), |s| (s.left_cols, s.right_cols));
    let left = open(&args.left, left_cols)?;
    let right = open(&args.right, right_cols)?;
    Ok(concat_columns(&left, &right, &args.output, opts, ctx)?)
}

pub fn run(args: &ConcatArgs, interrupt: &Interrupt) -> Result<()> {
    let config = args.experiment.load()?;
    let format: MatrixFormat = args.format.into();

    let (dtype, raw) = match format {
        MatrixFormat::Npy => {
            let left = read_npy_header(&args.left)?;
            let right = read_npy_header(&args.right)?;
            if left.dtype != right.dtype {
                bail!(
                    "dtype mismatch: {} is {}, {} is {}",
                    args.left.display(),
                    left.dtype,
                    args.right.display(),
                    right.dtype
                );
            }
            (left.dtype, None)
        }
        MatrixFormat::Raw => match (args.dtype, args.rows, args.left_cols, args.right_cols) {
            (Some(dtype), Some(rows), Some(left_cols), Some(right_cols)) => (
                DType::from(dtype),
                Some(RawShapes {
                    rows,
                    left_cols,
                    right_cols,
                }),
            ),
            _ => bail!("raw inputs need --dtype, --rows, --left-cols and --right-cols"),
        },
    };

    let opts = ConcatOptions {
        chunk_rows: args.chunk_rows.unwrap_or(config.chunks.concat_rows),
        progress_every: config.chunks.progress_every,
        format,
        space_margin: config.storage.space_margin,
    };
    let reporter = BarReporter::new();
    let ctx = StageContext::new(&reporter, interrupt);
    let raw = raw.as_ref();

    let summary = match dtype {
        DType::U8 => concat_typed::<u8>(args, raw, &opts, ctx)?,
        DType::I8 => concat_typed::<i8>(args, raw, &opts, ctx)?,
        DType::I16 => concat_typed::<i16>(args, raw, &opts, ctx)?,
        DType::F32 => concat_typed::<f32>(args, raw, &opts, ctx)?,
    };

    println!(
        "Concatenated {}x{} {} matrix in {} chunks: {}",
        summary.rows,
        summary.cols,
        dtype,
        summary.chunks,
        summary.path.display()
    );

    Ok(())
}
