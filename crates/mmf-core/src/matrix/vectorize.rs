use std::path::{Path, PathBuf};

use ndarray::Array2;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{raise, MmfError, Result, Warning};
use crate::frame::{Frame, FrameShape, SpeckleEncoding};
use crate::hadamard::is_power_of_two;
use crate::io::disk::remove_stale;
use crate::io::frames::list_frames;
use crate::io::image_io::{check_shape, image_shape, load_gray_expected};
use crate::io::matrix::MatrixFormat;
use crate::io::matrix_writer::MatrixWriter;
use crate::pipeline::types::{PipelineStage, StageContext};

/// How image samples are stored in the vectorized matrix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleMode {
    /// `1` where the sample exceeds the threshold, else `0`.
    Binarize(u8),
    /// Gray levels 0–255 unchanged.
    Raw,
}

impl SampleMode {
    /// Storage mode for speckle responses under `encoding`.
    pub fn for_speckles(encoding: SpeckleEncoding, threshold: u8) -> Self {
        match encoding {
            SpeckleEncoding::Raw => Self::Raw,
            SpeckleEncoding::Binarized => Self::Binarize(threshold),
        }
    }

    pub fn apply(&self, frame: Frame) -> Frame {
        match *self {
            Self::Binarize(threshold) => frame.binarized(threshold),
            Self::Raw => frame,
        }
    }
}

#[derive(Clone, Debug)]
pub struct VectorizeOptions {
    pub shape: FrameShape,
    pub mode: SampleMode,
    /// Images decoded per chunk.
    pub chunk_images: usize,
    /// Pattern order the set is expected to have; checked for pattern sets.
    pub expected_count: Option<usize>,
    pub format: MatrixFormat,
    pub space_margin: f64,
}

#[derive(Clone, Debug)]
pub struct VectorizeSummary {
    pub path: PathBuf,
    /// Pixels per image, M.
    pub rows: usize,
    /// Images, N.
    pub cols: usize,
    pub warnings: Vec<Warning>,
}

/// Vectorize every PNG of `dir` in acquisition order.
pub fn vectorize_dir(
    dir: &Path,
    out: &Path,
    opts: &VectorizeOptions,
    ctx: StageContext<'_>,
) -> Result<VectorizeSummary> {
    let list = list_frames(dir)?;
    let mut summary = vectorize_images(&list.paths, out, opts, ctx)?;
    let mut warnings = list.warnings;
    warnings.append(&mut summary.warnings);
    summary.warnings = warnings;
    Ok(summary)
}

/// Write an (H·W, N) matrix whose column i is the raster flattening of
/// image i.
///
/// Every image header is checked against the expected shape before the
/// output is created, so a bad image aborts the stage with nothing on disk.
pub fn vectorize_images(
    paths: &[PathBuf],
    out: &Path,
    opts: &VectorizeOptions,
    ctx: StageContext<'_>,
) -> Result<VectorizeSummary> {
    if paths.is_empty() {
        return Err(MmfError::EmptySequence);
    }
    if opts.chunk_images == 0 {
        return Err(MmfError::InvalidConfig(
            "vectorization chunk must hold at least one image".into(),
        ));
    }
    remove_stale(out)?;

    for path in paths {
        check_shape(path, opts.shape, image_shape(path)?)?;
    }

    let rows = opts.shape.pixels();
    let cols = paths.len();
    let mut warnings = Vec::new();
    if let Some(expected) = opts.expected_count {
        if !is_power_of_two(cols) {
            raise(&mut warnings, Warning::NonPowerOfTwoPatterns { count: cols });
        }
        if cols != expected {
            raise(
                &mut warnings,
                Warning::PatternOrderMismatch {
                    expected,
                    actual: cols,
                },
            );
        }
    }

    info!(
        out = %out.display(),
        images = cols,
        shape = %opts.shape,
        mode = ?opts.mode,
        "Vectorizing images"
    );

    let mut writer = MatrixWriter::<u8>::create(out, rows, cols, opts.format, opts.space_margin)?;
    let chunks = cols.div_ceil(opts.chunk_images);
    ctx.reporter
        .begin_stage(PipelineStage::Vectorizing, Some(cols));

    for (chunk, batch) in paths.chunks(opts.chunk_images).enumerate() {
        ctx.interrupt.check(PipelineStage::Vectorizing)?;
        let first = chunk * opts.chunk_images;

        let frames: Vec<Frame> = batch
            .par_iter()
            .map(|path| load_gray_expected(path, opts.shape).map(|f| opts.mode.apply(f)))
            .collect::<Result<_>>()?;

        let mut block = Array2::<u8>::zeros((rows, batch.len()));
        for (i, frame) in frames.iter().enumerate() {
            for (dst, &src) in block.column_mut(i).iter_mut().zip(frame.data.iter()) {
                *dst = src;
            }
        }

        writer.write_block(0, first, block.view())?;
        writer.flush()?;
        debug!(chunk, chunks, first, count = batch.len(), "Vectorized chunk");
        ctx.reporter.advance(first + batch.len());
    }

    let path = writer.finalize()?;
    ctx.reporter.finish_stage();

    Ok(VectorizeSummary {
        path,
        rows,
        cols,
        warnings,
    })
}
