use std::path::{Path, PathBuf};

use ndarray::{concatenate, Axis};
use tracing::info;

use crate::error::{MmfError, Result};
use crate::io::matrix::{Element, MatrixFormat, MatrixReader};
use crate::io::matrix_writer::MatrixWriter;
use crate::pipeline::types::{PipelineStage, StageContext};

#[derive(Clone, Debug)]
pub struct ConcatOptions {
    /// Rows copied per chunk.
    pub chunk_rows: usize,
    /// Log progress every this many chunks.
    pub progress_every: usize,
    pub format: MatrixFormat,
    pub space_margin: f64,
}

#[derive(Clone, Debug)]
pub struct ConcatSummary {
    pub path: PathBuf,
    pub rows: usize,
    pub cols: usize,
    pub chunks: usize,
}

/// Place `a` (r×c1) and `b` (r×c2) side by side into an r×(c1+c2) matrix
/// at `out`, one row chunk at a time. Each chunk is synced before the next
/// one is read.
pub fn concat_columns<T: Element>(
    a: &MatrixReader<T>,
    b: &MatrixReader<T>,
    out: &Path,
    opts: &ConcatOptions,
    ctx: StageContext<'_>,
) -> Result<ConcatSummary> {
    if a.rows() != b.rows() {
        return Err(MmfError::ShapeMismatch {
            stage: PipelineStage::Concatenating.name(),
            dimension: format!(
                "row count of {} vs {}",
                a.path().display(),
                b.path().display()
            ),
            expected: a.rows(),
            actual: b.rows(),
        });
    }
    if opts.chunk_rows == 0 {
        return Err(MmfError::InvalidConfig(
            "concatenation chunk must hold at least one row".into(),
        ));
    }

    let rows = a.rows();
    let cols = a.cols() + b.cols();
    let chunks = rows.div_ceil(opts.chunk_rows);
    let every = opts.progress_every.max(1);
    info!(
        out = %out.display(),
        rows,
        left = a.cols(),
        right = b.cols(),
        chunk_rows = opts.chunk_rows,
        chunks,
        "Concatenating matrices"
    );

    let mut writer = MatrixWriter::<T>::create(out, rows, cols, opts.format, opts.space_margin)?;
    ctx.reporter
        .begin_stage(PipelineStage::Concatenating, Some(chunks));

    for chunk in 0..chunks {
        ctx.interrupt.check(PipelineStage::Concatenating)?;
        let start = chunk * opts.chunk_rows;
        let count = opts.chunk_rows.min(rows - start);

        let left = a.read_rows(start, count)?;
        let right = b.read_rows(start, count)?;
        let joined = concatenate(Axis(1), &[left.view(), right.view()])?;
        writer.write_rows(start, joined.view())?;
        writer.flush()?;

        if chunk % every == 0 || chunk + 1 == chunks {
            info!(
                chunk = chunk + 1,
                chunks,
                rows_done = start + count,
                "Concatenation progress"
            );
        }
        ctx.reporter.advance(chunk + 1);
    }

    let path = writer.finalize()?;
    ctx.reporter.finish_stage();

    Ok(ConcatSummary {
        path,
        rows,
        cols,
        chunks,
    })
}
