use std::path::{Path, PathBuf};

use ndarray::{s, Array1, Array2, ArrayView1};
use tracing::{debug, info};

use crate::error::{raise, MmfError, Result, Warning};
use crate::io::matrix::{MatrixFormat, MatrixReader};
use crate::io::matrix_writer::MatrixWriter;
use crate::pipeline::types::{PipelineStage, StageContext};

const F32_BYTES: u64 = std::mem::size_of::<f32>() as u64;

/// Rows of a `cols`-wide matrix whose f32 copy fits in `budget` bytes.
pub fn rows_for_budget(cols: usize, budget: u64) -> usize {
    let row_bytes = (cols as u64).saturating_mul(F32_BYTES).max(1);
    ((budget / row_bytes) as usize).max(1)
}

/// Rows per streamed block: the explicit setting when given, else derived
/// from the budget. Explicit blocks larger than the budget are allowed but
/// reported.
pub fn plan_rows(
    explicit: Option<usize>,
    cols: usize,
    budget: u64,
    stage: PipelineStage,
    warnings: &mut Vec<Warning>,
) -> usize {
    match explicit {
        Some(rows) => {
            let rows = rows.max(1);
            let bytes = (rows as u64)
                .saturating_mul(cols as u64)
                .saturating_mul(F32_BYTES);
            if bytes > budget {
                raise(
                    warnings,
                    Warning::LargeChunkFootprint {
                        stage: stage.name(),
                        bytes,
                        budget,
                    },
                );
            }
            rows
        }
        None => rows_for_budget(cols, budget),
    }
}

/// Block sizes of the two-stage estimator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockPlan {
    /// Rows of Xᵗ per correlation block.
    pub correlation_rows: usize,
    /// Rows of Y per reconstruction block.
    pub reconstruction_rows: usize,
}

impl BlockPlan {
    pub fn new(
        correlation_rows: Option<usize>,
        reconstruction_rows: Option<usize>,
        pixels: usize,
        patterns2: usize,
        budget: u64,
        warnings: &mut Vec<Warning>,
    ) -> Self {
        Self {
            correlation_rows: plan_rows(
                correlation_rows,
                pixels,
                budget,
                PipelineStage::Correlating,
                warnings,
            ),
            reconstruction_rows: plan_rows(
                reconstruction_rows,
                patterns2,
                budget,
                PipelineStage::Reconstructing,
                warnings,
            ),
        }
    }
}

/// c = Xᵗ · I_out, streaming row blocks of Xᵗ.
pub fn correlate(
    xt: &MatrixReader<i8>,
    i_out: ArrayView1<f32>,
    rows_per_block: usize,
    ctx: StageContext<'_>,
) -> Result<Array1<f32>> {
    const STAGE: PipelineStage = PipelineStage::Correlating;
    if i_out.len() != xt.cols() {
        return Err(MmfError::ShapeMismatch {
            stage: STAGE.name(),
            dimension: "observed vector length vs pattern matrix columns".into(),
            expected: xt.cols(),
            actual: i_out.len(),
        });
    }

    let rows = xt.rows();
    let step = rows_per_block.max(1);
    let blocks = rows.div_ceil(step);
    let mut c = Array1::<f32>::zeros(rows);
    ctx.reporter.begin_stage(STAGE, Some(blocks));

    for block in 0..blocks {
        ctx.interrupt.check(STAGE)?;
        let start = block * step;
        let count = step.min(rows - start);
        let patterns = xt.read_rows(start, count)?.mapv(f32::from);
        c.slice_mut(s![start..start + count])
            .assign(&patterns.dot(&i_out));
        debug!(block, blocks, start, count, "Correlation block");
        ctx.reporter.advance(block + 1);
    }

    ctx.reporter.finish_stage();
    Ok(c)
}

/// I_rec = (1/2N) · Y · c, streaming row blocks of Y. Every finished slice
/// is handed to `sink` with its starting row.
pub fn reconstruct_stage<F>(
    y: &MatrixReader<i16>,
    c: ArrayView1<f32>,
    rows_per_block: usize,
    ctx: StageContext<'_>,
    mut sink: F,
) -> Result<()>
where
    F: FnMut(usize, ArrayView1<f32>) -> Result<()>,
{
    const STAGE: PipelineStage = PipelineStage::Reconstructing;
    if c.len() != y.cols() {
        return Err(MmfError::ShapeMismatch {
            stage: STAGE.name(),
            dimension: "correlation length vs intensity matrix columns".into(),
            expected: y.cols(),
            actual: c.len(),
        });
    }

    let rows = y.rows();
    let scale = 1.0 / y.cols() as f32;
    let step = rows_per_block.max(1);
    let blocks = rows.div_ceil(step);
    ctx.reporter.begin_stage(STAGE, Some(blocks));

    for block in 0..blocks {
        ctx.interrupt.check(STAGE)?;
        let start = block * step;
        let count = step.min(rows - start);
        let intensities = y.read_rows(start, count)?.mapv(f32::from);
        let slice = intensities.dot(&c) * scale;
        sink(start, slice.view())?;
        debug!(block, blocks, start, count, "Reconstruction block");
        ctx.reporter.advance(block + 1);
    }

    ctx.reporter.finish_stage();
    Ok(())
}

/// [`reconstruct_stage`] collected into a vector of length M.
pub fn reconstruct_vector(
    y: &MatrixReader<i16>,
    c: ArrayView1<f32>,
    rows_per_block: usize,
    ctx: StageContext<'_>,
) -> Result<Array1<f32>> {
    let mut out = Array1::<f32>::zeros(y.rows());
    reconstruct_stage(y, c, rows_per_block, ctx, |start, slice| {
        out.slice_mut(s![start..start + slice.len()]).assign(&slice);
        Ok(())
    })?;
    Ok(out)
}

/// Both stages back to back; never materializes an M×M matrix.
pub fn two_stage(
    xt: &MatrixReader<i8>,
    y: &MatrixReader<i16>,
    i_out: ArrayView1<f32>,
    plan: BlockPlan,
    ctx: StageContext<'_>,
) -> Result<Array1<f32>> {
    check_pair(xt, y)?;
    let c = correlate(xt, i_out, plan.correlation_rows, ctx)?;
    reconstruct_vector(y, c.view(), plan.reconstruction_rows, ctx)
}

/// Xᵗ must be (2N, M) and Y (M, 2N).
pub fn check_pair(xt: &MatrixReader<i8>, y: &MatrixReader<i16>) -> Result<()> {
    let stage = PipelineStage::Reconstructing.name();
    if xt.rows() % 2 != 0 {
        return Err(MmfError::InvalidMatrix {
            path: xt.path().to_path_buf(),
            reason: format!("odd row count {} for a [H; -H] matrix", xt.rows()),
        });
    }
    if y.cols() != xt.rows() {
        return Err(MmfError::ShapeMismatch {
            stage,
            dimension: "intensity matrix columns vs pattern matrix rows (2N)".into(),
            expected: xt.rows(),
            actual: y.cols(),
        });
    }
    if y.rows() != xt.cols() {
        return Err(MmfError::ShapeMismatch {
            stage,
            dimension: "intensity matrix rows vs pattern matrix columns (M)".into(),
            expected: xt.cols(),
            actual: y.rows(),
        });
    }
    Ok(())
}

#[derive(Clone, Debug)]
pub struct RvitmOptions {
    /// Refuse when M exceeds this.
    pub max_pixels: usize,
    pub budget_bytes: u64,
    pub format: MatrixFormat,
    pub space_margin: f64,
}

#[derive(Clone, Debug)]
pub struct RvitmSummary {
    pub path: PathBuf,
    pub pixels: usize,
    pub row_blocks: usize,
    pub col_blocks: usize,
}

/// RVITM = (1/2N) · Y · Xᵗ as an M×M float32 matrix at `out`.
///
/// Row blocks of Y are multiplied against column blocks of Xᵗ; one f32 row
/// block of the result is held at a time. Pixel counts above
/// `max_pixels` are refused with [`MmfError::Infeasible`].
pub fn estimate_rvitm(
    y: &MatrixReader<i16>,
    xt: &MatrixReader<i8>,
    out: &Path,
    opts: &RvitmOptions,
    ctx: StageContext<'_>,
) -> Result<RvitmSummary> {
    const STAGE: PipelineStage = PipelineStage::EstimatingTransmission;
    check_pair(xt, y)?;
    let pixels = y.rows();
    if pixels > opts.max_pixels {
        return Err(MmfError::Infeasible {
            pixels,
            limit: opts.max_pixels,
        });
    }

    let patterns2 = xt.rows();
    let scale = 1.0 / patterns2 as f32;
    let row_step = rows_for_budget(pixels, opts.budget_bytes).min(pixels);
    let col_step = rows_for_budget(patterns2, opts.budget_bytes).min(pixels);
    let row_blocks = pixels.div_ceil(row_step);
    let col_blocks = pixels.div_ceil(col_step);
    info!(
        out = %out.display(),
        pixels,
        patterns = patterns2,
        row_step,
        col_step,
        "Estimating full transmission matrix"
    );

    let mut writer =
        MatrixWriter::<f32>::create(out, pixels, pixels, opts.format, opts.space_margin)?;
    ctx.reporter.begin_stage(STAGE, Some(row_blocks));

    for rb in 0..row_blocks {
        let r0 = rb * row_step;
        let nr = row_step.min(pixels - r0);
        let intensities = y.read_rows(r0, nr)?.mapv(f32::from);
        let mut result = Array2::<f32>::zeros((nr, pixels));

        for cb in 0..col_blocks {
            ctx.interrupt.check(STAGE)?;
            let c0 = cb * col_step;
            let nc = col_step.min(pixels - c0);
            let patterns = xt.read_block(0, patterns2, c0, nc)?.mapv(f32::from);
            result
                .slice_mut(s![.., c0..c0 + nc])
                .assign(&intensities.dot(&patterns));
        }

        result *= scale;
        writer.write_rows(r0, result.view())?;
        writer.flush()?;
        debug!(block = rb, blocks = row_blocks, r0, nr, "RVITM row block");
        ctx.reporter.advance(rb + 1);
    }

    let path = writer.finalize()?;
    ctx.reporter.finish_stage();

    Ok(RvitmSummary {
        path,
        pixels,
        row_blocks,
        col_blocks,
    })
}

/// RVITM · I_out, streaming row blocks of the stored estimate.
pub fn apply_rvitm(
    rvitm: &MatrixReader<f32>,
    i_out: ArrayView1<f32>,
    rows_per_block: usize,
    ctx: StageContext<'_>,
) -> Result<Array1<f32>> {
    const STAGE: PipelineStage = PipelineStage::Reconstructing;
    if rvitm.rows() != rvitm.cols() || i_out.len() != rvitm.cols() {
        return Err(MmfError::ShapeMismatch {
            stage: STAGE.name(),
            dimension: format!(
                "observed vector length vs {}x{} transmission matrix",
                rvitm.rows(),
                rvitm.cols()
            ),
            expected: rvitm.cols(),
            actual: i_out.len(),
        });
    }

    let rows = rvitm.rows();
    let step = rows_per_block.max(1);
    let blocks = rows.div_ceil(step);
    let mut out = Array1::<f32>::zeros(rows);
    ctx.reporter.begin_stage(STAGE, Some(blocks));

    for block in 0..blocks {
        ctx.interrupt.check(STAGE)?;
        let start = block * step;
        let count = step.min(rows - start);
        let t = rvitm.read_rows(start, count)?;
        out.slice_mut(s![start..start + count]).assign(&t.dot(&i_out));
        ctx.reporter.advance(block + 1);
    }

    ctx.reporter.finish_stage();
    Ok(out)
}
