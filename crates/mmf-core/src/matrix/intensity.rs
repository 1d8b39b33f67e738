use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{Array1, ArrayView1, Axis, Zip};
use tracing::{debug, info};

use crate::error::{MmfError, Result, Warning};
use crate::io::disk::{cleanup, ensure_free_space, partial_path, remove_stale};
use crate::io::matrix::{file_bytes, DType, MatrixFormat, MatrixReader};
use crate::io::matrix_writer::{write_matrix, MatrixWriter};
use crate::pipeline::types::{PipelineStage, StageContext};

use super::checks::check_intensity_range;
use super::concat::{concat_columns, ConcatOptions};

/// Files produced by the intensity build.
#[derive(Clone, Debug)]
pub struct IntensityPaths {
    pub temp_h1: PathBuf,
    pub temp_h2: PathBuf,
    /// Baseline column I¹ as an (M, 1) int16 matrix.
    pub baseline: PathBuf,
    pub output: PathBuf,
}

#[derive(Clone, Debug)]
pub struct IntensityOptions {
    /// Columns transformed per chunk.
    pub transform_cols: usize,
    pub concat: ConcatOptions,
    pub keep_temporaries: bool,
    /// Sampled range at or below which Y is reported as suspicious.
    pub min_range: i64,
}

#[derive(Clone, Debug)]
pub struct IntensitySummary {
    pub path: PathBuf,
    pub baseline: PathBuf,
    pub rows: usize,
    /// 2N.
    pub cols: usize,
    /// Sampled (min, max) of the result.
    pub range: (i64, i64),
    pub warnings: Vec<Warning>,
}

const STAGE: &str = "intensity matrix";

/// Write `2·R − baseline` (per row) to `out` as int16, one column chunk at a
/// time. Chunk width does not affect the result.
pub fn baseline_transform(
    responses: &MatrixReader<u8>,
    baseline: ArrayView1<i16>,
    out: &Path,
    chunk_cols: usize,
    format: MatrixFormat,
    space_margin: f64,
    ctx: StageContext<'_>,
) -> Result<PathBuf> {
    let (rows, cols) = (responses.rows(), responses.cols());
    if baseline.len() != rows {
        return Err(MmfError::ShapeMismatch {
            stage: STAGE,
            dimension: "baseline length".into(),
            expected: rows,
            actual: baseline.len(),
        });
    }
    if chunk_cols == 0 {
        return Err(MmfError::InvalidConfig(
            "transform chunk must hold at least one column".into(),
        ));
    }

    let chunks = cols.div_ceil(chunk_cols);
    info!(
        input = %responses.path().display(),
        out = %out.display(),
        rows,
        cols,
        chunk_cols,
        "Baseline subtraction"
    );

    let mut writer = MatrixWriter::<i16>::create(out, rows, cols, format, space_margin)?;
    ctx.reporter
        .begin_stage(PipelineStage::Transforming, Some(chunks));

    for chunk in 0..chunks {
        ctx.interrupt.check(PipelineStage::Transforming)?;
        let first = chunk * chunk_cols;
        let width = chunk_cols.min(cols - first);

        let samples = responses.read_block(0, rows, first, width)?;
        let mut y = samples.mapv(|v| 2 * v as i16);
        Zip::from(y.rows_mut())
            .and(&baseline)
            .par_for_each(|mut row, &b| row.mapv_inplace(|v| v - b));

        writer.write_block(0, first, y.view())?;
        writer.flush()?;
        debug!(chunk, chunks, first, width, "Transformed chunk");
        ctx.reporter.advance(chunk + 1);
    }

    let path = writer.finalize()?;
    ctx.reporter.finish_stage();
    Ok(path)
}

/// Build Y = [2·R1 − I¹ | 2·R2 − I¹] with I¹ = R1[:, 0].
///
/// Y_H1 and Y_H2 are staged as separate files so a failed concatenation can
/// be recovered with [`rebuild_from_temporaries`].
pub fn build_intensity_matrix(
    r1: &MatrixReader<u8>,
    r2: &MatrixReader<u8>,
    paths: &IntensityPaths,
    opts: &IntensityOptions,
    ctx: StageContext<'_>,
) -> Result<IntensitySummary> {
    r2.expect_shape(r1.rows(), r1.cols(), STAGE)?;
    let staged = [&paths.output, &paths.temp_h1, &paths.temp_h2, &paths.baseline];
    ensure_stage_space(paths, r1.rows(), r1.cols(), opts, &staged)?;
    for path in staged {
        remove_stale(path)?;
    }

    let baseline: Array1<i16> = r1.read_col(0)?.mapv(i16::from);
    let column = baseline.view().insert_axis(Axis(1));
    write_matrix(
        &paths.baseline,
        column,
        opts.concat.format,
        opts.concat.space_margin,
    )?;
    info!(path = %paths.baseline.display(), "Persisted baseline I1");

    let format = opts.concat.format;
    let margin = opts.concat.space_margin;
    baseline_transform(
        r1,
        baseline.view(),
        &paths.temp_h1,
        opts.transform_cols,
        format,
        margin,
        ctx,
    )?;
    baseline_transform(
        r2,
        baseline.view(),
        &paths.temp_h2,
        opts.transform_cols,
        format,
        margin,
        ctx,
    )?;

    finish_from_temporaries(paths, r1.rows(), r1.cols(), opts, ctx)
}

/// Check once that the baseline, both temporaries and Y fit on disk
/// together. Stale copies about to be replaced count as free.
fn ensure_stage_space(
    paths: &IntensityPaths,
    rows: usize,
    cols: usize,
    opts: &IntensityOptions,
    staged: &[&PathBuf],
) -> Result<()> {
    let format = opts.concat.format;
    let temp = file_bytes(rows, cols, DType::I16, format)?;
    let required = file_bytes(rows, 1, DType::I16, format)?
        + 2 * temp
        + file_bytes(rows, 2 * cols, DType::I16, format)?;

    let reclaimable: u64 = staged
        .iter()
        .flat_map(|path| [path.to_path_buf(), partial_path(path)])
        .filter_map(|path| fs::metadata(path).ok())
        .map(|meta| meta.len())
        .sum();

    let margin = opts.concat.space_margin;
    let needed = (required as f64 * margin).ceil() as u64;
    debug!(required, needed, reclaimable, "Intensity stage space");
    ensure_free_space(&paths.output, needed.saturating_sub(reclaimable), 1.0)
}

/// Recovery path: rebuild Y from previously staged Y_H1/Y_H2 without
/// recomputing the baseline subtraction. Both temporaries must be complete
/// (rows, cols) int16 matrices.
pub fn rebuild_from_temporaries(
    paths: &IntensityPaths,
    rows: usize,
    cols: usize,
    opts: &IntensityOptions,
    ctx: StageContext<'_>,
) -> Result<IntensitySummary> {
    if !paths.baseline.exists() {
        return Err(MmfError::MissingFile(paths.baseline.clone()));
    }
    remove_stale(&paths.output)?;
    info!(
        h1 = %paths.temp_h1.display(),
        h2 = %paths.temp_h2.display(),
        "Rebuilding intensity matrix from temporaries"
    );
    finish_from_temporaries(paths, rows, cols, opts, ctx)
}

fn finish_from_temporaries(
    paths: &IntensityPaths,
    rows: usize,
    cols: usize,
    opts: &IntensityOptions,
    ctx: StageContext<'_>,
) -> Result<IntensitySummary> {
    let format = opts.concat.format;
    let y1 = MatrixReader::<i16>::open_expected(&paths.temp_h1, format, rows, cols, STAGE)?;
    let y2 = MatrixReader::<i16>::open_expected(&paths.temp_h2, format, rows, cols, STAGE)?;

    let summary = concat_columns(&y1, &y2, &paths.output, &opts.concat, ctx)?;
    drop((y1, y2));

    let y = MatrixReader::<i16>::open_expected(
        &summary.path,
        format,
        summary.rows,
        summary.cols,
        STAGE,
    )?;
    let mut warnings = Vec::new();
    let range = check_intensity_range(&y, opts.min_range, &mut warnings)?;
    info!(
        path = %summary.path.display(),
        rows = summary.rows,
        cols = summary.cols,
        min = range.0,
        max = range.1,
        "Intensity matrix complete"
    );

    if !opts.keep_temporaries {
        cleanup(&[paths.temp_h1.clone(), paths.temp_h2.clone()])?;
    }

    Ok(IntensitySummary {
        path: summary.path,
        baseline: paths.baseline.clone(),
        rows: summary.rows,
        cols: summary.cols,
        range,
        warnings,
    })
}
