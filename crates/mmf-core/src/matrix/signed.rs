use std::path::{Path, PathBuf};

use ndarray::{s, Array2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{raise, MmfError, Result, Warning};
use crate::frame::FrameShape;
use crate::hadamard::{is_power_of_two, PatternLayout};
use crate::io::disk::remove_stale;
use crate::io::matrix::{MatrixFormat, MatrixReader};
use crate::io::matrix_writer::MatrixWriter;
use crate::pipeline::config::VerificationConfig;
use crate::pipeline::types::{PipelineStage, StageContext};

/// Where the rows of Xᵗ come from.
pub enum PatternRows<'a> {
    /// Vectorized binary captures of both sets, each (M, N).
    Captured {
        h1: &'a MatrixReader<u8>,
        h2: &'a MatrixReader<u8>,
    },
    /// Generated H1 and its exact negation.
    ///
    /// Pixels outside the lit square come out as −1 in H1 rows and +1 in H2
    /// rows, where captured frames give −1 in both.
    Synthetic(&'a PatternLayout),
}

#[derive(Clone, Debug)]
pub struct SignedOptions {
    /// Pixel columns of Xᵗ produced per chunk.
    pub chunk_pixels: usize,
    pub format: MatrixFormat,
    pub space_margin: f64,
}

#[derive(Clone, Debug)]
pub struct SignedSummary {
    pub path: PathBuf,
    /// Patterns per set, N. Xᵗ has 2N rows.
    pub patterns: usize,
    /// Pixels, M.
    pub pixels: usize,
    pub warnings: Vec<Warning>,
}

#[inline]
fn bipolar(bit: u8) -> i8 {
    if bit != 0 {
        1
    } else {
        -1
    }
}

/// Build Xᵗ = [H; −H] of shape (2N, M) as int8 ±1.
///
/// Row i is `2·H1_bin − 1` of pattern i and row N+i is `2·H2_bin − 1`,
/// which is −H when H2 is the complement pattern. The matrix is produced in
/// pixel-column chunks directly as int8.
pub fn build_signed_matrix(
    source: PatternRows<'_>,
    out: &Path,
    opts: &SignedOptions,
    ctx: StageContext<'_>,
) -> Result<SignedSummary> {
    const STAGE: PipelineStage = PipelineStage::BuildingPatternMatrix;
    if opts.chunk_pixels == 0 {
        return Err(MmfError::InvalidConfig(
            "pattern matrix chunk must hold at least one pixel".into(),
        ));
    }
    remove_stale(out)?;

    let (pixels, patterns) = match &source {
        PatternRows::Captured { h1, h2 } => {
            h2.expect_shape(h1.rows(), h1.cols(), STAGE.name())?;
            (h1.rows(), h1.cols())
        }
        PatternRows::Synthetic(layout) => (layout.frame.pixels(), layout.order()),
    };
    let rows = patterns
        .checked_mul(2)
        .ok_or(MmfError::SizeOverflow {
            rows: patterns,
            cols: pixels,
        })?;

    let mut warnings = Vec::new();
    if !is_power_of_two(patterns) {
        raise(&mut warnings, Warning::NonPowerOfTwoPatterns { count: patterns });
    }

    info!(
        out = %out.display(),
        patterns,
        pixels,
        synthetic = matches!(source, PatternRows::Synthetic(_)),
        "Building bipolar pattern matrix"
    );

    let mut writer = MatrixWriter::<i8>::create(out, rows, pixels, opts.format, opts.space_margin)?;
    let chunks = pixels.div_ceil(opts.chunk_pixels);
    ctx.reporter.begin_stage(STAGE, Some(chunks));

    for chunk in 0..chunks {
        ctx.interrupt.check(STAGE)?;
        let first = chunk * opts.chunk_pixels;
        let width = opts.chunk_pixels.min(pixels - first);

        let block = match &source {
            PatternRows::Captured { h1, h2 } => {
                let top = h1.read_rows(first, width)?;
                let bottom = h2.read_rows(first, width)?;
                let mut block = Array2::<i8>::zeros((rows, width));
                block
                    .slice_mut(s![..patterns, ..])
                    .assign(&top.t().mapv(bipolar));
                block
                    .slice_mut(s![patterns.., ..])
                    .assign(&bottom.t().mapv(bipolar));
                block
            }
            PatternRows::Synthetic(layout) => synthetic_block(layout, first, width),
        };

        writer.write_block(0, first, block.view())?;
        writer.flush()?;
        debug!(chunk, chunks, first, width, "Pattern matrix chunk");
        ctx.reporter.advance(chunk + 1);
    }

    let path = writer.finalize()?;
    ctx.reporter.finish_stage();

    Ok(SignedSummary {
        path,
        patterns,
        pixels,
        warnings,
    })
}

/// Columns [first, first+width) of the synthetic Xᵗ.
fn synthetic_block(layout: &PatternLayout, first: usize, width: usize) -> Array2<i8> {
    let n = layout.order();
    let mut block = Array2::<i8>::zeros((2 * n, width));
    block
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(r, mut row)| {
            let (j, sign) = if r < n { (r, 1) } else { (r - n, -1) };
            for (p, v) in row.iter_mut().enumerate() {
                *v = sign * layout.bipolar(j, first + p);
            }
        });
    block
}

/// Outcome of the sampled H2 = −H1 check.
#[derive(Clone, Debug)]
pub struct NegationReport {
    /// Pattern indices compared.
    pub checked: Vec<usize>,
    /// Indices whose H2 row is not the negation of the H1 row.
    pub failed: Vec<usize>,
    /// Pixels compared per pair.
    pub window_pixels: usize,
    pub warnings: Vec<Warning>,
}

impl NegationReport {
    pub fn passed(&self) -> usize {
        self.checked.len() - self.failed.len()
    }
}

/// Indices compared by the negation check: quartiles plus seeded random
/// picks, deduplicated in first-seen order.
pub fn negation_sample_indices(patterns: usize, random: usize, seed: u64) -> Vec<usize> {
    if patterns == 0 {
        return Vec::new();
    }
    let mut indices = vec![
        0,
        patterns / 4,
        patterns / 2,
        3 * patterns / 4,
        patterns - 1,
    ];
    let mut rng = StdRng::seed_from_u64(seed);
    let amount = random.min(patterns);
    indices.extend(rand::seq::index::sample(&mut rng, patterns, amount).into_vec());

    let mut seen = std::collections::HashSet::new();
    indices.retain(|i| seen.insert(*i));
    indices
}

/// Raster indices of the central window compared per row. A window of 0
/// covers the whole frame.
pub fn central_window(frame: FrameShape, window: usize) -> Vec<usize> {
    if window == 0 || window >= frame.pixels() {
        return (0..frame.pixels()).collect();
    }
    let side = (window as f64).sqrt().floor().max(1.0) as usize;
    let h = side.min(frame.height);
    let w = side.min(frame.width);
    let top = (frame.height - h) / 2;
    let left = (frame.width - w) / 2;
    (top..top + h)
        .flat_map(|r| (left..left + w).map(move |c| frame.index(r, c)))
        .collect()
}

/// Check X[N+i] == −X[i] on a central window for a sample of indices.
///
/// Outside the lit square both captured sets are dark, so only the centre
/// of the frame is meaningful for captured patterns.
pub fn verify_negation(
    xt: &MatrixReader<i8>,
    frame: FrameShape,
    cfg: &VerificationConfig,
    ctx: StageContext<'_>,
) -> Result<NegationReport> {
    const STAGE: PipelineStage = PipelineStage::VerifyingPatterns;
    if xt.rows() % 2 != 0 {
        return Err(MmfError::InvalidMatrix {
            path: xt.path().to_path_buf(),
            reason: format!("odd row count {} for a [H; -H] matrix", xt.rows()),
        });
    }
    xt.expect_shape(xt.rows(), frame.pixels(), STAGE.name())?;

    let patterns = xt.rows() / 2;
    let checked = negation_sample_indices(patterns, cfg.random_samples, cfg.seed);
    let window = central_window(frame, cfg.window);

    ctx.reporter.begin_stage(STAGE, Some(checked.len()));
    let mut failed = Vec::new();
    for (done, &i) in checked.iter().enumerate() {
        ctx.interrupt.check(STAGE)?;
        let h1 = xt.read_row(i)?;
        let h2 = xt.read_row(patterns + i)?;
        let ok = window.iter().all(|&p| h2[p] == -h1[p]);
        if !ok {
            failed.push(i);
        }
        debug!(index = i, ok, "Negation pair");
        ctx.reporter.advance(done + 1);
    }
    ctx.reporter.finish_stage();

    let mut warnings = Vec::new();
    if !failed.is_empty() {
        raise(
            &mut warnings,
            Warning::NegationCheckFailed {
                failed: failed.len(),
                checked: checked.len(),
            },
        );
    } else {
        info!(pairs = checked.len(), "H2 = -H1 verified");
    }

    Ok(NegationReport {
        checked,
        failed,
        window_pixels: window.len(),
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_indices_are_deterministic_and_unique() {
        let a = negation_sample_indices(4096, 5, 42);
        let b = negation_sample_indices(4096, 5, 42);
        assert_eq!(a, b);
        assert_eq!(&a[..5], &[0, 1024, 2048, 3072, 4095]);
        let unique: std::collections::HashSet<_> = a.iter().collect();
        assert_eq!(unique.len(), a.len());
        assert!(a.iter().all(|&i| i < 4096));
    }

    #[test]
    fn small_orders_collapse_duplicates() {
        let idx = negation_sample_indices(2, 5, 1);
        assert_eq!(idx.len(), 2);
    }

    #[test]
    fn central_window_is_centred() {
        let frame = FrameShape::new(6, 8);
        let w = central_window(frame, 4);
        assert_eq!(
            w,
            vec![
                frame.index(2, 3),
                frame.index(2, 4),
                frame.index(3, 3),
                frame.index(3, 4)
            ]
        );
        assert_eq!(central_window(frame, 0).len(), 48);
    }
}
