use std::path::{Path, PathBuf};

use ndarray::Array1;
use tracing::info;

use crate::error::{raise, MmfError, Result, Warning};
use crate::frame::{FrameShape, SpeckleEncoding};
use crate::hadamard::is_power_of_two;
use crate::io::image_io::{check_shape, image_shape, load_gray_expected, save_gray};
use crate::io::matrix::{MatrixFormat, MatrixReader};
use crate::io::matrix_writer::write_matrix;
use crate::pipeline::config::{BaselineConvention, OutputMode};
use crate::pipeline::types::{PipelineStage, StageContext};

use super::normalize::{to_image, value_range};
use super::transmission::{check_pair, two_stage, BlockPlan};

/// Persisted matrices a reconstruction reads.
pub struct ReconstructionInputs<'a> {
    pub xt: &'a MatrixReader<i8>,
    pub y: &'a MatrixReader<i16>,
    /// Required for [`BaselineConvention::AddBack`].
    pub baseline: Option<&'a MatrixReader<i16>>,
}

#[derive(Clone, Debug)]
pub struct ReconstructOptions {
    pub frame: FrameShape,
    pub encoding: SpeckleEncoding,
    pub threshold: u8,
    pub baseline: BaselineConvention,
    pub output_mode: OutputMode,
    pub correlation_rows: Option<usize>,
    pub reconstruction_rows: Option<usize>,
    pub budget_bytes: u64,
    /// Also write I_rec as an (M, 1) f32 matrix in this format.
    pub save_raw: Option<MatrixFormat>,
    pub space_margin: f64,
}

#[derive(Clone, Debug)]
pub struct ReconstructionOutcome {
    pub source: PathBuf,
    pub image: PathBuf,
    pub raw: Option<PathBuf>,
    /// (min, max) of I_rec before conversion to 8 bits.
    pub range: Option<(f32, f32)>,
    pub warnings: Vec<Warning>,
}

/// Output file name for an observed speckle: `reconstructed_<stem>.png`.
pub fn output_name(source: &Path) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".into());
    format!("reconstructed_{stem}.png")
}

/// Check that Xᵗ, Y, the baseline and the frame describe the same
/// experiment. Returns N.
pub fn check_consistency(
    inputs: &ReconstructionInputs<'_>,
    frame: FrameShape,
    baseline: BaselineConvention,
) -> Result<usize> {
    let stage = PipelineStage::Reconstructing.name();
    check_pair(inputs.xt, inputs.y)?;
    if inputs.xt.cols() != frame.pixels() {
        return Err(MmfError::ShapeMismatch {
            stage,
            dimension: format!("pattern matrix columns vs {frame} image pixels"),
            expected: frame.pixels(),
            actual: inputs.xt.cols(),
        });
    }
    if baseline == BaselineConvention::AddBack {
        let reader = inputs.baseline.ok_or_else(|| {
            MmfError::InvalidConfig("baseline add-back needs the persisted baseline".into())
        })?;
        reader.expect_shape(frame.pixels(), 1, stage)?;
    }
    Ok(inputs.xt.rows() / 2)
}

/// Reconstruct one observed speckle image into `out_dir`.
pub fn reconstruct_image(
    inputs: &ReconstructionInputs<'_>,
    source: &Path,
    out_dir: &Path,
    opts: &ReconstructOptions,
    ctx: StageContext<'_>,
) -> Result<ReconstructionOutcome> {
    let patterns = check_consistency(inputs, opts.frame, opts.baseline)?;
    check_shape(source, opts.frame, image_shape(source)?)?;

    let mut warnings = Vec::new();
    if !is_power_of_two(patterns) {
        raise(&mut warnings, Warning::NonPowerOfTwoPatterns { count: patterns });
    }

    let mut frame = load_gray_expected(source, opts.frame)?;
    if opts.encoding == SpeckleEncoding::Binarized {
        frame = frame.binarized(opts.threshold);
    }
    let observed = frame.to_vector_f32();

    let plan = BlockPlan::new(
        opts.correlation_rows,
        opts.reconstruction_rows,
        opts.frame.pixels(),
        2 * patterns,
        opts.budget_bytes,
        &mut warnings,
    );
    info!(
        source = %source.display(),
        patterns,
        correlation_rows = plan.correlation_rows,
        reconstruction_rows = plan.reconstruction_rows,
        "Reconstructing image"
    );

    let mut rec = two_stage(inputs.xt, inputs.y, observed.view(), plan, ctx)?;
    if opts.baseline == BaselineConvention::AddBack {
        if let Some(reader) = inputs.baseline {
            let base: Array1<f32> = reader.read_col(0)?.mapv(f32::from);
            rec += &base;
        }
    }

    ctx.interrupt.check(PipelineStage::Writing)?;
    let name = output_name(source);
    let raw = match opts.save_raw {
        Some(format) => {
            let path = out_dir
                .join(&name)
                .with_extension(format.extension());
            let column = rec.view().insert_axis(ndarray::Axis(1));
            Some(write_matrix(&path, column, format, opts.space_margin)?)
        }
        None => None,
    };

    let pixels = to_image(rec.view(), opts.frame, opts.output_mode, &mut warnings)?;
    let image = out_dir.join(&name);
    save_gray(pixels.view(), &image)?;
    info!(image = %image.display(), "Saved reconstruction");

    Ok(ReconstructionOutcome {
        source: source.to_path_buf(),
        image,
        raw,
        range: value_range(rec.view()),
        warnings,
    })
}
