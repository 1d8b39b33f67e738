use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::consts::MIN_INTENSITY_RANGE;
use crate::error::{MmfError, Result, Warning};
use crate::frame::SpeckleEncoding;
use crate::hadamard::PatternLayout;
use crate::io::disk::cleanup;
use crate::io::frames::{check_pairing, list_frames, FrameList};
use crate::io::image_io::{check_shape, image_shape, load_gray_expected, save_gray};
use crate::io::matrix::{read_npy_header, MatrixFormat, MatrixReader};
use crate::matrix::concat::ConcatOptions;
use crate::matrix::intensity::{
    build_intensity_matrix, rebuild_from_temporaries, IntensityOptions, IntensityPaths,
    IntensitySummary,
};
use crate::matrix::signed::{
    build_signed_matrix, verify_negation, NegationReport, PatternRows, SignedOptions,
};
use crate::matrix::vectorize::{vectorize_images, SampleMode, VectorizeOptions};
use crate::reconstruct::image::{
    check_consistency, output_name, reconstruct_image, ReconstructOptions, ReconstructionInputs,
    ReconstructionOutcome,
};
use crate::reconstruct::normalize::{to_image, value_range};
use crate::reconstruct::transmission::{
    apply_rvitm, estimate_rvitm, rows_for_budget, RvitmOptions, RvitmSummary,
};

use super::config::{ArtifactPaths, BaselineConvention, ExperimentConfig, PatternSource};
use super::types::StageContext;

/// Result of [`run_build`].
#[derive(Clone, Debug)]
pub struct BuildSummary {
    pub hadamard_xt: PathBuf,
    pub intensity_y: PathBuf,
    pub baseline: PathBuf,
    /// Patterns per set, N.
    pub patterns: usize,
    /// Pixels per frame, M.
    pub pixels: usize,
    pub negation: NegationReport,
    pub intensity_range: (i64, i64),
    pub warnings: Vec<Warning>,
}

/// Result of [`run_reconstruct`].
#[derive(Clone, Debug)]
pub struct ReconstructionSummary {
    pub outcomes: Vec<ReconstructionOutcome>,
    pub warnings: Vec<Warning>,
}

fn prepare_dirs(config: &ExperimentConfig) -> Result<ArtifactPaths> {
    config.validate()?;
    fs::create_dir_all(&config.paths.output_dir)?;
    if let Some(temp) = &config.paths.temp_dir {
        fs::create_dir_all(temp)?;
    }
    Ok(config.artifacts())
}

fn intensity_paths(artifacts: &ArtifactPaths) -> IntensityPaths {
    IntensityPaths {
        temp_h1: artifacts.temp_y_h1.clone(),
        temp_h2: artifacts.temp_y_h2.clone(),
        baseline: artifacts.baseline.clone(),
        output: artifacts.intensity_y.clone(),
    }
}

fn intensity_options(config: &ExperimentConfig) -> IntensityOptions {
    IntensityOptions {
        transform_cols: config.chunks.transform_cols,
        concat: ConcatOptions {
            chunk_rows: config.chunks.concat_rows,
            progress_every: config.chunks.progress_every,
            format: config.storage.format,
            space_margin: config.storage.space_margin,
        },
        keep_temporaries: config.storage.keep_temporaries,
        min_range: match config.speckle_encoding {
            SpeckleEncoding::Raw => MIN_INTENSITY_RANGE,
            SpeckleEncoding::Binarized => 0,
        },
    }
}

fn vectorize_options(
    config: &ExperimentConfig,
    mode: SampleMode,
    expected_count: Option<usize>,
) -> VectorizeOptions {
    VectorizeOptions {
        shape: config.frame,
        mode,
        chunk_images: config.chunks.vectorize_images,
        expected_count,
        format: config.storage.format,
        space_margin: config.storage.space_margin,
    }
}

/// Append warnings not already present; repeated stages report the same
/// condition once.
fn merge_warnings(sink: &mut Vec<Warning>, new: &[Warning]) {
    for w in new {
        if !sink.contains(w) {
            sink.push(w.clone());
        }
    }
}

enum PatternInput {
    Captured(FrameList, FrameList),
    Synthetic(PatternLayout),
}

fn list_into(dir: &Path, warnings: &mut Vec<Warning>) -> Result<FrameList> {
    let mut list = list_frames(dir)?;
    warnings.append(&mut list.warnings);
    Ok(list)
}

/// Build Xᵗ, verify it, and build Y with its baseline.
///
/// All frame listings and pairings are checked before any matrix is written.
pub fn run_build(config: &ExperimentConfig, ctx: StageContext<'_>) -> Result<BuildSummary> {
    let artifacts = prepare_dirs(config)?;
    let paths = &config.paths;
    let frame = config.frame;
    let pixels = frame.pixels();
    let order = config.pattern_count();
    let mut warnings = Vec::new();

    let patterns = match config.pattern_source {
        PatternSource::Captured => {
            let h1 = list_into(&paths.patterns_h1, &mut warnings)?;
            let h2 = list_into(&paths.patterns_h2, &mut warnings)?;
            check_pairing("pattern sets H1/H2", &h1, &h2)?;
            PatternInput::Captured(h1, h2)
        }
        PatternSource::Synthetic => {
            PatternInput::Synthetic(PatternLayout::new(config.pattern_size, frame)?)
        }
    };

    let s1 = list_into(&paths.speckles_h1, &mut warnings)?;
    let s2 = list_into(&paths.speckles_h2, &mut warnings)?;
    check_pairing("speckle sets H1/H2", &s1, &s2)?;
    let n = match &patterns {
        PatternInput::Captured(h1, _) => h1.len(),
        PatternInput::Synthetic(layout) => layout.order(),
    };
    if s1.len() != n {
        return Err(MmfError::CountMismatch {
            what: "patterns vs speckles",
            left: n,
            right: s1.len(),
        });
    }

    info!(
        source = %config.pattern_source,
        patterns = n,
        pixels,
        format = %config.storage.format,
        "Starting matrix build"
    );

    let signed_opts = SignedOptions {
        chunk_pixels: config.chunks.pattern_pixels,
        format: config.storage.format,
        space_margin: config.storage.space_margin,
    };
    let signed = match &patterns {
        PatternInput::Captured(h1, h2) => {
            let mode = SampleMode::Binarize(config.threshold);
            let opts = vectorize_options(config, mode, Some(order));
            let v1 = vectorize_images(&h1.paths, &artifacts.patterns_h1, &opts, ctx)?;
            let v2 = vectorize_images(&h2.paths, &artifacts.patterns_h2, &opts, ctx)?;
            merge_warnings(&mut warnings, &v1.warnings);
            merge_warnings(&mut warnings, &v2.warnings);
            let format = config.storage.format;
            let stage = "pattern matrix";
            let b1 = MatrixReader::<u8>::open_expected(&v1.path, format, pixels, n, stage)?;
            let b2 = MatrixReader::<u8>::open_expected(&v2.path, format, pixels, n, stage)?;
            build_signed_matrix(
                PatternRows::Captured { h1: &b1, h2: &b2 },
                &artifacts.hadamard_xt,
                &signed_opts,
                ctx,
            )?
        }
        PatternInput::Synthetic(layout) => build_signed_matrix(
            PatternRows::Synthetic(layout),
            &artifacts.hadamard_xt,
            &signed_opts,
            ctx,
        )?,
    };
    merge_warnings(&mut warnings, &signed.warnings);

    let xt = MatrixReader::<i8>::open_expected(
        &signed.path,
        config.storage.format,
        2 * n,
        pixels,
        "pattern verification",
    )?;
    let negation = verify_negation(&xt, frame, &config.verification, ctx)?;
    warnings.extend(negation.warnings.iter().cloned());
    drop(xt);

    let mode = SampleMode::for_speckles(config.speckle_encoding, config.threshold);
    let opts = vectorize_options(config, mode, None);
    let r1 = vectorize_images(&s1.paths, &artifacts.speckles_h1, &opts, ctx)?;
    let r2 = vectorize_images(&s2.paths, &artifacts.speckles_h2, &opts, ctx)?;
    let format = config.storage.format;
    let stage = "intensity matrix";
    let m1 = MatrixReader::<u8>::open_expected(&r1.path, format, pixels, n, stage)?;
    let m2 = MatrixReader::<u8>::open_expected(&r2.path, format, pixels, n, stage)?;
    merge_warnings(&mut warnings, &r1.warnings);
    merge_warnings(&mut warnings, &r2.warnings);

    let intensity = build_intensity_matrix(
        &m1,
        &m2,
        &intensity_paths(&artifacts),
        &intensity_options(config),
        ctx,
    )?;
    drop((m1, m2));
    warnings.extend(intensity.warnings.iter().cloned());

    if !config.storage.keep_temporaries {
        cleanup(&artifacts.intermediates())?;
    }

    info!(
        xt = %signed.path.display(),
        y = %intensity.path.display(),
        warnings = warnings.len(),
        "Matrix build complete"
    );

    Ok(BuildSummary {
        hadamard_xt: signed.path,
        intensity_y: intensity.path,
        baseline: intensity.baseline,
        patterns: n,
        pixels,
        negation,
        intensity_range: intensity.range,
        warnings,
    })
}

/// Rebuild Y from the staged Y_H1/Y_H2 of an earlier run.
pub fn rebuild_intensity(
    config: &ExperimentConfig,
    ctx: StageContext<'_>,
) -> Result<IntensitySummary> {
    let artifacts = prepare_dirs(config)?;
    let cols = match config.storage.format {
        MatrixFormat::Npy => read_npy_header(&artifacts.temp_y_h1)?.cols,
        MatrixFormat::Raw => config.pattern_count(),
    };
    rebuild_from_temporaries(
        &intensity_paths(&artifacts),
        config.pixels(),
        cols,
        &intensity_options(config),
        ctx,
    )
}

/// Expand directories into their PNG files; plain files pass through.
pub fn collect_images(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for input in inputs {
        if input.is_dir() {
            images.extend(list_frames(input)?.paths);
        } else if input.exists() {
            images.push(input.clone());
        } else {
            return Err(MmfError::MissingFile(input.clone()));
        }
    }
    if images.is_empty() {
        return Err(MmfError::EmptySequence);
    }
    Ok(images)
}

/// Open the persisted Xᵗ and Y.
fn open_pair(
    config: &ExperimentConfig,
    artifacts: &ArtifactPaths,
) -> Result<(MatrixReader<i8>, MatrixReader<i16>)> {
    let pixels = config.pixels();
    match config.storage.format {
        MatrixFormat::Npy => Ok((
            MatrixReader::<i8>::open(&artifacts.hadamard_xt)?,
            MatrixReader::<i16>::open(&artifacts.intensity_y)?,
        )),
        MatrixFormat::Raw => {
            let rows = 2 * config.pattern_count();
            Ok((
                MatrixReader::<i8>::open_raw(&artifacts.hadamard_xt, rows, pixels)?,
                MatrixReader::<i16>::open_raw(&artifacts.intensity_y, pixels, rows)?,
            ))
        }
    }
}

fn open_baseline(
    config: &ExperimentConfig,
    artifacts: &ArtifactPaths,
) -> Result<Option<MatrixReader<i16>>> {
    match config.baseline {
        BaselineConvention::AddBack => Ok(Some(MatrixReader::<i16>::open_expected(
            &artifacts.baseline,
            config.storage.format,
            config.pixels(),
            1,
            "reconstruction",
        )?)),
        BaselineConvention::Omit => Ok(None),
    }
}

/// Reconstruct every image with the two-stage estimator.
///
/// Matrix shapes and every image's dimensions are validated before the
/// first correlation starts.
pub fn run_reconstruct(
    config: &ExperimentConfig,
    images: &[PathBuf],
    ctx: StageContext<'_>,
) -> Result<ReconstructionSummary> {
    let artifacts = prepare_dirs(config)?;
    if images.is_empty() {
        return Err(MmfError::EmptySequence);
    }
    let (xt, y) = open_pair(config, &artifacts)?;
    let baseline = open_baseline(config, &artifacts)?;
    let inputs = ReconstructionInputs {
        xt: &xt,
        y: &y,
        baseline: baseline.as_ref(),
    };
    check_consistency(&inputs, config.frame, config.baseline)?;
    for image in images {
        check_shape(image, config.frame, image_shape(image)?)?;
    }

    let opts = ReconstructOptions {
        frame: config.frame,
        encoding: config.speckle_encoding,
        threshold: config.threshold,
        baseline: config.baseline,
        output_mode: config.output_mode,
        correlation_rows: config.chunks.correlation_rows,
        reconstruction_rows: config.chunks.reconstruction_rows,
        budget_bytes: config.chunks.block_budget_bytes,
        save_raw: config
            .storage
            .save_raw_reconstruction
            .then_some(config.storage.format),
        space_margin: config.storage.space_margin,
    };

    let mut outcomes = Vec::with_capacity(images.len());
    let mut warnings = Vec::new();
    for image in images {
        let outcome = reconstruct_image(&inputs, image, &config.paths.output_dir, &opts, ctx)?;
        merge_warnings(&mut warnings, &outcome.warnings);
        outcomes.push(outcome);
    }

    Ok(ReconstructionSummary { outcomes, warnings })
}

/// Build the full M×M transmission estimate from the persisted X and Y.
pub fn run_rvitm(config: &ExperimentConfig, ctx: StageContext<'_>) -> Result<RvitmSummary> {
    let artifacts = prepare_dirs(config)?;
    let (xt, y) = open_pair(config, &artifacts)?;
    let opts = RvitmOptions {
        max_pixels: config.chunks.rvitm_max_pixels,
        budget_bytes: config.chunks.block_budget_bytes,
        format: config.storage.format,
        space_margin: config.storage.space_margin,
    };
    estimate_rvitm(&y, &xt, &artifacts.rvitm, &opts, ctx)
}

/// Reconstruct images through a stored RVITM instead of the two-stage path.
pub fn reconstruct_with_rvitm(
    config: &ExperimentConfig,
    images: &[PathBuf],
    ctx: StageContext<'_>,
) -> Result<ReconstructionSummary> {
    let artifacts = prepare_dirs(config)?;
    let pixels = config.pixels();
    let rvitm = MatrixReader::<f32>::open_expected(
        &artifacts.rvitm,
        config.storage.format,
        pixels,
        pixels,
        "reconstruction",
    )?;
    for image in images {
        check_shape(image, config.frame, image_shape(image)?)?;
    }
    let baseline = match open_baseline(config, &artifacts)? {
        Some(reader) => Some(reader.read_col(0)?.mapv(f32::from)),
        None => None,
    };
    let rows = rows_for_budget(pixels, config.chunks.block_budget_bytes);

    let mut outcomes = Vec::with_capacity(images.len());
    let mut warnings = Vec::new();
    for image in images {
        let mut frame = load_gray_expected(image, config.frame)?;
        if config.speckle_encoding == SpeckleEncoding::Binarized {
            frame = frame.binarized(config.threshold);
        }
        let mut rec = apply_rvitm(&rvitm, frame.to_vector_f32().view(), rows, ctx)?;
        if let Some(base) = &baseline {
            rec += base;
        }
        let mut image_warnings = Vec::new();
        let data = to_image(rec.view(), config.frame, config.output_mode, &mut image_warnings)?;
        let out = config.paths.output_dir.join(output_name(image));
        save_gray(data.view(), &out)?;
        info!(image = %out.display(), "Saved reconstruction");
        merge_warnings(&mut warnings, &image_warnings);
        outcomes.push(ReconstructionOutcome {
            source: image.clone(),
            image: out,
            raw: None,
            range: value_range(rec.view()),
            warnings: image_warnings,
        });
    }

    Ok(ReconstructionSummary { outcomes, warnings })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_warnings_are_reported_once() {
        let mismatch = Warning::PatternOrderMismatch {
            expected: 16,
            actual: 12,
        };
        let mut sink = vec![Warning::NonPowerOfTwoPatterns { count: 12 }];
        merge_warnings(&mut sink, &[mismatch.clone()]);
        merge_warnings(
            &mut sink,
            &[Warning::NonPowerOfTwoPatterns { count: 12 }, mismatch.clone()],
        );
        assert_eq!(
            sink,
            vec![Warning::NonPowerOfTwoPatterns { count: 12 }, mismatch]
        );
    }
}
