use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::error::{MmfError, Result};
use crate::frame::{FrameShape, SpeckleEncoding};
use crate::io::matrix::MatrixFormat;

/// Complete description of one experiment run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExperimentConfig {
    #[serde(default)]
    pub paths: PathConfig,
    #[serde(default = "default_frame")]
    pub frame: FrameShape,
    /// Side length of the square Hadamard pattern; N = size².
    #[serde(default = "default_pattern_size")]
    pub pattern_size: usize,
    #[serde(default = "default_threshold")]
    pub threshold: u8,
    #[serde(default)]
    pub pattern_source: PatternSource,
    #[serde(default)]
    pub speckle_encoding: SpeckleEncoding,
    #[serde(default)]
    pub baseline: BaselineConvention,
    #[serde(default)]
    pub output_mode: OutputMode,
    #[serde(default)]
    pub chunks: ChunkConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
}

fn default_frame() -> FrameShape {
    FrameShape::new(DEFAULT_FRAME_HEIGHT, DEFAULT_FRAME_WIDTH)
}

fn default_pattern_size() -> usize {
    DEFAULT_PATTERN_SIZE
}

fn default_threshold() -> u8 {
    DEFAULT_THRESHOLD
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            paths: PathConfig::default(),
            frame: default_frame(),
            pattern_size: default_pattern_size(),
            threshold: default_threshold(),
            pattern_source: PatternSource::default(),
            speckle_encoding: SpeckleEncoding::default(),
            baseline: BaselineConvention::default(),
            output_mode: OutputMode::default(),
            chunks: ChunkConfig::default(),
            storage: StorageConfig::default(),
            verification: VerificationConfig::default(),
        }
    }
}

impl ExperimentConfig {
    /// Number of Hadamard patterns per set.
    pub fn pattern_count(&self) -> usize {
        self.pattern_size * self.pattern_size
    }

    /// Pixels per frame, M.
    pub fn pixels(&self) -> usize {
        self.frame.pixels()
    }

    /// File names of every persisted artifact of this run.
    pub fn artifacts(&self) -> ArtifactPaths {
        ArtifactPaths::new(
            &self.paths.output_dir,
            self.paths.temp_dir.as_deref(),
            self.storage.format,
        )
    }

    /// Reject settings that cannot produce a valid run.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(MmfError::InvalidConfig(msg));
        if self.frame.height == 0 || self.frame.width == 0 {
            return fail(format!("frame size {} has a zero dimension", self.frame));
        }
        if self.pattern_size == 0 {
            return fail("pattern_size must be positive".into());
        }
        if self.pattern_size > self.frame.height.min(self.frame.width) {
            return fail(format!(
                "pattern_size {} does not fit in a {} frame",
                self.pattern_size, self.frame
            ));
        }
        let c = &self.chunks;
        for (name, value) in [
            ("vectorize_images", c.vectorize_images),
            ("transform_cols", c.transform_cols),
            ("concat_rows", c.concat_rows),
            ("pattern_pixels", c.pattern_pixels),
            ("progress_every", c.progress_every),
        ] {
            if value == 0 {
                return fail(format!("chunks.{name} must be positive"));
            }
        }
        if c.correlation_rows == Some(0) || c.reconstruction_rows == Some(0) {
            return fail("explicit block row counts must be positive".into());
        }
        if c.block_budget_bytes == 0 {
            return fail("chunks.block_budget_bytes must be positive".into());
        }
        let margin = self.storage.space_margin;
        if margin.is_nan() || margin < 1.0 {
            return fail(format!("storage.space_margin {margin} is below 1.0"));
        }
        Ok(())
    }
}

/// Input and output locations.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathConfig {
    pub patterns_h1: PathBuf,
    pub patterns_h2: PathBuf,
    pub speckles_h1: PathBuf,
    pub speckles_h2: PathBuf,
    pub output_dir: PathBuf,
    /// Where intermediate matrices go; defaults to `output_dir`.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            patterns_h1: PathBuf::from("patterns/h1"),
            patterns_h2: PathBuf::from("patterns/h2"),
            speckles_h1: PathBuf::from("speckles/h1"),
            speckles_h2: PathBuf::from("speckles/h2"),
            output_dir: PathBuf::from("output"),
            temp_dir: None,
        }
    }
}

/// Where the rows of the bipolar pattern matrix come from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternSource {
    /// Vectorize the captured H1/H2 pattern images.
    #[default]
    Captured,
    /// Generate H1 from the Sylvester construction and negate it for H2.
    Synthetic,
}

impl fmt::Display for PatternSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Captured => write!(f, "Captured"),
            Self::Synthetic => write!(f, "Synthetic"),
        }
    }
}

/// Whether the baseline speckle I¹ is added back after inversion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaselineConvention {
    #[default]
    Omit,
    AddBack,
}

impl fmt::Display for BaselineConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Omit => write!(f, "Omit"),
            Self::AddBack => write!(f, "Add back"),
        }
    }
}

/// How a real-valued reconstruction becomes an 8-bit image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputMode {
    /// Min–max rescale to 0–255.
    #[default]
    Normalized,
    /// 255 where the reconstruction is positive, else 0.
    Binarized,
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normalized => write!(f, "Normalized"),
            Self::Binarized => write!(f, "Binarized"),
        }
    }
}

/// Chunk sizes of every streaming stage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkConfig {
    #[serde(default = "default_vectorize_images")]
    pub vectorize_images: usize,
    #[serde(default = "default_transform_cols")]
    pub transform_cols: usize,
    #[serde(default = "default_concat_rows")]
    pub concat_rows: usize,
    #[serde(default = "default_pattern_pixels")]
    pub pattern_pixels: usize,
    /// Rows of Xᵗ per correlation block; derived from the budget when unset.
    #[serde(default)]
    pub correlation_rows: Option<usize>,
    /// Rows of Y per reconstruction block; derived from the budget when unset.
    #[serde(default)]
    pub reconstruction_rows: Option<usize>,
    #[serde(default = "default_block_budget")]
    pub block_budget_bytes: u64,
    #[serde(default = "default_progress_every")]
    pub progress_every: usize,
    #[serde(default = "default_rvitm_max_pixels")]
    pub rvitm_max_pixels: usize,
}

fn default_vectorize_images() -> usize {
    DEFAULT_VECTORIZE_CHUNK_IMAGES
}

fn default_transform_cols() -> usize {
    DEFAULT_TRANSFORM_CHUNK_COLS
}

fn default_concat_rows() -> usize {
    DEFAULT_CONCAT_CHUNK_ROWS
}

fn default_pattern_pixels() -> usize {
    DEFAULT_PATTERN_CHUNK_PIXELS
}

fn default_block_budget() -> u64 {
    DEFAULT_BLOCK_BUDGET_BYTES
}

fn default_progress_every() -> usize {
    DEFAULT_PROGRESS_EVERY
}

fn default_rvitm_max_pixels() -> usize {
    DEFAULT_RVITM_MAX_PIXELS
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            vectorize_images: default_vectorize_images(),
            transform_cols: default_transform_cols(),
            concat_rows: default_concat_rows(),
            pattern_pixels: default_pattern_pixels(),
            correlation_rows: None,
            reconstruction_rows: None,
            block_budget_bytes: default_block_budget(),
            progress_every: default_progress_every(),
            rvitm_max_pixels: default_rvitm_max_pixels(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub format: MatrixFormat,
    #[serde(default = "default_space_margin")]
    pub space_margin: f64,
    /// Keep Y_H1/Y_H2 and the vectorized inputs after a successful build.
    #[serde(default)]
    pub keep_temporaries: bool,
    /// Also write each reconstruction as an (M, 1) f32 matrix.
    #[serde(default)]
    pub save_raw_reconstruction: bool,
}

fn default_space_margin() -> f64 {
    DEFAULT_SPACE_MARGIN
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            format: MatrixFormat::default(),
            space_margin: default_space_margin(),
            keep_temporaries: false,
            save_raw_reconstruction: false,
        }
    }
}

/// Sampling of the H2 = −H1 check.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerificationConfig {
    #[serde(default = "default_random_samples")]
    pub random_samples: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Central pixels compared per row; 0 compares whole rows.
    #[serde(default = "default_window")]
    pub window: usize,
}

fn default_random_samples() -> usize {
    DEFAULT_NEGATION_RANDOM_SAMPLES
}

fn default_seed() -> u64 {
    DEFAULT_NEGATION_SEED
}

fn default_window() -> usize {
    DEFAULT_NEGATION_WINDOW
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            random_samples: default_random_samples(),
            seed: default_seed(),
            window: default_window(),
        }
    }
}

/// Locations of every matrix a run produces.
#[derive(Clone, Debug, PartialEq)]
pub struct ArtifactPaths {
    pub patterns_h1: PathBuf,
    pub patterns_h2: PathBuf,
    pub speckles_h1: PathBuf,
    pub speckles_h2: PathBuf,
    pub hadamard_xt: PathBuf,
    pub intensity_y: PathBuf,
    pub baseline: PathBuf,
    pub rvitm: PathBuf,
    pub temp_y_h1: PathBuf,
    pub temp_y_h2: PathBuf,
}

impl ArtifactPaths {
    pub fn new(output_dir: &Path, temp_dir: Option<&Path>, format: MatrixFormat) -> Self {
        let temp = temp_dir.unwrap_or(output_dir);
        let ext = format.extension();
        let file = |dir: &Path, stem: &str| dir.join(format!("{stem}.{ext}"));
        Self {
            patterns_h1: file(temp, "patterns_h1"),
            patterns_h2: file(temp, "patterns_h2"),
            speckles_h1: file(temp, "speckles_h1"),
            speckles_h2: file(temp, "speckles_h2"),
            hadamard_xt: file(output_dir, "hadamard_xt"),
            intensity_y: file(output_dir, "intensity_y"),
            baseline: file(output_dir, "baseline"),
            rvitm: file(output_dir, "rvitm"),
            temp_y_h1: file(temp, "temp_y_h1"),
            temp_y_h2: file(temp, "temp_y_h2"),
        }
    }

    /// Intermediates superseded once X and Y are built.
    pub fn intermediates(&self) -> Vec<PathBuf> {
        vec![
            self.patterns_h1.clone(),
            self.patterns_h2.clone(),
            self.speckles_h1.clone(),
            self.speckles_h2.clone(),
            self.temp_y_h1.clone(),
            self.temp_y_h2.clone(),
        ]
    }
}
