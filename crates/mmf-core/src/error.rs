use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::io::matrix::DType;

#[derive(Error, Debug)]
pub enum MmfError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Missing file: {}", .0.display())]
    MissingFile(PathBuf),

    #[error(
        "Image {} has unexpected size: expected {expected_height}x{expected_width}, got {actual_height}x{actual_width}",
        path.display()
    )]
    ImageShapeMismatch {
        path: PathBuf,
        expected_height: usize,
        expected_width: usize,
        actual_height: usize,
        actual_width: usize,
    },

    #[error("{stage}: {dimension} mismatch (expected {expected}, got {actual})")]
    ShapeMismatch {
        stage: &'static str,
        dimension: String,
        expected: usize,
        actual: usize,
    },

    #[error("Matrix {} has dtype {actual}, expected {expected}", path.display())]
    DTypeMismatch {
        path: PathBuf,
        expected: DType,
        actual: DType,
    },

    #[error("Invalid matrix file {}: {reason}", path.display())]
    InvalidMatrix { path: PathBuf, reason: String },

    #[error(
        "Matrix {} is truncated or oversized: expected {expected_bytes} bytes, found {actual_bytes}",
        path.display()
    )]
    TruncatedMatrix {
        path: PathBuf,
        expected_bytes: u64,
        actual_bytes: u64,
    },

    #[error(
        "Insufficient disk space for {}: need {required} bytes, {available} available",
        path.display()
    )]
    InsufficientSpace {
        path: PathBuf,
        required: u64,
        available: u64,
    },

    #[error("Matrix of {rows}x{cols} elements exceeds the addressable element count")]
    SizeOverflow { rows: usize, cols: usize },

    #[error("Frame ordering error in {}: {reason}", dir.display())]
    FrameOrdering { dir: PathBuf, reason: String },

    #[error("{what}: count mismatch ({left} vs {right})")]
    CountMismatch {
        what: &'static str,
        left: usize,
        right: usize,
    },

    #[error("Chunk at element offset {offset} written after offset {previous}")]
    ChunkOrder { offset: u64, previous: u64 },

    #[error("Block [{row}..+{rows}, {col}..+{cols}] out of range for {total_rows}x{total_cols} matrix")]
    BlockOutOfRange {
        row: usize,
        rows: usize,
        col: usize,
        cols: usize,
        total_rows: usize,
        total_cols: usize,
    },

    #[error("Matrix {} incomplete: {written} of {expected} elements written", path.display())]
    IncompleteMatrix {
        path: PathBuf,
        written: u64,
        expected: u64,
    },

    #[error("{stage} interrupted")]
    Interrupted { stage: &'static str },

    #[error("Full transmission matrix for {pixels} pixels exceeds the limit of {limit}")]
    Infeasible { pixels: usize, limit: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Empty frame sequence")]
    EmptySequence,
}

pub type Result<T> = std::result::Result<T, MmfError>;

/// Advisory conditions. These never abort a stage; they are collected in the
/// stage summary and logged at `warn` level.
#[derive(Clone, Debug, PartialEq)]
pub enum Warning {
    NonPowerOfTwoPatterns { count: usize },
    PatternOrderMismatch { expected: usize, actual: usize },
    NegationCheckFailed { failed: usize, checked: usize },
    SuspiciousIntensityRange { min: i64, max: i64 },
    LargeChunkFootprint {
        stage: &'static str,
        bytes: u64,
        budget: u64,
    },
    DegenerateResult { value: f32 },
    UnindexedFilenames { dir: PathBuf },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonPowerOfTwoPatterns { count } => {
                write!(f, "pattern count {count} is not a power of two")
            }
            Self::PatternOrderMismatch { expected, actual } => write!(
                f,
                "pattern count {actual} does not match the configured order {expected}"
            ),
            Self::NegationCheckFailed { failed, checked } => write!(
                f,
                "{failed} of {checked} sampled H2 rows are not the negation of H1"
            ),
            Self::SuspiciousIntensityRange { min, max } => {
                write!(f, "intensity samples span a suspicious range [{min}, {max}]")
            }
            Self::LargeChunkFootprint {
                stage,
                bytes,
                budget,
            } => write!(
                f,
                "{stage}: chunk footprint {bytes} bytes exceeds budget {budget} bytes"
            ),
            Self::DegenerateResult { value } => write!(
                f,
                "reconstruction is uniform ({value}); emitted mid-gray image"
            ),
            Self::UnindexedFilenames { dir } => write!(
                f,
                "{} has files without a numeric index; using lexicographic order",
                dir.display()
            ),
        }
    }
}

/// Log a warning and append it to `sink`.
pub fn raise(sink: &mut Vec<Warning>, warning: Warning) {
    tracing::warn!("{}", warning);
    sink.push(warning);
}
