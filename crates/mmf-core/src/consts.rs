/// Gray level above which a pattern pixel counts as "on".
pub const DEFAULT_THRESHOLD: u8 = 127;

/// Side length of the square Hadamard pattern (N = size² patterns).
pub const DEFAULT_PATTERN_SIZE: usize = 64;

/// Camera frame height in pixels.
pub const DEFAULT_FRAME_HEIGHT: usize = 1024;

/// Camera frame width in pixels.
pub const DEFAULT_FRAME_WIDTH: usize = 1280;

/// Images decoded and written per vectorization chunk.
pub const DEFAULT_VECTORIZE_CHUNK_IMAGES: usize = 64;

/// Columns transformed per chunk during baseline subtraction.
pub const DEFAULT_TRANSFORM_CHUNK_COLS: usize = 256;

/// Rows copied per chunk during concatenation. Small chunks keep page-cache
/// pressure low on removable and network volumes.
pub const DEFAULT_CONCAT_CHUNK_ROWS: usize = 250;

/// Pixel columns of the pattern matrix produced per chunk.
pub const DEFAULT_PATTERN_CHUNK_PIXELS: usize = 4096;

/// Working-set budget for one f32 block in the correlation and
/// reconstruction stages. Default: 1 GiB.
pub const DEFAULT_BLOCK_BUDGET_BYTES: u64 = 1_073_741_824;

/// Report concatenation progress every this many chunks.
pub const DEFAULT_PROGRESS_EVERY: usize = 100;

/// Free space must exceed the target size by this factor.
pub const DEFAULT_SPACE_MARGIN: f64 = 1.1;

/// Largest pixel count for which the full M×M transmission estimate is built.
pub const DEFAULT_RVITM_MAX_PIXELS: usize = 16_384;

/// Random H1/H2 pairs checked by the negation verification.
pub const DEFAULT_NEGATION_RANDOM_SAMPLES: usize = 5;

/// Seed of the negation verification sampler.
pub const DEFAULT_NEGATION_SEED: u64 = 42;

/// Central pixel window compared per sampled row (0 compares whole rows).
pub const DEFAULT_NEGATION_WINDOW: usize = 2_500;

/// Gray level written when a reconstruction has zero dynamic range.
pub const DEGENERATE_GRAY: u8 = 128;

/// Minimum sampled range of a healthy intensity matrix.
pub const MIN_INTENSITY_RANGE: i64 = 10;

/// Admissible values of 2·I^p − I¹ for 8-bit samples.
pub const INTENSITY_MIN: i64 = -255;
pub const INTENSITY_MAX: i64 = 510;

/// Largest stride of the sparse sample used by matrix inspection.
pub const INSPECT_STRIDE: usize = 1000;

/// The sparse sample narrows its stride to reach this many samples per axis.
pub const MIN_SAMPLES_PER_AXIS: usize = 32;

/// Side length of each inspected region.
pub const INSPECT_REGION: usize = 100;
