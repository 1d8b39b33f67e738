use std::collections::HashSet;
use std::path::{Path, PathBuf};

use num_traits::AsPrimitive;
use tracing::debug;

use crate::consts::{
    INSPECT_REGION, INSPECT_STRIDE, INTENSITY_MAX, INTENSITY_MIN, MIN_SAMPLES_PER_AXIS,
};
use crate::error::{raise, MmfError, Result, Warning};
use crate::io::matrix::{read_npy_header, DType, Element, MatrixFormat, MatrixReader};

/// Summary statistics of a set of samples.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub distinct: usize,
}

impl SampleStats {
    pub fn from_values<I: IntoIterator<Item = f64>>(values: I) -> Option<Self> {
        let mut count = 0usize;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        let mut distinct = HashSet::new();
        for v in values {
            count += 1;
            min = min.min(v);
            max = max.max(v);
            sum += v;
            distinct.insert(v.to_bits());
        }
        (count > 0).then(|| Self {
            count,
            min,
            max,
            mean: sum / count as f64,
            distinct: distinct.len(),
        })
    }
}

/// Statistics of one inspected block.
#[derive(Clone, Debug)]
pub struct RegionStats {
    pub label: &'static str,
    pub row: usize,
    pub col: usize,
    pub rows: usize,
    pub cols: usize,
    pub stats: SampleStats,
}

/// Bounded-read inspection report of a matrix file.
#[derive(Clone, Debug)]
pub struct MatrixStats {
    pub path: PathBuf,
    pub dtype: DType,
    pub rows: usize,
    pub cols: usize,
    pub file_bytes: u64,
    pub regions: Vec<RegionStats>,
    /// Strided sample over the whole matrix.
    pub sample: SampleStats,
}

/// Inspect top-left, centre and bottom-right blocks plus a strided sample.
pub fn inspect_matrix<T: Element>(reader: &MatrixReader<T>) -> Result<MatrixStats> {
    let (rows, cols) = (reader.rows(), reader.cols());
    let h = INSPECT_REGION.min(rows);
    let w = INSPECT_REGION.min(cols);
    let anchors = [
        ("top-left", 0, 0),
        ("centre", (rows - h) / 2, (cols - w) / 2),
        ("bottom-right", rows - h, cols - w),
    ];

    let mut regions = Vec::with_capacity(anchors.len());
    for (label, row, col) in anchors {
        let block = reader.read_block(row, h, col, w)?;
        let values = block.iter().map(|&v| AsPrimitive::<f64>::as_(v));
        if let Some(stats) = SampleStats::from_values(values) {
            regions.push(RegionStats {
                label,
                row,
                col,
                rows: h,
                cols: w,
                stats,
            });
        }
    }

    let sample = sparse_stats(reader, sample_stride(rows, cols))?;
    debug!(path = %reader.path().display(), rows, cols, "Inspected matrix");

    Ok(MatrixStats {
        path: reader.path().to_path_buf(),
        dtype: T::DTYPE,
        rows,
        cols,
        file_bytes: reader.file_len(),
        regions,
        sample,
    })
}

/// Sampling stride for a rows×cols matrix: [`INSPECT_STRIDE`] on large
/// matrices, finer on small ones.
pub fn sample_stride(rows: usize, cols: usize) -> usize {
    (rows.min(cols) / MIN_SAMPLES_PER_AXIS).clamp(1, INSPECT_STRIDE)
}

/// Statistics of every `stride`-th element along both axes.
pub fn sparse_stats<T: Element>(reader: &MatrixReader<T>, stride: usize) -> Result<SampleStats> {
    let stride = stride.max(1);
    let mut values = Vec::new();
    for r in (0..reader.rows()).step_by(stride) {
        let row = reader.read_row(r)?;
        values.extend(row.iter().step_by(stride).map(|&v| AsPrimitive::<f64>::as_(v)));
    }
    SampleStats::from_values(values).ok_or_else(|| MmfError::InvalidMatrix {
        path: reader.path().to_path_buf(),
        reason: "no elements to sample".into(),
    })
}

/// Sampled (min, max) of an intensity matrix, raising a warning when the
/// range is no wider than `min_range` or leaves [−255, 510].
pub fn check_intensity_range(
    reader: &MatrixReader<i16>,
    min_range: i64,
    warnings: &mut Vec<Warning>,
) -> Result<(i64, i64)> {
    let stats = sparse_stats(reader, sample_stride(reader.rows(), reader.cols()))?;
    let (min, max) = (stats.min as i64, stats.max as i64);
    if max - min <= min_range || min < INTENSITY_MIN || max > INTENSITY_MAX {
        raise(warnings, Warning::SuspiciousIntensityRange { min, max });
    }
    Ok((min, max))
}

/// Shape and dtype of a headerless file, supplied by the caller.
#[derive(Clone, Copy, Debug)]
pub struct RawLayout {
    pub dtype: DType,
    pub rows: usize,
    pub cols: usize,
}

/// Inspect a matrix file of any supported dtype.
pub fn inspect_file(
    path: &Path,
    format: MatrixFormat,
    raw: Option<RawLayout>,
) -> Result<MatrixStats> {
    let (dtype, shape) = match format {
        MatrixFormat::Npy => (read_npy_header(path)?.dtype, None),
        MatrixFormat::Raw => {
            let layout = raw.ok_or_else(|| {
                MmfError::InvalidConfig("raw matrices need a declared dtype and shape".into())
            })?;
            (layout.dtype, Some((layout.rows, layout.cols)))
        }
    };

    fn open<T: Element>(path: &Path, shape: Option<(usize, usize)>) -> Result<MatrixStats> {
        let reader = match shape {
            Some((rows, cols)) => MatrixReader::<T>::open_raw(path, rows, cols)?,
            None => MatrixReader::<T>::open(path)?,
        };
        inspect_matrix(&reader)
    }

    match dtype {
        DType::U8 => open::<u8>(path, shape),
        DType::I8 => open::<i8>(path, shape),
        DType::I16 => open::<i16>(path, shape),
        DType::F32 => open::<f32>(path, shape),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_of_known_values() {
        let s = SampleStats::from_values([1.0, 3.0, 3.0, -2.0]).unwrap();
        assert_eq!(s.count, 4);
        assert_eq!(s.min, -2.0);
        assert_eq!(s.max, 3.0);
        assert_eq!(s.mean, 1.25);
        assert_eq!(s.distinct, 3);
    }

    #[test]
    fn stride_adapts_to_small_matrices() {
        assert_eq!(sample_stride(64, 32), 1);
        assert_eq!(sample_stride(1_310_720, 8192), 256);
        assert_eq!(sample_stride(10_000_000, 1_000_000), INSPECT_STRIDE);
    }

    #[test]
    fn empty_stats_is_none() {
        assert!(SampleStats::from_values(std::iter::empty()).is_none());
    }
}
