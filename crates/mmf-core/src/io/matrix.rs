use std::fmt;
use std::fs::File;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};
use memmap2::Mmap;
use ndarray::{Array1, Array2};
use num_traits::AsPrimitive;
use serde::{Deserialize, Serialize};

use crate::error::{MmfError, Result};

pub(crate) const NPY_MAGIC: &[u8; 6] = b"\x93NUMPY";
/// Data in a version 1.0 .npy file starts on a multiple of this.
pub(crate) const NPY_ALIGN: usize = 64;
const NPY_PREAMBLE_V1: usize = 10;
const NPY_PREAMBLE_V2: usize = 12;

/// Element type of an on-disk matrix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DType {
    U8,
    I8,
    I16,
    F32,
}

impl DType {
    /// Bytes per element.
    pub fn size(&self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::I16 => 2,
            Self::F32 => 4,
        }
    }

    /// NumPy type descriptor (little-endian).
    pub fn descr(&self) -> &'static str {
        match self {
            Self::U8 => "|u1",
            Self::I8 => "|i1",
            Self::I16 => "<i2",
            Self::F32 => "<f4",
        }
    }

    pub fn from_descr(descr: &str) -> Option<Self> {
        match descr {
            "|u1" | "<u1" | "u1" => Some(Self::U8),
            "|i1" | "<i1" | "i1" => Some(Self::I8),
            "<i2" => Some(Self::I16),
            "<f4" => Some(Self::F32),
            _ => None,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::U8 => write!(f, "uint8"),
            Self::I8 => write!(f, "int8"),
            Self::I16 => write!(f, "int16"),
            Self::F32 => write!(f, "float32"),
        }
    }
}

/// On-disk layout of a matrix file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatrixFormat {
    /// Self-describing NumPy .npy (v1.0 on write).
    #[default]
    Npy,
    /// Headerless blob; dtype and shape are declared by every reader.
    Raw,
}

impl MatrixFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Npy => "npy",
            Self::Raw => "dat",
        }
    }
}

impl fmt::Display for MatrixFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Npy => write!(f, "npy"),
            Self::Raw => write!(f, "raw"),
        }
    }
}

/// A scalar type that can be stored in a disk matrix.
pub trait Element:
    Copy + Default + Send + Sync + PartialEq + fmt::Debug + AsPrimitive<f32> + AsPrimitive<f64> + 'static
{
    const DTYPE: DType;

    /// Decode `out.len()` little-endian elements from `bytes`.
    fn decode(bytes: &[u8], out: &mut [Self]);

    /// Encode `values` into `out` (little-endian).
    fn encode(values: &[Self], out: &mut [u8]);
}

impl Element for u8 {
    const DTYPE: DType = DType::U8;

    fn decode(bytes: &[u8], out: &mut [Self]) {
        out.copy_from_slice(bytes);
    }

    fn encode(values: &[Self], out: &mut [u8]) {
        out.copy_from_slice(values);
    }
}

impl Element for i8 {
    const DTYPE: DType = DType::I8;

    fn decode(bytes: &[u8], out: &mut [Self]) {
        for (o, &b) in out.iter_mut().zip(bytes) {
            *o = b as i8;
        }
    }

    fn encode(values: &[Self], out: &mut [u8]) {
        for (o, &v) in out.iter_mut().zip(values) {
            *o = v as u8;
        }
    }
}

impl Element for i16 {
    const DTYPE: DType = DType::I16;

    fn decode(bytes: &[u8], out: &mut [Self]) {
        LittleEndian::read_i16_into(bytes, out);
    }

    fn encode(values: &[Self], out: &mut [u8]) {
        LittleEndian::write_i16_into(values, out);
    }
}

impl Element for f32 {
    const DTYPE: DType = DType::F32;

    fn decode(bytes: &[u8], out: &mut [Self]) {
        LittleEndian::read_f32_into(bytes, out);
    }

    fn encode(values: &[Self], out: &mut [u8]) {
        LittleEndian::write_f32_into(values, out);
    }
}

/// Shape, dtype and data offset of a matrix file.
#[derive(Clone, Debug, PartialEq)]
pub struct MatrixHeader {
    pub dtype: DType,
    pub rows: usize,
    pub cols: usize,
    /// Byte offset of element (0, 0).
    pub data_offset: usize,
}

impl MatrixHeader {
    /// Total bytes of element data.
    pub fn data_bytes(&self) -> Result<u64> {
        data_bytes(self.rows, self.cols, self.dtype)
    }
}

/// Byte size of a rows×cols matrix, rejecting element counts that overflow
/// the signed index range.
pub fn data_bytes(rows: usize, cols: usize, dtype: DType) -> Result<u64> {
    let elements = rows
        .checked_mul(cols)
        .filter(|&n| n <= isize::MAX as usize)
        .ok_or(MmfError::SizeOverflow { rows, cols })?;
    elements
        .checked_mul(dtype.size())
        .filter(|&n| n <= isize::MAX as usize)
        .map(|n| n as u64)
        .ok_or(MmfError::SizeOverflow { rows, cols })
}

/// Size on disk of a rows×cols matrix, header included.
pub fn file_bytes(rows: usize, cols: usize, dtype: DType, format: MatrixFormat) -> Result<u64> {
    let header = match format {
        MatrixFormat::Npy => npy_header(dtype, rows, cols).len() as u64,
        MatrixFormat::Raw => 0,
    };
    Ok(header + data_bytes(rows, cols, dtype)?)
}

/// Build a version 1.0 .npy header for a C-order 2-D matrix.
pub fn npy_header(dtype: DType, rows: usize, cols: usize) -> Vec<u8> {
    let dict = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': ({}, {}), }}",
        dtype.descr(),
        rows,
        cols
    );
    // Header text is terminated by '\n' and padded with spaces so the data
    // starts on an NPY_ALIGN boundary.
    let unpadded = NPY_PREAMBLE_V1 + dict.len() + 1;
    let total = unpadded.div_ceil(NPY_ALIGN) * NPY_ALIGN;
    let header_len = (total - NPY_PREAMBLE_V1) as u16;

    let mut buf = Vec::with_capacity(total);
    buf.extend_from_slice(NPY_MAGIC);
    buf.extend_from_slice(&[1, 0]);
    buf.extend_from_slice(&header_len.to_le_bytes());
    buf.extend_from_slice(dict.as_bytes());
    buf.resize(total - 1, b' ');
    buf.push(b'\n');
    buf
}

/// Parse the header of a .npy file.
pub fn parse_npy_header(buf: &[u8], path: &Path) -> Result<MatrixHeader> {
    let invalid = |reason: &str| MmfError::InvalidMatrix {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    if buf.len() < NPY_PREAMBLE_V1 || &buf[..6] != NPY_MAGIC {
        return Err(invalid("missing NUMPY magic"));
    }

    let (header_len, preamble) = match buf[6] {
        1 => (
            LittleEndian::read_u16(&buf[8..10]) as usize,
            NPY_PREAMBLE_V1,
        ),
        2 | 3 => {
            if buf.len() < NPY_PREAMBLE_V2 {
                return Err(invalid("header truncated"));
            }
            (
                LittleEndian::read_u32(&buf[8..12]) as usize,
                NPY_PREAMBLE_V2,
            )
        }
        v => return Err(invalid(&format!("unsupported npy version {v}"))),
    };

    let data_offset = preamble + header_len;
    if buf.len() < data_offset {
        return Err(invalid("header truncated"));
    }
    let dict = std::str::from_utf8(&buf[preamble..data_offset])
        .map_err(|_| invalid("header is not valid text"))?;

    let descr = dict_value(dict, "descr")
        .and_then(quoted)
        .ok_or_else(|| invalid("missing descr"))?;
    let dtype = DType::from_descr(descr)
        .ok_or_else(|| invalid(&format!("unsupported descr {descr}")))?;

    let fortran = dict_value(dict, "fortran_order").ok_or_else(|| invalid("missing fortran_order"))?;
    if fortran.starts_with("True") {
        return Err(invalid("Fortran-order arrays are not supported"));
    }

    let shape = dict_value(dict, "shape")
        .and_then(parse_shape)
        .ok_or_else(|| invalid("malformed shape"))?;
    let (rows, cols) = match shape.as_slice() {
        [n] => (*n, 1),
        [r, c] => (*r, *c),
        _ => return Err(invalid(&format!("expected a 2-D shape, got {shape:?}"))),
    };

    Ok(MatrixHeader {
        dtype,
        rows,
        cols,
        data_offset,
    })
}

/// Text following `'key':` in a header dict.
fn dict_value<'a>(dict: &'a str, key: &str) -> Option<&'a str> {
    let pattern = format!("'{key}':");
    let start = dict.find(&pattern)? + pattern.len();
    Some(dict[start..].trim_start())
}

/// Contents of the leading quoted string.
fn quoted(s: &str) -> Option<&str> {
    let quote = s.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let rest = &s[1..];
    let end = rest.find(quote)?;
    Some(&rest[..end])
}

fn parse_shape(s: &str) -> Option<Vec<usize>> {
    let inner = s.strip_prefix('(')?;
    let end = inner.find(')')?;
    inner[..end]
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| t.trim_end_matches('L').parse().ok())
        .collect()
}

/// Memory-mapped, read-only disk matrix. Data is only ever handed out in
/// bounded blocks.
pub struct MatrixReader<T: Element> {
    mmap: Mmap,
    path: PathBuf,
    pub header: MatrixHeader,
    _marker: PhantomData<T>,
}

impl<T: Element> MatrixReader<T> {
    /// Open a self-describing .npy matrix.
    pub fn open(path: &Path) -> Result<Self> {
        let mmap = map_existing(path)?;
        let header = parse_npy_header(&mmap[..mmap.len().min(4096)], path)?;
        Self::from_parts(mmap, path, header)
    }

    /// Open a headerless matrix with caller-declared shape.
    pub fn open_raw(path: &Path, rows: usize, cols: usize) -> Result<Self> {
        let mmap = map_existing(path)?;
        let header = MatrixHeader {
            dtype: T::DTYPE,
            rows,
            cols,
            data_offset: 0,
        };
        Self::from_parts(mmap, path, header)
    }

    /// Open in the given format and require the given shape.
    pub fn open_expected(
        path: &Path,
        format: MatrixFormat,
        rows: usize,
        cols: usize,
        stage: &'static str,
    ) -> Result<Self> {
        let reader = match format {
            MatrixFormat::Npy => Self::open(path)?,
            MatrixFormat::Raw => Self::open_raw(path, rows, cols)?,
        };
        reader.expect_shape(rows, cols, stage)?;
        Ok(reader)
    }

    fn from_parts(mmap: Mmap, path: &Path, header: MatrixHeader) -> Result<Self> {
        if header.dtype != T::DTYPE {
            return Err(MmfError::DTypeMismatch {
                path: path.to_path_buf(),
                expected: T::DTYPE,
                actual: header.dtype,
            });
        }
        if header.rows == 0 || header.cols == 0 {
            return Err(MmfError::InvalidMatrix {
                path: path.to_path_buf(),
                reason: format!("empty shape {}x{}", header.rows, header.cols),
            });
        }

        let expected_bytes = header.data_offset as u64 + header.data_bytes()?;
        if mmap.len() as u64 != expected_bytes {
            return Err(MmfError::TruncatedMatrix {
                path: path.to_path_buf(),
                expected_bytes,
                actual_bytes: mmap.len() as u64,
            });
        }

        Ok(Self {
            mmap,
            path: path.to_path_buf(),
            header,
            _marker: PhantomData,
        })
    }

    pub fn rows(&self) -> usize {
        self.header.rows
    }

    pub fn cols(&self) -> usize {
        self.header.cols
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_len(&self) -> u64 {
        self.mmap.len() as u64
    }

    /// Fail with a ShapeMismatch naming `stage` unless the shape matches.
    pub fn expect_shape(&self, rows: usize, cols: usize, stage: &'static str) -> Result<()> {
        if self.rows() != rows {
            return Err(MmfError::ShapeMismatch {
                stage,
                dimension: format!("rows of {}", self.path.display()),
                expected: rows,
                actual: self.rows(),
            });
        }
        if self.cols() != cols {
            return Err(MmfError::ShapeMismatch {
                stage,
                dimension: format!("columns of {}", self.path.display()),
                expected: cols,
                actual: self.cols(),
            });
        }
        Ok(())
    }

    /// Copy the block [row..row+nrows, col..col+ncols] out of the file.
    pub fn read_block(&self, row: usize, nrows: usize, col: usize, ncols: usize) -> Result<Array2<T>> {
        if row + nrows > self.rows() || col + ncols > self.cols() {
            return Err(MmfError::BlockOutOfRange {
                row,
                rows: nrows,
                col,
                cols: ncols,
                total_rows: self.rows(),
                total_cols: self.cols(),
            });
        }

        let size = T::DTYPE.size();
        let mut data = vec![T::default(); nrows * ncols];
        if ncols == self.cols() {
            let start = self.byte_offset(row, 0);
            T::decode(&self.mmap[start..start + nrows * ncols * size], &mut data);
        } else {
            for (r, out) in data.chunks_mut(ncols.max(1)).enumerate() {
                let start = self.byte_offset(row + r, col);
                T::decode(&self.mmap[start..start + ncols * size], out);
            }
        }

        Ok(Array2::from_shape_vec((nrows, ncols), data)?)
    }

    /// Full rows [start..start+count].
    pub fn read_rows(&self, start: usize, count: usize) -> Result<Array2<T>> {
        self.read_block(start, count, 0, self.cols())
    }

    pub fn read_row(&self, row: usize) -> Result<Array1<T>> {
        Ok(self.read_rows(row, 1)?.into_shape_with_order(self.cols())?)
    }

    /// A single column. Strided: touches every row once.
    pub fn read_col(&self, col: usize) -> Result<Array1<T>> {
        if col >= self.cols() {
            return Err(MmfError::BlockOutOfRange {
                row: 0,
                rows: self.rows(),
                col,
                cols: 1,
                total_rows: self.rows(),
                total_cols: self.cols(),
            });
        }
        let size = T::DTYPE.size();
        let mut out = Array1::<T>::default(self.rows());
        for (r, value) in out.iter_mut().enumerate() {
            let start = self.byte_offset(r, col);
            T::decode(&self.mmap[start..start + size], std::slice::from_mut(value));
        }
        Ok(out)
    }

    fn byte_offset(&self, row: usize, col: usize) -> usize {
        self.header.data_offset + (row * self.cols() + col) * T::DTYPE.size()
    }
}

/// Peek at the dtype and shape of a .npy file without committing to a type.
pub fn read_npy_header(path: &Path) -> Result<MatrixHeader> {
    let mmap = map_existing(path)?;
    parse_npy_header(&mmap[..mmap.len().min(4096)], path)
}

fn map_existing(path: &Path) -> Result<Mmap> {
    if !path.exists() {
        return Err(MmfError::MissingFile(path.to_path_buf()));
    }
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Err(MmfError::InvalidMatrix {
            path: path.to_path_buf(),
            reason: "file is empty".into(),
        });
    }
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(mmap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_aligned_and_parses_back() {
        let header = npy_header(DType::I16, 1_310_720, 8192);
        assert_eq!(header.len() % NPY_ALIGN, 0);
        assert_eq!(*header.last().unwrap(), b'\n');

        let parsed = parse_npy_header(&header, Path::new("x.npy")).unwrap();
        assert_eq!(parsed.dtype, DType::I16);
        assert_eq!(parsed.rows, 1_310_720);
        assert_eq!(parsed.cols, 8192);
        assert_eq!(parsed.data_offset, header.len());
    }

    #[test]
    fn one_dimensional_shape_is_a_column() {
        let text = "{'descr': '<f4', 'fortran_order': False, 'shape': (12,), }";
        let mut buf = Vec::new();
        buf.extend_from_slice(NPY_MAGIC);
        buf.extend_from_slice(&[1, 0]);
        buf.extend_from_slice(&(text.len() as u16).to_le_bytes());
        buf.extend_from_slice(text.as_bytes());

        let parsed = parse_npy_header(&buf, Path::new("v.npy")).unwrap();
        assert_eq!((parsed.rows, parsed.cols), (12, 1));
        assert_eq!(parsed.dtype, DType::F32);
    }

    #[test]
    fn fortran_order_is_rejected() {
        let text = "{'descr': '<i2', 'fortran_order': True, 'shape': (2, 2), }";
        let mut buf = Vec::new();
        buf.extend_from_slice(NPY_MAGIC);
        buf.extend_from_slice(&[1, 0]);
        buf.extend_from_slice(&(text.len() as u16).to_le_bytes());
        buf.extend_from_slice(text.as_bytes());

        assert!(parse_npy_header(&buf, Path::new("f.npy")).is_err());
    }

    #[test]
    fn overflowing_sizes_are_rejected() {
        assert!(data_bytes(usize::MAX / 2, 4, DType::U8).is_err());
        assert!(data_bytes(1 << 40, 1 << 30, DType::F32).is_err());
        assert_eq!(data_bytes(1_310_720, 8192, DType::I16).unwrap(), 21_474_836_480);
    }

    #[test]
    fn i8_encoding_round_trips_negative_values() {
        let values = [-1i8, 1, -128, 127];
        let mut bytes = [0u8; 4];
        i8::encode(&values, &mut bytes);
        let mut back = [0i8; 4];
        i8::decode(&bytes, &mut back);
        assert_eq!(back, values);
    }
}
