use std::fs::{self, File};
use std::io::{Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use ndarray::ArrayView2;
use tracing::debug;

use crate::error::{MmfError, Result};
use crate::io::disk::{ensure_free_space, partial_path, remove_stale};
use crate::io::matrix::{data_bytes, npy_header, Element, MatrixFormat};

/// Chunked writer for a disk matrix.
///
/// Data goes to `<path>.partial` and only appears at `path` once
/// [`MatrixWriter::finalize`] has verified that every element was written.
/// Blocks must not overlap and arrive in raster order: each one either
/// starts below the previous block's last row, or shares its row band and
/// starts right of its last column.
pub struct MatrixWriter<T: Element> {
    file: File,
    path: PathBuf,
    partial: PathBuf,
    rows: usize,
    cols: usize,
    data_offset: u64,
    last_block: Option<BlockSpan>,
    written: u64,
    buf: Vec<u8>,
    _marker: PhantomData<T>,
}

#[derive(Debug, Clone, Copy)]
struct BlockSpan {
    row: usize,
    nrows: usize,
    col: usize,
    ncols: usize,
}

impl BlockSpan {
    /// True when `self` can be written after `previous` without touching
    /// any element written so far.
    fn follows(&self, previous: &BlockSpan) -> bool {
        let below = self.row >= previous.row + previous.nrows;
        let same_band = self.row == previous.row && self.nrows == previous.nrows;
        below || (same_band && self.col >= previous.col + previous.ncols)
    }
}

impl<T: Element> MatrixWriter<T> {
    /// Create a rows×cols matrix at `path`.
    ///
    /// Stale files from earlier runs are deleted first, then the free space
    /// on the target volume is compared against the full file size times
    /// `space_margin` before anything is allocated.
    pub fn create(
        path: &Path,
        rows: usize,
        cols: usize,
        format: MatrixFormat,
        space_margin: f64,
    ) -> Result<Self> {
        let data_len = data_bytes(rows, cols, T::DTYPE)?;
        if rows == 0 || cols == 0 {
            return Err(MmfError::InvalidMatrix {
                path: path.to_path_buf(),
                reason: format!("empty shape {rows}x{cols}"),
            });
        }

        remove_stale(path)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let header = match format {
            MatrixFormat::Npy => npy_header(T::DTYPE, rows, cols),
            MatrixFormat::Raw => Vec::new(),
        };
        let total = header.len() as u64 + data_len;
        ensure_free_space(path, total, space_margin)?;

        let partial = partial_path(path);
        let mut file = File::create(&partial)?;
        file.write_all(&header)?;
        file.set_len(total)?;

        debug!(
            path = %path.display(),
            rows,
            cols,
            dtype = %T::DTYPE,
            bytes = total,
            "Created matrix"
        );

        Ok(Self {
            file,
            path: path.to_path_buf(),
            partial,
            rows,
            cols,
            data_offset: header.len() as u64,
            last_block: None,
            written: 0,
            buf: Vec::new(),
            _marker: PhantomData,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `block` with its top-left corner at (row, col).
    pub fn write_block(&mut self, row: usize, col: usize, block: ArrayView2<T>) -> Result<()> {
        let (nrows, ncols) = block.dim();
        let out_of_range = || MmfError::BlockOutOfRange {
            row,
            rows: nrows,
            col,
            cols: ncols,
            total_rows: self.rows,
            total_cols: self.cols,
        };
        let row_end = row.checked_add(nrows).ok_or_else(out_of_range)?;
        let col_end = col.checked_add(ncols).ok_or_else(out_of_range)?;
        if row_end > self.rows || col_end > self.cols {
            return Err(out_of_range());
        }

        let span = BlockSpan {
            row,
            nrows,
            col,
            ncols,
        };
        let start = (row * self.cols + col) as u64;
        if let Some(previous) = self.last_block {
            if !span.follows(&previous) {
                return Err(MmfError::ChunkOrder {
                    offset: start,
                    previous: (previous.row * self.cols + previous.col) as u64,
                });
            }
        }

        let size = T::DTYPE.size();
        match block.as_slice() {
            // Whole rows in standard layout: one contiguous write.
            Some(values) if col == 0 && ncols == self.cols => {
                self.buf.resize(values.len() * size, 0);
                T::encode(values, &mut self.buf);
                self.file
                    .seek(SeekFrom::Start(self.data_offset + start * size as u64))?;
                self.file.write_all(&self.buf)?;
            }
            _ => {
                self.buf.resize(ncols * size, 0);
                let mut scratch: Vec<T> = Vec::with_capacity(ncols);
                for (r, line) in block.rows().into_iter().enumerate() {
                    let values = match line.as_slice() {
                        Some(s) => s,
                        None => {
                            scratch.clear();
                            scratch.extend(line.iter().copied());
                            scratch.as_slice()
                        }
                    };
                    T::encode(values, &mut self.buf);
                    let offset = ((row + r) * self.cols + col) as u64;
                    self.file
                        .seek(SeekFrom::Start(self.data_offset + offset * size as u64))?;
                    self.file.write_all(&self.buf)?;
                }
            }
        }

        self.last_block = Some(span);
        self.written += (nrows * ncols) as u64;
        Ok(())
    }

    /// Write full rows starting at `row`.
    pub fn write_rows(&mut self, row: usize, block: ArrayView2<T>) -> Result<()> {
        self.write_block(row, 0, block)
    }

    /// Persist everything written so far.
    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Verify completeness, sync and move the file to its final path.
    pub fn finalize(mut self) -> Result<PathBuf> {
        let expected = (self.rows * self.cols) as u64;
        if self.written != expected {
            return Err(MmfError::IncompleteMatrix {
                path: self.path.clone(),
                written: self.written,
                expected,
            });
        }
        self.file.flush()?;
        self.file.sync_all()?;
        fs::rename(&self.partial, &self.path)?;
        debug!(path = %self.path.display(), "Finalized matrix");
        Ok(self.path)
    }
}

/// Write a small in-memory matrix in one go. Intended for vectors and test
/// fixtures, never for full-size experiment matrices.
pub fn write_matrix<T: Element>(
    path: &Path,
    data: ArrayView2<T>,
    format: MatrixFormat,
    space_margin: f64,
) -> Result<PathBuf> {
    let (rows, cols) = data.dim();
    let mut writer = MatrixWriter::<T>::create(path, rows, cols, format, space_margin)?;
    writer.write_rows(0, data)?;
    writer.finalize()
}
