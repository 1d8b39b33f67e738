use std::fmt;

use ndarray::{Array2, ArrayViewMut2};

use crate::error::{MmfError, Result};
use crate::frame::{Frame, FrameShape};

use super::{is_power_of_two, sylvester_entry};

/// One of the two complementary pattern sets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatternSet {
    /// Lit where the Hadamard entry is +1.
    H1,
    /// Lit where the Hadamard entry is −1 (inside the active area).
    H2,
}

impl fmt::Display for PatternSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::H1 => write!(f, "H1"),
            Self::H2 => write!(f, "H2"),
        }
    }
}

/// Placement of a size×size Hadamard pattern in a camera-sized frame.
///
/// Pattern j is column j of the order-size² Sylvester matrix laid out row by
/// row, every cell upscaled to a scale×scale block and the square centred in
/// the frame. Pixels outside the square are dark in both sets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatternLayout {
    pub size: usize,
    pub frame: FrameShape,
    pub scale: usize,
    pub row_offset: usize,
    pub col_offset: usize,
}

impl PatternLayout {
    pub fn new(size: usize, frame: FrameShape) -> Result<Self> {
        if !is_power_of_two(size) {
            return Err(MmfError::InvalidConfig(format!(
                "pattern size {size} is not a power of two"
            )));
        }
        let scale = frame.height.min(frame.width) / size;
        if scale == 0 {
            return Err(MmfError::InvalidConfig(format!(
                "pattern size {size} does not fit in a {frame} frame"
            )));
        }
        let extent = size * scale;
        Ok(Self {
            size,
            frame,
            scale,
            row_offset: (frame.height - extent) / 2,
            col_offset: (frame.width - extent) / 2,
        })
    }

    /// Number of patterns per set, N = size².
    pub fn order(&self) -> usize {
        self.size * self.size
    }

    /// Side length of the lit square in pixels.
    pub fn extent(&self) -> usize {
        self.size * self.scale
    }

    /// Hadamard cell covering frame pixel (row, col), if inside the square.
    pub fn cell_at(&self, row: usize, col: usize) -> Option<usize> {
        let r = row.checked_sub(self.row_offset)?;
        let c = col.checked_sub(self.col_offset)?;
        if r >= self.extent() || c >= self.extent() {
            return None;
        }
        Some((r / self.scale) * self.size + c / self.scale)
    }

    /// Same as [`cell_at`](Self::cell_at) for a flat raster index.
    pub fn cell_of_pixel(&self, pixel: usize) -> Option<usize> {
        self.cell_at(pixel / self.frame.width, pixel % self.frame.width)
    }

    /// Whether `pixel` is lit in pattern `j` of `set`.
    pub fn is_lit(&self, set: PatternSet, j: usize, pixel: usize) -> bool {
        match self.cell_of_pixel(pixel) {
            Some(k) => {
                let positive = sylvester_entry(k, j) > 0;
                match set {
                    PatternSet::H1 => positive,
                    PatternSet::H2 => !positive,
                }
            }
            None => false,
        }
    }

    /// ±1 value of pattern `j` at `pixel`; dark pixels map to −1.
    #[inline]
    pub fn bipolar(&self, j: usize, pixel: usize) -> i8 {
        if self.is_lit(PatternSet::H1, j, pixel) {
            1
        } else {
            -1
        }
    }

    /// Render pattern `j` of `set` as an 8-bit frame (255 lit, 0 dark).
    pub fn pattern_image(&self, set: PatternSet, j: usize) -> Frame {
        let mut data = Array2::<u8>::zeros((self.frame.height, self.frame.width));
        self.fill_square(set, j, data.view_mut());
        Frame::new(data)
    }

    fn fill_square(&self, set: PatternSet, j: usize, mut data: ArrayViewMut2<u8>) {
        let extent = self.extent();
        for r in 0..extent {
            let cell_row = r / self.scale;
            for c in 0..extent {
                let k = cell_row * self.size + c / self.scale;
                let positive = sylvester_entry(k, j) > 0;
                let lit = match set {
                    PatternSet::H1 => positive,
                    PatternSet::H2 => !positive,
                };
                if lit {
                    data[[self.row_offset + r, self.col_offset + c]] = 255;
                }
            }
        }
    }
}
