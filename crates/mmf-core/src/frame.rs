use std::path::PathBuf;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Height and width of every image in an experiment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameShape {
    pub height: usize,
    pub width: usize,
}

impl FrameShape {
    pub fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }

    /// Number of pixels, M = H·W.
    pub fn pixels(&self) -> usize {
        self.height * self.width
    }

    /// Flat raster index of (row, col).
    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.width + col
    }
}

impl std::fmt::Display for FrameShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.height, self.width)
    }
}

/// A single 8-bit grayscale image.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Pixel data, row-major, shape = (height, width)
    pub data: Array2<u8>,
    /// File the frame was loaded from, if any
    pub source: Option<PathBuf>,
}

impl Frame {
    pub fn new(data: Array2<u8>) -> Self {
        Self { data, source: None }
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    pub fn shape(&self) -> FrameShape {
        FrameShape::new(self.height(), self.width())
    }

    /// Map every sample to 1 if it exceeds `threshold`, else 0.
    pub fn binarized(&self, threshold: u8) -> Frame {
        Frame {
            data: self.data.mapv(|v| u8::from(v > threshold)),
            source: self.source.clone(),
        }
    }

    /// Raster-order flattening: pixel (row, col) lands at row·W + col.
    pub fn to_vector(&self) -> Array1<u8> {
        self.data.iter().copied().collect()
    }

    /// Raster-order flattening converted to f32.
    pub fn to_vector_f32(&self) -> Array1<f32> {
        self.data.iter().map(|&v| v as f32).collect()
    }
}

/// How captured speckle samples enter the intensity matrix and reconstruction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeckleEncoding {
    /// Keep raw 0–255 intensities.
    #[default]
    Raw,
    /// Threshold to {0, 1} at the configured gray level.
    Binarized,
}

impl std::fmt::Display for SpeckleEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Raw => write!(f, "Raw"),
            Self::Binarized => write!(f, "Binarized"),
        }
    }
}
