use std::path::Path;

use image::{GrayImage, ImageFormat, Luma};
use ndarray::{Array2, ArrayView2};

use crate::error::{MmfError, Result};
use crate::frame::{Frame, FrameShape};

/// Read only the dimensions of an image file.
pub fn image_shape(path: &Path) -> Result<FrameShape> {
    if !path.exists() {
        return Err(MmfError::MissingFile(path.to_path_buf()));
    }
    let (w, h) = image::image_dimensions(path)?;
    Ok(FrameShape::new(h as usize, w as usize))
}

/// Load an image file as 8-bit grayscale.
pub fn load_gray(path: &Path) -> Result<Frame> {
    if !path.exists() {
        return Err(MmfError::MissingFile(path.to_path_buf()));
    }
    let gray = image::open(path)?.to_luma8();
    let (w, h) = gray.dimensions();
    let data = Array2::from_shape_vec((h as usize, w as usize), gray.into_raw())?;
    Ok(Frame {
        data,
        source: Some(path.to_path_buf()),
    })
}

/// Load an image and require it to have exactly `expected` dimensions.
pub fn load_gray_expected(path: &Path, expected: FrameShape) -> Result<Frame> {
    let frame = load_gray(path)?;
    check_shape(path, expected, frame.shape())?;
    Ok(frame)
}

/// Fail with ImageShapeMismatch naming `path` unless the shapes agree.
pub fn check_shape(path: &Path, expected: FrameShape, actual: FrameShape) -> Result<()> {
    if expected != actual {
        return Err(MmfError::ImageShapeMismatch {
            path: path.to_path_buf(),
            expected_height: expected.height,
            expected_width: expected.width,
            actual_height: actual.height,
            actual_width: actual.width,
        });
    }
    Ok(())
}

/// Save 8-bit samples as a grayscale PNG.
pub fn save_gray(data: ArrayView2<u8>, path: &Path) -> Result<()> {
    let (h, w) = data.dim();
    let mut img = GrayImage::new(w as u32, h as u32);
    for ((row, col), &val) in data.indexed_iter() {
        img.put_pixel(col as u32, row as u32, Luma([val]));
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    img.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

/// Save a frame as a grayscale PNG.
pub fn save_frame(frame: &Frame, path: &Path) -> Result<()> {
    save_gray(frame.data.view(), path)
}
