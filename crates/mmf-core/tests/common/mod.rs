#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use mmf_core::frame::FrameShape;
use mmf_core::hadamard::{save_patterns, PatternLayout, PatternSet};
use mmf_core::io::image_io::save_gray;
use mmf_core::io::matrix::{Element, MatrixFormat, MatrixReader};
use mmf_core::io::matrix_writer::write_matrix;
use mmf_core::pipeline::config::ExperimentConfig;
use mmf_core::pipeline::{Interrupt, NoOpReporter, StageContext};
use ndarray::Array2;

/// Context with no progress output.
pub fn quiet(interrupt: &Interrupt) -> StageContext<'_> {
    StageContext::new(&NoOpReporter, interrupt)
}

pub fn write_png(path: &Path, data: &Array2<u8>) {
    save_gray(data.view(), path).unwrap();
}

/// Write `frames` as `<prefix>_<first + i>.png` into `dir`.
pub fn write_frames(dir: &Path, prefix: &str, first: usize, frames: &[Array2<u8>]) -> Vec<PathBuf> {
    fs::create_dir_all(dir).unwrap();
    frames
        .iter()
        .enumerate()
        .map(|(i, frame)| {
            let path = dir.join(format!("{prefix}_{}.png", first + i));
            write_png(&path, frame);
            path
        })
        .collect()
}

pub fn write_npy<T: Element>(path: &Path, data: &Array2<T>) -> PathBuf {
    write_matrix(path, data.view(), MatrixFormat::Npy, 1.0).unwrap()
}

pub fn read_npy<T: Element>(path: &Path) -> Array2<T> {
    let reader = MatrixReader::<T>::open(path).unwrap();
    reader.read_rows(0, reader.rows()).unwrap()
}

/// 8x8 frames with 4x4 patterns scaled by 2, so every pixel is lit by the
/// pattern square. Chunk sizes are deliberately uneven.
pub fn small_config(root: &Path) -> ExperimentConfig {
    let mut config = ExperimentConfig::default();
    config.frame = FrameShape::new(8, 8);
    config.pattern_size = 4;
    config.paths.patterns_h1 = root.join("patterns/h1");
    config.paths.patterns_h2 = root.join("patterns/h2");
    config.paths.speckles_h1 = root.join("speckles/h1");
    config.paths.speckles_h2 = root.join("speckles/h2");
    config.paths.output_dir = root.join("out");
    config.paths.temp_dir = Some(root.join("tmp"));
    config.chunks.vectorize_images = 3;
    config.chunks.transform_cols = 5;
    config.chunks.concat_rows = 7;
    config.chunks.pattern_pixels = 10;
    config.chunks.progress_every = 1;
    config.chunks.correlation_rows = Some(3);
    config.chunks.reconstruction_rows = Some(5);
    config
}

/// Render both pattern sets and record speckles through an ideal fiber that
/// passes every pattern through unchanged. H2 speckles are numbered after
/// the H1 ones, as in a real acquisition.
pub fn acquire_identity_fiber(config: &ExperimentConfig) {
    let interrupt = Interrupt::new();
    let layout = PatternLayout::new(config.pattern_size, config.frame).unwrap();
    let paths = &config.paths;
    save_patterns(&paths.patterns_h1, PatternSet::H1, &layout, quiet(&interrupt)).unwrap();
    save_patterns(&paths.patterns_h2, PatternSet::H2, &layout, quiet(&interrupt)).unwrap();

    let n = layout.order();
    for (set, dir, first) in [
        (PatternSet::H1, &paths.speckles_h1, 0),
        (PatternSet::H2, &paths.speckles_h2, n),
    ] {
        let frames: Vec<Array2<u8>> = (0..n).map(|j| layout.pattern_image(set, j).data).collect();
        write_frames(dir, "speckle", first, &frames);
    }
}

/// Frame whose left half is white.
pub fn left_half(shape: FrameShape) -> Array2<u8> {
    Array2::from_shape_fn((shape.height, shape.width), |(_, c)| {
        if c < shape.width / 2 {
            255
        } else {
            0
        }
    })
}
