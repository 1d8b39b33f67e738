pub mod disk;
pub mod frames;
pub mod image_io;
pub mod matrix;
pub mod matrix_writer;

pub use matrix::{DType, Element, MatrixFormat, MatrixHeader, MatrixReader};
pub use matrix_writer::MatrixWriter;
