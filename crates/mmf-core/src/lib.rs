pub mod consts;
pub mod error;
pub mod frame;
pub mod hadamard;
pub mod io;
pub mod matrix;
pub mod pipeline;
pub mod reconstruct;
