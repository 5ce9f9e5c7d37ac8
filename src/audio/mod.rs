//! Segment assembly and inspection.

pub mod assembler;
pub mod wav;

pub use assembler::{Assembler, FfmpegAssembler};
