//! Text preparation: markup extraction and length-bounded chunking.

pub mod chunker;
pub mod extract;

pub use chunker::{TextChunk, chunk};
pub use extract::extract;
