//! Synthesis worker: wire protocol, request correlation and process supervision.

pub mod channel;
pub mod process;
pub mod protocol;
pub mod synthesizer;

pub use channel::WorkerChannel;
pub use process::{WorkerCommand, WorkerProcess, WorkerState};
pub use protocol::{Payload, SynthesisRequest, SynthesisResponse};
pub use synthesizer::{MockSynthesizer, MockSynthesizerLog, SynthesizedSegment, Synthesizer};
