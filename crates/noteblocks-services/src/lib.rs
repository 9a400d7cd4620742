//! noteblocks-services: Engine thread, metronome, and output layer

pub mod engine;
pub mod metronome;
pub mod output;

pub use engine::{ChainEngine, EngineError, EngineHandle, EngineStatus};
pub use metronome::{Metronome, MetronomeError};
pub use output::{ConsoleSink, MemorySink, NoteSink, OutputError, OutputProcessor};
