//! noteblocks-core: Domain types and processing logic for noteblocks

pub mod blocks;
pub mod chain;
pub mod chain_file;
mod error;
pub mod history;
mod note;
pub mod scale;
mod tempo;

pub use blocks::{
    ArpPattern, Block, BlockConfig, GateMode, Outlet, ProcessingBlock, Subscriber, SubscriberId,
};
pub use blocks::{Arpeggiator, Chordify, Gates, Monophonic, PitchShift};
pub use chain::BlockChain;
pub use chain_file::{deserialize_chain, serialize_chain, ChainFile};
pub use error::{NoteblocksError, Result};
pub use history::{History, HISTORY_CAPACITY};
pub use note::{keyboard, Note, NoteEvent, HIGHEST_PLAYABLE_KEY, LOWEST_PLAYABLE_KEY};
pub use scale::{ScaleContext, ScaleMode};
pub use tempo::{Tempo, MAX_BPM, MIN_BPM};
