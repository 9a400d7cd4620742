//! Processing blocks: the stages a note passes through on its way to the output

mod arpeggiator;
mod chordify;
mod gates;
mod monophonic;
mod pitch_shift;

pub use arpeggiator::{ArpPattern, Arpeggiator};
pub use chordify::Chordify;
pub use gates::{GateMode, Gates};
pub use monophonic::Monophonic;
pub use pitch_shift::PitchShift;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{NoteblocksError, Result};
use crate::note::{Note, NoteEvent};
use crate::scale::ScaleContext;

/// Handle returned by [`Outlet::subscribe`]
pub type SubscriberId = u64;

/// Callback receiving every event a block emits
pub type Subscriber = Box<dyn FnMut(&NoteEvent) + Send>;

/// Publish side of a block: an ordered list of subscriber callbacks
#[derive(Default)]
pub struct Outlet {
    next_id: SubscriberId,
    subscribers: Vec<(SubscriberId, Subscriber)>,
}

impl Outlet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, subscriber: Subscriber) -> SubscriberId {
        let id = self.next_id;
        self.next_id += 1;
        self.subscribers.push((id, subscriber));
        id
    }

    /// Returns false if `id` was not subscribed
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    pub fn unsubscribe_all(&mut self) {
        self.subscribers.clear();
    }

    pub fn emit(&mut self, event: NoteEvent) {
        for (_, subscriber) in &mut self.subscribers {
            subscriber(&event);
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

impl fmt::Debug for Outlet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outlet")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

/// Trait for processing blocks
pub trait Block: Send {
    /// Name used when persisting the block
    fn name(&self) -> &'static str;
    /// Current parameters as a configuration value
    fn config(&self) -> BlockConfig;
    fn on_event(&mut self, note: Note, on: bool, scale: &ScaleContext);
    /// Periodic tick; only time-based blocks react
    fn on_tick(&mut self) {}
    /// Release everything the block holds so no note is left sounding
    fn flush(&mut self);
    fn scale(&self) -> &ScaleContext;
    fn set_scale_context(&mut self, scale: ScaleContext);
    fn outlet(&self) -> &Outlet;
    fn outlet_mut(&mut self) -> &mut Outlet;

    fn subscribe(&mut self, subscriber: Subscriber) -> SubscriberId {
        self.outlet_mut().subscribe(subscriber)
    }

    fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        self.outlet_mut().unsubscribe(id)
    }

    fn unsubscribe_all(&mut self) {
        self.outlet_mut().unsubscribe_all()
    }
}

/// Implements common Block boilerplate for structs with `outlet: Outlet` and `scale: ScaleContext` fields.
/// Usage: `impl_block_boilerplate!(StructName, "Persisted Name");` or with a trailing `tick`
/// for blocks that provide `tick_impl`.
macro_rules! impl_block_boilerplate {
    (@common $name:expr) => {
        fn name(&self) -> &'static str { $name }

        fn config(&self) -> super::BlockConfig { self.config_impl() }

        fn on_event(&mut self, note: crate::note::Note, on: bool, scale: &crate::scale::ScaleContext) {
            self.on_event_impl(note, on, scale)
        }

        fn flush(&mut self) { self.flush_impl() }

        fn scale(&self) -> &crate::scale::ScaleContext { &self.scale }
        fn set_scale_context(&mut self, scale: crate::scale::ScaleContext) { self.scale = scale; }

        fn outlet(&self) -> &super::Outlet { &self.outlet }
        fn outlet_mut(&mut self) -> &mut super::Outlet { &mut self.outlet }
    };
    ($ty:ty, $name:expr) => {
        impl super::Block for $ty {
            super::impl_block_boilerplate!(@common $name);
        }
    };
    ($ty:ty, $name:expr, tick) => {
        impl super::Block for $ty {
            super::impl_block_boilerplate!(@common $name);

            fn on_tick(&mut self) { self.tick_impl() }
        }
    };
}

pub(crate) use impl_block_boilerplate;

// ============================================================================
// Configuration
// ============================================================================

/// Value description of a block: enough to rebuild it, snapshot it, or persist it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BlockConfig {
    Arpeggiator { pattern: ArpPattern },
    Gates { mode: GateMode, notes_per_tick: f64 },
    PitchShift { offset: i32 },
    Chordify,
    Monophonic,
}

impl BlockConfig {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Arpeggiator { .. } => "Arpeggiator",
            Self::Gates { .. } => "Gates",
            Self::PitchShift { .. } => "Pitchshift",
            Self::Chordify => "Chordify",
            Self::Monophonic => "Monophonic",
        }
    }

    /// Checks parameters and returns the configuration as a built block reports it
    /// (Gates rates rounded to two decimals)
    pub fn validate(&self) -> Result<Self> {
        Ok(match *self {
            Self::Gates { mode, notes_per_tick } => Self::Gates {
                mode,
                notes_per_tick: gates::check_notes_per_tick(notes_per_tick)?,
            },
            other => other,
        })
    }

    /// Factory for a fresh block with no subscribers and an empty scale
    pub fn build(&self) -> Result<ProcessingBlock> {
        Ok(match *self {
            Self::Arpeggiator { pattern } => ProcessingBlock::Arpeggiator(Arpeggiator::new(pattern)),
            Self::Gates { mode, notes_per_tick } => ProcessingBlock::Gates(Gates::new(mode, notes_per_tick)?),
            Self::PitchShift { offset } => ProcessingBlock::PitchShift(PitchShift::new(offset)),
            Self::Chordify => ProcessingBlock::Chordify(Chordify::new()),
            Self::Monophonic => ProcessingBlock::Monophonic(Monophonic::new()),
        })
    }
}

impl fmt::Display for BlockConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arpeggiator { pattern } => write!(f, "Arpeggiator: {pattern}"),
            Self::Gates { mode, notes_per_tick } => {
                write!(f, "Gates: {mode}, Notes released per tick: {notes_per_tick}")
            }
            Self::PitchShift { offset } => write!(f, "Pitch Shift: {offset}"),
            Self::Chordify => write!(f, "Chordify"),
            Self::Monophonic => write!(f, "Monophonic"),
        }
    }
}

// ============================================================================
// Block dispatch
// ============================================================================

/// Enum wrapper for all processing blocks
#[derive(Debug)]
pub enum ProcessingBlock {
    Arpeggiator(Arpeggiator),
    Gates(Gates),
    PitchShift(PitchShift),
    Chordify(Chordify),
    Monophonic(Monophonic),
}

impl ProcessingBlock {
    fn as_block(&self) -> &dyn Block {
        match self {
            Self::Arpeggiator(b) => b,
            Self::Gates(b) => b,
            Self::PitchShift(b) => b,
            Self::Chordify(b) => b,
            Self::Monophonic(b) => b,
        }
    }

    fn as_block_mut(&mut self) -> &mut dyn Block {
        match self {
            Self::Arpeggiator(b) => b,
            Self::Gates(b) => b,
            Self::PitchShift(b) => b,
            Self::Chordify(b) => b,
            Self::Monophonic(b) => b,
        }
    }

    /// Whether the block reacts to ticks
    pub fn is_timed(&self) -> bool {
        matches!(self, Self::Arpeggiator(_) | Self::Gates(_))
    }

    /// Change parameters in place, keeping held state and subscribers.
    /// The configuration must be for the same kind of block.
    pub fn apply_config(&mut self, config: &BlockConfig) -> Result<()> {
        match (self, *config) {
            (Self::Arpeggiator(b), BlockConfig::Arpeggiator { pattern }) => b.set_pattern(pattern),
            (Self::Gates(b), BlockConfig::Gates { mode, notes_per_tick }) => {
                b.set_notes_per_tick(notes_per_tick)?;
                b.set_mode(mode);
            }
            (Self::PitchShift(b), BlockConfig::PitchShift { offset }) => b.set_offset(offset),
            (Self::Chordify(_), BlockConfig::Chordify) | (Self::Monophonic(_), BlockConfig::Monophonic) => {}
            (block, config) => {
                return Err(NoteblocksError::InvalidParameter(format!(
                    "cannot apply {} parameters to a {} block",
                    config.name(),
                    block.name()
                )));
            }
        }
        Ok(())
    }
}

impl Block for ProcessingBlock {
    fn name(&self) -> &'static str {
        self.as_block().name()
    }

    fn config(&self) -> BlockConfig {
        self.as_block().config()
    }

    fn on_event(&mut self, note: Note, on: bool, scale: &ScaleContext) {
        self.as_block_mut().on_event(note, on, scale)
    }

    fn on_tick(&mut self) {
        self.as_block_mut().on_tick()
    }

    fn flush(&mut self) {
        self.as_block_mut().flush()
    }

    fn scale(&self) -> &ScaleContext {
        self.as_block().scale()
    }

    fn set_scale_context(&mut self, scale: ScaleContext) {
        self.as_block_mut().set_scale_context(scale)
    }

    fn outlet(&self) -> &Outlet {
        self.as_block().outlet()
    }

    fn outlet_mut(&mut self) -> &mut Outlet {
        self.as_block_mut().outlet_mut()
    }
}
