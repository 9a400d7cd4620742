//! Pitch shift block: moves notes by a number of scale steps

use super::{impl_block_boilerplate, BlockConfig, Outlet};
use crate::note::{Note, NoteEvent, HIGHEST_PLAYABLE_KEY, LOWEST_PLAYABLE_KEY};
use crate::scale::ScaleContext;

/// Shifts each note by `offset` positions within the scale.
///
/// Notes outside the scale snap to the closest in-scale note first, and the
/// shifted position is clamped to the ends of the scale.
#[derive(Debug, Default)]
pub struct PitchShift {
    offset: i32,
    last_sent: Option<Note>,
    outlet: Outlet,
    scale: ScaleContext,
}

impl PitchShift {
    pub fn new(offset: i32) -> Self {
        Self { offset, ..Default::default() }
    }

    pub fn offset(&self) -> i32 {
        self.offset
    }

    pub fn set_offset(&mut self, offset: i32) {
        self.offset = offset;
    }

    pub fn last_sent(&self) -> Option<Note> {
        self.last_sent
    }

    /// Where `note` lands in `scale`, or `None` for an empty scale
    pub fn shift(&self, note: &Note, scale: &ScaleContext) -> Option<Note> {
        let anchor = if note.key() < LOWEST_PLAYABLE_KEY {
            scale.first()?
        } else if note.key() > HIGHEST_PLAYABLE_KEY {
            scale.last()?
        } else {
            scale.closest(note)?
        };
        let position = scale.position(&anchor)? as i64;
        let top = scale.len() as i64 - 1;
        let shifted = (position + i64::from(self.offset)).clamp(0, top);
        scale.get(shifted as usize)
    }

    fn config_impl(&self) -> BlockConfig {
        BlockConfig::PitchShift { offset: self.offset }
    }

    fn on_event_impl(&mut self, note: Note, on: bool, scale: &ScaleContext) {
        let Some(shifted) = self.shift(&note, scale) else { return };
        self.last_sent = Some(shifted);
        self.outlet.emit(NoteEvent { note: shifted, on });
    }

    fn flush_impl(&mut self) {
        self.last_sent = None;
    }
}

impl_block_boilerplate!(PitchShift, "Pitchshift");
