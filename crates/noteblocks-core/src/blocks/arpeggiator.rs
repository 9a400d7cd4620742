//! Arpeggiator block

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{impl_block_boilerplate, BlockConfig, Outlet};
use crate::error::NoteblocksError;
use crate::note::{Note, NoteEvent};
use crate::scale::{normalize, ScaleContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ArpPattern {
    #[default]
    Ascending,
    Descending,
    PingPong,
    Random,
}

impl ArpPattern {
    pub fn all() -> &'static [ArpPattern] {
        &[Self::Ascending, Self::Descending, Self::PingPong, Self::Random]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Ascending => "Ascending Scale",
            Self::Descending => "Descending Scale",
            Self::PingPong => "Ping pong",
            Self::Random => "Random",
        }
    }
}

impl fmt::Display for ArpPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ArpPattern {
    type Err = NoteblocksError;

    /// Accepts the display names as well as `ascending`, `PingPong`, `ping_pong`...
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = normalize(s);
        match key.strip_suffix("scale").unwrap_or(&key) {
            "ascending" => Ok(Self::Ascending),
            "descending" => Ok(Self::Descending),
            "pingpong" => Ok(Self::PingPong),
            "random" => Ok(Self::Random),
            _ => Err(NoteblocksError::InvalidParameter(format!("unknown arpeggiator pattern '{s}'"))),
        }
    }
}

/// Plays the held notes one at a time, one note per tick.
///
/// Held notes are kept sorted by key. The last played index is only a hint:
/// notes may be released between ticks, so every index is clamped on read.
#[derive(Debug)]
pub struct Arpeggiator {
    pattern: ArpPattern,
    notes_on: Vec<Note>,
    last_index: Option<usize>,
    last_note: Option<Note>,
    /// Arpeggiated note whose note-off has not been sent yet
    sounding: Option<Note>,
    ascending: bool,
    rng: fastrand::Rng,
    outlet: Outlet,
    scale: ScaleContext,
}

impl Arpeggiator {
    pub fn new(pattern: ArpPattern) -> Self {
        Self::with_rng(pattern, fastrand::Rng::new())
    }

    /// Deterministic random pattern for a given seed
    pub fn with_seed(pattern: ArpPattern, seed: u64) -> Self {
        Self::with_rng(pattern, fastrand::Rng::with_seed(seed))
    }

    fn with_rng(pattern: ArpPattern, rng: fastrand::Rng) -> Self {
        Self {
            pattern,
            notes_on: Vec::new(),
            last_index: None,
            last_note: None,
            sounding: None,
            ascending: true,
            rng,
            outlet: Outlet::new(),
            scale: ScaleContext::default(),
        }
    }

    pub fn pattern(&self) -> ArpPattern {
        self.pattern
    }

    pub fn set_pattern(&mut self, pattern: ArpPattern) {
        self.pattern = pattern;
    }

    /// Held notes in ascending key order
    pub fn notes_on(&self) -> &[Note] {
        &self.notes_on
    }

    pub fn last_note(&self) -> Option<Note> {
        self.last_note
    }

    pub fn last_index(&self) -> Option<usize> {
        self.last_index
    }

    fn config_impl(&self) -> BlockConfig {
        BlockConfig::Arpeggiator { pattern: self.pattern }
    }

    fn on_event_impl(&mut self, note: Note, on: bool, _scale: &ScaleContext) {
        if on {
            if !self.notes_on.contains(&note) {
                let at = self.notes_on.partition_point(|held| held.key() < note.key());
                self.notes_on.insert(at, note);
            }
            return;
        }

        self.notes_on.retain(|held| *held != note);
        let was_sounding = self.sounding == Some(note);
        if was_sounding {
            self.sounding = None;
        }
        if self.notes_on.is_empty() {
            self.last_index = None;
            self.outlet.emit(NoteEvent::off(note));
        } else if was_sounding {
            // Releasing the arpeggiated note silences it now rather than leaving it on
            self.outlet.emit(NoteEvent::off(note));
        }
    }

    fn tick_impl(&mut self) {
        if self.notes_on.is_empty() {
            return;
        }
        if let Some(playing) = self.sounding.take() {
            if self.notes_on.contains(&playing) {
                self.outlet.emit(NoteEvent::off(playing));
            }
        }

        let index = self.next_index();
        let note = self.notes_on[index];
        self.outlet.emit(NoteEvent::on(note));

        self.last_index = Some(index);
        self.last_note = Some(note);
        self.sounding = Some(note);
    }

    fn flush_impl(&mut self) {
        if let Some(playing) = self.sounding.take() {
            self.outlet.emit(NoteEvent::off(playing));
        }
        self.notes_on.clear();
        self.last_index = None;
        self.last_note = None;
        self.ascending = true;
    }

    /// Index into `notes_on` of the next note to play; `notes_on` is non-empty
    fn next_index(&mut self) -> usize {
        let size = self.notes_on.len();
        let top = size - 1;
        if size == 1 {
            return 0;
        }

        let next = match self.pattern {
            ArpPattern::Ascending => match self.last_index {
                Some(last) if last < top => last + 1,
                _ => 0,
            },
            ArpPattern::Descending => match self.last_index {
                None | Some(0) => top,
                Some(last) => last.min(top).saturating_sub(1),
            },
            ArpPattern::PingPong => match self.last_index {
                None => {
                    self.ascending = true;
                    0
                }
                Some(last) if self.ascending => {
                    if last >= top {
                        self.ascending = false;
                        last - 1
                    } else {
                        last + 1
                    }
                }
                Some(0) => {
                    self.ascending = true;
                    1
                }
                Some(last) => last - 1,
            },
            ArpPattern::Random => {
                let exclude = self
                    .last_note
                    .and_then(|last| self.notes_on.iter().position(|held| *held == last));
                match exclude {
                    Some(skip) => {
                        let pick = self.rng.usize(0..top);
                        if pick >= skip { pick + 1 } else { pick }
                    }
                    None => self.rng.usize(0..size),
                }
            }
        };
        next.min(top)
    }
}

impl_block_boilerplate!(Arpeggiator, "Arpeggiator", tick);
