//! Gates block: holds incoming notes and lets them through on each tick

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{impl_block_boilerplate, BlockConfig, Outlet};
use crate::error::{NoteblocksError, Result};
use crate::note::{Note, NoteEvent};
use crate::scale::{normalize, ScaleContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GateMode {
    /// Release queued notes first-in first-out, `release_count` per tick
    #[default]
    Queue,
    /// Release the oldest queued note, drop the rest
    FirstHold,
    /// Release the newest queued note, drop the rest
    LastHold,
}

impl GateMode {
    pub fn all() -> &'static [GateMode] {
        &[Self::Queue, Self::FirstHold, Self::LastHold]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Queue => "Queue",
            Self::FirstHold => "First Hold",
            Self::LastHold => "Last Hold",
        }
    }
}

impl fmt::Display for GateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GateMode {
    type Err = NoteblocksError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "queue" => Ok(Self::Queue),
            "firsthold" => Ok(Self::FirstHold),
            "lasthold" => Ok(Self::LastHold),
            _ => Err(NoteblocksError::InvalidParameter(format!("unknown gates mode '{s}'"))),
        }
    }
}

/// Round to two decimal places
fn round_2dp(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Rejects rates that could never release a note
pub(super) fn check_notes_per_tick(notes_per_tick: f64) -> Result<f64> {
    if !notes_per_tick.is_finite() || notes_per_tick <= 0.0 {
        return Err(NoteblocksError::InvalidParameter(format!(
            "notes per tick must be a positive number, got {notes_per_tick}"
        )));
    }
    let rounded = round_2dp(notes_per_tick);
    if rounded <= 0.0 {
        return Err(NoteblocksError::InvalidParameter(format!(
            "notes per tick {notes_per_tick} rounds to zero"
        )));
    }
    Ok(rounded)
}

/// Notes released per tick in queue mode.
///
/// At or above one note per tick this rounds half up. Below one it is
/// `ceil(1 / rate)`, which releases several notes for fractional rates
/// (0.45 releases 3). Kept as-is for compatibility with saved chains.
pub fn release_count(notes_per_tick: f64) -> usize {
    if notes_per_tick < 1.0 {
        (1.0 / notes_per_tick).ceil() as usize
    } else if notes_per_tick.fract() >= 0.5 {
        notes_per_tick.ceil() as usize
    } else {
        notes_per_tick.floor() as usize
    }
}

#[derive(Debug)]
pub struct Gates {
    mode: GateMode,
    notes_per_tick: f64,
    release_count: usize,
    queue: VecDeque<Note>,
    /// Notes released by a previous tick whose note-off has not arrived
    released: Vec<Note>,
    /// Note-offs to send when the gate next opens
    pending_off: Vec<Note>,
    outlet: Outlet,
    scale: ScaleContext,
}

impl Gates {
    pub fn new(mode: GateMode, notes_per_tick: f64) -> Result<Self> {
        let notes_per_tick = check_notes_per_tick(notes_per_tick)?;
        Ok(Self {
            mode,
            notes_per_tick,
            release_count: release_count(notes_per_tick),
            queue: VecDeque::new(),
            released: Vec::new(),
            pending_off: Vec::new(),
            outlet: Outlet::new(),
            scale: ScaleContext::default(),
        })
    }

    pub fn mode(&self) -> GateMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: GateMode) {
        self.mode = mode;
    }

    pub fn notes_per_tick(&self) -> f64 {
        self.notes_per_tick
    }

    pub fn set_notes_per_tick(&mut self, notes_per_tick: f64) -> Result<()> {
        self.notes_per_tick = check_notes_per_tick(notes_per_tick)?;
        self.release_count = release_count(self.notes_per_tick);
        Ok(())
    }

    pub fn release_count(&self) -> usize {
        self.release_count
    }

    pub fn queued(&self) -> impl Iterator<Item = &Note> {
        self.queue.iter()
    }

    pub fn released(&self) -> &[Note] {
        &self.released
    }

    pub fn pending_off(&self) -> &[Note] {
        &self.pending_off
    }

    fn config_impl(&self) -> BlockConfig {
        BlockConfig::Gates { mode: self.mode, notes_per_tick: self.notes_per_tick }
    }

    fn on_event_impl(&mut self, note: Note, on: bool, _scale: &ScaleContext) {
        if on {
            self.queue.push_back(note);
        } else if let Some(at) = self.queue.iter().position(|n| *n == note) {
            self.queue.remove(at);
        } else if let Some(at) = self.released.iter().position(|n| *n == note) {
            self.released.remove(at);
            self.pending_off.push(note);
        }
    }

    fn tick_impl(&mut self) {
        self.send_pending_offs();

        match self.mode {
            GateMode::Queue => {
                let count = self.queue.len().min(self.release_count);
                for _ in 0..count {
                    if let Some(note) = self.queue.pop_front() {
                        self.release(note);
                    }
                }
            }
            GateMode::FirstHold => {
                if let Some(note) = self.queue.pop_front() {
                    self.release(note);
                }
                self.queue.clear();
            }
            GateMode::LastHold => {
                if let Some(note) = self.queue.pop_back() {
                    self.release(note);
                }
                self.queue.clear();
            }
        }
    }

    fn flush_impl(&mut self) {
        self.queue.clear();
        self.send_pending_offs();
        for note in std::mem::take(&mut self.released) {
            self.outlet.emit(NoteEvent::off(note));
        }
    }

    fn release(&mut self, note: Note) {
        self.outlet.emit(NoteEvent::on(note));
        self.released.push(note);
    }

    fn send_pending_offs(&mut self) {
        for note in std::mem::take(&mut self.pending_off) {
            self.outlet.emit(NoteEvent::off(note));
        }
    }
}

impl_block_boilerplate!(Gates, "Gates", tick);

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::Block;
    use super::*;

    fn arrive(gates: &mut Gates, keys: &[u8]) {
        let scale = ScaleContext::default();
        for &k in keys {
            gates.on_event(key(k), true, &scale);
        }
    }

    #[test]
    fn test_release_count() {
        assert_eq!(release_count(1.0), 1);
        assert_eq!(release_count(2.4), 2);
        assert_eq!(release_count(2.5), 3);
        assert_eq!(release_count(0.5), 2);
        // Fractional rates release more than one note; preserved literally
        assert_eq!(release_count(0.45), 3);
    }

    #[test]
    fn test_notes_per_tick_rounded_and_checked() {
        let gates = Gates::new(GateMode::Queue, 1.236).unwrap();
        assert_eq!(gates.notes_per_tick(), 1.24);
        assert!(Gates::new(GateMode::Queue, 0.0).is_err());
        assert!(Gates::new(GateMode::Queue, -1.0).is_err());
        assert!(Gates::new(GateMode::Queue, f64::NAN).is_err());
        assert!(Gates::new(GateMode::Queue, 0.004).is_err());
    }

    #[test]
    fn test_queue_releases_in_order() {
        let mut gates = Gates::new(GateMode::Queue, 2.0).unwrap();
        let log = record(&mut gates);
        arrive(&mut gates, &[22, 25, 24, 23]);
        assert!(drain(&log).is_empty());

        gates.on_tick();
        assert_eq!(drain(&log), vec![(22, true), (25, true)]);
        gates.on_tick();
        assert_eq!(drain(&log), vec![(24, true), (23, true)]);
        gates.on_tick();
        assert!(drain(&log).is_empty());
    }

    #[test]
    fn test_queue_fractional_rate() {
        let mut gates = Gates::new(GateMode::Queue, 0.45).unwrap();
        let log = record(&mut gates);
        arrive(&mut gates, &[22, 25, 24, 23]);
        gates.on_tick();
        assert_eq!(drain(&log).len(), 3);
        assert_eq!(gates.queued().count(), 1);
    }

    #[test]
    fn test_first_hold_discards_rest() {
        let mut gates = Gates::new(GateMode::FirstHold, 1.0).unwrap();
        let log = record(&mut gates);
        arrive(&mut gates, &[22, 25, 24, 23]);
        gates.on_tick();
        assert_eq!(drain(&log), vec![(22, true)]);
        assert_eq!(gates.queued().count(), 0);
    }

    #[test]
    fn test_last_hold_discards_rest() {
        let mut gates = Gates::new(GateMode::LastHold, 1.0).unwrap();
        let log = record(&mut gates);
        arrive(&mut gates, &[22, 25, 24, 23]);
        gates.on_tick();
        assert_eq!(drain(&log), vec![(23, true)]);
        assert_eq!(gates.queued().count(), 0);
    }

    #[test]
    fn test_note_off_before_release_cancels() {
        let mut gates = Gates::new(GateMode::Queue, 4.0).unwrap();
        let log = record(&mut gates);
        arrive(&mut gates, &[22, 23]);
        gates.on_event(key(22), false, &ScaleContext::default());
        gates.on_tick();
        assert_eq!(drain(&log), vec![(23, true)]);
    }

    #[test]
    fn test_note_off_after_release_waits_for_gate() {
        let mut gates = Gates::new(GateMode::Queue, 1.0).unwrap();
        let log = record(&mut gates);
        arrive(&mut gates, &[22]);
        gates.on_tick();
        gates.on_event(key(22), false, &ScaleContext::default());
        assert_eq!(drain(&log), vec![(22, true)]);
        assert_eq!(gates.pending_off(), &[key(22)]);

        gates.on_tick();
        assert_eq!(drain(&log), vec![(22, false)]);
        assert!(gates.released().is_empty());
    }

    #[test]
    fn test_flush_leaves_nothing_sounding() {
        let mut gates = Gates::new(GateMode::Queue, 1.0).unwrap();
        let log = record(&mut gates);
        arrive(&mut gates, &[22, 23, 24]);
        gates.on_tick();
        gates.on_tick();
        gates.on_event(key(22), false, &ScaleContext::default());
        drain(&log);

        gates.flush();
        let mut offs = drain(&log);
        offs.sort();
        assert_eq!(offs, vec![(22, false), (23, false)]);
        assert_eq!(gates.queued().count(), 0);
        assert!(gates.released().is_empty());
        assert!(gates.pending_off().is_empty());

        gates.on_tick();
        assert!(drain(&log).is_empty());
    }

    #[test]
    fn test_mode_names() {
        assert_eq!("First Hold".parse::<GateMode>().unwrap(), GateMode::FirstHold);
        assert_eq!("last_hold".parse::<GateMode>().unwrap(), GateMode::LastHold);
        assert_eq!("QUEUE".parse::<GateMode>().unwrap(), GateMode::Queue);
        assert!("middle hold".parse::<GateMode>().is_err());
    }
}
