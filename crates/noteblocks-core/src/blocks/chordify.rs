//! Chordify block: turns a single in-scale note into a triad

use super::{impl_block_boilerplate, BlockConfig, Outlet};
use crate::note::{Note, NoteEvent};
use crate::scale::ScaleContext;

/// Scale steps stacked above the played note
const CHORD_STEPS: [usize; 2] = [2, 4];

#[derive(Debug, Default)]
pub struct Chordify {
    last_sent: Vec<NoteEvent>,
    outlet: Outlet,
    scale: ScaleContext,
}

impl Chordify {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events emitted for the most recent input
    pub fn last_sent(&self) -> &[NoteEvent] {
        &self.last_sent
    }

    fn config_impl(&self) -> BlockConfig {
        BlockConfig::Chordify
    }

    fn on_event_impl(&mut self, note: Note, on: bool, scale: &ScaleContext) {
        self.last_sent.clear();
        // Notes outside the scale are dropped, on and off alike
        let Some(root) = scale.position(&note) else { return };

        let chord = std::iter::once(root)
            .chain(CHORD_STEPS.iter().map(|step| root + step))
            .filter_map(|index| scale.get(index));
        for chord_note in chord {
            let event = NoteEvent { note: chord_note, on };
            self.outlet.emit(event);
            self.last_sent.push(event);
        }
    }

    fn flush_impl(&mut self) {
        self.last_sent.clear();
    }
}

impl_block_boilerplate!(Chordify, "Chordify");

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::Block;
    use super::*;

    fn scale() -> ScaleContext {
        ScaleContext::from_pitch_classes(&["C#/Db", "D#/Eb", "E", "F#/Gb", "G#/Ab", "A", "C"]).unwrap()
    }

    fn sent(chordify: &Chordify) -> Vec<(u8, bool)> {
        chordify.last_sent().iter().map(|e| (e.note.key(), e.on)).collect()
    }

    #[test]
    fn test_triad() {
        let mut chordify = Chordify::new();
        let log = record(&mut chordify);
        chordify.on_event(key(8), true, &scale());
        assert_eq!(sent(&chordify), vec![(8, true), (12, true), (16, true)]);
        assert_eq!(drain(&log), sent(&chordify));
    }

    #[test]
    fn test_note_off_mirrors_on() {
        let mut chordify = Chordify::new();
        chordify.on_event(key(8), false, &scale());
        assert_eq!(sent(&chordify), vec![(8, false), (12, false), (16, false)]);
    }

    #[test]
    fn test_top_of_scale_has_no_wrap() {
        let scale = scale();
        assert_eq!(scale.len(), 49);
        let mut chordify = Chordify::new();

        // Second note from the top: only the third fits
        assert_eq!(scale.position(&key(82)), Some(46));
        chordify.on_event(key(82), true, &scale);
        assert_eq!(sent(&chordify), vec![(82, true), (85, true)]);

        chordify.on_event(key(84), true, &scale);
        assert_eq!(sent(&chordify), vec![(84, true)]);
    }

    #[test]
    fn test_out_of_scale_ignored() {
        let mut chordify = Chordify::new();
        let log = record(&mut chordify);
        chordify.on_event(key(9), true, &scale());
        chordify.on_event(key(9), false, &scale());
        chordify.on_event(key(8), true, &ScaleContext::default());
        assert!(drain(&log).is_empty());
        assert!(chordify.last_sent().is_empty());
    }
}
