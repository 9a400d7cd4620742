//! Monophonic block: at most one note sounding at a time

use super::{impl_block_boilerplate, BlockConfig, Outlet};
use crate::note::{Note, NoteEvent};
use crate::scale::ScaleContext;

#[derive(Debug, Default)]
pub struct Monophonic {
    current: Option<Note>,
    outlet: Outlet,
    scale: ScaleContext,
}

impl Monophonic {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Note> {
        self.current
    }

    fn config_impl(&self) -> BlockConfig {
        BlockConfig::Monophonic
    }

    fn on_event_impl(&mut self, note: Note, on: bool, _scale: &ScaleContext) {
        if on {
            // A repeated note-on for the current note re-triggers it
            if let Some(previous) = self.current.replace(note) {
                self.outlet.emit(NoteEvent::off(previous));
            }
            self.outlet.emit(NoteEvent::on(note));
        } else if self.current == Some(note) {
            self.current = None;
            self.outlet.emit(NoteEvent::off(note));
        }
    }

    fn flush_impl(&mut self) {
        if let Some(note) = self.current.take() {
            self.outlet.emit(NoteEvent::off(note));
        }
    }
}

impl_block_boilerplate!(Monophonic, "Monophonic");

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::Block;
    use super::*;

    #[test]
    fn test_new_note_replaces_current() {
        let scale = ScaleContext::default();
        let mut mono = Monophonic::new();
        let log = record(&mut mono);
        mono.on_event(key(40), true, &scale);
        mono.on_event(key(44), true, &scale);
        assert_eq!(drain(&log), vec![(40, true), (40, false), (44, true)]);
        assert_eq!(mono.current(), Some(key(44)));
    }

    #[test]
    fn test_only_current_note_off_passes() {
        let scale = ScaleContext::default();
        let mut mono = Monophonic::new();
        let log = record(&mut mono);
        mono.on_event(key(40), true, &scale);
        mono.on_event(key(44), true, &scale);
        drain(&log);

        mono.on_event(key(40), false, &scale);
        assert!(drain(&log).is_empty());
        mono.on_event(key(44), false, &scale);
        assert_eq!(drain(&log), vec![(44, false)]);
        assert_eq!(mono.current(), None);

        mono.on_event(key(44), false, &scale);
        assert!(drain(&log).is_empty());
    }

    #[test]
    fn test_same_note_retriggers() {
        let scale = ScaleContext::default();
        let mut mono = Monophonic::new();
        let log = record(&mut mono);
        mono.on_event(key(40), true, &scale);
        mono.on_event(key(40), true, &scale);
        assert_eq!(drain(&log), vec![(40, true), (40, false), (40, true)]);
    }

    #[test]
    fn test_never_two_notes_on() {
        let scale = ScaleContext::default();
        let mut mono = Monophonic::new();
        let log = record(&mut mono);
        for k in [30, 35, 31, 50, 22] {
            mono.on_event(key(k), true, &scale);
        }
        let mut sounding = 0i32;
        for (_, on) in drain(&log) {
            sounding += if on { 1 } else { -1 };
            assert!((0..=1).contains(&sounding));
        }
    }

    #[test]
    fn test_flush_turns_current_off() {
        let mut mono = Monophonic::new();
        let log = record(&mut mono);
        mono.on_event(key(40), true, &ScaleContext::default());
        drain(&log);
        mono.flush();
        assert_eq!(drain(&log), vec![(40, false)]);
        mono.flush();
        assert!(drain(&log).is_empty());
    }
}
