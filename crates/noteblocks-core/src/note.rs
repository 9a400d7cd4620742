//! Notes on an 88-key keyboard

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Lowest key number on the keyboard (A0)
pub const LOWEST_KEY: u8 = 1;
/// Highest key number on the keyboard (C8)
pub const HIGHEST_KEY: u8 = 88;
/// Lowest key the output hardware can play (C1)
pub const LOWEST_PLAYABLE_KEY: u8 = 4;
/// Highest key the output hardware can play (B7)
pub const HIGHEST_PLAYABLE_KEY: u8 = 87;

/// Letter and sharp flag for each semitone, starting from A
const SEMITONES: [(char, bool); 12] = [
    ('A', false),
    ('A', true),
    ('B', false),
    ('C', false),
    ('C', true),
    ('D', false),
    ('D', true),
    ('E', false),
    ('F', false),
    ('F', true),
    ('G', false),
    ('G', true),
];

/// A single key on the keyboard.
///
/// Two notes are equal when their key numbers are equal; the other fields are
/// derived from the key number and only matter for display and scale lookup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Note {
    key: u8,
    letter: char,
    sharp_or_flat: bool,
    octave: i8,
    playable: bool,
}

impl Note {
    /// Look up a key by number (1 = A0, 88 = C8)
    pub fn from_key(key: u8) -> Option<Self> {
        if !(LOWEST_KEY..=HIGHEST_KEY).contains(&key) {
            return None;
        }
        let (letter, sharp_or_flat) = SEMITONES[(key as usize - 1) % 12];
        Some(Self {
            key,
            letter,
            sharp_or_flat,
            octave: ((key as i16 + 8) / 12) as i8,
            playable: (LOWEST_PLAYABLE_KEY..=HIGHEST_PLAYABLE_KEY).contains(&key),
        })
    }

    pub fn key(&self) -> u8 {
        self.key
    }

    pub fn letter(&self) -> char {
        self.letter
    }

    pub fn is_sharp_or_flat(&self) -> bool {
        self.sharp_or_flat
    }

    pub fn octave(&self) -> i8 {
        self.octave
    }

    pub fn is_playable(&self) -> bool {
        self.playable
    }

    /// Pitch-class name without octave, e.g. `C` or `C#/Db`
    pub fn pitch_class(&self) -> String {
        if self.sharp_or_flat {
            format!("{}#/{}b", self.letter, next_letter(self.letter))
        } else {
            self.letter.to_string()
        }
    }

    /// Whether this note matches a pitch-class name such as `C`, `C#` or `C#/Db`
    pub fn matches_pitch_class(&self, name: &str) -> bool {
        crate::scale::pitch_class_of(name) == Some(self.semitone())
    }

    /// Semitone above C within the octave (`C` = 0, `B` = 11)
    pub fn semitone(&self) -> u8 {
        (self.key + 8) % 12
    }
}

fn next_letter(letter: char) -> char {
    if letter == 'G' { 'A' } else { (letter as u8 + 1) as char }
}

impl PartialEq for Note {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Note {}

impl Hash for Note {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for Note {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Note {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.cmp(&other.key)
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sharp_or_flat {
            write!(
                f,
                "{}#{}/{}b{}",
                self.letter,
                self.octave,
                next_letter(self.letter),
                self.octave
            )
        } else {
            write!(f, "{}{}", self.letter, self.octave)
        }
    }
}

/// All 88 keys in ascending order
pub fn keyboard() -> impl Iterator<Item = Note> {
    (LOWEST_KEY..=HIGHEST_KEY).filter_map(Note::from_key)
}

/// A note plus whether it is being switched on or off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub note: Note,
    pub on: bool,
}

impl NoteEvent {
    pub fn on(note: Note) -> Self {
        Self { note, on: true }
    }

    pub fn off(note: Note) -> Self {
        Self { note, on: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyboard_layout() {
        let a0 = Note::from_key(1).unwrap();
        assert_eq!((a0.letter(), a0.is_sharp_or_flat(), a0.octave()), ('A', false, 0));
        assert!(!a0.is_playable());

        let c1 = Note::from_key(4).unwrap();
        assert_eq!((c1.letter(), c1.octave()), ('C', 1));
        assert!(c1.is_playable());

        let f_sharp2 = Note::from_key(22).unwrap();
        assert_eq!((f_sharp2.letter(), f_sharp2.is_sharp_or_flat(), f_sharp2.octave()), ('F', true, 2));

        let c8 = Note::from_key(88).unwrap();
        assert_eq!((c8.letter(), c8.octave()), ('C', 8));
        assert!(!c8.is_playable());

        assert!(Note::from_key(0).is_none());
        assert!(Note::from_key(89).is_none());
        assert_eq!(keyboard().count(), 88);
    }

    #[test]
    fn test_equality_is_by_key() {
        let a = Note::from_key(40).unwrap();
        let b = Note::from_key(40).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, Note::from_key(41).unwrap());
        assert!(a < Note::from_key(41).unwrap());
    }

    #[test]
    fn test_display_and_pitch_class() {
        assert_eq!(Note::from_key(40).unwrap().to_string(), "C4");
        assert_eq!(Note::from_key(41).unwrap().to_string(), "C#4/Db4");
        assert_eq!(Note::from_key(48).unwrap().pitch_class(), "G#/Ab");
        assert!(Note::from_key(41).unwrap().matches_pitch_class("C#/Db"));
        assert!(Note::from_key(41).unwrap().matches_pitch_class("C#"));
        assert!(!Note::from_key(41).unwrap().matches_pitch_class("C"));
    }

    #[test]
    fn test_flat_names_match_enharmonic_key() {
        let c_sharp = Note::from_key(41).unwrap();
        assert!(c_sharp.matches_pitch_class("Db"));
        assert!(!c_sharp.matches_pitch_class("D"));
        assert!(!c_sharp.matches_pitch_class("Cx"));
        assert!(!c_sharp.matches_pitch_class("D#/Eb"));
        assert!(Note::from_key(50).unwrap().matches_pitch_class("Bb"));
        assert_eq!(c_sharp.semitone(), 1);
        assert_eq!(Note::from_key(1).unwrap().semitone(), 9);
    }
}
