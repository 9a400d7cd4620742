//! Scale modes and the scale context shared by every block in a chain

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{NoteblocksError, Result};
use crate::note::{keyboard, Note};

// ============================================================================
// Scale Modes
// ============================================================================

/// Scale/mode types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScaleMode {
    #[default]
    Major,
    Minor,
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
    Locrian,
    HarmonicMinor,
    MelodicMinor,
    Pentatonic,
    Blues,
    Chromatic,
}

impl ScaleMode {
    pub fn all() -> &'static [ScaleMode] {
        &[
            Self::Major,
            Self::Minor,
            Self::Dorian,
            Self::Phrygian,
            Self::Lydian,
            Self::Mixolydian,
            Self::Locrian,
            Self::HarmonicMinor,
            Self::MelodicMinor,
            Self::Pentatonic,
            Self::Blues,
            Self::Chromatic,
        ]
    }

    /// Get scale intervals (semitones from root)
    pub fn intervals(&self) -> &'static [u8] {
        match self {
            Self::Major => &[0, 2, 4, 5, 7, 9, 11],
            Self::Minor => &[0, 2, 3, 5, 7, 8, 10],
            Self::Dorian => &[0, 2, 3, 5, 7, 9, 10],
            Self::Phrygian => &[0, 1, 3, 5, 7, 8, 10],
            Self::Lydian => &[0, 2, 4, 6, 7, 9, 11],
            Self::Mixolydian => &[0, 2, 4, 5, 7, 9, 10],
            Self::Locrian => &[0, 1, 3, 5, 6, 8, 10],
            Self::HarmonicMinor => &[0, 2, 3, 5, 7, 8, 11],
            Self::MelodicMinor => &[0, 2, 3, 5, 7, 9, 11],
            Self::Pentatonic => &[0, 2, 4, 7, 9],
            Self::Blues => &[0, 3, 5, 6, 7, 10],
            Self::Chromatic => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Major => "Major",
            Self::Minor => "Minor",
            Self::Dorian => "Dorian",
            Self::Phrygian => "Phrygian",
            Self::Lydian => "Lydian",
            Self::Mixolydian => "Mixolydian",
            Self::Locrian => "Locrian",
            Self::HarmonicMinor => "Harmonic Minor",
            Self::MelodicMinor => "Melodic Minor",
            Self::Pentatonic => "Pentatonic",
            Self::Blues => "Blues",
            Self::Chromatic => "Chromatic",
        }
    }

    /// Parse a mode name, ignoring case, spaces and underscores
    pub fn from_name(name: &str) -> Option<Self> {
        let wanted = normalize(name);
        Self::all().iter().copied().find(|m| normalize(m.name()) == wanted)
    }
}

pub(crate) fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Semitone of a pitch-class name above C (`C` = 0, `F#` = 6, `Bb` = 10).
///
/// Enharmonic pairs such as `C#/Db` are accepted when both halves agree.
pub fn pitch_class_of(name: &str) -> Option<u8> {
    let mut parts = name.split('/').map(|part| single_pitch_class(part.trim()));
    let first = parts.next()??;
    parts.all(|part| part == Some(first)).then_some(first)
}

fn single_pitch_class(name: &str) -> Option<u8> {
    let mut chars = name.chars();
    let base: i8 = match chars.next()?.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };
    let shift: i8 = match chars.next() {
        None => 0,
        Some('#') => 1,
        Some('b') => -1,
        Some(_) => return None,
    };
    if chars.next().is_some() {
        return None;
    }
    Some((base + shift).rem_euclid(12) as u8)
}

// ============================================================================
// Scale Context
// ============================================================================

/// The notes currently considered in scale, strictly ascending by key.
///
/// Cloning is cheap; every block in a chain holds the same shared list and a
/// scale change swaps in a whole new context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScaleContext {
    notes: Arc<[Note]>,
}

impl ScaleContext {
    pub fn new(notes: Vec<Note>) -> Result<Self> {
        if let Some(pair) = notes.windows(2).find(|w| w[0].key() >= w[1].key()) {
            return Err(NoteblocksError::InvalidScale(format!(
                "notes must be strictly ascending ({} then {})",
                pair[0], pair[1]
            )));
        }
        Ok(Self { notes: notes.into() })
    }

    /// Every playable key whose pitch class is in `names` (`C`, `C#`, `C#/Db`)
    pub fn from_pitch_classes(names: &[&str]) -> Result<Self> {
        let classes = names
            .iter()
            .map(|name| {
                pitch_class_of(name)
                    .ok_or_else(|| NoteblocksError::InvalidScale(format!("unknown note name '{name}'")))
            })
            .collect::<Result<Vec<u8>>>()?;
        let notes = keyboard()
            .filter(Note::is_playable)
            .filter(|note| classes.contains(&note.semitone()))
            .collect();
        Self::new(notes)
    }

    /// Every playable key in `mode` rooted at `root` (e.g. `"D"`, `"F#"`)
    pub fn from_mode(root: &str, mode: ScaleMode) -> Result<Self> {
        let root_pc = pitch_class_of(root)
            .ok_or_else(|| NoteblocksError::InvalidScale(format!("unknown root note '{root}'")))?;
        let classes: Vec<u8> = mode.intervals().iter().map(|i| (root_pc + i) % 12).collect();
        let notes = keyboard()
            .filter(Note::is_playable)
            .filter(|note| classes.contains(&note.semitone()))
            .collect();
        Self::new(notes)
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Note> {
        self.notes.get(index).copied()
    }

    pub fn first(&self) -> Option<Note> {
        self.notes.first().copied()
    }

    pub fn last(&self) -> Option<Note> {
        self.notes.last().copied()
    }

    /// Index of the note with the same key number, if it is in scale
    pub fn position(&self, note: &Note) -> Option<usize> {
        self.notes.binary_search_by_key(&note.key(), Note::key).ok()
    }

    pub fn contains(&self, note: &Note) -> bool {
        self.position(note).is_some()
    }

    /// Nearest in-scale note by key distance; ties go to the lower key
    pub fn closest(&self, note: &Note) -> Option<Note> {
        let first = self.first()?;
        let last = self.last()?;
        if note.key() <= first.key() {
            return Some(first);
        }
        if note.key() >= last.key() {
            return Some(last);
        }
        // Strict comparison keeps the earlier (lower) candidate on a tie
        let mut best = first;
        for candidate in self.notes.iter() {
            if candidate.key().abs_diff(note.key()) < best.key().abs_diff(note.key()) {
                best = *candidate;
            }
        }
        Some(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(k: u8) -> Note {
        Note::from_key(k).unwrap()
    }

    #[test]
    fn test_context_must_ascend() {
        assert!(ScaleContext::new(vec![key(10), key(12), key(15)]).is_ok());
        assert!(ScaleContext::new(vec![key(10), key(10)]).is_err());
        assert!(ScaleContext::new(vec![key(12), key(10)]).is_err());
    }

    #[test]
    fn test_c_major_context() {
        let scale = ScaleContext::from_mode("C", ScaleMode::Major).unwrap();
        // Playable keys 4..=87 hold seven octaves of white keys (C1..B7)
        assert_eq!(scale.len(), 49);
        assert_eq!(scale.first().unwrap().to_string(), "C1");
        assert_eq!(scale.last().unwrap().to_string(), "B7");
        assert!(scale.notes().iter().all(|n| !n.is_sharp_or_flat()));
    }

    #[test]
    fn test_pitch_class_names_match_mode() {
        let by_name = ScaleContext::from_pitch_classes(&["C", "D", "E", "F", "G", "A", "B"]).unwrap();
        let by_mode = ScaleContext::from_mode("C", ScaleMode::Major).unwrap();
        assert_eq!(by_name, by_mode);

        let pentatonic = ScaleContext::from_pitch_classes(&["C#/Db", "D#/Eb", "F#/Gb", "G#/Ab", "A#/Bb"]).unwrap();
        assert!(pentatonic.notes().iter().all(Note::is_sharp_or_flat));
        assert!(ScaleContext::from_pitch_classes(&["H"]).is_err());
    }

    #[test]
    fn test_flat_and_malformed_names() {
        let d_flat = ScaleContext::from_pitch_classes(&["Db"]).unwrap();
        assert_eq!(d_flat.first().unwrap().pitch_class(), "C#/Db");
        assert_eq!(d_flat, ScaleContext::from_pitch_classes(&["C#"]).unwrap());

        // A#/Bb on playable keys: A#1 (14) up to A#7 (86)
        let b_flat = ScaleContext::from_pitch_classes(&["Bb"]).unwrap();
        assert_eq!(b_flat.len(), 7);
        assert_eq!(b_flat.first().unwrap().key(), 14);

        for bad in ["Cx", "C##", "", "C#/Eb", "Db/"] {
            assert!(
                matches!(ScaleContext::from_pitch_classes(&[bad]), Err(NoteblocksError::InvalidScale(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_pitch_class_parsing() {
        assert_eq!(pitch_class_of("C"), Some(0));
        assert_eq!(pitch_class_of("F#"), Some(6));
        assert_eq!(pitch_class_of("Bb"), Some(10));
        assert_eq!(pitch_class_of("C#/Db"), Some(1));
        assert_eq!(pitch_class_of("Cb"), Some(11));
        assert_eq!(pitch_class_of("X"), None);
        assert_eq!(pitch_class_of("Cx"), None);
        assert_eq!(pitch_class_of("D#/Eb"), Some(3));
        assert_eq!(pitch_class_of("D#/Db"), None);
        assert_eq!(ScaleMode::from_name("harmonic_minor"), Some(ScaleMode::HarmonicMinor));
    }

    #[test]
    fn test_closest_prefers_lower_on_tie() {
        let scale = ScaleContext::new(vec![key(10), key(14), key(20)]).unwrap();
        assert_eq!(scale.closest(&key(12)), Some(key(10)));
        assert_eq!(scale.closest(&key(13)), Some(key(14)));
        assert_eq!(scale.closest(&key(2)), Some(key(10)));
        assert_eq!(scale.closest(&key(60)), Some(key(20)));
        assert_eq!(ScaleContext::default().closest(&key(12)), None);
    }
}
