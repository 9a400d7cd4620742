//! Tempo and tick timing

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{NoteblocksError, Result};

pub const MIN_BPM: u32 = 1;
pub const MAX_BPM: u32 = 250;

/// Tick rate in beats per minute; one tick per beat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Tempo(u32);

impl Tempo {
    pub fn new(bpm: u32) -> Result<Self> {
        if !(MIN_BPM..=MAX_BPM).contains(&bpm) {
            return Err(NoteblocksError::InvalidTempo(bpm));
        }
        Ok(Self(bpm))
    }

    pub fn bpm(&self) -> u32 {
        self.0
    }

    /// Time between ticks, `60000 / bpm` whole milliseconds
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(u64::from(60_000 / self.0))
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self(120)
    }
}

impl TryFrom<u32> for Tempo {
    type Error = NoteblocksError;

    fn try_from(bpm: u32) -> Result<Self> {
        Self::new(bpm)
    }
}

impl From<Tempo> for u32 {
    fn from(tempo: Tempo) -> u32 {
        tempo.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tempo_range() {
        assert!(Tempo::new(0).is_err());
        assert!(Tempo::new(1).is_ok());
        assert!(Tempo::new(250).is_ok());
        assert!(Tempo::new(251).is_err());
    }

    #[test]
    fn test_tick_period() {
        assert_eq!(Tempo::new(120).unwrap().tick_period(), Duration::from_millis(500));
        assert_eq!(Tempo::new(1).unwrap().tick_period(), Duration::from_secs(60));
        // Integer division truncates
        assert_eq!(Tempo::new(70).unwrap().tick_period(), Duration::from_millis(857));
    }

    #[test]
    fn test_tempo_serde_validates() {
        let tempo: Tempo = serde_json::from_str("90").unwrap();
        assert_eq!(tempo.bpm(), 90);
        assert!(serde_json::from_str::<Tempo>("300").is_err());
        assert_eq!(serde_json::to_string(&Tempo::default()).unwrap(), "120");
    }
}
