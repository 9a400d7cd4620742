//! Text encoding of a block chain
//!
//! One block per line as `Name,Param1,Param2`; parameters a block does not
//! use are written as `NoParams`. A chain file adds the input source name on
//! the first line.
//!
//! ```text
//! Keyboard
//! Arpeggiator,Ping pong,NoParams
//! Gates,First Hold,1.5
//! Pitchshift,-2,NoParams
//! Chordify,NoParams,NoParams
//! ```

use std::fs;
use std::path::Path;

use tracing::info;

use crate::blocks::{ArpPattern, BlockConfig, GateMode};
use crate::error::{NoteblocksError, Result};
use crate::scale::normalize;

pub const NO_PARAMS: &str = "NoParams";

/// Encode one block as a line (no trailing newline)
pub fn encode_block(config: &BlockConfig) -> String {
    let (first, second) = match config {
        BlockConfig::Arpeggiator { pattern } => (pattern.to_string(), NO_PARAMS.to_string()),
        BlockConfig::Gates { mode, notes_per_tick } => (mode.to_string(), format!("{notes_per_tick:?}")),
        BlockConfig::PitchShift { offset } => (offset.to_string(), NO_PARAMS.to_string()),
        BlockConfig::Chordify | BlockConfig::Monophonic => (NO_PARAMS.to_string(), NO_PARAMS.to_string()),
    };
    format!("{},{},{}", config.name(), first, second)
}

pub fn serialize_chain(configs: &[BlockConfig]) -> Vec<String> {
    configs.iter().map(encode_block).collect()
}

/// Decode block lines; blank lines are skipped and errors carry 1-based line numbers
pub fn deserialize_chain<I, S>(lines: I) -> Result<Vec<BlockConfig>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    decode_lines(lines, 1)
}

fn decode_lines<I, S>(lines: I, first_line: usize) -> Result<Vec<BlockConfig>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .enumerate()
        .map(|(i, line)| (first_line + i, line))
        .filter(|(_, line)| !line.as_ref().trim().is_empty())
        .map(|(number, line)| decode_block(number, line.as_ref()))
        .collect()
}

/// Decode a single line; `line_number` is only used for error reporting
pub fn decode_block(line_number: usize, line: &str) -> Result<BlockConfig> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let [name, first, second] = fields[..] else {
        return Err(NoteblocksError::config(
            line_number,
            format!("expected 3 comma-separated fields, found {}", fields.len()),
        ));
    };
    let bad = |reason: String| NoteblocksError::config(line_number, reason);

    let config = match normalize(name).as_str() {
        "arpeggiator" => BlockConfig::Arpeggiator {
            pattern: first.parse::<ArpPattern>().map_err(|e| bad(e.to_string()))?,
        },
        "gates" => BlockConfig::Gates {
            mode: first.parse::<GateMode>().map_err(|e| bad(e.to_string()))?,
            notes_per_tick: second
                .parse::<f64>()
                .map_err(|_| bad(format!("invalid notes per tick '{second}'")))?,
        },
        "pitchshift" => BlockConfig::PitchShift {
            offset: first
                .parse::<i32>()
                .map_err(|_| bad(format!("invalid pitch shift offset '{first}'")))?,
        },
        "chordify" => BlockConfig::Chordify,
        "monophonic" => BlockConfig::Monophonic,
        _ => return Err(bad(format!("unknown block '{name}'"))),
    };
    config.validate().map_err(|e| bad(e.to_string()))
}

/// A saved chain together with the input source it was used with
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainFile {
    pub source: Option<String>,
    pub blocks: Vec<BlockConfig>,
}

impl ChainFile {
    pub fn new(source: Option<String>, blocks: Vec<BlockConfig>) -> Self {
        Self { source, blocks }
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines();
        let source = lines
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);
        let blocks = decode_lines(lines, 2)?;
        Ok(Self { source, blocks })
    }

    pub fn render(&self) -> String {
        let mut out = self.source.clone().unwrap_or_default();
        out.push('\n');
        for line in serialize_chain(&self.blocks) {
            out.push_str(&line);
            out.push('\n');
        }
        out
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = Self::parse(&fs::read_to_string(path)?)?;
        info!("Loaded chain from {} ({} blocks)", path.display(), file.blocks.len());
        Ok(file)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.render())?;
        info!("Saved chain to {} ({} blocks)", path.display(), self.blocks.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::Block;

    fn sample() -> Vec<BlockConfig> {
        vec![
            BlockConfig::Arpeggiator { pattern: ArpPattern::PingPong },
            BlockConfig::Gates { mode: GateMode::FirstHold, notes_per_tick: 1.5 },
            BlockConfig::Gates { mode: GateMode::Queue, notes_per_tick: 2.0 },
            BlockConfig::PitchShift { offset: -2 },
            BlockConfig::Chordify,
            BlockConfig::Monophonic,
        ]
    }

    #[test]
    fn test_encoding() {
        assert_eq!(
            serialize_chain(&sample()),
            vec![
                "Arpeggiator,Ping pong,NoParams",
                "Gates,First Hold,1.5",
                "Gates,Queue,2.0",
                "Pitchshift,-2,NoParams",
                "Chordify,NoParams,NoParams",
                "Monophonic,NoParams,NoParams",
            ]
        );
    }

    #[test]
    fn test_round_trip() {
        let lines = serialize_chain(&sample());
        assert_eq!(deserialize_chain(&lines).unwrap(), sample());
    }

    #[test]
    fn test_lenient_names() {
        let lines = [
            "arpeggiator, PingPong, NoParams",
            "",
            "GATES,last_hold,0.45",
            "Pitch Shift,3,NoParams",
            "   ",
            "Arpeggiator,Descending Scale,NoParams",
        ];
        assert_eq!(
            deserialize_chain(lines).unwrap(),
            vec![
                BlockConfig::Arpeggiator { pattern: ArpPattern::PingPong },
                BlockConfig::Gates { mode: GateMode::LastHold, notes_per_tick: 0.45 },
                BlockConfig::PitchShift { offset: 3 },
                BlockConfig::Arpeggiator { pattern: ArpPattern::Descending },
            ]
        );
    }

    #[test]
    fn test_decoded_rate_matches_built_block() {
        let configs = deserialize_chain(["Gates,Queue,1.236"]).unwrap();
        assert_eq!(configs, vec![BlockConfig::Gates { mode: GateMode::Queue, notes_per_tick: 1.24 }]);
        let built: Vec<BlockConfig> = configs.iter().map(|c| c.build().unwrap().config()).collect();
        assert_eq!(built, configs);
    }

    fn error_line(lines: &[&str]) -> usize {
        match deserialize_chain(lines) {
            Err(NoteblocksError::Configuration { line, .. }) => line,
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn test_errors_report_line() {
        assert_eq!(error_line(&["Chordify,NoParams,NoParams", "Reverb,NoParams,NoParams"]), 2);
        assert_eq!(error_line(&["Chordify,NoParams"]), 1);
        assert_eq!(error_line(&["", "Gates,Queue,lots"]), 2);
        assert_eq!(error_line(&["Gates,Queue,0"]), 1);
        assert_eq!(error_line(&["Gates,Sometimes,1.0"]), 1);
        assert_eq!(error_line(&["Pitchshift,up,NoParams"]), 1);
        assert_eq!(error_line(&["Arpeggiator,Sideways,NoParams"]), 1);
    }

    #[test]
    fn test_chain_file_text() {
        let file = ChainFile::new(Some("Keyboard".into()), sample());
        let text = file.render();
        assert!(text.starts_with("Keyboard\nArpeggiator,Ping pong,NoParams\n"));
        assert_eq!(ChainFile::parse(&text).unwrap(), file);

        let no_source = ChainFile::parse("\nChordify,NoParams,NoParams\n").unwrap();
        assert_eq!(no_source.source, None);
        assert_eq!(no_source.blocks, vec![BlockConfig::Chordify]);

        match ChainFile::parse("Keyboard\nChordify,NoParams,NoParams\nbogus") {
            Err(NoteblocksError::Configuration { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected configuration error, got {other:?}"),
        }
        assert_eq!(ChainFile::parse("").unwrap(), ChainFile::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.txt");
        let file = ChainFile::new(Some("Virtual keyboard".into()), sample());
        file.save(&path).unwrap();
        assert_eq!(ChainFile::load(&path).unwrap(), file);

        assert!(matches!(
            ChainFile::load(dir.path().join("missing.txt")),
            Err(NoteblocksError::Io(_))
        ));
    }
}
