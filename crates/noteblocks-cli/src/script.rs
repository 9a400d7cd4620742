//! Line-oriented command scripts driving a chain engine
//!
//! ```text
//! # comments and blank lines are ignored
//! add Arpeggiator,Ping pong,NoParams
//! play
//! on C4
//! on 44
//! wait 2000
//! off C4
//! save chain.txt
//! ```

use std::io::BufRead;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use noteblocks_core::chain_file::decode_block;
use noteblocks_core::{keyboard, BlockConfig, ChainFile, Note, ScaleContext, ScaleMode, Tempo};
use noteblocks_services::{ChainEngine, Metronome};
use tracing::{info, warn};

/// One parsed script line
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptCommand {
    Note { note: Note, on: bool },
    Tick(usize),
    Add(BlockConfig),
    Remove(usize),
    Up(usize),
    Down(usize),
    Update(usize, BlockConfig),
    Undo,
    Clear,
    Show,
    Save(PathBuf),
    Load(PathBuf),
    Tempo(Tempo),
    Play,
    Stop,
    Scale { root: String, mode: ScaleMode },
    Source(String),
    Wait(Duration),
    Quit,
}

/// Key number (`40`) or name (`C4`, `C#4`, `Db4`)
pub fn parse_note(token: &str) -> anyhow::Result<Note> {
    if let Ok(key) = token.parse::<u8>() {
        return Note::from_key(key).ok_or_else(|| anyhow!("key {key} is off the keyboard"));
    }
    keyboard()
        .find(|note| {
            note.to_string()
                .split('/')
                .any(|name| name.eq_ignore_ascii_case(token))
        })
        .ok_or_else(|| anyhow!("unknown note '{token}'"))
}

fn parse_index(arg: &str) -> anyhow::Result<usize> {
    arg.parse().with_context(|| format!("invalid block index '{arg}'"))
}

fn require<'a>(word: &str, rest: &'a str, what: &str) -> anyhow::Result<&'a str> {
    if rest.is_empty() {
        bail!("'{word}' needs {what}");
    }
    Ok(rest)
}

/// Parse one line; `None` for blanks and comments
pub fn parse_line(line_number: usize, line: &str) -> anyhow::Result<Option<ScriptCommand>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();

    let command = match word.to_ascii_lowercase().as_str() {
        "on" => ScriptCommand::Note { note: parse_note(require(word, rest, "a note")?)?, on: true },
        "off" => ScriptCommand::Note { note: parse_note(require(word, rest, "a note")?)?, on: false },
        "tick" => ScriptCommand::Tick(if rest.is_empty() {
            1
        } else {
            rest.parse().with_context(|| format!("invalid tick count '{rest}'"))?
        }),
        "add" => ScriptCommand::Add(decode_block(line_number, require(word, rest, "a block")?)?),
        "remove" => ScriptCommand::Remove(parse_index(require(word, rest, "an index")?)?),
        "up" => ScriptCommand::Up(parse_index(require(word, rest, "an index")?)?),
        "down" => ScriptCommand::Down(parse_index(require(word, rest, "an index")?)?),
        "update" => {
            let (index, block) = require(word, rest, "an index and a block")?
                .split_once(char::is_whitespace)
                .ok_or_else(|| anyhow!("'update' needs an index and a block"))?;
            ScriptCommand::Update(parse_index(index)?, decode_block(line_number, block.trim())?)
        }
        "undo" => ScriptCommand::Undo,
        "clear" => ScriptCommand::Clear,
        "show" => ScriptCommand::Show,
        "save" => ScriptCommand::Save(PathBuf::from(require(word, rest, "a path")?)),
        "load" => ScriptCommand::Load(PathBuf::from(require(word, rest, "a path")?)),
        "tempo" => {
            let bpm: u32 = require(word, rest, "a bpm")?
                .parse()
                .with_context(|| format!("invalid bpm '{rest}'"))?;
            ScriptCommand::Tempo(Tempo::new(bpm)?)
        }
        "play" => ScriptCommand::Play,
        "stop" => ScriptCommand::Stop,
        "scale" => {
            let (root, mode) = require(word, rest, "a root note")?
                .split_once(char::is_whitespace)
                .unwrap_or((rest, "major"));
            let mode = ScaleMode::from_name(mode).ok_or_else(|| anyhow!("unknown scale mode '{mode}'"))?;
            ScriptCommand::Scale { root: root.to_string(), mode }
        }
        "source" => ScriptCommand::Source(require(word, rest, "a source name")?.to_string()),
        "wait" => {
            let ms: u64 = require(word, rest, "milliseconds")?
                .parse()
                .with_context(|| format!("invalid wait '{rest}'"))?;
            ScriptCommand::Wait(Duration::from_millis(ms))
        }
        "quit" | "exit" => ScriptCommand::Quit,
        other => bail!("unknown command '{other}'"),
    };
    Ok(Some(command))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Engine plus metronome, driven one command at a time
pub struct Session {
    engine: ChainEngine,
    metronome: Metronome,
    tempo: Tempo,
    source: Option<String>,
}

impl Session {
    pub fn new(engine: ChainEngine, tempo: Tempo, source: Option<String>) -> Self {
        Self {
            engine,
            metronome: Metronome::new(tempo),
            tempo,
            source,
        }
    }

    pub fn engine(&self) -> &ChainEngine {
        &self.engine
    }

    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    pub fn is_ticking(&self) -> bool {
        self.metronome.is_running()
    }

    pub fn execute(&mut self, command: ScriptCommand) -> anyhow::Result<Flow> {
        match command {
            ScriptCommand::Note { note, on } => self.engine.send_note(note, on)?,
            ScriptCommand::Tick(count) => {
                for _ in 0..count {
                    self.engine.tick()?;
                }
            }
            ScriptCommand::Add(config) => self.engine.add_block(config)?,
            ScriptCommand::Remove(index) => {
                let removed = self.engine.remove_block(index)?;
                info!("Removed {}", removed);
            }
            ScriptCommand::Up(index) => {
                if !self.engine.move_block_up(index)? {
                    warn!("Block {} is already at the top", index);
                }
            }
            ScriptCommand::Down(index) => {
                if !self.engine.move_block_down(index)? {
                    warn!("Block {} is already at the bottom", index);
                }
            }
            ScriptCommand::Update(index, config) => self.engine.update_block(index, config)?,
            ScriptCommand::Undo => self.engine.undo()?,
            ScriptCommand::Clear => self.engine.clear_blocks()?,
            ScriptCommand::Show => self.show()?,
            ScriptCommand::Save(path) => {
                ChainFile::new(self.source.clone(), self.engine.configs()?).save(&path)?;
            }
            ScriptCommand::Load(path) => {
                let file = ChainFile::load(&path)?;
                if file.source.is_some() {
                    self.change_source(file.source)?;
                }
                self.engine.replace_blocks(file.blocks)?;
            }
            ScriptCommand::Tempo(tempo) => {
                self.tempo = tempo;
                self.metronome.set_tempo(tempo)?;
            }
            ScriptCommand::Play => {
                self.engine.play()?;
                if !self.metronome.is_running() {
                    let handle = self.engine.handle();
                    self.metronome.start(self.tempo, move || {
                        let _ = handle.tick();
                    })?;
                }
            }
            ScriptCommand::Stop => {
                if self.metronome.is_running() {
                    self.metronome.stop()?;
                }
                self.engine.stop()?;
            }
            ScriptCommand::Scale { root, mode } => {
                self.engine.set_scale(ScaleContext::from_mode(&root, mode)?)?;
                info!("Scale set to {} {}", root, mode.name());
            }
            ScriptCommand::Source(name) => self.change_source(Some(name))?,
            ScriptCommand::Wait(duration) => thread::sleep(duration),
            ScriptCommand::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    fn change_source(&mut self, source: Option<String>) -> anyhow::Result<()> {
        self.engine.change_source()?;
        info!("Input source: {}", source.as_deref().unwrap_or("(none)"));
        self.source = source;
        Ok(())
    }

    fn show(&self) -> anyhow::Result<()> {
        let status = self.engine.status()?;
        println!(
            "source: {}  tempo: {} bpm  playing: {}  undo steps: {}",
            self.source.as_deref().unwrap_or("(none)"),
            self.tempo.bpm(),
            status.playing,
            status.undo_steps
        );
        if status.configs.is_empty() {
            println!("  (no blocks)");
        }
        for (index, config) in status.configs.iter().enumerate() {
            println!("  {index}: {config}");
        }
        if !status.sounding.is_empty() {
            let names: Vec<String> = status.sounding.iter().map(ToString::to_string).collect();
            println!("  sounding: {}", names.join(" "));
        }
        Ok(())
    }

    /// Run every line; errors are logged and the script carries on unless `fail_fast`
    pub fn run<R: BufRead>(&mut self, reader: R, fail_fast: bool) -> anyhow::Result<()> {
        for (i, line) in reader.lines().enumerate() {
            let line_number = i + 1;
            let line = line?;
            let result = parse_line(line_number, &line).and_then(|command| match command {
                Some(command) => self.execute(command),
                None => Ok(Flow::Continue),
            });
            match result {
                Ok(Flow::Continue) => {}
                Ok(Flow::Quit) => break,
                Err(e) if fail_fast => return Err(e.context(format!("line {line_number}"))),
                Err(e) => warn!("Line {}: {:#}", line_number, e),
            }
        }
        Ok(())
    }

    /// Stop ticking and shut the engine down, flushing held notes
    pub fn finish(mut self) -> anyhow::Result<()> {
        if self.metronome.is_running() {
            self.metronome.stop()?;
        }
        self.engine.shutdown()?;
        Ok(())
    }
}
