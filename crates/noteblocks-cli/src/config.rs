//! User config persistence

use std::path::{Path, PathBuf};

use anyhow::Context;
use noteblocks_core::{ScaleContext, ScaleMode, Tempo};

// ── App config ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub tempo_bpm: u32,
    pub scale_root: String,
    pub scale_mode: ScaleMode,
    pub chain_file: Option<PathBuf>,
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tempo_bpm: 120,
            scale_root: "C".into(),
            scale_mode: ScaleMode::Major,
            chain_file: None,
            log_filter: "noteblocks=info".into(),
        }
    }
}

impl AppConfig {
    pub fn tempo(&self) -> anyhow::Result<Tempo> {
        Tempo::new(self.tempo_bpm).context("invalid tempo_bpm in config")
    }

    pub fn scale(&self) -> anyhow::Result<ScaleContext> {
        ScaleContext::from_mode(&self.scale_root, self.scale_mode)
            .with_context(|| format!("invalid scale '{} {}'", self.scale_root, self.scale_mode.name()))
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("noteblocks")
        .join("config.toml")
}

/// Missing or malformed files fall back to defaults
pub fn load_config(path: &Path) -> AppConfig {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| toml::from_str(&s).ok())
        .unwrap_or_default()
}

pub fn save_config(path: &Path, config: &AppConfig) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let s = toml::to_string_pretty(config)?;
    std::fs::write(path, s).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
