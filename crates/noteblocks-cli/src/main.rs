//! noteblocks: run a note-processing chain from a command script

mod config;
mod script;

use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use noteblocks_core::{BlockChain, ChainFile, Tempo};
use noteblocks_services::{ChainEngine, ConsoleSink, OutputProcessor};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::{config_path, load_config, save_config};
use script::Session;

#[derive(Debug, Parser)]
#[command(name = "noteblocks", version, about = "Note-event processing chains")]
struct Cli {
    /// Command script to run; reads stdin when omitted
    script: Option<PathBuf>,

    /// Chain file to start from (overrides the config file)
    #[arg(long)]
    chain: Option<PathBuf>,

    /// Tempo in beats per minute (overrides the config file)
    #[arg(long)]
    tempo: Option<u32>,

    /// Config file location
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the effective config to the config file and exit
    #[arg(long)]
    write_config: bool,

    /// Stop at the first failing script line
    #[arg(long)]
    fail_fast: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let path = cli.config.clone().unwrap_or_else(config_path);
    let mut config = load_config(&path);
    if let Some(bpm) = cli.tempo {
        config.tempo_bpm = bpm;
    }
    if let Some(chain) = &cli.chain {
        config.chain_file = Some(chain.clone());
    }

    // Logs go to stderr; stdout carries the note output
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(config.log_filter.parse().context("invalid log_filter")?))
        .init();

    if cli.write_config {
        save_config(&path, &config)?;
        tracing::info!("Wrote config to {}", path.display());
        return Ok(());
    }

    let tempo: Tempo = config.tempo()?;
    let scale = config.scale()?;
    let (source, blocks) = match &config.chain_file {
        Some(file) => {
            let chain_file = ChainFile::load(file)
                .with_context(|| format!("loading chain file {}", file.display()))?;
            (chain_file.source, chain_file.blocks)
        }
        None => (None, Vec::new()),
    };

    tracing::info!(
        "Starting noteblocks: {} {}, {} bpm, {} block(s)",
        config.scale_root,
        config.scale_mode.name(),
        tempo.bpm(),
        blocks.len()
    );

    let chain = BlockChain::from_configs(&blocks, scale)?;
    let engine = ChainEngine::start(chain)?;

    let mut output = OutputProcessor::new();
    output.add_sink(ConsoleSink::stdout())?;
    engine.subscribe_output(output.subscriber())?;

    let mut session = Session::new(engine, tempo, source);
    let result = match &cli.script {
        Some(script) => {
            let file = File::open(script)
                .with_context(|| format!("opening script {}", script.display()))?;
            session.run(BufReader::new(file), cli.fail_fast)
        }
        None => session.run(io::stdin().lock(), cli.fail_fast),
    };

    session.finish()?;
    output.shutdown();
    result
}
