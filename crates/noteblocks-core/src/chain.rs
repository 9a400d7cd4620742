//! Chain controller: owns the blocks, wires them in order and keeps undo history

use std::collections::BTreeSet;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, info};

use crate::blocks::{Block, BlockConfig, Outlet, ProcessingBlock, Subscriber, SubscriberId};
use crate::error::{NoteblocksError, Result};
use crate::history::History;
use crate::note::{Note, NoteEvent};
use crate::scale::ScaleContext;

/// An event on its way from one block to the next; `to == blocks.len()` is the output
#[derive(Debug)]
struct Hop {
    to: usize,
    event: NoteEvent,
}

/// Ordered chain of processing blocks between an input source and the output.
///
/// Blocks never hold references to each other. Each block's outlet forwards
/// into a hop queue owned by the chain, and the chain delivers queued events
/// to the next block (or to its own terminal outlet) until the queue is empty.
/// Every structural change records the previous configuration for undo, then
/// rewires all edges and flushes every block so nothing is left sounding.
#[derive(Debug)]
pub struct BlockChain {
    blocks: Vec<ProcessingBlock>,
    scale: ScaleContext,
    history: History<Vec<BlockConfig>>,
    hop_tx: Sender<Hop>,
    hop_rx: Receiver<Hop>,
    terminal: Outlet,
    /// Notes switched on at the output and not yet switched off
    sounding: BTreeSet<Note>,
}

impl Default for BlockChain {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockChain {
    pub fn new() -> Self {
        Self::with_scale(ScaleContext::default())
    }

    pub fn with_scale(scale: ScaleContext) -> Self {
        let (hop_tx, hop_rx) = unbounded();
        Self {
            blocks: Vec::new(),
            scale,
            history: History::new(Vec::new()),
            hop_tx,
            hop_rx,
            terminal: Outlet::new(),
            sounding: BTreeSet::new(),
        }
    }

    /// Chain built from saved configurations; they also become the undo baseline
    pub fn from_configs(configs: &[BlockConfig], scale: ScaleContext) -> Result<Self> {
        let mut chain = Self::with_scale(scale);
        chain.blocks = build_all(configs)?;
        chain.history = History::new(configs.to_vec());
        chain.reconfigure();
        Ok(chain)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[ProcessingBlock] {
        &self.blocks
    }

    pub fn configs(&self) -> Vec<BlockConfig> {
        self.blocks.iter().map(Block::config).collect()
    }

    pub fn scale(&self) -> &ScaleContext {
        &self.scale
    }

    pub fn history(&self) -> &History<Vec<BlockConfig>> {
        &self.history
    }

    /// Notes currently on at the output
    pub fn sounding(&self) -> impl Iterator<Item = &Note> {
        self.sounding.iter()
    }

    // ------------------------------------------------------------------
    // Output subscribers
    // ------------------------------------------------------------------

    pub fn subscribe(&mut self, subscriber: Subscriber) -> SubscriberId {
        self.terminal.subscribe(subscriber)
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        self.terminal.unsubscribe(id)
    }

    // ------------------------------------------------------------------
    // Event flow
    // ------------------------------------------------------------------

    /// Feed an input event into the head of the chain
    pub fn on_event(&mut self, note: Note, on: bool) {
        self.deliver(Hop { to: 0, event: NoteEvent { note, on } });
        self.pump();
    }

    /// Tick every block in order; each block's output settles before the next ticks
    pub fn on_tick(&mut self) {
        for index in 0..self.blocks.len() {
            self.blocks[index].on_tick();
            self.pump();
        }
    }

    /// Flush every block head to tail, then switch off anything still sounding
    pub fn flush_all(&mut self) {
        for index in 0..self.blocks.len() {
            self.blocks[index].flush();
            self.pump();
        }
        let stuck = std::mem::take(&mut self.sounding);
        if !stuck.is_empty() {
            debug!("Releasing {} note(s) left sounding", stuck.len());
        }
        for note in stuck {
            self.terminal.emit(NoteEvent::off(note));
        }
    }

    pub fn set_scale(&mut self, scale: ScaleContext) {
        info!("Scale changed ({} notes)", scale.len());
        self.scale = scale;
        self.propagate_scale();
        self.flush_all();
    }

    fn deliver(&mut self, hop: Hop) {
        let Hop { to, event } = hop;
        if to < self.blocks.len() {
            self.blocks[to].on_event(event.note, event.on, &self.scale);
        } else {
            if event.on {
                self.sounding.insert(event.note);
            } else {
                self.sounding.remove(&event.note);
            }
            self.terminal.emit(event);
        }
    }

    fn pump(&mut self) {
        while let Ok(hop) = self.hop_rx.try_recv() {
            self.deliver(hop);
        }
    }

    // ------------------------------------------------------------------
    // Structural edits
    // ------------------------------------------------------------------

    pub fn add_block(&mut self, config: BlockConfig) -> Result<()> {
        let block = config.build()?;
        self.snapshot();
        self.blocks.push(block);
        info!("Added {} block at position {}", config.name(), self.blocks.len() - 1);
        self.reconfigure();
        Ok(())
    }

    pub fn remove_block(&mut self, index: usize) -> Result<BlockConfig> {
        self.check_index(index)?;
        self.snapshot();
        let removed = self.blocks.remove(index);
        let config = removed.config();
        info!("Removed {} block from position {}", config.name(), index);
        drop(removed);
        self.reconfigure();
        Ok(config)
    }

    /// Swap with the block above; returns false when already at the top
    pub fn move_up(&mut self, index: usize) -> Result<bool> {
        self.check_index(index)?;
        if index == 0 {
            return Ok(false);
        }
        self.snapshot();
        self.blocks.swap(index - 1, index);
        info!("Moved block {} up", index);
        self.reconfigure();
        Ok(true)
    }

    /// Swap with the block below; returns false when already at the bottom
    pub fn move_down(&mut self, index: usize) -> Result<bool> {
        self.check_index(index)?;
        if index + 1 == self.blocks.len() {
            return Ok(false);
        }
        self.snapshot();
        self.blocks.swap(index, index + 1);
        info!("Moved block {} down", index);
        self.reconfigure();
        Ok(true)
    }

    /// Change a block's parameters in place, or replace it when the kind differs
    pub fn update_block(&mut self, index: usize, config: BlockConfig) -> Result<()> {
        self.check_index(index)?;
        let config = config.validate()?;
        let replacement = if self.blocks[index].name() == config.name() {
            None
        } else {
            Some(config.build()?)
        };

        self.snapshot();
        match replacement {
            Some(block) => self.blocks[index] = block,
            None => self.blocks[index].apply_config(&config)?,
        }
        info!("Updated block {}: {}", index, config);
        self.reconfigure();
        Ok(())
    }

    pub fn clear(&mut self) {
        if self.blocks.is_empty() {
            return;
        }
        self.snapshot();
        self.blocks.clear();
        info!("Cleared all blocks");
        self.reconfigure();
    }

    /// Swap in a whole new chain, e.g. one loaded from a file
    pub fn replace_all(&mut self, configs: &[BlockConfig]) -> Result<()> {
        let blocks = build_all(configs)?;
        self.snapshot();
        self.blocks = blocks;
        info!("Replaced chain with {} block(s)", configs.len());
        self.reconfigure();
        Ok(())
    }

    /// Restore the previous configuration; this is not itself recorded
    pub fn undo(&mut self) -> Result<()> {
        let previous = self.history.pop();
        self.blocks = build_all(&previous)?;
        info!("Undo: restored {} block(s), {} step(s) left", previous.len(), self.history.len());
        self.reconfigure();
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.blocks.len() {
            return Err(NoteblocksError::InvalidIndex { index, len: self.blocks.len() });
        }
        Ok(())
    }

    fn snapshot(&mut self) {
        let configs = self.configs();
        self.history.push(configs);
    }

    fn reconfigure(&mut self) {
        self.rewire();
        self.propagate_scale();
        self.flush_all();
    }

    /// Tear down every edge and connect block `i` to `i + 1`
    fn rewire(&mut self) {
        while self.hop_rx.try_recv().is_ok() {}

        for (index, block) in self.blocks.iter_mut().enumerate() {
            block.unsubscribe_all();
            let tx = self.hop_tx.clone();
            let to = index + 1;
            block.subscribe(Box::new(move |event: &NoteEvent| {
                let _ = tx.send(Hop { to, event: *event });
            }));
        }
        debug!("Rewired {} block(s)", self.blocks.len());
    }

    fn propagate_scale(&mut self) {
        for block in &mut self.blocks {
            block.set_scale_context(self.scale.clone());
        }
    }
}

fn build_all(configs: &[BlockConfig]) -> Result<Vec<ProcessingBlock>> {
    configs.iter().map(BlockConfig::build).collect()
}
