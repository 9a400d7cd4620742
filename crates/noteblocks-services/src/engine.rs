//! Chain engine: a worker thread that owns the block chain
//!
//! Input events, metronome ticks and edits all arrive as commands on one
//! channel, so the chain only ever runs on the engine thread and no two of
//! them interleave.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use noteblocks_core::{
    BlockChain, BlockConfig, Note, NoteblocksError, ScaleContext, Subscriber, SubscriberId,
};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Chain error: {0}")]
    Chain(#[from] NoteblocksError),
    #[error("Engine not running")]
    NotRunning,
    #[error("Failed to start engine thread: {0}")]
    Spawn(#[from] std::io::Error),
}

type Reply<T> = Sender<T>;
type ChainReply<T> = Reply<noteblocks_core::Result<T>>;

enum Command {
    Note { note: Note, on: bool },
    Tick,
    Flush(Reply<()>),
    Play(Reply<()>),
    Stop(Reply<()>),
    SetScale(ScaleContext, Reply<()>),
    Add(BlockConfig, ChainReply<()>),
    Remove(usize, ChainReply<BlockConfig>),
    MoveUp(usize, ChainReply<bool>),
    MoveDown(usize, ChainReply<bool>),
    Update(usize, BlockConfig, ChainReply<()>),
    Clear(Reply<()>),
    Replace(Vec<BlockConfig>, ChainReply<()>),
    Undo(ChainReply<()>),
    Status(Reply<EngineStatus>),
    Subscribe(Subscriber, Reply<SubscriberId>),
    Unsubscribe(SubscriberId, Reply<bool>),
    Shutdown,
}

/// Snapshot of the chain as seen from the engine thread
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStatus {
    pub configs: Vec<BlockConfig>,
    pub undo_steps: usize,
    pub sounding: Vec<Note>,
    pub playing: bool,
}

struct EngineState {
    running: AtomicBool,
    playing: AtomicBool,
}

/// Cloneable sender for producer threads (input sources, the metronome)
#[derive(Clone)]
pub struct EngineHandle {
    tx: Sender<Command>,
    state: Arc<EngineState>,
}

impl EngineHandle {
    fn send(&self, command: Command) -> Result<(), EngineError> {
        if !self.state.running.load(Ordering::SeqCst) {
            return Err(EngineError::NotRunning);
        }
        self.tx.send(command).map_err(|_| EngineError::NotRunning)
    }

    fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.send(make(reply_tx))?;
        reply_rx.recv().map_err(|_| EngineError::NotRunning)
    }

    /// Queue an input event; dropped by the engine while stopped
    pub fn send_note(&self, note: Note, on: bool) -> Result<(), EngineError> {
        self.send(Command::Note { note, on })
    }

    /// Queue a tick; ignored by the engine while stopped
    pub fn tick(&self) -> Result<(), EngineError> {
        self.send(Command::Tick)
    }

    pub fn is_playing(&self) -> bool {
        self.state.playing.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }
}

/// Owns the engine thread; dropping it shuts the thread down
pub struct ChainEngine {
    handle: EngineHandle,
    worker: Option<JoinHandle<()>>,
}

impl ChainEngine {
    /// Move `chain` onto a new engine thread. Playback starts stopped.
    pub fn start(chain: BlockChain) -> Result<Self, EngineError> {
        let (tx, rx) = unbounded::<Command>();
        let state = Arc::new(EngineState {
            running: AtomicBool::new(true),
            playing: AtomicBool::new(false),
        });

        let worker_state = Arc::clone(&state);
        let worker = thread::Builder::new()
            .name("chain-engine".into())
            .spawn(move || Self::process_loop(chain, rx, worker_state))?;

        info!("Chain engine started");
        Ok(Self {
            handle: EngineHandle { tx, state },
            worker: Some(worker),
        })
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    pub fn is_playing(&self) -> bool {
        self.handle.is_playing()
    }

    /// Flush the chain and stop the engine thread
    pub fn shutdown(&mut self) -> Result<(), EngineError> {
        let worker = self.worker.take().ok_or(EngineError::NotRunning)?;
        let _ = self.handle.tx.send(Command::Shutdown);
        self.handle.state.running.store(false, Ordering::SeqCst);
        if worker.join().is_err() {
            warn!("Chain engine thread panicked");
        }
        info!("Chain engine stopped");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Playback
    // ------------------------------------------------------------------

    pub fn send_note(&self, note: Note, on: bool) -> Result<(), EngineError> {
        self.handle.send_note(note, on)
    }

    pub fn tick(&self) -> Result<(), EngineError> {
        self.handle.tick()
    }

    /// Flush every block, then start accepting events and ticks
    pub fn play(&self) -> Result<(), EngineError> {
        self.handle.request(Command::Play)
    }

    /// Stop accepting events and ticks; held notes stay until the next flush
    pub fn stop(&self) -> Result<(), EngineError> {
        self.handle.request(Command::Stop)
    }

    /// Flush every block; used when the input source changes
    pub fn change_source(&self) -> Result<(), EngineError> {
        self.handle.request(Command::Flush)
    }

    pub fn set_scale(&self, scale: ScaleContext) -> Result<(), EngineError> {
        self.handle.request(|reply| Command::SetScale(scale, reply))
    }

    pub fn subscribe_output(&self, subscriber: Subscriber) -> Result<SubscriberId, EngineError> {
        self.handle.request(|reply| Command::Subscribe(subscriber, reply))
    }

    pub fn unsubscribe_output(&self, id: SubscriberId) -> Result<bool, EngineError> {
        self.handle.request(|reply| Command::Unsubscribe(id, reply))
    }

    // ------------------------------------------------------------------
    // Chain edits
    // ------------------------------------------------------------------

    pub fn add_block(&self, config: BlockConfig) -> Result<(), EngineError> {
        Ok(self.handle.request(|reply| Command::Add(config, reply))??)
    }

    pub fn remove_block(&self, index: usize) -> Result<BlockConfig, EngineError> {
        Ok(self.handle.request(|reply| Command::Remove(index, reply))??)
    }

    pub fn move_block_up(&self, index: usize) -> Result<bool, EngineError> {
        Ok(self.handle.request(|reply| Command::MoveUp(index, reply))??)
    }

    pub fn move_block_down(&self, index: usize) -> Result<bool, EngineError> {
        Ok(self.handle.request(|reply| Command::MoveDown(index, reply))??)
    }

    pub fn update_block(&self, index: usize, config: BlockConfig) -> Result<(), EngineError> {
        Ok(self.handle.request(|reply| Command::Update(index, config, reply))??)
    }

    pub fn clear_blocks(&self) -> Result<(), EngineError> {
        self.handle.request(Command::Clear)
    }

    pub fn replace_blocks(&self, configs: Vec<BlockConfig>) -> Result<(), EngineError> {
        Ok(self.handle.request(|reply| Command::Replace(configs, reply))??)
    }

    pub fn undo(&self) -> Result<(), EngineError> {
        Ok(self.handle.request(Command::Undo)??)
    }

    pub fn status(&self) -> Result<EngineStatus, EngineError> {
        self.handle.request(Command::Status)
    }

    pub fn configs(&self) -> Result<Vec<BlockConfig>, EngineError> {
        Ok(self.status()?.configs)
    }

    fn process_loop(mut chain: BlockChain, rx: Receiver<Command>, state: Arc<EngineState>) {
        while let Ok(command) = rx.recv() {
            let playing = state.playing.load(Ordering::SeqCst);
            match command {
                Command::Note { note, on } => {
                    if playing {
                        chain.on_event(note, on);
                    } else {
                        debug!("Dropped input {} while stopped", note);
                    }
                }
                Command::Tick => {
                    if playing {
                        chain.on_tick();
                    }
                }
                Command::Flush(reply) => {
                    chain.flush_all();
                    let _ = reply.send(());
                }
                Command::Play(reply) => {
                    chain.flush_all();
                    state.playing.store(true, Ordering::SeqCst);
                    info!("Playback started");
                    let _ = reply.send(());
                }
                Command::Stop(reply) => {
                    state.playing.store(false, Ordering::SeqCst);
                    info!("Playback stopped");
                    let _ = reply.send(());
                }
                Command::SetScale(scale, reply) => {
                    chain.set_scale(scale);
                    let _ = reply.send(());
                }
                Command::Add(config, reply) => {
                    let _ = reply.send(chain.add_block(config));
                }
                Command::Remove(index, reply) => {
                    let _ = reply.send(chain.remove_block(index));
                }
                Command::MoveUp(index, reply) => {
                    let _ = reply.send(chain.move_up(index));
                }
                Command::MoveDown(index, reply) => {
                    let _ = reply.send(chain.move_down(index));
                }
                Command::Update(index, config, reply) => {
                    let _ = reply.send(chain.update_block(index, config));
                }
                Command::Clear(reply) => {
                    chain.clear();
                    let _ = reply.send(());
                }
                Command::Replace(configs, reply) => {
                    let _ = reply.send(chain.replace_all(&configs));
                }
                Command::Undo(reply) => {
                    let _ = reply.send(chain.undo());
                }
                Command::Status(reply) => {
                    let _ = reply.send(EngineStatus {
                        configs: chain.configs(),
                        undo_steps: chain.history().len(),
                        sounding: chain.sounding().copied().collect(),
                        playing,
                    });
                }
                Command::Subscribe(subscriber, reply) => {
                    let _ = reply.send(chain.subscribe(subscriber));
                }
                Command::Unsubscribe(id, reply) => {
                    let _ = reply.send(chain.unsubscribe(id));
                }
                Command::Shutdown => {
                    chain.flush_all();
                    break;
                }
            }
        }
        state.running.store(false, Ordering::SeqCst);
        state.playing.store(false, Ordering::SeqCst);
    }
}

impl Drop for ChainEngine {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
