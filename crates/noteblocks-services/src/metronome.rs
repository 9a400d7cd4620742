//! Tick scheduler

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, tick, Sender};
use noteblocks_core::Tempo;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum MetronomeError {
    #[error("Metronome already running")]
    AlreadyRunning,
    #[error("Metronome not running")]
    NotRunning,
    #[error("Failed to start metronome thread: {0}")]
    Spawn(#[from] std::io::Error),
}

type TickTarget = Arc<dyn Fn() + Send + Sync>;

struct Running {
    cancel: Sender<()>,
    worker: JoinHandle<()>,
    target: TickTarget,
}

/// Calls a target once per beat at the current tempo.
///
/// Changing the tempo while running restarts the period from the moment of
/// the change.
pub struct Metronome {
    tempo: Tempo,
    ticks: Arc<AtomicU64>,
    running: Option<Running>,
}

impl Metronome {
    pub fn new(tempo: Tempo) -> Self {
        Self {
            tempo,
            ticks: Arc::new(AtomicU64::new(0)),
            running: None,
        }
    }

    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Ticks delivered since creation
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Call `target` once every `tempo.tick_period()` until stopped
    pub fn start<F>(&mut self, tempo: Tempo, target: F) -> Result<(), MetronomeError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        if self.running.is_some() {
            return Err(MetronomeError::AlreadyRunning);
        }
        self.tempo = tempo;
        self.spawn(Arc::new(target))?;
        info!(bpm = self.tempo.bpm(), "Metronome started");
        Ok(())
    }

    pub fn set_tempo(&mut self, tempo: Tempo) -> Result<(), MetronomeError> {
        self.tempo = tempo;
        if let Some(running) = self.running.take() {
            let target = Arc::clone(&running.target);
            Self::halt(running);
            self.spawn(target)?;
        }
        info!(bpm = tempo.bpm(), "Tempo changed");
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), MetronomeError> {
        let running = self.running.take().ok_or(MetronomeError::NotRunning)?;
        Self::halt(running);
        info!(ticks = self.ticks(), "Metronome stopped");
        Ok(())
    }

    fn spawn(&mut self, target: TickTarget) -> Result<(), MetronomeError> {
        let (cancel, cancelled) = bounded::<()>(1);
        let period = self.tempo.tick_period();
        let ticks = Arc::clone(&self.ticks);
        let worker_target = Arc::clone(&target);

        let worker = thread::Builder::new()
            .name("metronome".into())
            .spawn(move || {
                let ticker = tick(period);
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            ticks.fetch_add(1, Ordering::SeqCst);
                            (*worker_target)();
                        }
                        recv(cancelled) -> _ => break,
                    }
                }
            })?;

        self.running = Some(Running { cancel, worker, target });
        Ok(())
    }

    fn halt(running: Running) {
        let _ = running.cancel.send(());
        let _ = running.worker.join();
    }
}

impl Default for Metronome {
    fn default() -> Self {
        Self::new(Tempo::default())
    }
}

impl Drop for Metronome {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn counter() -> (Arc<AtomicU64>, impl Fn() + Send + Sync + 'static) {
        let count = Arc::new(AtomicU64::new(0));
        let inner = Arc::clone(&count);
        (count, move || {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_start_stop() {
        let mut metronome = Metronome::default();
        assert!(matches!(metronome.stop(), Err(MetronomeError::NotRunning)));

        let fast = Tempo::new(250).unwrap();
        let (count, target) = counter();
        metronome.start(fast, target).unwrap();
        assert!(metronome.is_running());
        assert_eq!(metronome.tempo(), fast);
        assert!(matches!(metronome.start(fast, || {}), Err(MetronomeError::AlreadyRunning)));

        // 250 bpm ticks every 240ms
        thread::sleep(Duration::from_millis(600));
        metronome.stop().unwrap();
        assert!(!metronome.is_running());

        let seen = count.load(Ordering::SeqCst);
        assert!(seen >= 1, "expected at least one tick, got {seen}");
        assert_eq!(metronome.ticks(), seen);

        thread::sleep(Duration::from_millis(300));
        assert_eq!(count.load(Ordering::SeqCst), seen);
    }

    #[test]
    fn test_set_tempo_while_stopped() {
        let mut metronome = Metronome::default();
        assert_eq!(metronome.tempo().bpm(), 120);
        metronome.set_tempo(Tempo::new(60).unwrap()).unwrap();
        assert_eq!(metronome.tempo().bpm(), 60);
        assert!(!metronome.is_running());
    }

    #[test]
    fn test_set_tempo_keeps_target() {
        let mut metronome = Metronome::default();
        let (count, target) = counter();
        metronome.start(Tempo::new(1).unwrap(), target).unwrap();

        // One tick per minute would never fire here; 250 bpm does
        metronome.set_tempo(Tempo::new(250).unwrap()).unwrap();
        assert!(metronome.is_running());
        thread::sleep(Duration::from_millis(600));
        metronome.stop().unwrap();
        assert!(count.load(Ordering::SeqCst) >= 1);
    }
}
