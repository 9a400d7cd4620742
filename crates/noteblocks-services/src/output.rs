//! Output processing: per-key dedup and fan-out to note sinks

use std::collections::BTreeSet;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Sender};
use noteblocks_core::{NoteEvent, Subscriber};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to start sink thread: {0}")]
    Spawn(#[from] io::Error),
}

/// Destination for processed notes; each sink runs on its own thread
pub trait NoteSink: Send + 'static {
    fn name(&self) -> &str;
    fn send(&mut self, event: &NoteEvent);
    /// Called once when the processor shuts down
    fn finish(&mut self) {}
}

/// Writes one line per event, e.g. `on  C4` / `off C#4/Db4`
pub struct ConsoleSink {
    out: Box<dyn Write + Send>,
}

impl ConsoleSink {
    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self { out }
    }
}

impl NoteSink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    fn send(&mut self, event: &NoteEvent) {
        let state = if event.on { "on " } else { "off" };
        if let Err(e) = writeln!(self.out, "{} {}", state, event.note) {
            warn!("Console sink write failed: {}", e);
        }
    }

    fn finish(&mut self) {
        let _ = self.out.flush();
    }
}

/// Keeps every event it receives; clone the handle to read them back
#[derive(Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<NoteEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NoteEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn take(&self) -> Vec<NoteEvent> {
        self.events
            .lock()
            .map(|mut e| std::mem::take(&mut *e))
            .unwrap_or_default()
    }
}

impl NoteSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn send(&mut self, event: &NoteEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(*event);
        }
    }
}

/// Dedup state and sink channels shared with the chain subscriber
#[derive(Default)]
struct OutputState {
    /// Key numbers currently on
    keys_on: BTreeSet<u8>,
    sinks: Vec<(String, Sender<NoteEvent>)>,
}

impl OutputState {
    /// Returns true if the event was forwarded
    fn process(&mut self, event: &NoteEvent) -> bool {
        let key = event.note.key();
        let changed = if event.on {
            self.keys_on.insert(key)
        } else {
            self.keys_on.remove(&key)
        };
        if !changed {
            debug!("Dropped duplicate {} for {}", if event.on { "note-on" } else { "note-off" }, event.note);
            return false;
        }

        self.sinks.retain(|(name, tx)| {
            let alive = tx.send(*event).is_ok();
            if !alive {
                warn!("Sink '{}' stopped; removing it", name);
            }
            alive
        });
        true
    }
}

/// Terminal stage between a chain and its sinks.
///
/// A note-on for a key that is already on is dropped, and a note-off is only
/// forwarded for a key that is on, so each sink sees well-formed on/off pairs.
pub struct OutputProcessor {
    state: Arc<Mutex<OutputState>>,
    workers: Vec<JoinHandle<()>>,
}

impl OutputProcessor {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(OutputState::default())),
            workers: Vec::new(),
        }
    }

    /// Start a consumer thread for `sink`
    pub fn add_sink<S: NoteSink>(&mut self, mut sink: S) -> Result<(), OutputError> {
        let name = sink.name().to_string();
        let (tx, rx) = unbounded::<NoteEvent>();

        let worker = thread::Builder::new()
            .name(format!("sink-{name}"))
            .spawn(move || {
                while let Ok(event) = rx.recv() {
                    sink.send(&event);
                }
                sink.finish();
            })?;

        if let Ok(mut state) = self.state.lock() {
            state.sinks.push((name.clone(), tx));
        }
        self.workers.push(worker);
        info!(sink = %name, "Output sink added");
        Ok(())
    }

    pub fn sink_count(&self) -> usize {
        self.state.lock().map(|s| s.sinks.len()).unwrap_or(0)
    }

    /// Dedup and fan out one event; returns true if it reached the sinks
    pub fn process(&self, event: &NoteEvent) -> bool {
        self.state
            .lock()
            .map(|mut state| state.process(event))
            .unwrap_or(false)
    }

    /// Callback to register on a chain's output
    pub fn subscriber(&self) -> Subscriber {
        let state = Arc::clone(&self.state);
        Box::new(move |event: &NoteEvent| {
            if let Ok(mut state) = state.lock() {
                state.process(event);
            }
        })
    }

    /// Key numbers currently on
    pub fn keys_on(&self) -> Vec<u8> {
        self.state
            .lock()
            .map(|s| s.keys_on.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Close every sink channel and wait for the sink threads to drain
    pub fn shutdown(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.sinks.clear();
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Default for OutputProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for OutputProcessor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use noteblocks_core::Note;

    use super::*;

    fn on(k: u8) -> NoteEvent {
        NoteEvent::on(Note::from_key(k).unwrap())
    }

    fn off(k: u8) -> NoteEvent {
        NoteEvent::off(Note::from_key(k).unwrap())
    }

    #[test]
    fn test_dedup_per_key() {
        let output = OutputProcessor::new();
        assert!(output.process(&on(40)));
        assert!(!output.process(&on(40)));
        assert!(output.process(&on(44)));
        assert_eq!(output.keys_on(), vec![40, 44]);

        assert!(output.process(&off(40)));
        assert!(!output.process(&off(40)));
        assert!(!output.process(&off(50)));
        assert_eq!(output.keys_on(), vec![44]);
    }

    #[test]
    fn test_fan_out_to_every_sink() {
        let first = MemorySink::new();
        let second = MemorySink::new();
        let mut output = OutputProcessor::new();
        output.add_sink(first.clone()).unwrap();
        output.add_sink(second.clone()).unwrap();
        assert_eq!(output.sink_count(), 2);

        for event in [on(40), on(40), off(40), off(40)] {
            output.process(&event);
        }
        output.shutdown();

        assert_eq!(first.events(), vec![on(40), off(40)]);
        assert_eq!(second.events(), vec![on(40), off(40)]);
    }

    #[test]
    fn test_subscriber_feeds_processor() {
        let sink = MemorySink::new();
        let mut output = OutputProcessor::new();
        output.add_sink(sink.clone()).unwrap();

        let mut subscriber = output.subscriber();
        subscriber(&on(30));
        subscriber(&on(30));
        output.shutdown();
        assert_eq!(sink.take(), vec![on(30)]);
        assert!(sink.events().is_empty());
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_console_sink_format() {
        let buf = SharedBuf::default();
        let mut sink = ConsoleSink::new(Box::new(buf.clone()));
        sink.send(&on(40));
        sink.send(&off(41));
        let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert_eq!(text, "on  C4\noff C#4/Db4\n");
    }
}
