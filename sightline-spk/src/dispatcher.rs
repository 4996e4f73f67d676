//! Single-worker speech queue

use crate::config::SpeechConfig;
use crate::engines::{self, TtsEngine};
use crate::error::SpeechError;
use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// One queued utterance
#[derive(Debug, Clone)]
pub struct SpeechRequest {
    pub text: String,
    pub enqueued_at: DateTime<Utc>,
}

/// Messages consumed by the speech worker
#[derive(Debug)]
pub enum SpeechCommand {
    Say(SpeechRequest),
    /// Stop after everything queued before it has been spoken
    Shutdown,
}

/// Owns the speech worker thread and the sending side of its queue.
///
/// Utterances are rendered one at a time in enqueue order. The handle is
/// shared behind an `Arc` by every producer.
pub struct SpeechDispatcher {
    sender: Sender<SpeechCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
    engine_name: String,
}

impl SpeechDispatcher {
    /// Start the worker with the engine chosen by `config`
    pub fn from_config(config: &SpeechConfig) -> Result<Self, SpeechError> {
        config.validate().map_err(SpeechError::Config)?;
        Self::spawn(engines::engine_from_config(config))
    }

    /// Start the worker thread, which takes ownership of `engine`
    pub fn spawn(engine: Box<dyn TtsEngine>) -> Result<Self, SpeechError> {
        let (sender, receiver) = unbounded();
        let engine_name = engine.name().to_string();

        let worker = thread::Builder::new()
            .name("sightline-speech".to_string())
            .spawn(move || run_worker(engine, receiver))?;

        info!("Speech worker started with engine {}", engine_name);
        Ok(Self {
            sender,
            worker: Mutex::new(Some(worker)),
            engine_name,
        })
    }

    /// Queue `text` for speaking without waiting for it.
    ///
    /// Empty or whitespace-only text is ignored.
    pub fn enqueue(&self, text: impl Into<String>) -> Result<(), SpeechError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Ok(());
        }

        debug!("Queueing utterance: {}", text);
        self.sender
            .send(SpeechCommand::Say(SpeechRequest {
                text,
                enqueued_at: Utc::now(),
            }))
            .map_err(|_| SpeechError::Dispatcher("Speech worker has stopped".to_string()))
    }

    /// Utterances waiting to be spoken
    pub fn pending(&self) -> usize {
        self.sender.len()
    }

    pub fn engine_name(&self) -> &str {
        &self.engine_name
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().as_ref().map(|w| !w.is_finished()).unwrap_or(false)
    }

    /// Stop the worker after the queued utterances and wait for it to exit
    pub fn shutdown(&self) {
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            let _ = self.sender.send(SpeechCommand::Shutdown);
            if worker.join().is_err() {
                error!("Speech worker panicked");
            }
            info!("Speech worker stopped");
        }
    }
}

impl Drop for SpeechDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(mut engine: Box<dyn TtsEngine>, receiver: Receiver<SpeechCommand>) {
    // A closed channel ends the loop like an explicit shutdown
    while let Ok(command) = receiver.recv() {
        match command {
            SpeechCommand::Say(request) => {
                let waited = Utc::now() - request.enqueued_at;
                debug!(
                    "Speaking after {} ms in queue: {}",
                    waited.num_milliseconds(),
                    request.text
                );
                if let Err(e) = engine.render(&request.text) {
                    warn!("Failed to speak '{}': {}", request.text, e);
                }
            }
            SpeechCommand::Shutdown => break,
        }
    }
    debug!("Speech worker loop exited");
}
