use std::path::PathBuf;
use std::time::Instant;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::ipc::UpMessage;

/// A single observed file modification
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub at: Instant,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            at: Instant::now(),
        }
    }
}

/// Everything that can wake a worker up
#[derive(Debug, Clone)]
pub enum WorkerInput {
    Changed(ChangeEvent),
    Message(UpMessage),
    /// The child closed its end of the channel
    Closed,
}

/// A worker input tagged with who it belongs to
#[derive(Debug, Clone)]
pub struct Envelope {
    pub worker: String,
    pub generation: Uuid,
    pub input: WorkerInput,
}

/// Sending half handed to the watcher and the channel reader of one launch.
///
/// Every input it delivers carries the launch generation so the supervisor
/// can drop inputs that outlive the process they came from.
#[derive(Debug, Clone)]
pub struct WorkerInbox {
    worker: String,
    generation: Uuid,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl WorkerInbox {
    pub fn new(worker: &str, generation: Uuid, tx: mpsc::UnboundedSender<Envelope>) -> Self {
        Self {
            worker: worker.to_string(),
            generation,
            tx,
        }
    }

    pub fn worker(&self) -> &str {
        &self.worker
    }

    pub fn generation(&self) -> Uuid {
        self.generation
    }

    /// Returns false once the supervisor is gone
    pub fn deliver(&self, input: WorkerInput) -> bool {
        self.tx
            .send(Envelope {
                worker: self.worker.clone(),
                generation: self.generation,
                input,
            })
            .is_ok()
    }
}
