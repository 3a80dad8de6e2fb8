//! Recording doubles for the launcher seam.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::core::inbox::WorkerInbox;
use crate::core::process::{LaunchSpec, Launcher, ProcessBox, WorkerProcess};
use crate::error::{ChannelError, SupervisorError};
use crate::ipc::DownMessage;

/// Shared view of everything the fake children were asked to do
#[derive(Debug, Default, Clone)]
pub struct Recorder {
    pub sent: Arc<Mutex<Vec<DownMessage>>>,
    pub interrupts: Arc<AtomicUsize>,
    pub fail_sends: Arc<AtomicBool>,
}

impl Recorder {
    pub fn sent(&self) -> Vec<DownMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn interrupts(&self) -> usize {
        self.interrupts.load(Ordering::SeqCst)
    }
}

pub struct RecordingProcess {
    recorder: Recorder,
}

impl RecordingProcess {
    pub fn boxed(recorder: &Recorder) -> ProcessBox {
        Box::new(Self {
            recorder: recorder.clone(),
        })
    }
}

#[async_trait]
impl WorkerProcess for RecordingProcess {
    fn pid(&self) -> Option<u32> {
        Some(4242)
    }

    async fn send(&mut self, message: &DownMessage) -> Result<(), ChannelError> {
        if self.recorder.fail_sends.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }
        self.recorder.sent.lock().unwrap().push(message.clone());
        Ok(())
    }

    fn interrupt(&mut self) -> anyhow::Result<()> {
        self.recorder.interrupts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct RecordingLauncher {
    pub recorder: Recorder,
    pub launches: Arc<Mutex<Vec<(LaunchSpec, WorkerInbox)>>>,
    pub fail: Arc<AtomicBool>,
}

impl RecordingLauncher {
    pub fn launch_count(&self) -> usize {
        self.launches.lock().unwrap().len()
    }

    /// Inbox of the most recent launch, to play the child's side
    pub fn last_inbox(&self) -> WorkerInbox {
        self.launches.lock().unwrap().last().unwrap().1.clone()
    }
}

#[async_trait]
impl Launcher for RecordingLauncher {
    async fn launch(
        &self,
        spec: &LaunchSpec,
        inbox: WorkerInbox,
    ) -> Result<ProcessBox, SupervisorError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SupervisorError::Spawn {
                name: spec.name.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such program"),
            });
        }
        self.launches.lock().unwrap().push((spec.clone(), inbox));
        Ok(RecordingProcess::boxed(&self.recorder))
    }
}
