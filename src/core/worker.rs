use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::core::inbox::{WorkerInbox, WorkerInput};
use crate::core::process::ProcessBox;
use crate::core::registry::{is_prefix, Dispatch, WatchRegistry};
use crate::core::watcher::FileWatcher;
use crate::error::SupervisorError;
use crate::ipc::{DownMessage, UpMessage};

/// Dispatch state of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Running without file watching
    NoWatcher,
    /// Running, changes are routed
    Watching,
    /// The child went away on its own; only the base directory is watched
    Exited,
    /// Killed and cleaned up, waiting for a relaunch (or nothing)
    TornDown,
}

/// What the supervisor has to do after a worker handled an input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    /// Teardown is complete, emit the restart event
    Restart,
    /// The worker is finished and can be dropped
    Exited,
}

/// One supervised bot: its process handle, resolver roots and watcher
pub struct Worker {
    name: String,
    base_dir: PathBuf,
    workdir: PathBuf,
    watch: bool,
    debounce: Duration,
    generation: Uuid,
    inbox: Option<WorkerInbox>,
    handle: Option<ProcessBox>,
    registry: WatchRegistry,
    watcher: Option<FileWatcher>,
    state: WorkerState,
}

impl Worker {
    pub fn new(name: &str, base_dir: PathBuf, watch: bool, debounce: Duration) -> Self {
        Self {
            name: name.to_string(),
            base_dir,
            workdir: PathBuf::new(),
            watch,
            debounce,
            generation: Uuid::nil(),
            inbox: None,
            handle: None,
            registry: WatchRegistry::new(),
            watcher: None,
            state: WorkerState::NoWatcher,
        }
    }

    /// Directory relative resolver paths are anchored at
    pub fn with_workdir(mut self, workdir: PathBuf) -> Self {
        self.workdir = workdir;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn watch(&self) -> bool {
        self.watch
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn generation(&self) -> Uuid {
        self.generation
    }

    pub fn is_attached(&self) -> bool {
        self.handle.is_some()
    }

    pub fn registry(&self) -> &WatchRegistry {
        &self.registry
    }

    pub fn watcher(&self) -> Option<&FileWatcher> {
        self.watcher.as_ref()
    }

    /// Bind a freshly launched process. Watching starts here in watch mode,
    /// with the base directory as the first root.
    pub fn attach(&mut self, handle: ProcessBox, inbox: WorkerInbox) -> Result<(), SupervisorError> {
        if self.handle.is_some() {
            return Err(SupervisorError::AlreadyAttached(self.name.clone()));
        }

        let pid = handle.pid();
        self.generation = inbox.generation();
        self.handle = Some(handle);

        if self.watch {
            if self.watcher.is_none() {
                self.watcher = Some(FileWatcher::new(inbox.clone(), self.debounce)?);
            }
            if let Some(watcher) = self.watcher.as_mut() {
                watcher.add(&self.base_dir)?;
            }
            self.state = WorkerState::Watching;
        } else {
            self.state = WorkerState::NoWatcher;
        }

        self.inbox = Some(inbox);
        info!(worker = %self.name, pid = ?pid, watch = self.watch, "🔗 Attached bot process");
        Ok(())
    }

    /// Process one input to completion
    pub async fn handle_input(&mut self, input: WorkerInput) -> Result<Outcome, SupervisorError> {
        match input {
            WorkerInput::Changed(event) => Ok(self.on_change(&event.path).await),
            WorkerInput::Message(message) => {
                self.on_message(message);
                Ok(Outcome::Continue)
            }
            WorkerInput::Closed => self.on_closed().await,
        }
    }

    async fn on_change(&mut self, path: &Path) -> Outcome {
        match self.state {
            WorkerState::Watching => match self.registry.route(&self.base_dir, path) {
                Dispatch::Reload(resolvers) => {
                    for resolver in resolvers {
                        self.send_reload(resolver).await;
                    }
                    Outcome::Continue
                }
                Dispatch::Restart => {
                    info!(worker = %self.name, "♻️ {:?} is outside every plugin, restarting", path);
                    self.teardown().await;
                    Outcome::Restart
                }
                Dispatch::Ignore => {
                    trace!("Change outside scope: {:?}", path);
                    Outcome::Continue
                }
            },
            WorkerState::Exited if is_prefix(&self.base_dir, path) => {
                info!(worker = %self.name, "♻️ {:?} changed, relaunching exited bot", path);
                self.teardown().await;
                Outcome::Restart
            }
            _ => {
                trace!("Ignoring change in state {:?}: {:?}", self.state, path);
                Outcome::Continue
            }
        }
    }

    async fn send_reload(&mut self, resolver: String) {
        let Some(handle) = self.handle.as_mut() else {
            return;
        };

        debug!(worker = %self.name, "🔄 Reloading plugin: {}", resolver);
        let message = DownMessage::PluginReload { resolver };
        if let Err(e) = handle.send(&message).await {
            error!(worker = %self.name, "❌ Failed to send {:?}: {}", message, e);
        }
    }

    fn on_message(&mut self, message: UpMessage) {
        match message {
            UpMessage::PluginApply { resolver } => {
                if !self.watch || self.state != WorkerState::Watching {
                    trace!("Ignoring plugin:apply for {} (not watching)", resolver);
                    return;
                }

                let (dir, _) = self.registry.register_at(&self.workdir, &resolver);
                if let Some(watcher) = self.watcher.as_mut() {
                    if let Err(e) = watcher.add(&dir) {
                        warn!(worker = %self.name, "⚠️ Cannot watch {:?}: {}", dir, e);
                    }
                }
                debug!(worker = %self.name, "🔌 Plugin applied: {} ({:?})", resolver, dir);
            }
            UpMessage::Other { kind } => {
                trace!("Inert message type: {}", kind);
            }
        }
    }

    async fn on_closed(&mut self) -> Result<Outcome, SupervisorError> {
        if self.handle.is_none() {
            return Ok(Outcome::Continue);
        }

        warn!(worker = %self.name, "⚠️ Bot exited without being asked to");
        self.handle = None;
        self.registry.clear();

        if let Some(watcher) = self.watcher.take() {
            watcher.close().await;
        }

        if !self.watch {
            self.state = WorkerState::TornDown;
            return Ok(Outcome::Exited);
        }

        // keep an eye on the base directory so a fix brings it back
        if let Some(inbox) = self.inbox.clone() {
            let mut watcher = FileWatcher::new(inbox, self.debounce)?;
            watcher.add(&self.base_dir)?;
            self.watcher = Some(watcher);
        }
        self.state = WorkerState::Exited;
        info!(worker = %self.name, "⏸️ Waiting for changes in {:?}", self.base_dir);
        Ok(Outcome::Continue)
    }

    /// Kill the process, forget every resolver root and close the watcher.
    /// Returns once the watcher is fully closed.
    pub async fn teardown(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            if let Err(e) = handle.interrupt() {
                error!(worker = %self.name, "❌ Failed to interrupt bot: {}", e);
            }
        }

        self.registry.clear();

        if let Some(watcher) = self.watcher.take() {
            watcher.close().await;
        }

        self.inbox = None;
        self.state = WorkerState::TornDown;
        debug!(worker = %self.name, "🧹 Torn down");
    }
}
