use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::core::event_bus::{EventBus, EventKind, SubscriptionId, SupervisorEvent};
use crate::core::inbox::{Envelope, WorkerInbox};
use crate::core::process::{LaunchOptions, LaunchSpec, Launcher};
use crate::core::worker::{Outcome, Worker, WorkerState};
use crate::error::{Result, SupervisorError};

/// Owns every worker, keyed by name, and drives them from one loop.
///
/// Inputs from all workers arrive on a single inbox and are handled one at a
/// time, so a change event and a child message never interleave.
pub struct Supervisor {
    config: Config,
    launcher: Arc<dyn Launcher>,
    bus: EventBus,
    workers: HashMap<String, Worker>,
    subscriptions: HashMap<String, (SubscriptionId, LaunchOptions)>,
    inbox_tx: mpsc::UnboundedSender<Envelope>,
    inbox_rx: mpsc::UnboundedReceiver<Envelope>,
    restart_tx: mpsc::UnboundedSender<String>,
    restart_rx: mpsc::UnboundedReceiver<String>,
}

impl Supervisor {
    pub fn new(config: Config, launcher: Arc<dyn Launcher>) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (restart_tx, restart_rx) = mpsc::unbounded_channel();

        Self {
            config,
            launcher,
            bus: EventBus::new(),
            workers: HashMap::new(),
            subscriptions: HashMap::new(),
            inbox_tx,
            inbox_rx,
            restart_tx,
            restart_rx,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Extra subscribers (metrics, tests) hook in here
    pub fn bus_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    pub fn worker(&self, name: &str) -> Option<&Worker> {
        self.workers.get(name)
    }

    /// Start `name` and keep relaunching it whenever its restart event fires
    pub async fn start(&mut self, name: &str, options: LaunchOptions) -> Result<()> {
        let fresh = !self.subscriptions.contains_key(name);
        if fresh {
            let id = self.subscribe_restart(name);
            self.subscriptions
                .insert(name.to_string(), (id, options.clone()));
        }

        let result = self.launch(name, &options).await;
        if result.is_err() && fresh {
            // a bot that never came up must not leave a restart loop behind
            if let Some((id, _)) = self.subscriptions.remove(name) {
                self.bus.off(id);
            }
        }
        result
    }

    fn subscribe_restart(&mut self, name: &str) -> SubscriptionId {
        let tx = self.restart_tx.clone();
        let target = name.to_string();

        self.bus.on(EventKind::Restart, move |event| {
            if event.worker() == target {
                tx.send(target.clone())
                    .map_err(|_| anyhow::anyhow!("supervisor loop is gone"))?;
            }
            Ok(())
        })
    }

    /// Drop the restart subscription for `name`; the next teardown is final
    pub fn stop_restarting(&mut self, name: &str) -> bool {
        match self.subscriptions.remove(name) {
            Some((id, _)) => {
                info!(worker = %name, "⏹️ Restart loop disabled");
                self.bus.off(id)
            }
            None => false,
        }
    }

    /// Base directory of `name`, if it is one of the worker directories
    pub async fn ensure_exists(&self, name: &str) -> Result<PathBuf> {
        let bots_dir = &self.config.supervisor.bots_dir;
        let not_found = || SupervisorError::NotFound {
            name: name.to_string(),
            bots_dir: bots_dir.clone(),
        };

        let mut entries = tokio::fs::read_dir(bots_dir)
            .await
            .map_err(|_| not_found())?;

        while let Some(entry) = entries.next_entry().await.map_err(|_| not_found())? {
            if entry.file_name().as_os_str() == OsStr::new(name) {
                let is_dir = entry
                    .file_type()
                    .await
                    .map(|t| t.is_dir())
                    .unwrap_or(false);
                if is_dir {
                    return Ok(entry.path());
                }
            }
        }

        Err(not_found())
    }

    /// Launch one child for `name`, retiring any previous one first
    pub async fn launch(&mut self, name: &str, options: &LaunchOptions) -> Result<()> {
        self.ensure_exists(name).await?;

        if let Some(mut previous) = self.workers.remove(name) {
            if previous.state() != WorkerState::TornDown {
                debug!(worker = %name, "Retiring previous process before launch");
                previous.teardown().await;
            }
        }

        let spec = LaunchSpec::from_config(&self.config, name, options);
        let inbox = WorkerInbox::new(name, Uuid::new_v4(), self.inbox_tx.clone());

        info!(worker = %name, dev = options.watch, "🚀 Launching bot");
        let process = self.launcher.launch(&spec, inbox.clone()).await?;

        let mut worker = Worker::new(
            name,
            spec.base_dir.clone(),
            options.watch,
            self.config.watch.debounce(),
        )
        .with_workdir(self.config.workdir.clone());
        if let Err(e) = worker.attach(process, inbox) {
            worker.teardown().await;
            return Err(e);
        }

        self.workers.insert(name.to_string(), worker);
        Ok(())
    }

    /// Handle exactly one pending input or restart
    pub async fn step(&mut self) -> Result<()> {
        tokio::select! {
            Some(envelope) = self.inbox_rx.recv() => self.dispatch(envelope).await,
            Some(name) = self.restart_rx.recv() => self.relaunch(&name).await,
        }
    }

    async fn dispatch(&mut self, envelope: Envelope) -> Result<()> {
        let Some(worker) = self.workers.get_mut(&envelope.worker) else {
            trace!("Input for unknown bot {}", envelope.worker);
            return Ok(());
        };

        if worker.generation() != envelope.generation {
            trace!(worker = %envelope.worker, "Dropping input from a retired process");
            return Ok(());
        }

        match worker.handle_input(envelope.input).await? {
            Outcome::Continue => Ok(()),
            Outcome::Restart => {
                let event = SupervisorEvent::Restart {
                    worker: envelope.worker,
                };
                let handled = self.bus.emit(&event)?;
                debug!("📣 Restart event delivered to {} handler(s)", handled);
                Ok(())
            }
            Outcome::Exited => {
                info!(worker = %envelope.worker, "👋 Bot finished");
                self.workers.remove(&envelope.worker);
                Ok(())
            }
        }
    }

    async fn relaunch(&mut self, name: &str) -> Result<()> {
        let Some((_, options)) = self.subscriptions.get(name) else {
            debug!(worker = %name, "Restart requested but no longer subscribed");
            return Ok(());
        };
        let options = options.clone();

        info!(worker = %name, "♻️ Restarting bot");
        self.launch(name, &options).await
    }

    /// Nothing running and nothing queued
    pub fn is_idle(&self) -> bool {
        self.workers
            .values()
            .all(|w| w.state() == WorkerState::TornDown)
            && self.restart_rx.is_empty()
            && self.inbox_rx.is_empty()
    }

    /// Loop until Ctrl-C or until every bot is gone for good
    pub async fn run(&mut self) -> Result<()> {
        info!("🔄 Starting supervisor loop");

        loop {
            if self.is_idle() {
                info!("No bots left to supervise");
                break;
            }

            tokio::select! {
                result = self.step() => {
                    if let Err(e) = result {
                        error!("❌ Supervisor error: {}", e);
                        self.shutdown().await;
                        return Err(e);
                    }
                }
                _ = signal::ctrl_c() => {
                    info!("🛑 Received shutdown signal");
                    break;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Interrupt every live bot and close every watcher
    pub async fn shutdown(&mut self) {
        let live = self.workers.values().filter(|w| w.is_attached()).count();
        if live > 0 {
            info!("👋 Stopping {} bot(s)", live);
        }

        futures::future::join_all(self.workers.values_mut().map(|w| w.teardown())).await;

        let ids: Vec<SubscriptionId> = self.subscriptions.drain().map(|(_, (id, _))| id).collect();
        for id in ids {
            if !self.bus.off(id) {
                warn!("Restart subscription {:?} was already gone", id);
            }
        }
    }
}
