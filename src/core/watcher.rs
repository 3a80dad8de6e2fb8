use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::core::inbox::{ChangeEvent, WorkerInbox, WorkerInput};

/// Only in-place modifications count as changes
pub fn is_change(kind: &EventKind) -> bool {
    match kind {
        EventKind::Modify(ModifyKind::Name(_)) => false,
        EventKind::Modify(_) => true,
        _ => false,
    }
}

/// Recursive file watcher for one worker launch.
///
/// Roots are cumulative. A directory that already sits inside a watched root
/// is recorded but does not get a second OS subscription.
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    forwarder: JoinHandle<()>,
    roots: Vec<PathBuf>,
    requested: BTreeSet<PathBuf>,
}

impl FileWatcher {
    /// Must be called from inside a tokio runtime
    pub fn new(inbox: WorkerInbox, debounce: Duration) -> Result<Self, notify::Error> {
        let worker = inbox.worker().to_string();
        let (tx, rx) = mpsc::unbounded_channel();

        let watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) if is_change(&event.kind) => {
                    for path in event.paths {
                        let _ = tx.send(path);
                    }
                }
                Ok(event) => trace!("🔍 Ignoring event type: {:?}", event.kind),
                Err(e) => error!("File watch error: {}", e),
            },
            Config::default(),
        )?;

        let forwarder = tokio::spawn(forward_changes(rx, inbox, debounce));
        debug!(worker = %worker, "👀 File watcher created");

        Ok(Self {
            watcher,
            forwarder,
            roots: Vec::new(),
            requested: BTreeSet::new(),
        })
    }

    /// Watch `dir` recursively. Returns false when it was already requested.
    pub fn add(&mut self, dir: &Path) -> Result<bool, notify::Error> {
        if self.requested.contains(dir) {
            return Ok(false);
        }

        if let Some(root) = self.roots.iter().find(|root| dir.starts_with(root)) {
            debug!("👀 {:?} already covered by {:?}", dir, root);
        } else {
            self.watcher.watch(dir, RecursiveMode::Recursive)?;
            self.roots.push(dir.to_path_buf());
            info!("👀 Watching directory: {:?}", dir);
        }

        self.requested.insert(dir.to_path_buf());
        Ok(true)
    }

    pub fn is_watching(&self, dir: &Path) -> bool {
        self.requested.contains(dir)
    }

    /// Directories holding an OS-level subscription
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn requested(&self) -> impl Iterator<Item = &Path> {
        self.requested.iter().map(PathBuf::as_path)
    }

    /// Tear the watcher down. Resolves once the OS watcher is fully dropped
    /// and no further change can be delivered; pending changes are discarded.
    pub async fn close(self) {
        let roots = self.roots.len();
        let watcher = self.watcher;

        if let Err(e) = tokio::task::spawn_blocking(move || drop(watcher)).await {
            warn!("⚠️ File watcher teardown did not finish cleanly: {}", e);
        }

        self.forwarder.abort();
        if let Err(e) = self.forwarder.await {
            if !e.is_cancelled() {
                warn!("⚠️ Change forwarder failed: {}", e);
            }
        }
        debug!("🛑 File watcher closed ({} roots)", roots);
    }
}

/// Trailing-edge debounce: a path is delivered once it has seen no new
/// modification for `debounce`, so the last write of a burst always wins.
async fn forward_changes(
    mut rx: mpsc::UnboundedReceiver<PathBuf>,
    inbox: WorkerInbox,
    debounce: Duration,
) {
    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();

    loop {
        let next_due = pending.values().min().copied();

        tokio::select! {
            received = rx.recv() => match received {
                Some(path) => {
                    if pending.insert(path.clone(), Instant::now() + debounce).is_some() {
                        debug!("🔍 Event debounced for {:?}", path);
                    }
                }
                None => break,
            },
            _ = sleep_until(next_due.unwrap_or_else(Instant::now)), if next_due.is_some() => {
                let now = Instant::now();
                let due: Vec<PathBuf> = pending
                    .iter()
                    .filter(|(_, at)| **at <= now)
                    .map(|(path, _)| path.clone())
                    .collect();

                for path in due {
                    pending.remove(&path);
                    debug!("📁 File changed: {:?}", path);
                    if !inbox.deliver(WorkerInput::Changed(ChangeEvent::new(path))) {
                        debug!("Supervisor inbox closed, dropping changes");
                        return;
                    }
                }
            }
        }
    }

    trace!("File watcher channel closed");
}
