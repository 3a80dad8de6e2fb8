pub mod event_bus;
pub mod inbox;
pub mod process;
pub mod registry;
pub mod supervisor;
pub mod watcher;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use event_bus::{EventBus, EventKind, SubscriptionId, SupervisorEvent};
pub use inbox::{ChangeEvent, Envelope, WorkerInbox, WorkerInput};
pub use process::{LaunchOptions, LaunchSpec, Launcher, ProcessBox, ProcessLauncher, WorkerProcess};
pub use registry::{Dispatch, WatchRegistry};
pub use supervisor::Supervisor;
pub use watcher::FileWatcher;
pub use worker::{Outcome, Worker, WorkerState};
