//! Botvisor - a dev-mode supervisor for bot workers
//!
//! Runs one child per bot, watches its source tree and the plugin
//! directories the child reports, and either asks the child to hot-reload a
//! single plugin or restarts the whole process when a change falls outside
//! every plugin.

pub mod config;
pub mod core;
pub mod error;
pub mod ipc;

// Re-export commonly used types
pub use config::Config;
pub use crate::core::process::{LaunchOptions, ProcessLauncher};
pub use crate::core::supervisor::Supervisor;
pub use error::{ChannelError, ProtocolError, SupervisorError};
