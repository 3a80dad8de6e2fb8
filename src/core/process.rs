use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::core::inbox::{WorkerInbox, WorkerInput};
use crate::error::{ChannelError, SupervisorError};
use crate::ipc::{DownMessage, FrameReader, FrameWriter, Inbound};

/// Options fixed for the lifetime of a worker name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Passed to the child as `PORT`
    pub port: u16,
    /// Dev mode: watch files and hot-reload plugins
    pub watch: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            port: 8080,
            watch: false,
        }
    }
}

/// Everything needed to start one child
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub name: String,
    pub base_dir: PathBuf,
    pub program: String,
    pub args: Vec<String>,
    pub options: LaunchOptions,
}

impl LaunchSpec {
    pub fn from_config(config: &Config, name: &str, options: &LaunchOptions) -> Self {
        Self {
            name: name.to_string(),
            base_dir: config.supervisor.bots_dir.join(name),
            program: config.supervisor.program.clone(),
            args: config.launch_args(options.watch),
            options: options.clone(),
        }
    }
}

/// The live child, as seen by the supervisor
#[async_trait]
pub trait WorkerProcess: Send {
    fn pid(&self) -> Option<u32>;

    /// Deliver one frame to the child
    async fn send(&mut self, message: &DownMessage) -> Result<(), ChannelError>;

    /// Ask the child to stop (SIGINT). Does not wait for it to exit.
    fn interrupt(&mut self) -> anyhow::Result<()>;
}

pub type ProcessBox = Box<dyn WorkerProcess>;

/// Starts worker processes
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Start the child described by `spec`. Channel traffic and the final
    /// close go to `inbox`.
    async fn launch(&self, spec: &LaunchSpec, inbox: WorkerInbox)
        -> Result<ProcessBox, SupervisorError>;
}

/// Spawns real processes with `tokio::process`
#[derive(Debug, Default, Clone)]
pub struct ProcessLauncher;

impl ProcessLauncher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Launcher for ProcessLauncher {
    async fn launch(
        &self,
        spec: &LaunchSpec,
        inbox: WorkerInbox,
    ) -> Result<ProcessBox, SupervisorError> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.base_dir)
            .env("PORT", spec.options.port.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(false);

        let mut child = cmd.spawn().map_err(|source| SupervisorError::Spawn {
            name: spec.name.clone(),
            source,
        })?;

        let pid = child.id();
        info!(worker = %spec.name, pid = ?pid, "🚀 Spawned bot");

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump_frames(stdout, inbox));
        } else {
            warn!(worker = %spec.name, "⚠️ Child has no stdout, channel is one-way");
        }

        let stdin = child.stdin.take().map(FrameWriter::new);
        Ok(Box::new(ChildProcess { child, stdin }))
    }
}

/// Forward everything the child writes until it closes stdout
async fn pump_frames<R>(reader: R, inbox: WorkerInbox)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut frames = FrameReader::new(reader);

    loop {
        match frames.next().await {
            Ok(Some(Inbound::Message(message))) => {
                if !inbox.deliver(WorkerInput::Message(message)) {
                    return;
                }
            }
            Ok(Some(Inbound::Output(line))) => {
                info!(worker = %inbox.worker(), "{}", line);
            }
            Ok(None) => break,
            Err(ChannelError::Protocol(e)) => {
                warn!(worker = %inbox.worker(), "⚠️ Ignoring invalid frame: {}", e);
            }
            Err(e) => {
                warn!(worker = %inbox.worker(), "⚠️ Channel read failed: {}", e);
                break;
            }
        }
    }

    debug!(worker = %inbox.worker(), "📪 Channel closed by child");
    inbox.deliver(WorkerInput::Closed);
}

/// A child spawned by [`ProcessLauncher`]
pub struct ChildProcess {
    child: Child,
    stdin: Option<FrameWriter<ChildStdin>>,
}

#[async_trait]
impl WorkerProcess for ChildProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    async fn send(&mut self, message: &DownMessage) -> Result<(), ChannelError> {
        match self.stdin.as_mut() {
            Some(writer) => writer.send(message).await,
            None => Err(ChannelError::Closed),
        }
    }

    fn interrupt(&mut self) -> anyhow::Result<()> {
        // closing stdin lets the child notice even if it ignores the signal
        self.stdin = None;

        let Some(pid) = self.child.id() else {
            debug!("Child already reaped, nothing to interrupt");
            return Ok(());
        };

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            kill(Pid::from_raw(pid as i32), Some(Signal::SIGINT))
                .map_err(|e| anyhow::anyhow!("Failed to send SIGINT to {}: {}", pid, e))?;
            info!("🛑 Sent SIGINT to process {}", pid);
        }

        #[cfg(not(unix))]
        {
            self.child.start_kill()?;
            info!("🛑 Killed process {}", pid);
        }

        Ok(())
    }
}
