use std::path::PathBuf;

/// Errors raised by the supervisor core
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// No directory named after the worker exists under the workers root
    #[error("bot `{name}` is not found in {}", bots_dir.display())]
    NotFound { name: String, bots_dir: PathBuf },

    /// Process creation failed; never retried automatically
    #[error("failed to spawn bot `{name}`: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// A second handle was attached while the first one was still live
    #[error("bot `{0}` already has a live process handle")]
    AlreadyAttached(String),

    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),

    /// A restart subscriber failed; the bus does not catch these
    #[error("restart handler for `{worker}` failed: {source}")]
    Handler {
        worker: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Failures delivering a frame to the child
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The child side is gone (stdin already taken or process retired)
    #[error("channel is closed")]
    Closed,
}

/// A frame that parsed as JSON but does not carry a valid payload for its type
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid `{kind}` payload: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub type Result<T, E = SupervisorError> = std::result::Result<T, E>;
