//! Message channel between the supervisor and its worker.
//!
//! Frames are JSON objects, one per line, carried over the child's stdin
//! (supervisor to child) and stdout (child to supervisor).

pub mod channel;
pub mod protocol;

pub use channel::{FrameReader, FrameWriter, Inbound};
pub use protocol::{DownMessage, Frame, UpMessage, PLUGIN_APPLY, PLUGIN_RELOAD};
