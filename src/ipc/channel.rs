use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tracing::{debug, trace};

use crate::error::{ChannelError, ProtocolError};
use crate::ipc::protocol::{DownMessage, UpMessage};

/// What a single line from the child turned out to be
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Message(UpMessage),
    /// Plain output that is not a protocol frame
    Output(String),
}

/// Writes newline-delimited frames to the child
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin + Send> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn send(&mut self, message: &DownMessage) -> Result<(), ChannelError> {
        let mut line = message.encode()?;
        line.push('\n');

        self.inner.write_all(line.as_bytes()).await?;
        self.inner.flush().await?;

        trace!("📤 Sent frame: {:?}", message);
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Reads newline-delimited frames coming from the child
pub struct FrameReader<R> {
    lines: LinesStream<BufReader<R>>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            lines: LinesStream::new(BufReader::new(inner).lines()),
        }
    }

    /// Next inbound item, `Ok(None)` once the child closed its end.
    ///
    /// Frames of a known type with a broken payload are returned as errors;
    /// the caller decides whether to keep reading.
    pub async fn next(&mut self) -> Result<Option<Inbound>, ChannelError> {
        loop {
            let line = match self.lines.next().await {
                Some(line) => line?,
                None => return Ok(None),
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            return match UpMessage::decode(trimmed) {
                Ok(message) => {
                    trace!("📨 Received frame: {:?}", message);
                    Ok(Some(Inbound::Message(message)))
                }
                Err(ProtocolError::Malformed(_)) => Ok(Some(Inbound::Output(line))),
                Err(e) => {
                    debug!("⚠️ Dropping invalid frame: {}", e);
                    Err(e.into())
                }
            };
        }
    }
}
