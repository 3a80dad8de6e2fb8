use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Frame type asking the child to hot-reload one resolver
pub const PLUGIN_RELOAD: &str = "plugin:reload";

/// Frame type the child emits after it applied a plugin
pub const PLUGIN_APPLY: &str = "plugin:apply";

/// One line on the wire: `{"type": ..., "data": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Messages sent from supervisor to child
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownMessage {
    /// Reload the plugin identified by `resolver`
    PluginReload { resolver: String },
}

/// Messages sent from child to supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpMessage {
    /// The child applied the plugin living at `resolver`
    PluginApply { resolver: String },
    /// Any other frame type; reserved for child-specific concerns
    Other { kind: String },
}

#[derive(Debug, Serialize, Deserialize)]
struct ApplyPayload {
    resolver: String,
}

impl From<&DownMessage> for Frame {
    fn from(message: &DownMessage) -> Self {
        match message {
            DownMessage::PluginReload { resolver } => Frame {
                kind: PLUGIN_RELOAD.to_string(),
                data: serde_json::Value::String(resolver.clone()),
            },
        }
    }
}

impl TryFrom<Frame> for UpMessage {
    type Error = ProtocolError;

    fn try_from(frame: Frame) -> Result<Self, Self::Error> {
        match frame.kind.as_str() {
            PLUGIN_APPLY => {
                let payload: ApplyPayload = serde_json::from_value(frame.data).map_err(|source| {
                    ProtocolError::InvalidPayload {
                        kind: frame.kind.clone(),
                        source,
                    }
                })?;
                Ok(UpMessage::PluginApply {
                    resolver: payload.resolver,
                })
            }
            _ => Ok(UpMessage::Other { kind: frame.kind }),
        }
    }
}

impl TryFrom<Frame> for DownMessage {
    type Error = ProtocolError;

    fn try_from(frame: Frame) -> Result<Self, Self::Error> {
        match frame.kind.as_str() {
            PLUGIN_RELOAD => {
                let resolver: String = serde_json::from_value(frame.data).map_err(|source| {
                    ProtocolError::InvalidPayload {
                        kind: frame.kind.clone(),
                        source,
                    }
                })?;
                Ok(DownMessage::PluginReload { resolver })
            }
            other => Err(ProtocolError::InvalidPayload {
                kind: other.to_string(),
                source: serde::de::Error::custom("unknown supervisor message type"),
            }),
        }
    }
}

impl DownMessage {
    /// Encode as a single JSON line (no trailing newline)
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&Frame::from(self))
    }

    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        let frame: Frame = serde_json::from_str(line)?;
        frame.try_into()
    }
}

impl UpMessage {
    /// Decode one line received from the child
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        let frame: Frame = serde_json::from_str(line)?;
        frame.try_into()
    }
}
