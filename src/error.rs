//! Crate-level error type.

use thiserror::Error;

use crate::turn::TurnError;

/// Errors surfaced by the client library.
///
/// Most of these never reach the user: inbound decode failures are logged and
/// the frame is dropped, and transport failures only change the status line.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The frame was not valid JSON, or not a JSON object.
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    /// The frame named a `mime_type` outside the enumerated set.
    #[error("unknown mime_type '{0}'")]
    UnknownMimeType(String),

    /// The frame carried neither a `mime_type` nor a turn signal.
    #[error("frame has no mime_type and no turn signal")]
    MissingMimeType,

    /// `data` did not have the shape its `mime_type` requires.
    #[error("invalid data for {mime_type}: expected {expected}")]
    InvalidData {
        mime_type: &'static str,
        expected: &'static str,
    },

    /// The WebSocket handshake failed.
    #[error("connection to {url} failed: {detail}")]
    Connect { url: String, detail: String },

    /// A transport-level failure on an established channel.
    #[error("transport error: {0}")]
    Transport(String),

    /// A write was attempted on a channel that is not open.
    #[error("channel is not open")]
    ChannelClosed,

    /// Audio bridge setup or playback failure.
    #[error("{0}")]
    Audio(String),

    /// Invalid configuration (bad URL scheme, unreadable TOML, ...).
    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Turn(#[from] TurnError),
}

pub type Result<T> = std::result::Result<T, ClientError>;
