//! Wire protocol: the tagged JSON payload exchanged with the agent endpoint.
//!
//! Every channel frame is one JSON object of the shape
//! `{ "mime_type": ..., "data": ..., "turn_complete"?: bool }`. The shape of
//! `data` depends on `mime_type`, so inbound frames are decoded into a sum type
//! with one variant per enumerated kind. Unknown tags are rejected rather than
//! silently ignored.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ClientError, Result};
use crate::turn::Role;

// ---------------------------------------------------------------------------
// Mime types
// ---------------------------------------------------------------------------

/// The fixed set of content tags carried in `mime_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MimeType {
    Text,
    Transcription,
    InputTranscription,
    Audio,
    ImageUrl,
    ImageUrlList,
}

impl MimeType {
    pub const ALL: [MimeType; 6] = [
        MimeType::Text,
        MimeType::Transcription,
        MimeType::InputTranscription,
        MimeType::Audio,
        MimeType::ImageUrl,
        MimeType::ImageUrlList,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MimeType::Text => "text/plain",
            MimeType::Transcription => "text/transcription",
            MimeType::InputTranscription => "text/input_transcription",
            MimeType::Audio => "audio/pcm",
            MimeType::ImageUrl => "image/url",
            MimeType::ImageUrlList => "image/url_list",
        }
    }

    /// Parse a wire tag, rejecting anything outside the enumerated set.
    pub fn parse(tag: &str) -> Result<Self> {
        MimeType::ALL
            .into_iter()
            .find(|m| m.as_str() == tag)
            .ok_or_else(|| ClientError::UnknownMimeType(tag.to_string()))
    }
}

impl std::fmt::Display for MimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Inbound frames
// ---------------------------------------------------------------------------

/// A content-bearing payload from the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Final agent text; replaces the open agent bubble's text.
    Text(String),
    /// Live transcript fragment of the agent's speech; appended.
    Transcription(String),
    /// Live transcript of the user's own speech; replaces.
    InputTranscription(String),
    /// Decoded PCM audio for the playback sink.
    Audio(Vec<u8>),
    ImageUrl(String),
    ImageUrlList(Vec<String>),
}

impl Payload {
    pub fn mime_type(&self) -> MimeType {
        match self {
            Payload::Text(_) => MimeType::Text,
            Payload::Transcription(_) => MimeType::Transcription,
            Payload::InputTranscription(_) => MimeType::InputTranscription,
            Payload::Audio(_) => MimeType::Audio,
            Payload::ImageUrl(_) => MimeType::ImageUrl,
            Payload::ImageUrlList(_) => MimeType::ImageUrlList,
        }
    }

    /// Which side of the conversation produced this payload.
    pub fn author(&self) -> Role {
        match self {
            Payload::InputTranscription(_) => Role::User,
            _ => Role::Agent,
        }
    }
}

/// One decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// `turn_complete: true` was present; other fields are ignored.
    TurnComplete,
    /// The server reported that the agent was interrupted mid-turn.
    Interrupted,
    Payload(Payload),
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    turn_complete: Option<bool>,
    #[serde(default)]
    interrupted: Option<bool>,
}

/// Decode one text frame received from the channel.
pub fn decode_frame(text: &str) -> Result<InboundFrame> {
    let raw: RawFrame = serde_json::from_str(text)?;

    if raw.turn_complete == Some(true) {
        return Ok(InboundFrame::TurnComplete);
    }

    let Some(tag) = raw.mime_type.as_deref() else {
        if raw.interrupted == Some(true) {
            return Ok(InboundFrame::Interrupted);
        }
        return Err(ClientError::MissingMimeType);
    };

    let mime = MimeType::parse(tag)?;
    let payload = match mime {
        MimeType::Text => Payload::Text(expect_string(mime, raw.data)?),
        MimeType::Transcription => Payload::Transcription(expect_string(mime, raw.data)?),
        MimeType::InputTranscription => {
            Payload::InputTranscription(expect_string(mime, raw.data)?)
        }
        MimeType::Audio => Payload::Audio(decode_pcm(&raw.data)),
        MimeType::ImageUrl => Payload::ImageUrl(expect_string(mime, raw.data)?),
        MimeType::ImageUrlList => Payload::ImageUrlList(expect_string_list(mime, raw.data)?),
    };
    Ok(InboundFrame::Payload(payload))
}

fn expect_string(mime: MimeType, data: Value) -> Result<String> {
    match data {
        Value::String(s) => Ok(s),
        _ => Err(ClientError::InvalidData {
            mime_type: mime.as_str(),
            expected: "a string",
        }),
    }
}

fn expect_string_list(mime: MimeType, data: Value) -> Result<Vec<String>> {
    let invalid = || ClientError::InvalidData {
        mime_type: mime.as_str(),
        expected: "a list of strings",
    };
    let Value::Array(items) = data else {
        return Err(invalid());
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::String(s) => Ok(s),
            _ => Err(invalid()),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Outbound frames
// ---------------------------------------------------------------------------

/// A frame written by the client. Only text and audio ever go upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mime_type", content = "data")]
pub enum OutboundFrame {
    #[serde(rename = "text/plain")]
    Text(String),
    /// Base64-encoded PCM.
    #[serde(rename = "audio/pcm")]
    Audio(String),
}

impl OutboundFrame {
    pub fn text(text: impl Into<String>) -> Self {
        OutboundFrame::Text(text.into())
    }

    pub fn audio(pcm: &[u8]) -> Self {
        OutboundFrame::Audio(encode_pcm(pcm))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ---------------------------------------------------------------------------
// Base64 boundary
// ---------------------------------------------------------------------------

/// Decode base64 PCM carried in a frame's `data` field.
///
/// An empty string, a non-string value, or undecodable input all yield an
/// empty buffer.
pub fn decode_pcm(data: &Value) -> Vec<u8> {
    match data {
        Value::String(s) if !s.is_empty() => match BASE64.decode(s) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "discarding undecodable audio payload");
                Vec::new()
            }
        },
        _ => Vec::new(),
    }
}

pub fn encode_pcm(pcm: &[u8]) -> String {
    BASE64.encode(pcm)
}
