//! Outbound message encoder: user text and microphone audio to wire frames.
//!
//! Writes on a channel that is not open are dropped without queueing.

use crate::connection::Channel;
use crate::error::Result;
use crate::protocol::OutboundFrame;
use crate::turn::{CloseReason, Role};
use crate::view::ChatView;

/// Write `frame` if the channel is open. Returns whether it was written.
pub fn write_frame<C: Channel>(channel: Option<&C>, frame: &OutboundFrame) -> Result<bool> {
    match channel {
        Some(ch) if ch.is_open() => {
            ch.send(frame.to_json()?)?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Submit the text currently in `view.input`.
///
/// Nothing happens unless the trimmed input is non-empty and the channel is
/// open. Otherwise the frame is written, any open user transcript bubble is
/// discarded (the typed text is authoritative), a finalized user bubble is
/// appended and the input cleared. A failed write leaves the view untouched.
pub fn submit_text<C: Channel>(view: &mut ChatView, channel: Option<&C>) -> Result<bool> {
    let text = view.input.trim().to_string();
    if text.is_empty() || !channel.is_some_and(|c| c.is_open()) {
        return Ok(false);
    }

    // The transcript only changes once the frame is on the wire.
    let sent = write_frame(channel, &OutboundFrame::text(text.as_str()))?;
    tracing::debug!(len = text.len(), "client to agent text");

    if let Some(stale) = view.turns.close(Role::User, CloseReason::Finalized) {
        view.transcript.remove(&stale);
    }
    view.transcript.push_bubble(Role::User, text.as_str(), false);
    view.input.clear();
    view.transcript.scroll_to_bottom();
    Ok(sent)
}

/// Forward one microphone buffer when in audio mode.
pub fn send_audio<C: Channel>(pcm: &[u8], is_audio: bool, channel: Option<&C>) -> Result<bool> {
    if !is_audio {
        return Ok(false);
    }
    write_frame(channel, &OutboundFrame::audio(pcm))
}
