//! Inbound message router.
//!
//! Maps one decoded frame onto the view. Dispatch is ordered:
//!
//! 1. `turn_complete` closes both roles and changes nothing else.
//! 2. A user input transcription lands in the open user bubble, opening one
//!    (and closing the agent role) if needed.
//! 3. Anything the agent authored first ends the user's turn.
//! 4. Audio goes to the playback sink.
//! 5. Galleries and single images are final responses and close the agent role.
//! 6. Agent text opens an agent bubble if needed; transcription fragments
//!    append, final text replaces.
//!
//! Every branch that touches the transcript scrolls it to the bottom.

use crate::audio::PlaybackSink;
use crate::error::Result;
use crate::protocol::{InboundFrame, Payload};
use crate::transcript::BubbleId;
use crate::turn::{CloseReason, Role};
use crate::view::ChatView;

/// Apply one inbound frame to `view`.
pub fn route(
    frame: InboundFrame,
    view: &mut ChatView,
    playback: &mut Option<Box<dyn PlaybackSink>>,
) -> Result<()> {
    let payload = match frame {
        InboundFrame::TurnComplete => {
            view.turns.reset(CloseReason::TurnComplete);
            return Ok(());
        }
        InboundFrame::Interrupted => {
            tracing::debug!("agent interrupted");
            end_user_turn(view);
            return Ok(());
        }
        InboundFrame::Payload(payload) => payload,
    };
    tracing::trace!(
        mime_type = payload.mime_type().as_str(),
        author = %payload.author(),
        "routing payload"
    );

    if payload.author() == Role::Agent {
        end_user_turn(view);
    }

    match payload {
        Payload::InputTranscription(text) => show_user_transcript(view, &text)?,
        Payload::Audio(pcm) => play_audio(playback, &pcm),
        Payload::ImageUrlList(urls) => {
            view.transcript.push_gallery(urls);
            view.turns.close(Role::Agent, CloseReason::Finalized);
            view.transcript.scroll_to_bottom();
        }
        Payload::ImageUrl(url) => {
            view.transcript.push_image(url);
            view.turns.close(Role::Agent, CloseReason::Finalized);
            view.transcript.scroll_to_bottom();
        }
        Payload::Transcription(text) => {
            let id = agent_bubble(view)?;
            view.transcript.append_text(&id, &text);
            view.transcript.set_transient(&id, true);
            view.transcript.scroll_to_bottom();
        }
        Payload::Text(text) => {
            let id = agent_bubble(view)?;
            view.transcript.set_text(&id, &text);
            view.transcript.set_transient(&id, false);
            view.transcript.scroll_to_bottom();
        }
    }
    Ok(())
}

/// Close the open user bubble, dropping its transient marker.
fn end_user_turn(view: &mut ChatView) {
    if let Some(id) = view.turns.close(Role::User, CloseReason::Superseded) {
        view.transcript.set_transient(&id, false);
    }
}

fn show_user_transcript(view: &mut ChatView, text: &str) -> Result<()> {
    let id = match open_bubble(view, Role::User) {
        Some(id) => id,
        None => {
            view.turns.close(Role::Agent, CloseReason::Superseded);
            let id = view.transcript.push_bubble(Role::User, "", true);
            view.turns.open(Role::User, id.clone())?;
            id
        }
    };
    view.transcript.set_text(&id, text);
    view.transcript.scroll_to_bottom();
    Ok(())
}

/// The open agent bubble, or a fresh one.
fn agent_bubble(view: &mut ChatView) -> Result<BubbleId> {
    if let Some(id) = open_bubble(view, Role::Agent) {
        return Ok(id);
    }
    let id = view.transcript.push_bubble(Role::Agent, "", false);
    view.turns.open(Role::Agent, id.clone())?;
    Ok(id)
}

/// The open bubble for `role`, provided it is still in the transcript. A
/// tracked id whose bubble has vanished is closed.
fn open_bubble(view: &mut ChatView, role: Role) -> Option<BubbleId> {
    let id = view.turns.current(role)?.clone();
    if view.transcript.bubble(&id).is_some() {
        return Some(id);
    }
    tracing::debug!(%role, %id, "tracked bubble no longer in transcript");
    view.turns.close(role, CloseReason::Superseded);
    None
}

fn play_audio(playback: &mut Option<Box<dyn PlaybackSink>>, pcm: &[u8]) {
    let Some(sink) = playback.as_mut() else {
        tracing::debug!(len = pcm.len(), "no playback sink, dropping audio");
        return;
    };
    if sink.is_suspended() {
        if let Err(e) = sink.resume() {
            tracing::error!(error = %e, "failed to resume playback");
        }
    }
    if let Err(e) = sink.play(pcm) {
        tracing::warn!(error = %e, "playback failed");
    }
}
