//! Connection manager and session state.
//!
//! A [`Session`] owns everything that changes over the life of the client:
//! the current channel, the audio-mode flag, the turn tracker and the view.
//! It is driven by one queue of [`SessionEvent`]s and handles them one at a
//! time, so no state is ever touched concurrently.
//!
//! ## Lifecycle
//! 1. `connect()` opens a channel for the current `is_audio` flag.
//! 2. On open the send affordance is enabled. Submitted lines are accepted
//!    from the first open on; commands such as `/audio` work before that.
//! 3. On close (any code) the send affordance is disabled, both turn roles are
//!    closed and exactly one reconnect is scheduled.
//! 4. Switching to audio mode closes the channel normally; the resulting close
//!    drives the reconnect with the new flag.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::audio::{AudioBridge, PlaybackSink};
use crate::config::ClientConfig;
use crate::connection::{endpoint_url, generate_session_id, Channel, ChannelEvent, ChannelId, Connector};
use crate::encoder;
use crate::error::Result;
use crate::protocol::decode_frame;
use crate::reconnect::ReconnectTimer;
use crate::router;
use crate::status::NORMAL_CLOSURE;
use crate::transcript::NoticeKind;
use crate::turn::CloseReason;
use crate::view::ChatView;

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// Everything that can happen to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A lifecycle event from channel `ChannelId`.
    Channel(ChannelId, ChannelEvent),
    /// The automatic reconnect delay elapsed.
    ReconnectDue,
    /// The user submitted a line of text.
    Submit(String),
    /// The user asked to switch to audio mode.
    EnableAudio,
    /// One buffer of recorded PCM.
    Microphone(Vec<u8>),
    Shutdown,
}

/// What the driver should do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// First successful open: submitted lines are accepted from now on.
    AttachInput,
    Exit,
}

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

pub struct Session<C: Connector> {
    connector: C,
    server: String,
    session_id: String,
    is_audio: bool,
    reconnect_delay: Duration,
    channel: Option<C::Channel>,
    channel_id: ChannelId,
    input_attached: bool,
    reconnect: ReconnectTimer,
    audio: Box<dyn AudioBridge>,
    playback: Option<Box<dyn PlaybackSink>>,
    view: ChatView,
    events: EventSender,
}

impl<C: Connector> Session<C> {
    pub fn new(
        connector: C,
        config: &ClientConfig,
        audio: Box<dyn AudioBridge>,
        events: EventSender,
    ) -> Self {
        Self {
            connector,
            server: config.server.clone(),
            session_id: generate_session_id(),
            is_audio: false,
            reconnect_delay: config.reconnect_delay(),
            channel: None,
            channel_id: ChannelId::default(),
            input_attached: false,
            reconnect: ReconnectTimer::new(),
            audio,
            playback: None,
            view: ChatView::new(),
            events,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_audio(&self) -> bool {
        self.is_audio
    }

    /// Generation of the current (or most recent) channel.
    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn is_connected(&self) -> bool {
        self.channel.as_ref().is_some_and(|c| c.is_open())
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect.is_pending()
    }

    pub fn view(&self) -> &ChatView {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut ChatView {
        &mut self.view
    }

    pub fn endpoint(&self) -> Result<String> {
        endpoint_url(&self.server, &self.session_id, self.is_audio)
    }

    // -----------------------------------------------------------------------
    // Connection management
    // -----------------------------------------------------------------------

    /// First connection. With `audio` the bridge is started first; if that
    /// fails the session connects in text mode.
    pub fn start(&mut self, audio: bool) -> Result<()> {
        if audio {
            self.enable_audio();
        }
        if self.channel.is_none() {
            self.connect()?;
        }
        Ok(())
    }

    /// Open a new channel with the current audio flag. Cancels any pending
    /// automatic reconnect and abandons the previous channel.
    pub fn connect(&mut self) -> Result<()> {
        if self.reconnect.cancel() {
            tracing::debug!("manual connect cancelled pending reconnect");
        }
        let url = self.endpoint()?;
        if let Some(old) = self.channel.take() {
            old.close(NORMAL_CLOSURE, "Reconnecting");
        }
        self.view.status.connecting();
        self.channel_id = self.channel_id.next();
        tracing::info!(channel = %self.channel_id, %url, is_audio = self.is_audio, "connecting");
        self.channel = Some(self.connector.connect(self.channel_id, &url, self.events.clone()));
        Ok(())
    }

    /// Handle one event.
    pub fn handle(&mut self, event: SessionEvent) -> Step {
        match event {
            SessionEvent::Channel(id, event) => {
                if id != self.channel_id {
                    tracing::debug!(channel = %id, ?event, "ignoring event from stale channel");
                    return Step::Continue;
                }
                self.on_channel_event(event)
            }
            SessionEvent::ReconnectDue => {
                self.reconnect.fired();
                self.connect_or_log();
                Step::Continue
            }
            SessionEvent::Submit(line) => {
                if !self.input_attached {
                    tracing::debug!("not connected yet, dropping submitted line");
                    return Step::Continue;
                }
                self.view.input = line;
                if let Err(e) = encoder::submit_text(&mut self.view, self.channel.as_ref()) {
                    tracing::warn!(error = %e, "failed to send text");
                }
                Step::Continue
            }
            SessionEvent::EnableAudio => {
                self.enable_audio();
                Step::Continue
            }
            SessionEvent::Microphone(pcm) => {
                if let Err(e) = encoder::send_audio(&pcm, self.is_audio, self.channel.as_ref()) {
                    tracing::warn!(error = %e, "failed to send audio");
                }
                Step::Continue
            }
            SessionEvent::Shutdown => {
                self.shutdown();
                Step::Exit
            }
        }
    }

    fn on_channel_event(&mut self, event: ChannelEvent) -> Step {
        match event {
            ChannelEvent::Opened => {
                tracing::info!(channel = %self.channel_id, "connection opened");
                self.view.status.connected();
                self.view.controls.send_enabled = true;
                if !self.input_attached {
                    self.input_attached = true;
                    return Step::AttachInput;
                }
            }
            ChannelEvent::Message(text) => self.on_message(&text),
            ChannelEvent::Error(detail) => {
                tracing::error!(channel = %self.channel_id, %detail, "websocket error");
                self.view.status.error();
            }
            ChannelEvent::Closed { code, reason } => {
                tracing::info!(channel = %self.channel_id, code, %reason, "connection closed");
                self.view.status.disconnected(code);
                self.view.controls.send_enabled = false;
                self.view.turns.reset(CloseReason::Disconnect);
                self.channel = None;
                self.reconnect.schedule(self.reconnect_delay, self.events.clone());
            }
        }
        Step::Continue
    }

    fn on_message(&mut self, text: &str) {
        let frame = match decode_frame(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "dropping inbound frame");
                return;
            }
        };
        if let Err(e) = router::route(frame, &mut self.view, &mut self.playback) {
            tracing::warn!(error = %e, "failed to apply inbound frame");
        }
    }

    fn connect_or_log(&mut self) {
        if let Err(e) = self.connect() {
            tracing::error!(error = %e, "cannot connect");
            self.view.status.error();
        }
    }

    // -----------------------------------------------------------------------
    // Audio mode
    // -----------------------------------------------------------------------

    /// Start the audio bridge and switch the connection to audio mode.
    ///
    /// A setup failure is reported inline and leaves the affordance enabled
    /// so the user can retry; the session stays in text mode.
    pub fn enable_audio(&mut self) {
        if !self.view.controls.audio_enabled {
            tracing::debug!("audio already enabled");
            return;
        }
        self.view.controls.audio_enabled = false;

        match self.audio.start(self.events.clone()) {
            Ok(sink) => {
                self.playback = Some(sink);
                self.view
                    .transcript
                    .push_notice("Audio setup complete. Ready for voice.", NoticeKind::Info);
                self.view.transcript.scroll_to_bottom();
            }
            Err(e) => {
                tracing::error!(error = %e, "audio setup failed");
                self.view
                    .transcript
                    .push_notice(format!("Audio setup failed: {e}."), NoticeKind::Error);
                self.view.transcript.scroll_to_bottom();
                self.view.controls.audio_enabled = true;
                return;
            }
        }

        self.is_audio = true;
        match self.channel.as_ref() {
            Some(ch) if ch.is_open() => ch.close(NORMAL_CLOSURE, "Switching to audio mode"),
            _ => self.connect_or_log(),
        }
    }

    /// Cancel any pending reconnect and close the channel.
    pub fn shutdown(&mut self) {
        self.reconnect.cancel();
        if let Some(ch) = self.channel.as_ref() {
            ch.close(NORMAL_CLOSURE, "Client shutdown");
        }
        tracing::info!(session = %self.session_id, "session shut down");
    }
}
