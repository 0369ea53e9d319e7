//! The channel abstraction the session talks to, and its WebSocket
//! implementation.
//!
//! The session never touches a socket directly. It asks a [`Connector`] for a
//! [`Channel`], writes through it, and learns about open/message/close/error
//! through [`ChannelEvent`]s posted to its event queue. Tests substitute an
//! in-memory connector.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::error::{ClientError, Result};
use crate::session::{EventSender, SessionEvent};

/// Close code reported when the connection drops without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;
const NO_STATUS_RECEIVED: u16 = 1005;

// ---------------------------------------------------------------------------
// Channel interface
// ---------------------------------------------------------------------------

/// Generation number of a channel. Events from superseded channels are
/// ignored by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ChannelId(pub u64);

impl ChannelId {
    pub fn next(self) -> Self {
        ChannelId(self.0 + 1)
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ReadyState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }
}

/// Lifecycle notifications from a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Opened,
    Message(String),
    Error(String),
    Closed { code: u16, reason: String },
}

/// One bidirectional text channel.
pub trait Channel {
    fn ready_state(&self) -> ReadyState;

    /// Queue one text frame. Fails if the channel is not open.
    fn send(&self, text: String) -> Result<()>;

    /// Start a close handshake with the given code and reason.
    fn close(&self, code: u16, reason: &str);

    fn is_open(&self) -> bool {
        self.ready_state() == ReadyState::Open
    }
}

/// Opens channels. Each call produces a new, independent channel whose events
/// are tagged with `id` and posted to `events`.
pub trait Connector {
    type Channel: Channel;

    fn connect(&mut self, id: ChannelId, url: &str, events: EventSender) -> Self::Channel;
}

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// Generate a random lowercase base-36 session token.
pub fn generate_session_id() -> String {
    use rand::Rng;
    const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..11)
        .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
        .collect()
}

/// Build `<ws|wss>://host/ws/<session_id>?is_audio=<bool>` from a server base
/// URL. `http` maps to `ws` and `https` to `wss`.
pub fn endpoint_url(server: &str, session_id: &str, is_audio: bool) -> Result<String> {
    let server = server.trim().trim_end_matches('/');
    let (scheme, rest) = server
        .split_once("://")
        .ok_or_else(|| ClientError::Config(format!("server URL '{server}' has no scheme")))?;
    let ws_scheme = match scheme.to_ascii_lowercase().as_str() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ClientError::Config(format!(
                "unsupported scheme '{other}' in server URL"
            )))
        }
    };
    if rest.is_empty() {
        return Err(ClientError::Config(format!("server URL '{server}' has no host")));
    }
    Ok(format!("{ws_scheme}://{rest}/ws/{session_id}?is_audio={is_audio}"))
}

// ---------------------------------------------------------------------------
// WebSocket implementation
// ---------------------------------------------------------------------------

/// Connector backed by tokio-tungstenite. Must be used inside a tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

pub struct WsChannel {
    id: ChannelId,
    state: Arc<AtomicU8>,
    outbound: mpsc::UnboundedSender<WsMessage>,
}

impl Channel for WsChannel {
    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn send(&self, text: String) -> Result<()> {
        if !self.is_open() {
            return Err(ClientError::ChannelClosed);
        }
        self.outbound
            .send(WsMessage::Text(text))
            .map_err(|_| ClientError::ChannelClosed)
    }

    fn close(&self, code: u16, reason: &str) {
        if matches!(self.ready_state(), ReadyState::Closing | ReadyState::Closed) {
            return;
        }
        tracing::debug!(channel = %self.id, code, reason, "closing channel");
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        if self.outbound.send(WsMessage::Close(Some(frame))).is_ok() {
            self.state.store(ReadyState::Closing as u8, Ordering::SeqCst);
        }
    }
}

impl Connector for WsConnector {
    type Channel = WsChannel;

    fn connect(&mut self, id: ChannelId, url: &str, events: EventSender) -> WsChannel {
        let state = Arc::new(AtomicU8::new(ReadyState::Connecting as u8));
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_ws_channel(
            id,
            url.to_string(),
            Arc::clone(&state),
            outbound_rx,
            events,
        ));
        WsChannel {
            id,
            state,
            outbound,
        }
    }
}

async fn run_ws_channel(
    id: ChannelId,
    url: String,
    state: Arc<AtomicU8>,
    mut outbound_rx: mpsc::UnboundedReceiver<WsMessage>,
    events: EventSender,
) {
    let emit = |event: ChannelEvent| {
        let _ = events.send(SessionEvent::Channel(id, event));
    };

    let ws_stream = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            let err = ClientError::Connect {
                url: url.clone(),
                detail: e.to_string(),
            };
            state.store(ReadyState::Closed as u8, Ordering::SeqCst);
            emit(ChannelEvent::Error(err.to_string()));
            emit(ChannelEvent::Closed {
                code: ABNORMAL_CLOSURE,
                reason: String::new(),
            });
            return;
        }
    };

    state.store(ReadyState::Open as u8, Ordering::SeqCst);
    tracing::info!(channel = %id, %url, "websocket connected");
    emit(ChannelEvent::Opened);

    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    // Multiplex inbound frames and queued outbound writes until either side
    // closes.
    let (code, reason) = loop {
        tokio::select! {
            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => emit(ChannelEvent::Message(text)),
                    Some(Ok(WsMessage::Close(frame))) => {
                        break frame
                            .map(|f| (u16::from(f.code), f.reason.into_owned()))
                            .unwrap_or((NO_STATUS_RECEIVED, String::new()));
                    }
                    Some(Ok(WsMessage::Binary(bytes))) => {
                        tracing::debug!(channel = %id, len = bytes.len(), "ignoring binary frame");
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        emit(ChannelEvent::Error(ClientError::Transport(e.to_string()).to_string()));
                        break (ABNORMAL_CLOSURE, String::new());
                    }
                    None => break (ABNORMAL_CLOSURE, String::new()),
                }
            }
            out = outbound_rx.recv() => {
                match out {
                    Some(msg) => {
                        if let Err(e) = ws_sink.send(msg).await {
                            emit(ChannelEvent::Error(ClientError::Transport(e.to_string()).to_string()));
                            break (ABNORMAL_CLOSURE, String::new());
                        }
                    }
                    // Every handle dropped: close quietly.
                    None => {
                        let _ = ws_sink.close().await;
                        break (crate::status::NORMAL_CLOSURE, String::new());
                    }
                }
            }
        }
    };

    state.store(ReadyState::Closed as u8, Ordering::SeqCst);
    tracing::info!(channel = %id, code, %reason, "websocket closed");
    emit(ChannelEvent::Closed { code, reason });
}
