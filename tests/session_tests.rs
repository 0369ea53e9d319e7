//! Tests for the session: connection lifecycle, reconnect scheduling, inbound
//! routing, outbound encoding and the audio mode switch, all driven through an
//! in-memory connector.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use live_chat_client::audio::{AudioBridge, DiscardPlayback, PlaybackSink};
use live_chat_client::cli::parse_input;
use live_chat_client::connection::{Channel, ChannelEvent, ChannelId, Connector, ReadyState};
use live_chat_client::session::{event_channel, EventReceiver, EventSender};
use live_chat_client::status::StatusClass;
use live_chat_client::transcript::{Content, NoticeKind};
use live_chat_client::turn::Role;
use live_chat_client::{ClientConfig, ClientError, Result, Session, SessionEvent, Step};

// ---------------------------------------------------------------------------
// In-memory connector
// ---------------------------------------------------------------------------

#[derive(Default)]
struct WireLog {
    urls: Vec<String>,
    sent: Vec<String>,
    closes: Vec<(u16, String)>,
}

#[derive(Clone)]
struct MockConnector {
    log: Rc<RefCell<WireLog>>,
    state: Rc<Cell<ReadyState>>,
}

impl MockConnector {
    fn new() -> Self {
        Self {
            log: Rc::new(RefCell::new(WireLog::default())),
            state: Rc::new(Cell::new(ReadyState::Closed)),
        }
    }

    fn urls(&self) -> Vec<String> {
        self.log.borrow().urls.clone()
    }

    fn sent(&self) -> Vec<String> {
        self.log.borrow().sent.clone()
    }

    fn closes(&self) -> Vec<(u16, String)> {
        self.log.borrow().closes.clone()
    }
}

struct MockChannel {
    log: Rc<RefCell<WireLog>>,
    state: Rc<Cell<ReadyState>>,
}

impl Channel for MockChannel {
    fn ready_state(&self) -> ReadyState {
        self.state.get()
    }

    fn send(&self, text: String) -> Result<()> {
        if !self.is_open() {
            return Err(ClientError::ChannelClosed);
        }
        self.log.borrow_mut().sent.push(text);
        Ok(())
    }

    fn close(&self, code: u16, reason: &str) {
        self.log.borrow_mut().closes.push((code, reason.to_string()));
        self.state.set(ReadyState::Closing);
    }
}

impl Connector for MockConnector {
    type Channel = MockChannel;

    fn connect(&mut self, _id: ChannelId, url: &str, _events: EventSender) -> MockChannel {
        self.log.borrow_mut().urls.push(url.to_string());
        self.state.set(ReadyState::Connecting);
        MockChannel {
            log: Rc::clone(&self.log),
            state: Rc::clone(&self.state),
        }
    }
}

/// Thread-safe start counter; `AudioBridge` requires `Send`.
#[derive(Clone, Default)]
struct StartCount(Arc<AtomicU32>);

impl StartCount {
    fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }

    fn set(&self, value: u32) {
        self.0.store(value, Ordering::SeqCst);
    }
}

struct StubBridge {
    fail: bool,
    starts: StartCount,
}

impl AudioBridge for StubBridge {
    fn start(&mut self, _mic: EventSender) -> Result<Box<dyn PlaybackSink>> {
        self.starts.set(self.starts.get() + 1);
        if self.fail {
            Err(ClientError::Audio("microphone permission denied".to_string()))
        } else {
            Ok(Box::new(DiscardPlayback::new()))
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Harness {
    session: Session<MockConnector>,
    wire: MockConnector,
    rx: EventReceiver,
    audio_starts: StartCount,
}

fn harness_with_audio(fail_audio: bool) -> Harness {
    let (tx, rx) = event_channel();
    let wire = MockConnector::new();
    let audio_starts = StartCount::default();
    let bridge = StubBridge {
        fail: fail_audio,
        starts: audio_starts.clone(),
    };
    let session = Session::new(wire.clone(), &ClientConfig::default(), Box::new(bridge), tx);
    Harness {
        session,
        wire,
        rx,
        audio_starts,
    }
}

fn harness() -> Harness {
    harness_with_audio(false)
}

impl Harness {
    fn channel_event(&mut self, event: ChannelEvent) -> Step {
        let id = self.session.channel_id();
        self.session.handle(SessionEvent::Channel(id, event))
    }

    fn open(&mut self) -> Step {
        self.wire.state.set(ReadyState::Open);
        self.channel_event(ChannelEvent::Opened)
    }

    fn close(&mut self, code: u16) -> Step {
        self.wire.state.set(ReadyState::Closed);
        self.channel_event(ChannelEvent::Closed {
            code,
            reason: String::new(),
        })
    }

    fn recv(&mut self, json: &str) {
        self.channel_event(ChannelEvent::Message(json.to_string()));
    }

    fn connected(&mut self) {
        tokio_test::assert_ok!(self.session.connect());
        self.open();
    }

    /// Collect every event posted within `window` of (paused) time.
    async fn drain_for(&mut self, window: Duration) -> Vec<SessionEvent> {
        tokio::time::sleep(window).await;
        let mut out = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            out.push(event);
        }
        out
    }
}

fn reconnects(events: &[SessionEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, SessionEvent::ReconnectDue))
        .count()
}

// ---------------------------------------------------------------------------
// Connection lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_connect_uses_session_id_and_audio_flag() {
    let mut h = harness();
    h.session.connect().unwrap();
    let expected = format!(
        "ws://localhost:8000/ws/{}?is_audio=false",
        h.session.session_id()
    );
    assert_eq!(h.wire.urls(), vec![expected]);
    assert_eq!(h.session.view().status.class(), StatusClass::Connecting);
}

#[tokio::test]
async fn test_open_enables_send_and_attaches_input_once() {
    let mut h = harness();
    h.session.connect().unwrap();
    assert_eq!(h.open(), Step::AttachInput);
    assert!(h.session.view().controls.send_enabled);
    assert_eq!(h.session.view().status.text(), "Connection status: Connected");

    h.close(1006);
    h.session.connect().unwrap();
    assert_eq!(h.open(), Step::Continue);
    h.close(1000);
    h.session.connect().unwrap();
    assert_eq!(h.open(), Step::Continue);
}

#[tokio::test(start_paused = true)]
async fn test_close_resets_state_and_schedules_one_reconnect() {
    let mut h = harness();
    h.connected();
    h.recv(r#"{"mime_type":"text/transcription","data":"partial"}"#);
    assert!(h.session.view().turns.is_open(Role::Agent));

    h.close(1006);
    let view = h.session.view();
    assert!(!view.controls.send_enabled);
    assert!(!view.turns.is_open(Role::Agent));
    assert!(!view.turns.is_open(Role::User));
    assert_eq!(view.status.class(), StatusClass::Error);
    assert!(h.session.reconnect_pending());

    let early = h.drain_for(Duration::from_millis(2900)).await;
    assert_eq!(reconnects(&early), 0);
    let late = h.drain_for(Duration::from_secs(30)).await;
    assert_eq!(reconnects(&late), 1);
}

#[tokio::test(start_paused = true)]
async fn test_normal_close_still_reconnects() {
    let mut h = harness();
    h.connected();
    h.close(1000);
    assert_eq!(h.session.view().status.class(), StatusClass::Disconnected);
    let events = h.drain_for(Duration::from_secs(4)).await;
    assert_eq!(reconnects(&events), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_due_opens_same_endpoint() {
    let mut h = harness();
    h.connected();
    h.close(1006);
    let events = h.drain_for(Duration::from_secs(4)).await;
    for event in events {
        h.session.handle(event);
    }
    let urls = h.wire.urls();
    assert_eq!(urls.len(), 2);
    assert_eq!(urls[0], urls[1]);
    assert!(!h.session.reconnect_pending());
}

#[tokio::test(start_paused = true)]
async fn test_manual_connect_cancels_pending_reconnect() {
    let mut h = harness();
    h.connected();
    h.close(1006);
    assert!(h.session.reconnect_pending());

    h.session.connect().unwrap();
    assert!(!h.session.reconnect_pending());
    let events = h.drain_for(Duration::from_secs(10)).await;
    assert_eq!(reconnects(&events), 0);
}

#[tokio::test]
async fn test_transport_error_only_flips_status() {
    let mut h = harness();
    h.connected();
    h.channel_event(ChannelEvent::Error("reset by peer".into()));
    assert_eq!(h.session.view().status.class(), StatusClass::Error);
    assert!(h.session.view().controls.send_enabled);
    assert!(!h.session.reconnect_pending());
}

#[tokio::test]
async fn test_stale_channel_events_ignored() {
    let mut h = harness();
    h.connected();
    let old = h.session.channel_id();
    h.session.connect().unwrap();
    h.session.handle(SessionEvent::Channel(
        old,
        ChannelEvent::Closed {
            code: 1006,
            reason: String::new(),
        },
    ));
    assert!(!h.session.reconnect_pending());
    assert_eq!(h.session.view().status.class(), StatusClass::Connecting);
}

#[tokio::test]
async fn test_shutdown_closes_channel_and_exits() {
    let mut h = harness();
    h.connected();
    assert_eq!(h.session.handle(SessionEvent::Shutdown), Step::Exit);
    assert_eq!(h.wire.closes(), vec![(1000, "Client shutdown".to_string())]);
}

// ---------------------------------------------------------------------------
// Inbound routing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_malformed_frames_are_dropped() {
    let mut h = harness();
    h.connected();
    h.recv("{broken");
    h.recv(r#"{"mime_type":"video/mp4","data":"x"}"#);
    h.recv(r#"{"mime_type":"text/plain","data":42}"#);
    assert!(h.session.view().transcript.is_empty());
    assert!(h.session.is_connected());
}

#[tokio::test]
async fn test_full_voice_turn() {
    let mut h = harness();
    h.connected();
    h.recv(r#"{"mime_type":"text/input_transcription","data":"book a"}"#);
    h.recv(r#"{"mime_type":"text/input_transcription","data":"book a flight"}"#);
    h.recv(r#"{"mime_type":"audio/pcm","data":"AAAA"}"#);
    h.recv(r#"{"mime_type":"text/transcription","data":"Sure, "}"#);
    h.recv(r#"{"mime_type":"text/transcription","data":"where to?"}"#);
    h.recv(r#"{"turn_complete":true,"interrupted":false}"#);

    let view = h.session.view();
    let bubbles: Vec<_> = view.transcript.bubbles().collect();
    assert_eq!(bubbles.len(), 2);
    assert_eq!(bubbles[0].role, Role::User);
    assert_eq!(bubbles[0].text, "book a flight");
    assert!(!bubbles[0].transient);
    assert_eq!(bubbles[1].role, Role::Agent);
    assert_eq!(bubbles[1].text, "Sure, where to?");
    assert!(!view.turns.is_open(Role::User));
    assert!(!view.turns.is_open(Role::Agent));
}

#[tokio::test]
async fn test_image_list_renders_gallery_in_order() {
    let mut h = harness();
    h.connected();
    h.recv(r#"{"mime_type":"text/transcription","data":"Here are some places"}"#);
    h.recv(r#"{"mime_type":"image/url_list","data":["a.png","b.png"]}"#);

    let view = h.session.view();
    assert!(!view.turns.is_open(Role::Agent));
    let galleries: Vec<_> = view
        .transcript
        .entries()
        .iter()
        .filter_map(|e| match &e.content {
            Content::Gallery(images) => Some(images),
            _ => None,
        })
        .collect();
    assert_eq!(galleries.len(), 1);
    let urls: Vec<_> = galleries[0].iter().map(|i| i.url.as_str()).collect();
    assert_eq!(urls, ["a.png", "b.png"]);
}

// ---------------------------------------------------------------------------
// Outbound encoding
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_submit_sends_exactly_one_frame() {
    let mut h = harness();
    h.connected();
    h.session.handle(SessionEvent::Submit("hello".into()));
    assert_eq!(h.wire.sent(), vec![r#"{"mime_type":"text/plain","data":"hello"}"#]);
    assert!(h.session.view().input.is_empty());
}

#[tokio::test]
async fn test_submit_replaces_user_transcript() {
    let mut h = harness();
    h.connected();
    h.recv(r#"{"mime_type":"text/input_transcription","data":"helo"}"#);
    h.session.handle(SessionEvent::Submit("hello".into()));
    let bubbles: Vec<_> = h.session.view().transcript.bubbles().collect();
    assert_eq!(bubbles.len(), 1);
    assert_eq!(bubbles[0].text, "hello");
    assert!(!bubbles[0].transient);
}

#[tokio::test]
async fn test_submit_while_disconnected_is_dropped() {
    let mut h = harness();
    h.session.connect().unwrap();
    h.session.handle(SessionEvent::Submit("hello".into()));
    assert!(h.wire.sent().is_empty());
    assert!(h.session.view().transcript.is_empty());
}

#[tokio::test]
async fn test_lines_before_first_open_are_not_submitted() {
    let mut h = harness();
    tokio_test::assert_ok!(h.session.start(false));
    h.session.handle(parse_input("too early"));
    assert!(h.session.view().input.is_empty());
    assert!(h.session.view().transcript.is_empty());

    h.open();
    h.session.handle(parse_input("hello"));
    assert_eq!(h.wire.sent(), vec![r#"{"mime_type":"text/plain","data":"hello"}"#]);
}

#[tokio::test]
async fn test_microphone_ignored_in_text_mode() {
    let mut h = harness();
    h.connected();
    h.session.handle(SessionEvent::Microphone(vec![1, 2, 3]));
    assert!(h.wire.sent().is_empty());
}

// ---------------------------------------------------------------------------
// Audio mode
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_enable_audio_switches_mode_via_close() {
    let mut h = harness();
    h.connected();
    h.session.handle(SessionEvent::EnableAudio);

    assert!(h.session.is_audio());
    assert_eq!(h.audio_starts.get(), 1);
    assert_eq!(h.wire.closes(), vec![(1000, "Switching to audio mode".to_string())]);
    assert!(!h.session.view().controls.audio_enabled);
    let notices: Vec<_> = h
        .session
        .view()
        .transcript
        .entries()
        .iter()
        .filter_map(|e| match &e.content {
            Content::Notice { text, kind } => Some((text.clone(), *kind)),
            _ => None,
        })
        .collect();
    assert_eq!(
        notices,
        vec![("Audio setup complete. Ready for voice.".to_string(), NoticeKind::Info)]
    );

    h.close(1000);
    let events = h.drain_for(Duration::from_secs(4)).await;
    for event in events {
        h.session.handle(event);
    }
    let urls = h.wire.urls();
    assert_eq!(urls.len(), 2);
    assert!(urls[1].ends_with("?is_audio=true"));

    h.open();
    h.session.handle(SessionEvent::Microphone(vec![0, 1, 2]));
    assert_eq!(h.wire.sent(), vec![r#"{"mime_type":"audio/pcm","data":"AAEC"}"#]);
}

#[tokio::test]
async fn test_enable_audio_when_disconnected_connects_directly() {
    let mut h = harness();
    h.session.handle(SessionEvent::EnableAudio);
    let urls = h.wire.urls();
    assert_eq!(urls.len(), 1);
    assert!(urls[0].ends_with("?is_audio=true"));
    assert!(h.wire.closes().is_empty());
}

#[tokio::test]
async fn test_audio_command_before_first_open_reconnects_in_audio_mode() {
    let mut h = harness();
    tokio_test::assert_ok!(h.session.start(false));
    assert_eq!(h.session.handle(parse_input("/audio")), Step::Continue);

    assert!(h.session.is_audio());
    let urls = h.wire.urls();
    assert_eq!(urls.len(), 2);
    assert!(urls[0].ends_with("?is_audio=false"));
    assert!(urls[1].ends_with("?is_audio=true"));
    assert_eq!(h.wire.closes(), vec![(1000, "Reconnecting".to_string())]);

    assert_eq!(h.session.handle(parse_input("/quit")), Step::Exit);
}

#[tokio::test]
async fn test_enable_audio_failure_allows_retry() {
    let mut h = harness_with_audio(true);
    h.connected();
    h.session.handle(SessionEvent::EnableAudio);

    assert!(!h.session.is_audio());
    assert!(h.session.view().controls.audio_enabled);
    assert!(h.wire.closes().is_empty());
    let last = h.session.view().transcript.entries().last().cloned().unwrap();
    assert_eq!(
        last.content,
        Content::Notice {
            text: "Audio setup failed: microphone permission denied.".to_string(),
            kind: NoticeKind::Error,
        }
    );

    h.session.handle(SessionEvent::EnableAudio);
    assert_eq!(h.audio_starts.get(), 2);
}

#[tokio::test]
async fn test_start_with_audio_connects_once() {
    let mut h = harness();
    tokio_test::assert_ok!(h.session.start(true));
    assert!(h.session.is_audio());
    assert_eq!(h.wire.urls().len(), 1);
}

#[tokio::test]
async fn test_start_with_failed_audio_connects_in_text_mode() {
    let mut h = harness_with_audio(true);
    tokio_test::assert_ok!(h.session.start(true));
    assert!(!h.session.is_audio());
    let urls = h.wire.urls();
    assert_eq!(urls.len(), 1);
    assert!(urls[0].ends_with("?is_audio=false"));
}
