//! Live chat client for a streaming conversational agent.
//!
//! Text and audio travel over one WebSocket as tagged JSON payloads. Inbound
//! payloads are routed onto a transcript view, user input and microphone audio
//! are encoded back onto the same connection, and the connection is reopened
//! automatically whenever it closes.

pub mod audio;
pub mod cli;
pub mod config;
pub mod connection;
pub mod encoder;
pub mod error;
pub mod protocol;
pub mod reconnect;
pub mod render;
pub mod router;
pub mod session;
pub mod status;
pub mod transcript;
pub mod turn;
pub mod view;

pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use protocol::{decode_frame, InboundFrame, MimeType, OutboundFrame, Payload};
pub use session::{Session, SessionEvent, Step};

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber, writing to stderr.
///
/// `RUST_LOG` takes precedence over `default_filter`. Calling this twice is
/// harmless; the second call is ignored.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new(config::DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
