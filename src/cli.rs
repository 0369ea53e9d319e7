use std::path::PathBuf;

use clap::Parser;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;

use crate::session::{EventSender, SessionEvent};

#[derive(Parser, Debug)]
#[command(name = "live-chat")]
#[command(version)]
#[command(about = "Live text and voice chat with a streaming conversational agent")]
pub struct Args {
    /// Agent server base URL (http, https, ws or wss)
    #[arg(long, short)]
    pub server: Option<String>,

    /// Switch to audio mode right after startup
    #[arg(long)]
    pub audio: bool,

    /// Delay before reconnecting after the connection closes
    #[arg(long)]
    pub reconnect_delay_ms: Option<u64>,

    /// Raw PCM file streamed as microphone input in audio mode
    #[arg(long)]
    pub pcm_in: Option<PathBuf>,

    /// Raw PCM file that agent audio is written to
    #[arg(long)]
    pub pcm_out: Option<PathBuf>,

    /// Bytes per microphone chunk
    #[arg(long)]
    pub chunk_bytes: Option<usize>,

    /// Milliseconds between microphone chunks
    #[arg(long)]
    pub chunk_interval_ms: Option<u64>,

    /// TOML config file; command-line flags take precedence
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// tracing filter directive, e.g. `live_chat_client=debug`
    #[arg(long)]
    pub log_filter: Option<String>,

    /// Disable colours and in-place redraws
    #[arg(long)]
    pub plain: bool,

    /// Print shell completions and exit
    #[arg(long, value_enum)]
    pub completions: Option<clap_complete::Shell>,
}

/// Turn one line typed at the prompt into a session event.
///
/// `/audio` switches to audio mode and `/quit` (or `/exit`) ends the session;
/// anything else is submitted as a message.
pub fn parse_input(line: &str) -> SessionEvent {
    match line.trim() {
        "/audio" => SessionEvent::EnableAudio,
        "/quit" | "/exit" => SessionEvent::Shutdown,
        _ => SessionEvent::Submit(line.to_string()),
    }
}

/// Forward lines typed on `input` to the session until `/quit` or end of
/// input. End of input also ends the session.
pub fn spawn_input_reader<R>(input: R, events: EventSender) -> JoinHandle<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = LinesStream::new(input.lines());
        while let Some(line) = lines.next().await {
            let event = match line {
                Ok(line) => parse_input(&line),
                Err(e) => {
                    tracing::error!(error = %e, "input read failed");
                    break;
                }
            };
            let quit = event == SessionEvent::Shutdown;
            if events.send(event).is_err() || quit {
                return;
            }
        }
        let _ = events.send(SessionEvent::Shutdown);
    })
}
