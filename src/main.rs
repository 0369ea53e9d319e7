use std::io::{self, IsTerminal};
use std::time::Duration;

use clap::{CommandFactory, Parser};
use colored::*;
use tokio::io::BufReader;

use live_chat_client::cli::{spawn_input_reader, Args};
use live_chat_client::connection::{ChannelEvent, WsConnector};
use live_chat_client::render::TerminalRenderer;
use live_chat_client::session::{self, EventReceiver};
use live_chat_client::{ClientConfig, Session, SessionEvent, Step};

/// How long to wait for the close handshake on exit.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(shell) = args.completions {
        clap_complete::generate(shell, &mut Args::command(), "live-chat", &mut io::stdout());
        return Ok(());
    }

    let config = ClientConfig::from_args(&args)?;
    live_chat_client::init_tracing(&config.log_filter);

    let ansi = !config.plain && io::stdout().is_terminal();
    if !ansi {
        colored::control::set_override(false);
    }

    let (events_tx, mut events_rx) = session::event_channel();
    let mut session = Session::new(
        WsConnector,
        &config,
        config.audio_bridge(),
        events_tx.clone(),
    );
    let mut renderer = TerminalRenderer::new(io::stdout(), ansi);

    print_header(&config, session.session_id());
    session.start(config.audio)?;
    renderer.render(session.view_mut())?;

    spawn_input_reader(BufReader::new(tokio::io::stdin()), events_tx.clone());

    let ctrl_c_tx = events_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = ctrl_c_tx.send(SessionEvent::Shutdown);
        }
    });

    while let Some(event) = events_rx.recv().await {
        let step = session.handle(event);
        renderer.render(session.view_mut())?;
        match step {
            Step::Continue => {}
            Step::AttachInput => tracing::debug!("message input attached"),
            Step::Exit => break,
        }
    }

    wait_for_close(&mut events_rx).await;
    Ok(())
}

fn print_header(config: &ClientConfig, session_id: &str) {
    println!("{}", "Live Chat".bright_cyan().bold());
    println!(
        "{} {}  {} {}",
        "server:".dimmed(),
        config.server,
        "session:".dimmed(),
        session_id
    );
    println!(
        "{}",
        "Type a message and press Enter. /audio enables voice, /quit exits.".dimmed()
    );
    println!();
}

async fn wait_for_close(events: &mut EventReceiver) {
    let closed = async {
        while let Some(event) = events.recv().await {
            if matches!(event, SessionEvent::Channel(_, ChannelEvent::Closed { .. })) {
                break;
            }
        }
    };
    let _ = tokio::time::timeout(SHUTDOWN_GRACE, closed).await;
}
