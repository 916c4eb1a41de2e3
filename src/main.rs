//! Console consumer: renders session events, toggles recording from stdin
//! and auto-copies final transcripts to the clipboard.

use tokio::io::{AsyncBufReadExt, BufReader};

use livescribe::{ClientConfig, Command, ConnectionPhase, DictationSession, SessionEvent};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let (host, secure) = parse_args(std::env::args());
    let config = ClientConfig::new(host, secure);
    log::info!("Connecting to {}", config.ws_url());

    let (session, handle, mut events) = DictationSession::connect(config);

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            render(event);
        }
    });
    tokio::spawn(session.run());

    println!("Press Enter to start/stop recording, 'q' + Enter to quit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match line.trim() {
            "q" | "quit" => break,
            _ => {
                if handle.send(Command::Toggle).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// `livescribe [host[:port]] [--secure]`, in either order. Flag-shaped
/// arguments never stand in for the host positional.
fn parse_args<I: IntoIterator<Item = String>>(args: I) -> (String, bool) {
    let mut host = None;
    let mut secure = false;
    for arg in args.into_iter().skip(1) {
        if arg == "--secure" {
            secure = true;
        } else if !arg.starts_with("--") && host.is_none() {
            host = Some(arg);
        }
    }
    (host.unwrap_or_else(|| "localhost:8000".to_string()), secure)
}

fn render(event: SessionEvent) {
    match event {
        SessionEvent::PhaseChanged(phase) => println!("-- {}", phase_label(phase)),
        SessionEvent::TranscriptUpdated(text) => println!("{}", text),
        SessionEvent::TranscriptFinal(text) => {
            if !text.is_empty() {
                copy_to_clipboard(&text);
            }
        }
        SessionEvent::RecordingStarted => println!("-- recording"),
        SessionEvent::RecordingStopped { elapsed } => {
            println!("-- stopped after {:.1}s", elapsed.as_secs_f32())
        }
        SessionEvent::ServerError(message) => eprintln!("backend error: {}", message),
        SessionEvent::CaptureError(message) => eprintln!("microphone error: {}", message),
    }
}

fn phase_label(phase: ConnectionPhase) -> &'static str {
    match phase {
        ConnectionPhase::Disconnected => "disconnected",
        ConnectionPhase::Connecting => "connecting",
        ConnectionPhase::Idle => "idle",
        ConnectionPhase::Connected => "processing",
    }
}

fn copy_to_clipboard(text: &str) {
    match arboard::Clipboard::new() {
        Ok(mut clipboard) => match clipboard.set_text(text.to_string()) {
            Ok(()) => log::info!("Clipboard: copied final transcript ({} chars)", text.len()),
            Err(e) => log::warn!("Clipboard: copy failed: {}", e),
        },
        Err(e) => log::warn!("Clipboard: unavailable: {}", e),
    }
}
