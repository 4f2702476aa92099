//! Interactive terminal chat against a running backend.
//!
//! Usage:
//!   cargo run -p streamchat-client --example chat_cli -- --email ada@example.com --password secret
//!   cargo run -p streamchat-client --example chat_cli -- --token <jwt> --no-stream
//!
//! Endpoints default to `ClientConfig::from_env()`; `--api` and `--socket`
//! override them. Lines typed on stdin go to the active room. Commands:
//! `/rooms`, `/new [title]`, `/join <id>`, `/reconnect`, `/quit`.

use clap::Parser;
use std::{error::Error, io::BufRead, io::Write};
use streamchat_client::{ChatSession, ClientConfig, ConnectionState};
use streamchat_protocol::{EventKind, RoomId, SenderKind, ServerEvent};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "chat_cli", about = "Terminal client for the streamchat realtime channel")]
struct Args {
    #[arg(long, value_name = "URL", help = "REST base URL, e.g. http://127.0.0.1:8000/api")]
    api: Option<String>,

    #[arg(long, value_name = "URL", help = "WebSocket URL, e.g. ws://127.0.0.1:8000/ws")]
    socket: Option<String>,

    #[arg(long, requires = "password", conflicts_with = "token")]
    email: Option<String>,

    #[arg(long)]
    password: Option<String>,

    #[arg(long, help = "Resume with a previously issued access token")]
    token: Option<String>,

    #[arg(long, help = "Ask for complete replies instead of streamed ones")]
    no_stream: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let mut config = ClientConfig::from_env();
    if let Some(api) = args.api {
        config.api_base_url = api.trim_end_matches('/').to_string();
    }
    if let Some(socket) = args.socket {
        config.socket_url = socket;
    }

    let mut session = ChatSession::from_config(&config)?;
    let user = match (args.email, args.password, args.token) {
        (Some(email), Some(password), _) => session.login(&email, &password).await?,
        (_, _, Some(token)) => session.resume(token).await?,
        _ => {
            eprintln!("either --email/--password or --token is required");
            std::process::exit(2);
        }
    };
    info!(user=%user.id, "signed in");
    println!("signed in as {}", user.email);

    session.subscribe(EventKind::StreamChunk, |event| {
        if let ServerEvent::StreamChunk { chunk, .. } = event {
            print!("{chunk}");
            let _ = std::io::stdout().flush();
        }
    });
    session.subscribe(EventKind::StreamEnd, |_| println!());
    session.subscribe(EventKind::MessageSaved, |event| {
        if let ServerEvent::MessageSaved(message) = event {
            if message.sender == SenderKind::Assistant {
                println!("{}", message.content);
            }
        }
    });
    session.subscribe(EventKind::Error, |event| {
        if let ServerEvent::Error { message } = event {
            eprintln!("server error: {message}");
        }
    });

    session.refresh_rooms().await?;
    match session.active_room() {
        Some(room) => println!("active room: {room}"),
        None => println!("no rooms yet; type /new to create one"),
    }

    // stdin is blocking; read it on its own thread.
    let (line_tx, mut lines) = mpsc::unbounded_channel::<String>();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines().map_while(Result::ok) {
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    loop {
        // `next_event` only awaits the queue, so dropping it mid-wait loses nothing.
        let step = tokio::select! {
            line = lines.recv() => Step::Line(line),
            alive = session.next_event() => Step::Event(alive),
        };
        match step {
            Step::Line(Some(line)) => {
                if !run_line(&mut session, line.trim(), !args.no_stream).await {
                    break;
                }
            }
            Step::Line(None) | Step::Event(false) => break,
            Step::Event(true) => {}
        }
    }
    session.logout();
    Ok(())
}

enum Step {
    Line(Option<String>),
    Event(bool),
}

/// Returns false when the user asked to quit.
async fn run_line(session: &mut ChatSession, line: &str, stream: bool) -> bool {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let result = match command {
        "/quit" => return false,
        "/rooms" => {
            for room in session.rooms() {
                let marker = if session.active_room() == Some(&room.id) { '*' } else { ' ' };
                println!("{marker} {} {}", room.id, room.title);
            }
            Ok(())
        }
        "/new" => {
            let title = Some(rest.trim()).filter(|t| !t.is_empty());
            session.create_room(title).await.map(|room| println!("created {} ({})", room.id, room.title))
        }
        "/join" => session.select_room(RoomId::from(rest.trim())).await.map(|()| {
            for message in session.messages() {
                println!("[{:?}] {}", message.sender, message.content);
            }
        }),
        "/reconnect" => session.reconnect(),
        _ => match session.send_message(line, stream) {
            Ok(true) => Ok(()),
            Ok(false) if session.connection_state() != ConnectionState::Connected => {
                println!("not connected; try /reconnect");
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(e) => Err(e),
        },
    };
    if let Err(e) = result {
        warn!(%e, "command failed");
        eprintln!("error: {e}");
    }
    true
}
