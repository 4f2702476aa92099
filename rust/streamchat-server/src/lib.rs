//! Streamchat WebSocket Server
//!
//! Reference server for the realtime chat channel. It accepts JSON text
//! frames, answers text "ping" with text "pong", and replies to every
//! `send_message` with a mock assistant:
//! - the user message is echoed back as `message_saved`
//! - with `stream: true` the reply goes out word by word as
//!   `ai_stream_start`, `ai_stream_chunk`..., `ai_stream_end`
//! - otherwise the whole reply arrives as one `message_saved`
//!
//! Nothing is persisted. Message ids come from a per-server counter.
//!
//! Example (not run here because it binds a socket):
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! #   let rt = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
//! #   rt.block_on(async move {
//! streamchat_server::serve("127.0.0.1:8000").await?;
//! #   Ok(())
//! # })
//! # }
//! ```

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::frame::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};

pub use streamchat_protocol as protocol;
use protocol::{
    decode_directive, encode_event, ChatMessage, ClientDirective, CodecError, MessageId, RoomId,
    SenderKind, ServerEvent,
};
use tracing::{debug, error, info, warn};

type Sender = mpsc::UnboundedSender<Message>;
type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Arguments passed to the handshake auth hook.
pub struct HandshakeAuthArgs<'a> {
    /// Request path, e.g. `/ws`.
    pub path: &'a str,
    /// `token` query parameter if present.
    pub token: Option<&'a str>,
}

pub struct JoinArgs {
    pub conn_id: u64,
    pub room: RoomId,
}

pub struct CloseConnectionArgs {
    pub conn_id: u64,
    /// Rooms joined during the connection, in join order.
    pub rooms: Vec<RoomId>,
}

pub type HandshakeAuthFn = dyn for<'a> Fn(HandshakeAuthArgs<'a>) -> bool + Send + Sync;
pub type JoinFn = dyn Fn(JoinArgs) + Send + Sync;
pub type CloseConnectionFn = dyn Fn(CloseConnectionArgs) + Send + Sync;
/// Produces the assistant's reply text for a saved user message.
pub type ResponderFn = dyn Fn(&ChatMessage) -> String + Send + Sync;

#[derive(Clone)]
pub struct ServerConfig {
    /// Optional handshake auth: called during WS HTTP upgrade.
    ///
    /// Return true to accept, false to reject with 401.
    pub handshake_auth: Option<Arc<HandshakeAuthFn>>,
    /// Called after a connection joins a room.
    pub on_join: Option<Arc<JoinFn>>,
    /// Called once per connection after its socket closed.
    pub on_close_connection: Option<Arc<CloseConnectionFn>>,
    pub responder: Arc<ResponderFn>,
    /// Pause before each streamed chunk.
    pub chunk_delay_ms: u64,
    /// Pause before a non-streamed reply.
    pub reply_delay_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            handshake_auth: None,
            on_join: None,
            on_close_connection: None,
            responder: Arc::new(mock_reply),
            chunk_delay_ms: 100,
            reply_delay_ms: 1_000,
        }
    }
}

/// Canned reply quoting the user's message.
pub fn mock_reply(prompt: &ChatMessage) -> String {
    let said = &prompt.content;
    match prompt.content.chars().count() % 4 {
        0 => format!("I understand you said: '{said}'. How can I help you further?"),
        1 => format!("That's interesting! Regarding '{said}', let me think..."),
        2 => format!("Thanks for sharing that. Based on '{said}', here's my thought..."),
        _ => format!("I see you mentioned '{said}'. Let me provide some insight on that."),
    }
}

/// Split a reply into the chunks a streamed answer is sent as: one per word,
/// each but the last followed by a space.
pub fn stream_chunks(text: &str) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let last = words.len().saturating_sub(1);
    words
        .iter()
        .enumerate()
        .map(|(i, word)| if i < last { format!("{word} ") } else { (*word).to_string() })
        .collect()
}

struct Shared {
    config: ServerConfig,
    next_message_id: AtomicU64,
}

impl Shared {
    fn new(config: ServerConfig) -> Self { Self { config, next_message_id: AtomicU64::new(1) } }

    fn message(&self, room_id: RoomId, sender: SenderKind, content: String) -> ChatMessage {
        let id = self.next_message_id.fetch_add(1, Ordering::Relaxed);
        ChatMessage {
            id: MessageId::new(id.to_string()),
            room_id,
            sender,
            content,
            created_at: Utc::now(),
        }
    }
}

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Start a server with the default config on the given socket address.
pub async fn serve(addr: &str) -> Result<(), BoxError> {
    info!(%addr, "binding TCP listener");
    let listener = TcpListener::bind(addr).await?;
    serve_incoming_with_config(listener, ServerConfig::default()).await
}

/// Serve a pre-bound listener. Useful for tests to bind on port 0.
pub async fn serve_incoming(listener: TcpListener) -> Result<(), BoxError> {
    serve_incoming_with_config(listener, ServerConfig::default()).await
}

pub async fn serve_incoming_with_config(
    listener: TcpListener,
    config: ServerConfig,
) -> Result<(), BoxError> {
    let shared = Arc::new(Shared::new(config));

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!(remote=%peer, "accepted TCP connection");
                let shared = shared.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_conn(stream, shared).await {
                        warn!(%e, "connection task ended with error");
                    }
                });
            }
            Err(e) => {
                error!(%e, "accept failed; continuing");
                continue;
            }
        }
    }
}

fn query_param<'a>(query: Option<&'a str>, key: &str) -> Option<&'a str> {
    query?.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        (k == key).then_some(v)
    })
}

fn unauthorized() -> tungstenite::handshake::server::ErrorResponse {
    let mut response = tungstenite::http::Response::new(Some("Unauthorized".to_string()));
    *response.status_mut() = tungstenite::http::StatusCode::UNAUTHORIZED;
    response
}

fn send_event(tx: &Sender, event: &ServerEvent) -> bool {
    match encode_event(event) {
        Ok(text) => tx.send(Message::Text(text)).is_ok(),
        Err(e) => {
            warn!(event = event.kind().name(), %e, "failed to encode event");
            false
        }
    }
}

struct PendingReply {
    prompt: ChatMessage,
    stream: bool,
}

async fn handle_conn(stream: TcpStream, shared: Arc<Shared>) -> Result<(), BoxError> {
    let handshake_auth = shared.config.handshake_auth.clone();
    let ws = accept_hdr_async(
        stream,
        move |req: &tungstenite::handshake::server::Request,
              resp: tungstenite::handshake::server::Response| {
            if let Some(check) = &handshake_auth {
                let uri = req.uri();
                let token = query_param(uri.query(), "token");
                if !(check)(HandshakeAuthArgs { path: uri.path(), token }) {
                    warn!(path=%uri.path(), has_token = token.is_some(), "handshake auth denied");
                    return Err(unauthorized());
                }
                debug!(path=%uri.path(), "handshake auth accepted");
            }
            Ok(resp)
        },
    )
    .await?;

    // writer task channel
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let (mut sink, mut stream) = ws.split();
    let sink_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                debug!("sink send error; writer task exiting");
                break;
            }
        }
    });

    let conn_id = NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed);
    // Replies are produced one at a time so they never interleave.
    let (reply_tx, reply_rx) = mpsc::unbounded_channel::<PendingReply>();
    let reply_task = tokio::spawn(reply_loop(shared.clone(), reply_rx, tx.clone()));
    let mut joined_rooms: Vec<RoomId> = Vec::new();

    while let Some(msg) = stream.next().await {
        match msg? {
            Message::Text(txt) => {
                if txt == "ping" {
                    let _ = tx.send(Message::Text("pong".into()));
                    continue;
                }
                if txt == "pong" {
                    continue;
                }
                match decode_directive(&txt) {
                    Ok(ClientDirective::JoinChat { room_id }) => {
                        if !joined_rooms.contains(&room_id) {
                            joined_rooms.push(room_id.clone());
                        }
                        info!(conn_id, room=%room_id, "join ok");
                        if let Some(hook) = &shared.config.on_join {
                            (hook)(JoinArgs { conn_id, room: room_id });
                        }
                    }
                    Ok(ClientDirective::SendMessage { room_id, content, stream: streamed }) => {
                        let prompt = shared.message(room_id, SenderKind::User, content);
                        debug!(conn_id, room=%prompt.room_id, id=%prompt.id, streamed, "user message saved");
                        send_event(&tx, &ServerEvent::MessageSaved(prompt.clone()));
                        let _ = reply_tx.send(PendingReply { prompt, stream: streamed });
                    }
                    Err(CodecError::TooLarge { size }) => {
                        warn!(conn_id, size, "oversized frame; closing connection");
                        let _ = tx.send(Message::Close(Some(CloseFrame {
                            code: CloseCode::Size,
                            reason: "Frame too large".into(),
                        })));
                        break;
                    }
                    Err(e) => {
                        warn!(conn_id, %e, "rejecting unrecognized frame");
                        send_event(&tx, &ServerEvent::Error { message: e.to_string() });
                    }
                }
            }
            Message::Close(frame) => {
                let _ = tx.send(Message::Close(frame.clone()));
                break;
            }
            Message::Ping(p) => {
                let _ = tx.send(Message::Pong(p));
            }
            _ => {}
        }
    }

    // Pending replies die with the connection.
    drop(reply_tx);
    reply_task.abort();
    if let Some(hook) = &shared.config.on_close_connection {
        (hook)(CloseConnectionArgs { conn_id, rooms: joined_rooms });
    }
    // drop tx to stop writer
    drop(tx);
    let _ = sink_task.await;
    debug!(conn_id, "connection closed and cleaned up");
    Ok(())
}

async fn pause(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

async fn reply_loop(shared: Arc<Shared>, mut pending: mpsc::UnboundedReceiver<PendingReply>, tx: Sender) {
    while let Some(PendingReply { prompt, stream }) = pending.recv().await {
        let text = (shared.config.responder)(&prompt);
        let room = prompt.room_id;
        if stream {
            send_event(&tx, &ServerEvent::StreamStart { room_id: Some(room.clone()) });
            let mut full = String::with_capacity(text.len());
            for chunk in stream_chunks(&text) {
                pause(shared.config.chunk_delay_ms).await;
                full.push_str(&chunk);
                if !send_event(&tx, &ServerEvent::StreamChunk { chunk, room_id: Some(room.clone()) }) {
                    return;
                }
            }
            let reply = shared.message(room, SenderKind::Assistant, full);
            debug!(room=%reply.room_id, id=%reply.id, len = reply.content.len(), "streamed reply finished");
            send_event(&tx, &ServerEvent::StreamEnd(reply));
        } else {
            pause(shared.config.reply_delay_ms).await;
            let reply = shared.message(room, SenderKind::Assistant, text);
            send_event(&tx, &ServerEvent::MessageSaved(reply));
        }
    }
}
