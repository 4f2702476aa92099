//! WebSocket transport.
//!
//! Two layers are exposed:
//! - Low-level `Client` to send directives and receive server events directly.
//! - `WsConnector`, the [`Connector`] used by a session: it spawns one task
//!   per channel that owns the socket reader and feeds the session queue.
//!
//! Low-level example (not run here):
//! ```no_run
//! use streamchat_client::transport::ws::Client;
//! use streamchat_protocol::{ClientDirective, RoomId};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! #   let rt = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
//! #   rt.block_on(async move {
//! let mut client = Client::connect("ws://127.0.0.1:8000/ws?token=secret").await?;
//! client.send(&ClientDirective::JoinChat { room_id: RoomId::from("7") }).await?;
//! if let Some(event) = client.next().await? {
//!     println!("got: {:?}", event);
//! }
//! #   Ok(())
//! # })
//! # }
//! ```
use futures_util::{SinkExt, StreamExt};
use streamchat_protocol::{encode_directive, try_decode_event, ClientDirective, ServerEvent};
use tokio::{
    net::TcpStream,
    sync::{mpsc, oneshot},
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, trace, warn};

use super::{ChannelEvents, ChannelSink, Connector};
use crate::{config::ClientConfig, credential::Credential, error::ClientError};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn open_socket(url: &str) -> Result<Ws, ClientError> {
    match connect_async(url).await {
        Ok((ws, _resp)) => Ok(ws),
        Err(e) => {
            if let tungstenite::Error::Http(resp) = &e {
                if resp.status() == tungstenite::http::StatusCode::UNAUTHORIZED {
                    return Err(ClientError::Unauthorized);
                }
            }
            Err(ClientError::from(e))
        }
    }
}

/// Append the bearer token as the `token` query parameter.
pub fn authenticated_url(socket_url: &str, credential: &Credential) -> Result<String, ClientError> {
    let mut url =
        reqwest::Url::parse(socket_url).map_err(|e| ClientError::InvalidUrl(format!("{socket_url}: {e}")))?;
    url.query_pairs_mut().append_pair("token", credential.token());
    Ok(url.to_string())
}

/// A minimal client wrapping a WebSocket stream.
pub struct Client {
    ws: Ws,
}

impl Client {
    /// Connect to a ws/wss URL (token already in the query string).
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        Ok(Self { ws: open_socket(url).await? })
    }

    pub async fn send(&mut self, directive: &ClientDirective) -> Result<(), ClientError> {
        let text = encode_directive(directive)?;
        self.ws.send(Message::Text(text.into())).await?;
        Ok(())
    }

    /// Send a keepalive ping (text frame "ping").
    pub async fn ping(&mut self) -> Result<(), ClientError> {
        self.ws.send(Message::Text("ping".into())).await?;
        Ok(())
    }

    /// Receive the next server event.
    /// - Skips unknown events and non-text frames.
    /// - Replies to text "ping" with text "pong".
    /// - Returns Ok(None) on clean close.
    pub async fn next(&mut self) -> Result<Option<ServerEvent>, ClientError> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(txt))) => {
                    if txt == "ping" {
                        self.ws.send(Message::Text("pong".into())).await?;
                    } else if let Some(event) = try_decode_event(&txt) {
                        return Ok(Some(event));
                    }
                }
                Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(None),
            }
        }
    }

    /// Close the connection gracefully.
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.ws.close(None).await?;
        Ok(())
    }
}

/// Opens one WebSocket per connect attempt.
#[derive(Clone, Debug)]
pub struct WsConnector {
    socket_url: String,
}

impl WsConnector {
    pub fn new(socket_url: impl Into<String>) -> Self { Self { socket_url: socket_url.into() } }

    pub fn from_config(config: &ClientConfig) -> Self { Self::new(config.socket_url.clone()) }
}

impl Connector for WsConnector {
    fn open(&self, credential: &Credential, events: ChannelEvents) {
        let url = match authenticated_url(&self.socket_url, credential) {
            Ok(url) => url,
            Err(e) => {
                events.failed(e);
                return;
            }
        };
        tokio::spawn(async move {
            let ws = match open_socket(&url).await {
                Ok(ws) => ws,
                Err(e) => {
                    events.failed(e);
                    return;
                }
            };
            let (mut sink, stream) = ws.split();
            let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

            // Writer
            tokio::spawn(async move {
                while let Some(msg) = rx.recv().await {
                    if sink.send(msg).await.is_err() {
                        debug!("sink send error; writer task exiting");
                        break;
                    }
                }
            });

            let (shutdown_tx, shutdown_rx) = oneshot::channel();
            // Opened is queued before any event the reader forwards.
            let open = events.opened(Box::new(WsSink { tx: tx.clone(), shutdown: Some(shutdown_tx) }));
            if open {
                read_loop(stream, tx, &events, shutdown_rx).await;
            }
        });
    }
}

async fn read_loop(
    mut stream: futures_util::stream::SplitStream<Ws>,
    tx: mpsc::UnboundedSender<Message>,
    events: &ChannelEvents,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        let frame = tokio::select! {
            _ = &mut shutdown => {
                trace!(epoch = events.epoch(), "reader stopped by client");
                return;
            }
            frame = stream.next() => frame,
        };
        match frame {
            Some(Ok(Message::Text(txt))) => {
                if txt == "ping" {
                    let _ = tx.send(Message::Text("pong".into()));
                } else if txt == "pong" {
                    // keepalive reply
                } else if let Some(event) = try_decode_event(&txt) {
                    if !events.event(event) {
                        return;
                    }
                } else {
                    debug!(len = txt.len(), "skipping unrecognized frame");
                }
            }
            Some(Ok(Message::Ping(p))) => {
                let _ = tx.send(Message::Pong(p));
            }
            Some(Ok(Message::Close(frame))) => {
                debug!(epoch = events.epoch(), ?frame, "server closed channel");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(epoch = events.epoch(), %e, "ws read error");
                break;
            }
            None => break,
        }
    }
    events.closed();
}

struct WsSink {
    tx: mpsc::UnboundedSender<Message>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl ChannelSink for WsSink {
    fn send(&mut self, directive: &ClientDirective) -> Result<(), ClientError> {
        let text = encode_directive(directive)?;
        self.tx
            .send(Message::Text(text.into()))
            .map_err(|_| ClientError::ChannelClosed)
    }

    fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = self.tx.send(Message::Close(None));
            let _ = shutdown.send(());
        }
    }
}

impl Drop for WsSink {
    fn drop(&mut self) { self.close(); }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_appended_as_query_parameter() {
        let url = authenticated_url("ws://127.0.0.1:9000/ws", &Credential::new("a b&c")).unwrap();
        assert_eq!(url, "ws://127.0.0.1:9000/ws?token=a+b%26c");
    }

    #[test]
    fn existing_query_is_kept() {
        let url = authenticated_url("ws://host/ws?v=2", &Credential::new("t")).unwrap();
        assert_eq!(url, "ws://host/ws?v=2&token=t");
    }

    #[test]
    fn bad_socket_url_is_reported() {
        let err = authenticated_url("not a url", &Credential::new("t")).unwrap_err();
        assert!(matches!(err, ClientError::InvalidUrl(_)));
    }
}
