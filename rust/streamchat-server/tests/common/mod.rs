#![allow(dead_code)]

use async_trait::async_trait;
use std::{future::Future, sync::Arc, time::Duration};
use streamchat_client::{
    protocol::{ChatMessage, Room, RoomId, UserId},
    AuthGrant, ChatApi, ChatSession, ClientError, Credential, Registration, UserProfile, WsConnector,
};
use streamchat_server as server;
use tokio::net::TcpListener;

pub const TOKEN: &str = "secret";
pub const ROOM: &str = "7";

/// REST stand-in: every login yields `TOKEN`, the only room is `ROOM`.
pub struct FakeApi {
    pub token: String,
}

impl Default for FakeApi {
    fn default() -> Self { Self { token: TOKEN.to_string() } }
}

fn profile() -> UserProfile {
    UserProfile { id: UserId::from("1"), email: "ada@example.com".into(), first_name: None, last_name: None }
}

#[async_trait]
impl ChatApi for FakeApi {
    async fn login(&self, _email: &str, _password: &str) -> Result<AuthGrant, ClientError> {
        Ok(AuthGrant { access_token: self.token.clone(), user: profile() })
    }

    async fn register(&self, _registration: &Registration) -> Result<AuthGrant, ClientError> {
        self.login("", "").await
    }

    async fn current_user(&self, _credential: &Credential) -> Result<UserProfile, ClientError> {
        Ok(profile())
    }

    async fn list_rooms(&self, _credential: &Credential) -> Result<Vec<Room>, ClientError> {
        Ok(vec![Room {
            id: RoomId::from(ROOM),
            title: "New Chat".into(),
            created_at: chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }])
    }

    async fn room_history(&self, _credential: &Credential, _room: &RoomId) -> Result<Vec<ChatMessage>, ClientError> {
        Ok(Vec::new())
    }

    async fn create_room(&self, _credential: &Credential, _title: &str) -> Result<Room, ClientError> {
        Err(ClientError::Api { status: 501, detail: "not supported".into() })
    }
}

/// Config requiring `TOKEN` at handshake, replying without delays.
pub fn config() -> server::ServerConfig {
    server::ServerConfig {
        handshake_auth: Some(Arc::new(|args: server::HandshakeAuthArgs<'_>| args.token == Some(TOKEN))),
        responder: Arc::new(|prompt: &ChatMessage| format!("you said {}", prompt.content)),
        chunk_delay_ms: 0,
        reply_delay_ms: 0,
        ..Default::default()
    }
}

/// Bind an ephemeral port and serve `cfg`. Returns the socket URL and task.
pub async fn start(cfg: server::ServerConfig) -> (String, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(async move {
        server::serve_incoming_with_config(listener, cfg).await.unwrap();
    });
    (format!("ws://{}/ws", addr), task)
}

pub fn session(api: FakeApi, socket_url: &str) -> ChatSession {
    ChatSession::new(Arc::new(api), Arc::new(WsConnector::new(socket_url)))
}

/// Apply inbound events until `done` holds, failing after two seconds.
pub async fn until(session: &mut ChatSession, mut done: impl FnMut(&ChatSession) -> bool) {
    let wait = async {
        while !done(session) {
            session.next_event().await;
        }
    };
    tokio::time::timeout(Duration::from_secs(2), wait)
        .await
        .expect("condition not reached in time");
}

/// Poll `check` until it holds, failing after two seconds.
pub async fn eventually<F: Future<Output = bool>>(mut check: impl FnMut() -> F) {
    let wait = async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(2), wait)
        .await
        .expect("condition not reached in time");
}
