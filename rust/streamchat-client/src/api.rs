//! # REST collaborator
//!
//! Authentication, room listing/creation and history fetches. The session
//! only depends on the [`ChatApi`] trait; [`HttpChatApi`] is the reqwest
//! implementation. No call is retried here.
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use streamchat_protocol::{ChatMessage, Room, RoomId, UserId};
use tracing::{debug, info, warn};

use crate::{config::ClientConfig, credential::Credential, error::ClientError};

pub const DEFAULT_ROOM_TITLE: &str = "New Chat";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// Successful login or registration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthGrant {
    pub access_token: String,
    pub user: UserProfile,
}

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<AuthGrant, ClientError>;
    async fn register(&self, registration: &Registration) -> Result<AuthGrant, ClientError>;
    async fn current_user(&self, credential: &Credential) -> Result<UserProfile, ClientError>;
    /// Rooms, most recent first.
    async fn list_rooms(&self, credential: &Credential) -> Result<Vec<Room>, ClientError>;
    /// Messages of a room in creation order.
    async fn room_history(&self, credential: &Credential, room: &RoomId) -> Result<Vec<ChatMessage>, ClientError>;
    async fn create_room(&self, credential: &Credential, title: &str) -> Result<Room, ClientError>;
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct CreateRoomRequest<'a> {
    title: &'a str,
}

// `GET /chats/{id}` embeds the history in the room body.
#[derive(Deserialize)]
struct RoomWithMessages {
    #[serde(default)]
    messages: Vec<ChatMessage>,
}

// `detail` is a string for handled errors and a list for validation errors.
#[derive(Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

pub struct HttpChatApi {
    client: Client,
    base_url: String,
}

impl HttpChatApi {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { client, base_url: config.api_base_url.trim_end_matches('/').to_string() })
    }

    fn url(&self, path: &str) -> String { format!("{}{}", self.base_url, path) }

    fn authorized(&self, request: RequestBuilder, credential: &Credential) -> RequestBuilder {
        request.bearer_auth(credential.token())
    }

    async fn read<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }
        let detail = match response.json::<ErrorBody>().await {
            Ok(ErrorBody { detail: serde_json::Value::String(s) }) => s,
            Ok(ErrorBody { detail }) => detail.to_string(),
            Err(_) => status.canonical_reason().unwrap_or("request failed").to_string(),
        };
        warn!(status = status.as_u16(), %detail, "request failed");
        Err(ClientError::Api { status: status.as_u16(), detail })
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    #[tracing::instrument(skip(self, password))]
    async fn login(&self, email: &str, password: &str) -> Result<AuthGrant, ClientError> {
        let response = self
            .client
            .post(self.url("/auth/login"))
            .json(&LoginRequest { email, password })
            .send()
            .await?;
        let grant: AuthGrant = Self::read(response).await?;
        info!(user=%grant.user.id, "login successful");
        Ok(grant)
    }

    #[tracing::instrument(skip_all, fields(email = %registration.email))]
    async fn register(&self, registration: &Registration) -> Result<AuthGrant, ClientError> {
        let response = self.client.post(self.url("/auth/register")).json(registration).send().await?;
        let grant: AuthGrant = Self::read(response).await?;
        info!(user=%grant.user.id, "registration successful");
        Ok(grant)
    }

    async fn current_user(&self, credential: &Credential) -> Result<UserProfile, ClientError> {
        let request = self.authorized(self.client.get(self.url("/auth/me")), credential);
        Self::read(request.send().await?).await
    }

    async fn list_rooms(&self, credential: &Credential) -> Result<Vec<Room>, ClientError> {
        let request = self.authorized(self.client.get(self.url("/chats")), credential);
        let rooms: Vec<Room> = Self::read(request.send().await?).await?;
        debug!(count = rooms.len(), "rooms fetched");
        Ok(rooms)
    }

    async fn room_history(&self, credential: &Credential, room: &RoomId) -> Result<Vec<ChatMessage>, ClientError> {
        let request = self.authorized(self.client.get(self.url(&format!("/chats/{room}"))), credential);
        let body: RoomWithMessages = Self::read(request.send().await?).await?;
        debug!(room=%room, count = body.messages.len(), "history fetched");
        Ok(body.messages)
    }

    async fn create_room(&self, credential: &Credential, title: &str) -> Result<Room, ClientError> {
        let request = self
            .authorized(self.client.post(self.url("/chats")), credential)
            .json(&CreateRoomRequest { title });
        let room: Room = Self::read(request.send().await?).await?;
        info!(room=%room.id, "room created");
        Ok(room)
    }
}
