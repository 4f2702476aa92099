//! # Session controller
//!
//! [`ChatSession`] is the one context object that owns everything a signed-in
//! user has: the credential, the transport, the active room binding, the
//! conversation and the room list. It is driven from one task. Commands take
//! `&mut self`; inbound channel traffic is queued and applied through
//! [`ChatSession::handle`], either by [`pump`](ChatSession::pump) or by
//! awaiting [`next_event`](ChatSession::next_event).
//!
//! ```no_run
//! use std::sync::Arc;
//! use streamchat_client::{ChatSession, ClientConfig, HttpChatApi, WsConnector};
//! # async fn run() -> Result<(), streamchat_client::ClientError> {
//! let config = ClientConfig::from_env();
//! let mut session = ChatSession::new(
//!     Arc::new(HttpChatApi::new(&config)?),
//!     Arc::new(WsConnector::from_config(&config)),
//! );
//! session.login("ada@example.com", "hunter2").await?;
//! session.refresh_rooms().await?;
//! session.send_message("hello", true)?;
//! while session.next_event().await {
//!     print!("\r{}", session.streaming_text());
//! }
//! # Ok(())
//! # }
//! ```
use std::{collections::HashSet, sync::Arc};

use streamchat_protocol::{ChatMessage, ClientDirective, EventKind, Room, RoomId, ServerEvent};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    api::{AuthGrant, ChatApi, HttpChatApi, Registration, UserProfile, DEFAULT_ROOM_TITLE},
    binding::RoomBinding,
    config::ClientConfig,
    conversation::Conversation,
    credential::{Credential, CredentialStore},
    error::ClientError,
    transport::{
        ws::WsConnector, ConnectionState, Connector, Inbound, SubscriptionId, Transition, Transport,
    },
};

/// Owned copy of the observable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub connection: ConnectionState,
    pub active_room: Option<RoomId>,
    pub messages: Vec<ChatMessage>,
    pub streaming_text: String,
    pub is_streaming: bool,
}

pub struct ChatSession {
    api: Arc<dyn ChatApi>,
    credentials: CredentialStore,
    transport: Transport,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    binding: RoomBinding,
    conversation: Conversation,
    rooms: Vec<Room>,
    user: Option<UserProfile>,
}

impl ChatSession {
    pub fn new(api: Arc<dyn ChatApi>, connector: Arc<dyn Connector>) -> Self {
        let (tx, inbound) = mpsc::unbounded_channel();
        Self {
            api,
            credentials: CredentialStore::new(),
            transport: Transport::new(connector, tx),
            inbound,
            binding: RoomBinding::default(),
            conversation: Conversation::default(),
            rooms: Vec::new(),
            user: None,
        }
    }

    /// HTTP collaborator plus WebSocket transport.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        Ok(Self::new(
            Arc::new(HttpChatApi::new(config)?),
            Arc::new(WsConnector::from_config(config)),
        ))
    }

    // ----- observable state -----

    pub fn connection_state(&self) -> ConnectionState { self.transport.state() }

    pub fn active_room(&self) -> Option<&RoomId> { self.binding.current() }

    /// Finalized log of the active room.
    pub fn messages(&self) -> &[ChatMessage] { self.conversation.messages(self.binding.current()) }

    pub fn streaming_text(&self) -> &str { self.conversation.streaming_text() }

    pub fn is_streaming(&self) -> bool { self.conversation.is_streaming() }

    /// Known rooms, most recent first.
    pub fn rooms(&self) -> &[Room] { &self.rooms }

    pub fn user(&self) -> Option<&UserProfile> { self.user.as_ref() }

    pub fn is_authenticated(&self) -> bool { self.credentials.get().is_some() }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            connection: self.connection_state(),
            active_room: self.active_room().cloned(),
            messages: self.messages().to_vec(),
            streaming_text: self.streaming_text().to_string(),
            is_streaming: self.is_streaming(),
        }
    }

    // ----- inbound intake -----

    /// Apply one inbound channel event. This is the only place where
    /// transport traffic changes session state.
    pub fn handle(&mut self, inbound: Inbound) {
        let Some(transition) = self.transport.accept(inbound) else {
            return;
        };
        match transition {
            Transition::Connected => self.rejoin(),
            Transition::ConnectFailed(e) => {
                if e.is_auth_failure() {
                    warn!(%e, "realtime channel rejected the credential; clearing it");
                    self.credentials.clear();
                }
            }
            Transition::Lost => {
                self.conversation.abandon_stream();
            }
            Transition::Event(event) => {
                self.reconcile(&event);
                self.transport.dispatch(&event);
            }
        }
    }

    /// Apply every queued event without waiting. Returns how many were taken.
    pub fn pump(&mut self) -> usize {
        let mut n = 0;
        while let Ok(inbound) = self.inbound.try_recv() {
            self.handle(inbound);
            n += 1;
        }
        n
    }

    /// Wait for the next inbound event and apply it. The session holds a
    /// sender of its own queue, so this only returns false if that queue is
    /// torn down.
    pub async fn next_event(&mut self) -> bool {
        match self.inbound.recv().await {
            Some(inbound) => {
                self.handle(inbound);
                true
            }
            None => false,
        }
    }

    fn rejoin(&mut self) {
        if let Some(join) = self.binding.join_directive() {
            debug!(room=%join.room_id(), "re-joining active room");
            self.transport.send(&join);
        }
    }

    fn reconcile(&mut self, event: &ServerEvent) {
        let active = self.binding.current();
        match event {
            ServerEvent::MessageSaved(message) => {
                self.conversation.append_finalized(message.clone(), active);
            }
            ServerEvent::StreamStart { room_id } => {
                self.conversation.stream_start(room_id.as_ref(), active);
            }
            ServerEvent::StreamChunk { chunk, room_id } => {
                self.conversation.stream_chunk(chunk, room_id.as_ref(), active);
            }
            ServerEvent::StreamEnd(message) => {
                self.conversation.stream_end(message.clone(), active);
            }
            ServerEvent::Error { message } => {
                warn!(%message, "server reported an error");
            }
        }
    }

    // ----- transport -----

    /// Open the realtime channel with the stored credential. No-op when a
    /// channel is already open or opening.
    pub fn connect(&mut self) -> Result<(), ClientError> {
        let credential = self.credentials.get().ok_or(ClientError::NotAuthenticated)?;
        self.transport.connect(credential);
        Ok(())
    }

    /// Drop the current channel and open a fresh one.
    pub fn reconnect(&mut self) -> Result<(), ClientError> {
        if !self.is_authenticated() {
            return Err(ClientError::NotAuthenticated);
        }
        self.disconnect();
        self.connect()
    }

    /// Idempotent. Any open stream is abandoned.
    pub fn disconnect(&mut self) {
        self.transport.disconnect();
        self.conversation.abandon_stream();
    }

    pub fn subscribe(
        &mut self,
        kind: EventKind,
        handler: impl FnMut(&ServerEvent) + Send + 'static,
    ) -> SubscriptionId {
        self.transport.subscribe(kind, handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool { self.transport.unsubscribe(id) }

    // ----- room binding -----

    /// Bind `room`. On a real change any open stream is abandoned and, when
    /// connected, one join is sent for the new room. Returns whether the
    /// binding changed.
    pub fn set_active_room(&mut self, room: Option<RoomId>) -> bool {
        let Some(previous) = self.binding.set(room) else {
            return false;
        };
        self.conversation.abandon_stream();
        info!(from=?previous, to=?self.binding.current(), "active room changed");
        if self.transport.is_connected() {
            if let Some(join) = self.binding.join_directive() {
                self.transport.send(&join);
            }
        }
        true
    }

    /// Install fetched history for `room`. Discarded unless `room` is still
    /// the active binding.
    pub fn apply_history(&mut self, room: &RoomId, messages: Vec<ChatMessage>) -> bool {
        if !self.binding.is_active(room) {
            debug!(room=%room, "history for a room that is no longer active discarded");
            return false;
        }
        self.conversation.load_history(room, messages);
        true
    }

    // ----- commands -----

    pub async fn login(&mut self, email: &str, password: &str) -> Result<UserProfile, ClientError> {
        let result = self.api.login(email, password).await;
        self.finish_auth(result)
    }

    pub async fn register(&mut self, registration: &Registration) -> Result<UserProfile, ClientError> {
        let result = self.api.register(registration).await;
        self.finish_auth(result)
    }

    /// Bootstrap from a previously stored token.
    pub async fn resume(&mut self, token: impl Into<String>) -> Result<UserProfile, ClientError> {
        let credential = Credential::new(token);
        match self.api.current_user(&credential).await {
            Ok(user) => {
                info!(user=%user.id, "session resumed");
                self.bind_identity(credential, user.clone())?;
                Ok(user)
            }
            Err(e) => {
                warn!(%e, "stored credential rejected");
                self.fail_auth();
                Err(e)
            }
        }
    }

    fn finish_auth(&mut self, result: Result<AuthGrant, ClientError>) -> Result<UserProfile, ClientError> {
        match result {
            Ok(grant) => {
                self.bind_identity(Credential::new(grant.access_token), grant.user.clone())?;
                Ok(grant.user)
            }
            Err(e) => {
                self.fail_auth();
                Err(e)
            }
        }
    }

    // A failed authentication leaves nothing of the previous identity behind.
    fn fail_auth(&mut self) {
        if self.user.is_some() || self.transport.state() != ConnectionState::Disconnected {
            self.logout();
        } else {
            self.credentials.clear();
        }
    }

    // A new identity never reuses a channel opened for another one.
    fn bind_identity(&mut self, credential: Credential, user: UserProfile) -> Result<(), ClientError> {
        if self.transport.state() != ConnectionState::Disconnected {
            self.disconnect();
        }
        self.credentials.set(credential);
        self.user = Some(user);
        self.connect()
    }

    /// Tear the whole session down.
    pub fn logout(&mut self) {
        self.credentials.clear();
        self.binding.set(None);
        self.disconnect();
        self.conversation.clear();
        self.rooms.clear();
        self.user = None;
        info!("logged out");
    }

    /// Reload the room list. Selects the first room when none is active.
    pub async fn refresh_rooms(&mut self) -> Result<&[Room], ClientError> {
        let credential = self.credential()?;
        let mut rooms = self.api.list_rooms(&credential).await?;
        let mut seen = HashSet::new();
        rooms.retain(|room| seen.insert(room.id.clone()));
        self.rooms = rooms;
        if self.binding.current().is_none() {
            if let Some(first) = self.rooms.first().map(|room| room.id.clone()) {
                self.select_room(first).await?;
            }
        }
        Ok(&self.rooms)
    }

    /// Bind `room` and load its history. A newly bound room starts with an
    /// empty log until its history arrives.
    pub async fn select_room(&mut self, room: RoomId) -> Result<(), ClientError> {
        let credential = self.credential()?;
        if self.set_active_room(Some(room.clone())) {
            self.conversation.load_history(&room, Vec::new());
        }
        let history = self.api.room_history(&credential, &room).await?;
        self.apply_history(&room, history);
        Ok(())
    }

    /// Create a room, put it first in the list and make it active.
    pub async fn create_room(&mut self, title: Option<&str>) -> Result<Room, ClientError> {
        let credential = self.credential()?;
        let room = self
            .api
            .create_room(&credential, title.unwrap_or(DEFAULT_ROOM_TITLE))
            .await?;
        self.rooms.retain(|r| r.id != room.id);
        self.rooms.insert(0, room.clone());
        self.set_active_room(Some(room.id.clone()));
        self.conversation.load_history(&room.id, Vec::new());
        Ok(room)
    }

    /// Ask the server to post `text` to the active room. Returns `Ok(false)`
    /// for blank text or when the directive was dropped because the channel
    /// is not connected.
    pub fn send_message(&mut self, text: &str, stream: bool) -> Result<bool, ClientError> {
        let room_id = self.binding.current().cloned().ok_or(ClientError::NoActiveRoom)?;
        if text.trim().is_empty() {
            return Ok(false);
        }
        if self.conversation.is_streaming() {
            debug!(room=%room_id, "sending while a reply is still streaming");
        }
        Ok(self.transport.send(&ClientDirective::SendMessage {
            room_id,
            content: text.to_string(),
            stream,
        }))
    }

    fn credential(&self) -> Result<Credential, ClientError> {
        self.credentials.get().cloned().ok_or(ClientError::NotAuthenticated)
    }
}
