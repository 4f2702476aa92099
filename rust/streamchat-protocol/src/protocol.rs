//! Wire types for the realtime chat channel.
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`. The
//! event names below are shared with the HTTP/Socket.IO backend and must not
//! change.
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub const MAX_FRAME_SIZE: usize = 256 * 1024; // 256KB

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }
            pub fn as_str(&self) -> &str { &self.0 }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self { Self(s.to_owned()) }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self { Self(s) }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                RawId::deserialize(d).map(|raw| Self(raw.into_string()))
            }
        }
    };
}

// The backend uses integer primary keys; other deployments use strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Signed(i64),
    Unsigned(u64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Text(s) => s,
            RawId::Signed(n) => n.to_string(),
            RawId::Unsigned(n) => n.to_string(),
        }
    }
}

opaque_id!(
    /// Identifier of a chat room (`chat_id` on the wire).
    RoomId
);
opaque_id!(
    /// Identifier of a persisted message.
    MessageId
);
opaque_id!(
    /// Identifier of an authenticated user.
    UserId
);

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SenderKind {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "ai", alias = "assistant")]
    Assistant,
}

/// A finalized message as persisted by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    #[serde(rename = "chat_id")]
    pub room_id: RoomId,
    #[serde(rename = "sender_type")]
    pub sender: SenderKind,
    pub content: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// A chat room as listed by the REST collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub title: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Discriminant of [`ServerEvent`], used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MessageSaved,
    StreamStart,
    StreamChunk,
    StreamEnd,
    Error,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::MessageSaved,
        EventKind::StreamStart,
        EventKind::StreamChunk,
        EventKind::StreamEnd,
        EventKind::Error,
    ];

    /// Event name as it appears on the wire.
    pub fn name(self) -> &'static str {
        match self {
            EventKind::MessageSaved => "message_saved",
            EventKind::StreamStart => "ai_stream_start",
            EventKind::StreamChunk => "ai_stream_chunk",
            EventKind::StreamEnd => "ai_stream_end",
            EventKind::Error => "error",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

/// Server-to-client events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// A message (user echo or non-streamed reply) was persisted.
    #[serde(rename = "message_saved")]
    MessageSaved(ChatMessage),
    #[serde(rename = "ai_stream_start")]
    StreamStart {
        #[serde(rename = "chat_id", default, skip_serializing_if = "Option::is_none")]
        room_id: Option<RoomId>,
    },
    #[serde(rename = "ai_stream_chunk")]
    StreamChunk {
        chunk: String,
        #[serde(rename = "chat_id", default, skip_serializing_if = "Option::is_none")]
        room_id: Option<RoomId>,
    },
    /// Carries the authoritative finalized reply.
    #[serde(rename = "ai_stream_end")]
    StreamEnd(ChatMessage),
    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::MessageSaved(_) => EventKind::MessageSaved,
            ServerEvent::StreamStart { .. } => EventKind::StreamStart,
            ServerEvent::StreamChunk { .. } => EventKind::StreamChunk,
            ServerEvent::StreamEnd(_) => EventKind::StreamEnd,
            ServerEvent::Error { .. } => EventKind::Error,
        }
    }

    /// Room the event is tagged with, if the server included one.
    pub fn room_id(&self) -> Option<&RoomId> {
        match self {
            ServerEvent::MessageSaved(m) | ServerEvent::StreamEnd(m) => Some(&m.room_id),
            ServerEvent::StreamStart { room_id } | ServerEvent::StreamChunk { room_id, .. } => {
                room_id.as_ref()
            }
            ServerEvent::Error { .. } => None,
        }
    }
}

/// Discriminant of [`ClientDirective`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectiveKind {
    SendMessage,
    JoinChat,
}

impl DirectiveKind {
    pub fn name(self) -> &'static str {
        match self {
            DirectiveKind::SendMessage => "send_message",
            DirectiveKind::JoinChat => "join_chat",
        }
    }
}

/// Client-to-server directives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientDirective {
    #[serde(rename = "send_message")]
    SendMessage {
        #[serde(rename = "chat_id")]
        room_id: RoomId,
        content: String,
        #[serde(default)]
        stream: bool,
    },
    #[serde(rename = "join_chat")]
    JoinChat {
        #[serde(rename = "chat_id")]
        room_id: RoomId,
    },
}

impl ClientDirective {
    pub fn kind(&self) -> DirectiveKind {
        match self {
            ClientDirective::SendMessage { .. } => DirectiveKind::SendMessage,
            ClientDirective::JoinChat { .. } => DirectiveKind::JoinChat,
        }
    }

    pub fn room_id(&self) -> &RoomId {
        match self {
            ClientDirective::SendMessage { room_id, .. } | ClientDirective::JoinChat { room_id } => room_id,
        }
    }
}

/// RFC 3339 on output; also accepts the naive ISO-8601 form the Python
/// backend emits (`datetime.isoformat()` without offset), read as UTC.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw}")))
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}
