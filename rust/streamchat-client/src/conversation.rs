//! Per-room message logs plus the live streaming buffer.
use std::collections::HashMap;

use streamchat_protocol::{ChatMessage, RoomId};
use tracing::debug;

use crate::stream::{StreamMachine, StreamOutcome};

#[derive(Debug, Default)]
pub struct Conversation {
    logs: HashMap<RoomId, Vec<ChatMessage>>,
    stream: StreamMachine,
}

impl Conversation {
    /// Replace a room's log with an authoritative history snapshot.
    pub fn load_history(&mut self, room: &RoomId, messages: Vec<ChatMessage>) {
        debug!(room=%room, count = messages.len(), "history loaded");
        self.logs.insert(room.clone(), messages);
    }

    /// Append a finalized message to its room's log if that room is the
    /// active one. Returns whether it was appended.
    pub fn append_finalized(&mut self, message: ChatMessage, active: Option<&RoomId>) -> bool {
        if active != Some(&message.room_id) {
            debug!(room=%message.room_id, id=%message.id, "finalized message for inactive room dropped");
            return false;
        }
        self.logs.entry(message.room_id.clone()).or_default().push(message);
        true
    }

    /// Ordered log of `room`; empty when nothing is known about it.
    pub fn messages(&self, room: Option<&RoomId>) -> &[ChatMessage] {
        room.and_then(|r| self.logs.get(r))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn streaming_text(&self) -> &str { self.stream.text() }

    pub fn is_streaming(&self) -> bool { self.stream.is_streaming() }

    pub fn stream_start(&mut self, room: Option<&RoomId>, active: Option<&RoomId>) -> StreamOutcome {
        self.stream.start(room, active)
    }

    pub fn stream_chunk(&mut self, text: &str, room: Option<&RoomId>, active: Option<&RoomId>) -> StreamOutcome {
        self.stream.chunk(text, room, active)
    }

    /// Finish the open stream; the server's message, not the local buffer,
    /// is appended to the log.
    pub fn stream_end(&mut self, message: ChatMessage, active: Option<&RoomId>) -> StreamOutcome {
        match self.stream.end(message, active) {
            StreamOutcome::Finished(message) => {
                self.append_finalized(message.clone(), active);
                StreamOutcome::Finished(message)
            }
            other => other,
        }
    }

    pub fn abandon_stream(&mut self) -> bool { self.stream.abandon() }

    pub fn clear(&mut self) {
        self.stream.abandon();
        self.logs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use streamchat_protocol::{MessageId, SenderKind};

    fn msg(id: &str, room: &str, content: &str) -> ChatMessage {
        ChatMessage {
            id: MessageId::from(id),
            room_id: RoomId::from(room),
            sender: SenderKind::User,
            content: content.into(),
            created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn appends_keep_call_order() {
        let r = RoomId::from("r1");
        let mut c = Conversation::default();
        // Same timestamp on purpose: order comes from the calls, not time.
        assert!(c.append_finalized(msg("m2", "r1", "second"), Some(&r)));
        assert!(c.append_finalized(msg("m1", "r1", "first"), Some(&r)));
        let ids: Vec<&str> = c.messages(Some(&r)).iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m2", "m1"]);
    }

    #[test]
    fn inactive_room_messages_are_dropped() {
        let mut c = Conversation::default();
        assert!(!c.append_finalized(msg("m1", "r2", "x"), Some(&RoomId::from("r1"))));
        assert!(!c.append_finalized(msg("m1", "r2", "x"), None));
        assert!(c.messages(Some(&RoomId::from("r2"))).is_empty());
    }

    #[test]
    fn history_replaces_wholesale() {
        let r = RoomId::from("r1");
        let mut c = Conversation::default();
        c.append_finalized(msg("live", "r1", "x"), Some(&r));
        c.load_history(&r, vec![msg("h1", "r1", "a"), msg("h2", "r1", "b")]);
        let ids: Vec<&str> = c.messages(Some(&r)).iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["h1", "h2"]);

        c.load_history(&r, Vec::new());
        assert!(c.messages(Some(&r)).is_empty());
    }

    #[test]
    fn stream_end_appends_server_message_not_buffer() {
        let r = RoomId::from("r1");
        let mut c = Conversation::default();
        c.stream_start(None, Some(&r));
        c.stream_chunk("Hi", None, Some(&r));
        c.stream_chunk(" there", None, Some(&r));
        let before = c.messages(Some(&r)).len();
        c.stream_end(msg("m1", "r1", "Hi there!"), Some(&r));
        let log = c.messages(Some(&r));
        assert_eq!(log.len(), before + 1);
        assert_eq!(log[log.len() - 1].content, "Hi there!");
        assert!(!c.is_streaming());
        assert_eq!(c.streaming_text(), "");
    }

    #[test]
    fn clear_drops_logs_and_stream() {
        let r = RoomId::from("r1");
        let mut c = Conversation::default();
        c.append_finalized(msg("m1", "r1", "x"), Some(&r));
        c.stream_start(None, Some(&r));
        c.clear();
        assert!(c.messages(Some(&r)).is_empty());
        assert!(!c.is_streaming());
    }
}
