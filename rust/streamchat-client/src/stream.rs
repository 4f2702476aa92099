//! Streaming reply state machine.
//!
//! `ai_stream_start`, `ai_stream_chunk` and `ai_stream_end` drive a single
//! buffer that exists only to show the reply as it is typed. The buffer never
//! reaches the message log: on `end` the server's final message is handed
//! back to the caller instead, and on abandon the buffer is simply dropped.
//!
//! States and transitions:
//! - `Idle --start--> Streaming("")`
//! - `Streaming --start--> Streaming("")` (overlapping stream, logged)
//! - `Streaming --chunk(t)--> Streaming(buf + t)`
//! - `Streaming --end(m)--> Idle`, yields `m`
//! - any event while the buffer's room is no longer active: abandon, `Idle`
//! - `chunk`/`end` while `Idle`: logged, stays `Idle`
use streamchat_protocol::{ChatMessage, RoomId};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingBuffer {
    room: RoomId,
    text: String,
}

impl StreamingBuffer {
    fn new(room: RoomId) -> Self { Self { room, text: String::new() } }

    pub fn room(&self) -> &RoomId { &self.room }

    pub fn text(&self) -> &str { &self.text }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StreamState {
    #[default]
    Idle,
    Streaming(StreamingBuffer),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// `ai_stream_start` while a stream was already open.
    OverlappingStart,
    ChunkWhileIdle,
    EndWhileIdle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    Started,
    Appended,
    /// The stream finished; the server's final message.
    Finished(ChatMessage),
    /// The owning room stopped being active; buffer dropped.
    Abandoned,
    Violation(ProtocolViolation),
    /// Event belongs to a room that is not active.
    Ignored,
}

#[derive(Debug, Default)]
pub struct StreamMachine {
    state: StreamState,
}

impl StreamMachine {
    pub fn state(&self) -> &StreamState { &self.state }

    pub fn is_streaming(&self) -> bool { matches!(self.state, StreamState::Streaming(_)) }

    /// Live text, empty when idle.
    pub fn text(&self) -> &str {
        match &self.state {
            StreamState::Streaming(buf) => buf.text(),
            StreamState::Idle => "",
        }
    }

    /// `room` is the event's own tag; untagged events belong to `active`.
    pub fn start(&mut self, room: Option<&RoomId>, active: Option<&RoomId>) -> StreamOutcome {
        let Some(owner) = owning_room(room, active) else {
            debug!(room=?room, "stream start for inactive room ignored");
            return StreamOutcome::Ignored;
        };
        let overlapping = self.is_streaming();
        self.state = StreamState::Streaming(StreamingBuffer::new(owner.clone()));
        if overlapping {
            warn!(room=%owner, "stream start while already streaming; previous buffer discarded");
            StreamOutcome::Violation(ProtocolViolation::OverlappingStart)
        } else {
            debug!(room=%owner, "stream started");
            StreamOutcome::Started
        }
    }

    pub fn chunk(&mut self, text: &str, room: Option<&RoomId>, active: Option<&RoomId>) -> StreamOutcome {
        let StreamState::Streaming(buf) = &mut self.state else {
            return idle_violation(room, active, ProtocolViolation::ChunkWhileIdle);
        };
        if active != Some(&buf.room) {
            self.abandon();
            return StreamOutcome::Abandoned;
        }
        if room.is_some_and(|r| *r != buf.room) {
            debug!(room=?room, "chunk for another room ignored");
            return StreamOutcome::Ignored;
        }
        buf.text.push_str(text);
        StreamOutcome::Appended
    }

    pub fn end(&mut self, message: ChatMessage, active: Option<&RoomId>) -> StreamOutcome {
        let StreamState::Streaming(buf) = &self.state else {
            return idle_violation(Some(&message.room_id), active, ProtocolViolation::EndWhileIdle);
        };
        if active != Some(&buf.room) {
            self.abandon();
            return StreamOutcome::Abandoned;
        }
        if message.room_id != buf.room {
            debug!(room=%message.room_id, "stream end for another room ignored");
            return StreamOutcome::Ignored;
        }
        debug!(room=%buf.room, local_len = buf.text.len(), final_len = message.content.len(), "stream finished");
        self.state = StreamState::Idle;
        StreamOutcome::Finished(message)
    }

    /// Drop any open buffer without surfacing it. Returns whether one existed.
    pub fn abandon(&mut self) -> bool {
        match std::mem::take(&mut self.state) {
            StreamState::Streaming(buf) => {
                debug!(room=%buf.room, discarded = buf.text.len(), "stream abandoned");
                true
            }
            StreamState::Idle => false,
        }
    }
}

fn owning_room(tag: Option<&RoomId>, active: Option<&RoomId>) -> Option<RoomId> {
    let active = active?;
    match tag {
        Some(room) if room != active => None,
        _ => Some(active.clone()),
    }
}

fn idle_violation(room: Option<&RoomId>, active: Option<&RoomId>, violation: ProtocolViolation) -> StreamOutcome {
    if owning_room(room, active).is_none() {
        return StreamOutcome::Ignored;
    }
    warn!(?violation, room=?room, "stream event without an open stream");
    StreamOutcome::Violation(violation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use streamchat_protocol::{MessageId, SenderKind};

    fn room(id: &str) -> RoomId { RoomId::from(id) }

    fn reply(room_id: &str, content: &str) -> ChatMessage {
        ChatMessage {
            id: MessageId::from("m1"),
            room_id: RoomId::from(room_id),
            sender: SenderKind::Assistant,
            content: content.into(),
            created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn start_chunk_end_scenario() {
        let active = room("r1");
        let mut m = StreamMachine::default();
        assert_eq!(m.start(None, Some(&active)), StreamOutcome::Started);
        assert!(m.is_streaming());
        assert_eq!(m.text(), "");
        assert_eq!(m.chunk("Hi", None, Some(&active)), StreamOutcome::Appended);
        assert_eq!(m.text(), "Hi");
        assert_eq!(m.chunk(" there", None, Some(&active)), StreamOutcome::Appended);
        assert_eq!(m.text(), "Hi there");

        let outcome = m.end(reply("r1", "Hi there!"), Some(&active));
        assert_eq!(outcome, StreamOutcome::Finished(reply("r1", "Hi there!")));
        assert!(!m.is_streaming());
        assert_eq!(m.text(), "");
    }

    #[test]
    fn chunks_are_kept_verbatim_in_order() {
        let active = room("r1");
        let mut m = StreamMachine::default();
        m.start(Some(&active), Some(&active));
        for c in ["a", "a", " ", "", "b"] {
            m.chunk(c, Some(&active), Some(&active));
        }
        assert_eq!(m.text(), "aa b");
    }

    #[test]
    fn overlapping_start_resets_and_keeps_streaming() {
        let active = room("r1");
        let mut m = StreamMachine::default();
        m.start(None, Some(&active));
        m.chunk("partial", None, Some(&active));
        assert_eq!(
            m.start(None, Some(&active)),
            StreamOutcome::Violation(ProtocolViolation::OverlappingStart)
        );
        assert!(m.is_streaming());
        assert_eq!(m.text(), "");
    }

    #[test]
    fn chunk_and_end_while_idle_are_violations() {
        let active = room("r1");
        let mut m = StreamMachine::default();
        assert_eq!(
            m.chunk("x", None, Some(&active)),
            StreamOutcome::Violation(ProtocolViolation::ChunkWhileIdle)
        );
        assert_eq!(
            m.end(reply("r1", "x"), Some(&active)),
            StreamOutcome::Violation(ProtocolViolation::EndWhileIdle)
        );
        assert_eq!(m.state(), &StreamState::Idle);
    }

    #[test]
    fn room_change_mid_stream_abandons() {
        let mut m = StreamMachine::default();
        m.start(None, Some(&room("r1")));
        m.chunk("Hel", None, Some(&room("r1")));
        assert_eq!(m.chunk("lo", None, Some(&room("r2"))), StreamOutcome::Abandoned);
        assert_eq!(m.state(), &StreamState::Idle);

        m.start(None, Some(&room("r1")));
        assert_eq!(m.end(reply("r1", "Hello"), None), StreamOutcome::Abandoned);
        assert!(!m.is_streaming());
    }

    #[test]
    fn events_tagged_for_other_rooms_are_ignored() {
        let active = room("r1");
        let mut m = StreamMachine::default();
        assert_eq!(m.start(Some(&room("r9")), Some(&active)), StreamOutcome::Ignored);
        assert!(!m.is_streaming());
        assert_eq!(m.chunk("x", Some(&room("r9")), Some(&active)), StreamOutcome::Ignored);
        assert_eq!(m.end(reply("r9", "x"), Some(&active)), StreamOutcome::Ignored);

        m.start(None, Some(&active));
        assert_eq!(m.chunk("x", Some(&room("r9")), Some(&active)), StreamOutcome::Ignored);
        assert_eq!(m.text(), "");
        assert!(m.is_streaming());
    }

    #[test]
    fn no_stream_without_active_room() {
        let mut m = StreamMachine::default();
        assert_eq!(m.start(None, None), StreamOutcome::Ignored);
        assert!(!m.abandon());
    }
}
