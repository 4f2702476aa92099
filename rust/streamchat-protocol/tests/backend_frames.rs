// Frames as emitted by the Socket.IO backend (payload bodies copied from its
// `emit` calls), checked against the Rust decoder.
use streamchat_protocol::{
    decode_event, encode_event, try_decode_directive, ChatMessage, ClientDirective, EventKind,
    MessageId, RoomId, SenderKind, ServerEvent,
};

fn frame(event: &str, data: serde_json::Value) -> String {
    serde_json::json!({ "event": event, "data": data }).to_string()
}

#[test]
fn message_saved_user_echo() {
    let text = frame(
        "message_saved",
        serde_json::json!({
            "id": 41,
            "content": "hello",
            "sender_type": "user",
            "created_at": "2025-01-09T08:00:00.000001",
            "chat_id": 5
        }),
    );
    let ev = decode_event(&text).expect("decode message_saved");
    assert_eq!(ev.kind(), EventKind::MessageSaved);
    assert_eq!(ev.room_id(), Some(&RoomId::from("5")));
    match ev {
        ServerEvent::MessageSaved(m) => {
            assert_eq!(m.id, MessageId::from("41"));
            assert_eq!(m.sender, SenderKind::User);
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn full_stream_sequence_decodes_in_order() {
    let frames = [
        frame("ai_stream_start", serde_json::json!({ "chat_id": 5 })),
        frame("ai_stream_chunk", serde_json::json!({ "chunk": "Thanks ", "chat_id": 5 })),
        frame("ai_stream_chunk", serde_json::json!({ "chunk": "for sharing", "chat_id": 5 })),
        frame(
            "ai_stream_end",
            serde_json::json!({
                "id": 42,
                "content": "Thanks for sharing",
                "sender_type": "ai",
                "created_at": "2025-01-09T08:00:01+00:00",
                "chat_id": 5
            }),
        ),
    ];
    let kinds: Vec<EventKind> = frames
        .iter()
        .map(|f| decode_event(f).expect("decode").kind())
        .collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::StreamStart,
            EventKind::StreamChunk,
            EventKind::StreamChunk,
            EventKind::StreamEnd
        ]
    );
}

#[test]
fn error_event_carries_message() {
    let ev = decode_event(&frame("error", serde_json::json!({ "message": "Not authenticated" })))
        .expect("decode error");
    assert_eq!(ev, ServerEvent::Error { message: "Not authenticated".into() });
}

#[test]
fn encoded_event_is_decodable() {
    let msg = ChatMessage {
        id: MessageId::from("m1"),
        room_id: RoomId::from("room-7"),
        sender: SenderKind::Assistant,
        content: "Hi there!".into(),
        created_at: chrono::DateTime::from_timestamp(1_700_000_000, 0).expect("timestamp"),
    };
    let text = encode_event(&ServerEvent::StreamEnd(msg.clone())).expect("encode");
    assert!(text.contains("\"sender_type\":\"ai\""));
    assert_eq!(decode_event(&text).expect("decode"), ServerEvent::StreamEnd(msg));
}

#[test]
fn send_message_defaults_stream_to_false() {
    let d = try_decode_directive(r#"{"event":"send_message","data":{"chat_id":1,"content":"hi"}}"#)
        .expect("decode send_message");
    assert_eq!(
        d,
        ClientDirective::SendMessage { room_id: RoomId::from("1"), content: "hi".into(), stream: false }
    );
}
