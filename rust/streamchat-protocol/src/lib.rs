//! # Streamchat Realtime Protocol (Rust)
//!
//! Typed vocabulary and JSON text-frame codec for the realtime chat channel,
//! shared by the Rust client and server crates.
//!
//! ## Guarantees
//! - Enforces the 256 KiB per-frame limit on encode and decode
//! - Accepts numeric or string ids and naive backend timestamps on input
//! - Rejects unknown event names so readers can skip them
//!
//! ## Crate layout
//! - `protocol`: ids, `ChatMessage`, `Room`, `ServerEvent`, `ClientDirective`
//! - `encoding`: `encode_*`, `decode_*` and `try_decode_*` helpers
//!
//! ## Quick start
//!
//! ```
//! use streamchat_protocol::{decode_directive, encode_directive, ClientDirective, RoomId};
//!
//! let msg = ClientDirective::JoinChat { room_id: RoomId::from("room-123") };
//! let text = encode_directive(&msg).unwrap();
//! assert_eq!(text, r#"{"event":"join_chat","data":{"chat_id":"room-123"}}"#);
//! assert_eq!(decode_directive(&text).unwrap(), msg);
//! ```
//!
//! ## Streaming decode
//!
//! ```
//! use streamchat_protocol::{try_decode_event, ServerEvent};
//!
//! let ev = try_decode_event(r#"{"event":"ai_stream_chunk","data":{"chunk":"Hi","chat_id":7}}"#);
//! assert!(matches!(ev, Some(ServerEvent::StreamChunk { .. })));
//! ```

pub mod encoding;
pub mod protocol;

pub use encoding::{
    decode_directive, decode_event, encode_directive, encode_event, try_decode_directive,
    try_decode_event, CodecError,
};
pub use protocol::*;
