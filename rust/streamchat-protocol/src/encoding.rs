//! JSON text-frame encoder/decoder.
//!
//! A frame is `{"event": <name>, "data": <payload>}`. Encoding enforces the
//! 256KB frame limit; decoding rejects unknown event names so readers can
//! skip them with the `try_` variants.
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::protocol::{ClientDirective, ServerEvent, MAX_FRAME_SIZE};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("frame of {size} bytes exceeds the {MAX_FRAME_SIZE} byte limit")]
    TooLarge { size: usize },
    #[error("invalid frame: {0}")]
    Json(#[from] serde_json::Error),
}

fn encode_frame<T: Serialize>(frame: &T) -> Result<String, CodecError> {
    let text = serde_json::to_string(frame)?;
    if text.len() > MAX_FRAME_SIZE {
        return Err(CodecError::TooLarge { size: text.len() });
    }
    Ok(text)
}

fn decode_frame<T: DeserializeOwned>(text: &str) -> Result<T, CodecError> {
    if text.len() > MAX_FRAME_SIZE {
        return Err(CodecError::TooLarge { size: text.len() });
    }
    Ok(serde_json::from_str(text)?)
}

/// Encode a server event into a text frame.
pub fn encode_event(event: &ServerEvent) -> Result<String, CodecError> { encode_frame(event) }

/// Decode a server event, reporting why a frame was rejected.
pub fn decode_event(text: &str) -> Result<ServerEvent, CodecError> { decode_frame(text) }

/// Decode a server event, returning `None` for unknown or malformed frames.
pub fn try_decode_event(text: &str) -> Option<ServerEvent> { decode_event(text).ok() }

pub fn encode_directive(directive: &ClientDirective) -> Result<String, CodecError> {
    encode_frame(directive)
}

pub fn decode_directive(text: &str) -> Result<ClientDirective, CodecError> { decode_frame(text) }

pub fn try_decode_directive(text: &str) -> Option<ClientDirective> {
    decode_directive(text).ok()
}
