use thiserror::Error;

/// Errors that may occur in the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// WebSocket handshake returned 401 Unauthorized.
    #[error("unauthorized")]
    Unauthorized,
    /// Underlying WebSocket error.
    #[error("websocket error: {0}")]
    Ws(Box<tokio_tungstenite::tungstenite::Error>),
    /// Frame encoding/decoding error.
    #[error("protocol error: {0}")]
    Protocol(#[from] streamchat_protocol::CodecError),
    /// The channel writer has gone away.
    #[error("channel closed")]
    ChannelClosed,
    /// Network or body error from the REST collaborator.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// The REST collaborator answered with a non-success status.
    #[error("request failed ({status}): {detail}")]
    Api { status: u16, detail: String },
    /// A command that needs a credential ran without one.
    #[error("not authenticated")]
    NotAuthenticated,
    /// No room is bound.
    #[error("no active room")]
    NoActiveRoom,
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self { ClientError::Ws(Box::new(e)) }
}

impl ClientError {
    /// Whether the failure means the credential was rejected.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            ClientError::Unauthorized | ClientError::NotAuthenticated => true,
            ClientError::Api { status, .. } => *status == 401 || *status == 403,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_error_display() {
        let e = ClientError::Api { status: 400, detail: "Email already registered".into() };
        assert_eq!(format!("{}", e), "request failed (400): Email already registered");
    }

    #[test]
    fn auth_failures_are_classified() {
        assert!(ClientError::Unauthorized.is_auth_failure());
        assert!(ClientError::Api { status: 401, detail: String::new() }.is_auth_failure());
        assert!(!ClientError::Api { status: 500, detail: String::new() }.is_auth_failure());
        assert!(!ClientError::ChannelClosed.is_auth_failure());
    }
}
