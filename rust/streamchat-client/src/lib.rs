//! Streamchat Client
//!
//! Real-time session controller for an AI-backed chat service.
//!
//! - [`ChatSession`] owns the credential, the realtime [`Transport`], the
//!   active room binding and the per-room conversation, and applies every
//!   inbound channel event through a single intake.
//! - [`Transport`] keeps one channel at a time behind a stable object;
//!   subscriptions survive reconnects.
//! - [`ChatApi`] is the REST collaborator (login, rooms, history);
//!   [`HttpChatApi`] talks to the HTTP backend with reqwest.
//! - [`WsConnector`] opens WebSocket channels; [`MemoryConnector`] simulates
//!   them in-process.
//!
//! Simulated session (not run here):
//! ```no_run
//! use std::sync::Arc;
//! use streamchat_client::{ChatSession, HttpChatApi, ClientConfig, MemoryConnector};
//! use streamchat_protocol::ServerEvent;
//! # async fn run() -> Result<(), streamchat_client::ClientError> {
//! let connector = MemoryConnector::auto_accept();
//! let api = HttpChatApi::new(&ClientConfig::default())?;
//! let mut session = ChatSession::new(Arc::new(api), Arc::new(connector.clone()));
//! session.resume("stored-token").await?;
//! connector.push(ServerEvent::StreamStart { room_id: None });
//! session.pump();
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod binding;
pub mod config;
pub mod conversation;
pub mod credential;
pub mod error;
pub mod session;
pub mod stream;
pub mod transport;

pub use streamchat_protocol as protocol;

pub use api::{AuthGrant, ChatApi, HttpChatApi, Registration, UserProfile};
pub use config::ClientConfig;
pub use credential::{Credential, CredentialStore};
pub use error::ClientError;
pub use session::{ChatSession, SessionSnapshot};
pub use stream::{ProtocolViolation, StreamOutcome, StreamState};
pub use transport::{
    memory::MemoryConnector, ws::WsConnector, ConnectionState, Connector, SubscriptionId, Transport,
};
