//! In-process connector for tests and simulations.
//!
//! The "server side" is driven by hand: accept or reject the handshake, push
//! events, drop the connection, and inspect what the client sent.
use std::sync::Arc;

use parking_lot::Mutex;
use streamchat_protocol::{ClientDirective, ServerEvent};

use super::{ChannelEvents, ChannelSink, Connector};
use crate::{credential::Credential, error::ClientError};

#[derive(Default)]
struct MemoryState {
    auto_accept: bool,
    credentials: Vec<Credential>,
    current: Option<ChannelEvents>,
    sent: Vec<ClientDirective>,
    closes: usize,
}

#[derive(Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryConnector {
    /// Handshakes stay pending until [`accept`](Self::accept) or
    /// [`reject`](Self::reject).
    pub fn new() -> Self { Self::default() }

    /// Every handshake succeeds immediately.
    pub fn auto_accept() -> Self {
        let connector = Self::default();
        connector.state.lock().auto_accept = true;
        connector
    }

    pub fn accept(&self) -> bool {
        match self.current_events() {
            Some(events) => events.opened(Box::new(self.sink())),
            None => false,
        }
    }

    pub fn reject(&self, error: ClientError) -> bool {
        self.current_events().is_some_and(|events| events.failed(error))
    }

    /// Deliver a server event on the latest channel.
    pub fn push(&self, event: ServerEvent) -> bool {
        self.current_events().is_some_and(|events| events.event(event))
    }

    /// Simulate the server dropping the latest channel.
    pub fn drop_connection(&self) -> bool {
        self.current_events().is_some_and(|events| events.closed())
    }

    /// Posting handle of the latest connect attempt.
    pub fn current_events(&self) -> Option<ChannelEvents> { self.state.lock().current.clone() }

    pub fn credentials(&self) -> Vec<Credential> { self.state.lock().credentials.clone() }

    pub fn open_attempts(&self) -> usize { self.state.lock().credentials.len() }

    pub fn sent(&self) -> Vec<ClientDirective> { self.state.lock().sent.clone() }

    pub fn take_sent(&self) -> Vec<ClientDirective> { std::mem::take(&mut self.state.lock().sent) }

    /// Number of times a channel was closed from the client side.
    pub fn closes(&self) -> usize { self.state.lock().closes }

    fn sink(&self) -> MemorySink { MemorySink { state: self.state.clone(), closed: false } }
}

impl Connector for MemoryConnector {
    fn open(&self, credential: &Credential, events: ChannelEvents) {
        let auto_accept = {
            let mut state = self.state.lock();
            state.credentials.push(credential.clone());
            state.current = Some(events.clone());
            state.auto_accept
        };
        if auto_accept {
            events.opened(Box::new(self.sink()));
        }
    }
}

struct MemorySink {
    state: Arc<Mutex<MemoryState>>,
    closed: bool,
}

impl ChannelSink for MemorySink {
    fn send(&mut self, directive: &ClientDirective) -> Result<(), ClientError> {
        if self.closed {
            return Err(ClientError::ChannelClosed);
        }
        self.state.lock().sent.push(directive.clone());
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.lock().closes += 1;
        }
    }
}
