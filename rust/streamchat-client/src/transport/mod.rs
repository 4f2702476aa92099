//! Transport connection: one realtime channel at a time behind a stable
//! object.
//!
//! Handlers are registered on [`Transport`], not on a channel, so they
//! survive reconnects. Each connect attempt gets a fresh epoch; everything a
//! channel reports travels through one ordered queue tagged with that epoch,
//! and anything tagged with an older epoch is discarded.
use std::{collections::HashMap, fmt, sync::Arc};

use streamchat_protocol::{ClientDirective, EventKind, ServerEvent};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::{credential::Credential, error::ClientError};

pub mod memory;
pub mod ws;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Outbound half of an open channel.
pub trait ChannelSink: Send {
    fn send(&mut self, directive: &ClientDirective) -> Result<(), ClientError>;
    /// Tear the channel down. Must be safe to call more than once.
    fn close(&mut self);
}

/// Opens channels. Implementations report the handshake outcome and all
/// inbound traffic through `events`, in delivery order.
pub trait Connector: Send + Sync {
    fn open(&self, credential: &Credential, events: ChannelEvents);
}

pub enum ChannelEvent {
    Opened(Box<dyn ChannelSink>),
    OpenFailed(ClientError),
    Event(ServerEvent),
    Closed,
}

impl fmt::Debug for ChannelEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelEvent::Opened(_) => f.write_str("Opened"),
            ChannelEvent::OpenFailed(e) => f.debug_tuple("OpenFailed").field(e).finish(),
            ChannelEvent::Event(ev) => f.debug_tuple("Event").field(ev).finish(),
            ChannelEvent::Closed => f.write_str("Closed"),
        }
    }
}

/// A channel event tagged with the connect attempt that produced it.
#[derive(Debug)]
pub struct Inbound {
    pub epoch: u64,
    pub event: ChannelEvent,
}

/// Posting handle given to a [`Connector`] for one connect attempt.
#[derive(Clone)]
pub struct ChannelEvents {
    epoch: u64,
    tx: mpsc::UnboundedSender<Inbound>,
}

impl ChannelEvents {
    pub fn new(epoch: u64, tx: mpsc::UnboundedSender<Inbound>) -> Self { Self { epoch, tx } }

    pub fn epoch(&self) -> u64 { self.epoch }

    /// Each method returns false once the receiving session is gone.
    pub fn opened(&self, sink: Box<dyn ChannelSink>) -> bool { self.post(ChannelEvent::Opened(sink)) }

    pub fn failed(&self, error: ClientError) -> bool { self.post(ChannelEvent::OpenFailed(error)) }

    pub fn event(&self, event: ServerEvent) -> bool { self.post(ChannelEvent::Event(event)) }

    pub fn closed(&self) -> bool { self.post(ChannelEvent::Closed) }

    fn post(&self, event: ChannelEvent) -> bool {
        self.tx.send(Inbound { epoch: self.epoch, event }).is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type Handler = Box<dyn FnMut(&ServerEvent) + Send>;

#[derive(Default)]
struct Handlers {
    next_id: u64,
    by_kind: HashMap<EventKind, Vec<(SubscriptionId, Handler)>>,
}

impl Handlers {
    fn add(&mut self, kind: EventKind, handler: Handler) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.by_kind.entry(kind).or_default().push((id, handler));
        id
    }

    fn remove(&mut self, id: SubscriptionId) -> bool {
        for list in self.by_kind.values_mut() {
            let before = list.len();
            list.retain(|(h, _)| *h != id);
            if list.len() != before {
                return true;
            }
        }
        false
    }

    fn dispatch(&mut self, event: &ServerEvent) {
        if let Some(list) = self.by_kind.get_mut(&event.kind()) {
            for (_, handler) in list.iter_mut() {
                handler(event);
            }
        }
    }

    fn count(&self, kind: EventKind) -> usize { self.by_kind.get(&kind).map_or(0, Vec::len) }
}

/// What an accepted inbound event meant for the connection.
#[derive(Debug)]
pub enum Transition {
    Connected,
    ConnectFailed(ClientError),
    Lost,
    Event(ServerEvent),
}

pub struct Transport {
    connector: Arc<dyn Connector>,
    inbound: mpsc::UnboundedSender<Inbound>,
    state: ConnectionState,
    epoch: u64,
    sink: Option<Box<dyn ChannelSink>>,
    handlers: Handlers,
}

impl Transport {
    pub fn new(connector: Arc<dyn Connector>, inbound: mpsc::UnboundedSender<Inbound>) -> Self {
        Self {
            connector,
            inbound,
            state: ConnectionState::Disconnected,
            epoch: 0,
            sink: None,
            handlers: Handlers::default(),
        }
    }

    pub fn state(&self) -> ConnectionState { self.state }

    pub fn is_connected(&self) -> bool { self.state == ConnectionState::Connected }

    /// Identifier of the current (or last) connect attempt.
    pub fn epoch(&self) -> u64 { self.epoch }

    /// Start connecting unless a channel is already open or opening.
    pub fn connect(&mut self, credential: &Credential) {
        if self.state != ConnectionState::Disconnected {
            debug!(state=?self.state, "connect ignored: channel already open or opening");
            return;
        }
        self.epoch += 1;
        self.state = ConnectionState::Connecting;
        info!(epoch = self.epoch, "connecting realtime channel");
        self.connector
            .open(credential, ChannelEvents::new(self.epoch, self.inbound.clone()));
    }

    /// Drop the channel. Idempotent.
    pub fn disconnect(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            sink.close();
        }
        if self.state != ConnectionState::Disconnected {
            // Invalidate anything still in flight from the old channel.
            self.epoch += 1;
            info!(epoch = self.epoch, "realtime channel disconnected");
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Send a directive; returns false when it was dropped.
    pub fn send(&mut self, directive: &ClientDirective) -> bool {
        let sink = match (self.state, self.sink.as_mut()) {
            (ConnectionState::Connected, Some(sink)) => sink,
            _ => {
                debug!(directive = directive.kind().name(), state=?self.state, "dropping directive: not connected");
                return false;
            }
        };
        match sink.send(directive) {
            Ok(()) => true,
            Err(e) => {
                warn!(directive = directive.kind().name(), %e, "send failed");
                false
            }
        }
    }

    pub fn subscribe(
        &mut self,
        kind: EventKind,
        handler: impl FnMut(&ServerEvent) + Send + 'static,
    ) -> SubscriptionId {
        self.handlers.add(kind, Box::new(handler))
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool { self.handlers.remove(id) }

    pub fn handler_count(&self, kind: EventKind) -> usize { self.handlers.count(kind) }

    pub(crate) fn dispatch(&mut self, event: &ServerEvent) { self.handlers.dispatch(event) }

    /// Apply one inbound event to the connection state. Returns `None` for
    /// stale or out-of-place events.
    pub(crate) fn accept(&mut self, inbound: Inbound) -> Option<Transition> {
        if inbound.epoch != self.epoch {
            trace!(epoch = inbound.epoch, current = self.epoch, event=?inbound.event, "ignoring stale channel event");
            if let ChannelEvent::Opened(mut sink) = inbound.event {
                sink.close();
            }
            return None;
        }
        match inbound.event {
            ChannelEvent::Opened(mut sink) => {
                if self.state != ConnectionState::Connecting {
                    sink.close();
                    return None;
                }
                self.sink = Some(sink);
                self.state = ConnectionState::Connected;
                info!(epoch = self.epoch, "realtime channel connected");
                Some(Transition::Connected)
            }
            ChannelEvent::OpenFailed(e) => {
                if self.state != ConnectionState::Connecting {
                    return None;
                }
                self.state = ConnectionState::Disconnected;
                warn!(epoch = self.epoch, %e, "realtime handshake failed");
                Some(Transition::ConnectFailed(e))
            }
            ChannelEvent::Event(event) => {
                if self.state != ConnectionState::Connected {
                    debug!(event = event.kind().name(), "ignoring event outside an open channel");
                    return None;
                }
                Some(Transition::Event(event))
            }
            ChannelEvent::Closed => {
                if self.state == ConnectionState::Disconnected {
                    return None;
                }
                self.sink = None;
                self.state = ConnectionState::Disconnected;
                warn!(epoch = self.epoch, "realtime channel lost");
                Some(Transition::Lost)
            }
        }
    }
}
