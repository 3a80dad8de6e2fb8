use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::SupervisorError;

/// Kinds of supervisor events a handler can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Restart,
}

/// Events published on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// Relaunch the named worker from scratch
    Restart { worker: String },
}

impl SupervisorEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SupervisorEvent::Restart { .. } => EventKind::Restart,
        }
    }

    pub fn worker(&self) -> &str {
        match self {
            SupervisorEvent::Restart { worker } => worker,
        }
    }
}

pub type Handler = Arc<dyn Fn(&SupervisorEvent) -> anyhow::Result<()> + Send + Sync>;

/// Returned by [`EventBus::on`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Same-thread pub/sub.
///
/// Handlers run synchronously inside [`EventBus::emit`]. A handler that needs
/// to do async work spawns it; the bus never waits for that work. There is no
/// error boundary: the first failing handler aborts the emission and its error
/// is returned to whoever called `emit`.
#[derive(Default)]
pub struct EventBus {
    handlers: HashMap<EventKind, Vec<(SubscriptionId, Handler)>>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; every registered handler sees every emission once
    pub fn on<F>(&mut self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&SupervisorEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;

        self.handlers
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));

        debug!("📡 Subscribed handler {:?} to {:?}", id, kind);
        id
    }

    /// Remove a handler. Returns false if it was not registered.
    pub fn off(&mut self, id: SubscriptionId) -> bool {
        for handlers in self.handlers.values_mut() {
            if let Some(pos) = handlers.iter().position(|(hid, _)| *hid == id) {
                handlers.remove(pos);
                debug!("📡 Unsubscribed handler {:?}", id);
                return true;
            }
        }
        false
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }

    /// Invoke every handler for the event's kind. Returns how many ran.
    pub fn emit(&self, event: &SupervisorEvent) -> Result<usize, SupervisorError> {
        let Some(handlers) = self.handlers.get(&event.kind()) else {
            trace!("No handlers for {:?}", event);
            return Ok(0);
        };

        for (_, handler) in handlers {
            handler(event).map_err(|source| SupervisorError::Handler {
                worker: event.worker().to_string(),
                source,
            })?;
        }

        Ok(handlers.len())
    }
}
