// ABOUTME: Dispatch table mapping event names to ordered handler registrations.
// ABOUTME: Guarded by a RwLock so handlers can be registered while the worker dispatches.

use crate::session::SessionInfo;
use futures::future::BoxFuture;
use mirai_gateway::{GatewayClient, MessageOrEvent};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

/// Runtime filter evaluated against an event body before its handler runs
pub type Predicate = Arc<dyn Fn(&MessageOrEvent) -> bool + Send + Sync>;

/// Async event handler: receives the body, the session view and the gateway
pub type Handler = Arc<
    dyn Fn(
            MessageOrEvent,
            Arc<SessionInfo>,
            Arc<dyn GatewayClient>,
        ) -> BoxFuture<'static, anyhow::Result<()>>
        + Send
        + Sync,
>;

/// One `(predicate, handler)` entry
#[derive(Clone)]
pub struct Registration {
    pub predicate: Option<Predicate>,
    pub handler: Handler,
}

impl Registration {
    /// An entry without a predicate always matches
    pub fn matches(&self, body: &MessageOrEvent) -> bool {
        match &self.predicate {
            Some(predicate) => predicate(body),
            None => true,
        }
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("predicate", &self.predicate.is_some())
            .finish_non_exhaustive()
    }
}

/// Per-session handler table.
///
/// Entries only ever get appended. Clones share the same table.
#[derive(Clone, Default)]
pub struct DispatchTable {
    entries: Arc<RwLock<HashMap<String, Vec<Registration>>>>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a registration for `event`, creating the entry list if needed
    pub fn register(&self, event: &str, predicate: Option<Predicate>, handler: Handler) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries
            .entry(event.to_string())
            .or_default()
            .push(Registration { predicate, handler });
        tracing::debug!(
            event,
            registrations = entries[event].len(),
            "Handler registered"
        );
    }

    /// Start a fluent registration for `event`
    pub fn on(&self, event: &str) -> HandlerBuilder<'_> {
        HandlerBuilder {
            table: self,
            event: event.to_string(),
            predicate: None,
        }
    }

    /// Snapshot of the registrations for `event`, in registration order.
    ///
    /// The lock is released before returning so callers can await handlers.
    pub fn handlers_for(&self, event: &str) -> Vec<Registration> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(event)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of registrations for `event`
    pub fn count(&self, event: &str) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(event)
            .map_or(0, Vec::len)
    }

    /// Event names with at least one registration
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }
}

/// Fluent registration: `table.on("GroupMessage").when(pred).handle(f)`
pub struct HandlerBuilder<'a> {
    table: &'a DispatchTable,
    event: String,
    predicate: Option<Predicate>,
}

impl HandlerBuilder<'_> {
    /// Only run the handler when `predicate` holds for the body
    pub fn when<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&MessageOrEvent) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Register `handler` and finish
    pub fn handle<F, Fut>(self, handler: F)
    where
        F: Fn(MessageOrEvent, Arc<SessionInfo>, Arc<dyn GatewayClient>) -> Fut
            + Send
            + Sync
            + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler: Handler = Arc::new(
            move |body: MessageOrEvent,
                  session: Arc<SessionInfo>,
                  gateway: Arc<dyn GatewayClient>|
                  -> BoxFuture<'static, anyhow::Result<()>> {
                Box::pin(handler(body, session, gateway))
            },
        );
        self.table.register(&self.event, self.predicate, handler);
    }
}
