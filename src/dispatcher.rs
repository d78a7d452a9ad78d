//! Priority-ordered event delivery.
//!
//! Handlers run in ascending priority; registrations with equal priority run in
//! the order they were made. The event name is appended to the subject's log
//! before any handler runs, so `has_event` holds even when nobody listens.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::errors::CrudError;
use crate::event::{Event, EventContext};
use crate::listener::Listener;

/// Closure handler registered through [`CrudController::on`](crate::CrudController::on)
pub type Callback = Arc<dyn Fn(&mut EventContext<'_>) -> Result<(), CrudError> + Send + Sync>;

/// Something that can receive a dispatched event
#[derive(Clone)]
pub enum Handler {
    Listener(Arc<dyn Listener>),
    Callback(Callback),
}

impl Handler {
    fn call(&self, ctx: &mut EventContext<'_>) -> Result<(), CrudError> {
        match self {
            Self::Listener(listener) => listener.handle(ctx),
            Self::Callback(callback) => callback(ctx),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listener(listener) => write!(f, "Listener({})", listener.name()),
            Self::Callback(_) => f.write_str("Callback"),
        }
    }
}

#[derive(Debug, Clone)]
struct Registration {
    listener_id: String,
    handler: Handler,
    priority: i32,
    sequence: u64,
}

/// Result of a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatched {
    /// A handler stopped propagation
    pub stopped: bool,
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    prefix: String,
    logging: bool,
    registrations: HashMap<Event, Vec<Registration>>,
    next_sequence: u64,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new("Crud")
    }
}

impl Dispatcher {
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            logging: false,
            registrations: HashMap::new(),
            next_sequence: 0,
        }
    }

    /// Log every dispatch at debug level
    #[must_use]
    pub fn with_logging(mut self, logging: bool) -> Self {
        self.logging = logging;
        self
    }

    /// Full name recorded in the subject's event log, e.g. `"Crud.beforeRender"`
    #[must_use]
    pub fn event_name(&self, event: Event) -> String {
        format!("{}.{}", self.prefix, event.name())
    }

    /// Register `handler` for `event`. Registering the same `listener_id` for the
    /// same event again replaces the earlier entry.
    pub fn subscribe(&mut self, event: Event, listener_id: &str, handler: Handler, priority: i32) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let entries = self.registrations.entry(event).or_default();
        entries.retain(|entry| entry.listener_id != listener_id);
        entries.push(Registration {
            listener_id: listener_id.to_string(),
            handler,
            priority,
            sequence,
        });
        entries.sort_by_key(|entry| (entry.priority, entry.sequence));
    }

    /// Remove every registration made under `listener_id`
    pub fn unsubscribe(&mut self, listener_id: &str) {
        for entries in self.registrations.values_mut() {
            entries.retain(|entry| entry.listener_id != listener_id);
        }
        self.registrations.retain(|_, entries| !entries.is_empty());
    }

    /// Listener ids registered for `event`, in dispatch order
    #[must_use]
    pub fn listeners_for(&self, event: Event) -> Vec<&str> {
        self.registrations
            .get(&event)
            .map(|entries| entries.iter().map(|entry| entry.listener_id.as_str()).collect())
            .unwrap_or_default()
    }

    /// Deliver the context's event to every handler.
    ///
    /// # Errors
    ///
    /// The first error a handler returns aborts the dispatch and is returned as is.
    pub fn dispatch(&self, ctx: &mut EventContext<'_>) -> Result<Dispatched, CrudError> {
        let event = ctx.event();
        let name = self.event_name(event);
        ctx.subject.add_event(name.clone());

        if self.logging {
            tracing::debug!(
                event = %name,
                action = ctx.subject.action().unwrap_or("-"),
                "Dispatching event"
            );
        }

        if let Some(entries) = self.registrations.get(&event) {
            for entry in entries {
                entry.handler.call(ctx)?;
                if ctx.is_stopped() {
                    if self.logging {
                        tracing::debug!(
                            event = %name,
                            listener = %entry.listener_id,
                            "Propagation stopped"
                        );
                    }
                    break;
                }
            }
        }

        Ok(Dispatched {
            stopped: ctx.is_stopped(),
        })
    }
}
