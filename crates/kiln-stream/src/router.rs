//! Event fan-out to registered listeners.
//!
//! Routing runs on the receive-loop task, so delivery must never block:
//! saturated targets drop the event (the listener's consecutive-drop
//! counter decides when it gets evicted), closed targets are evicted
//! immediately, and one listener's outcome never affects another's.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use kiln_core::events::PromptEvent;

use crate::listener::DeliveryOutcome;
use crate::registry::{ListenerRegistry, RegisteredListener};

/// Dispatches decoded events to the registry's listeners.
pub struct EventRouter {
    registry: Arc<ListenerRegistry>,
    max_consecutive_drops: u32,
}

impl EventRouter {
    /// Create a router over a registry.
    #[must_use]
    pub fn new(registry: Arc<ListenerRegistry>, max_consecutive_drops: u32) -> Self {
        Self {
            registry,
            max_consecutive_drops,
        }
    }

    /// Deliver an event to every interested listener.
    ///
    /// Events carrying a prompt ID go to that prompt's listeners plus
    /// wildcards; events without one (connection-level) go to everyone.
    /// Each listener sees its own events in the order they arrived here.
    pub fn route(&self, event: &PromptEvent) {
        let listeners = match &event.prompt_id {
            Some(prompt) => self.registry.listeners_for(prompt),
            None => self.registry.all_listeners(),
        };
        if listeners.is_empty() {
            trace!(kind = %event.kind, "no listeners for event");
            return;
        }
        debug!(kind = %event.kind, recipients = listeners.len(), "routing event");

        for listener in listeners {
            self.deliver_one(&listener, event);
        }
    }

    fn deliver_one(&self, listener: &RegisteredListener, event: &PromptEvent) {
        match listener.target().deliver(event.clone()) {
            DeliveryOutcome::Delivered => listener.reset_drops(),
            DeliveryOutcome::Saturated => {
                let drops = listener.record_drop();
                warn!(
                    listener_id = %listener.handle().id(),
                    drops,
                    kind = %event.kind,
                    "listener saturated, dropping event"
                );
                if drops >= self.max_consecutive_drops {
                    self.registry.dispatch_failure(&listener.handle());
                }
            }
            DeliveryOutcome::Closed => {
                self.registry.dispatch_failure(&listener.handle());
            }
        }
    }
}
