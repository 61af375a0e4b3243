//! Listener delivery targets and registration handles.
//!
//! A listener is either a closure invoked inline or the sending half of a
//! bounded channel. Both expose the same deliver-or-signal-failure
//! contract: delivery never blocks the caller, and the outcome says
//! whether the target took the event, was saturated, or is gone.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use kiln_core::events::PromptEvent;
use kiln_core::ids::{ListenerId, PromptId};

/// Which events a listener wants.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PromptFilter {
    /// Events for one prompt (plus connection-level events).
    Prompt(PromptId),
    /// Every event, regardless of prompt.
    All,
}

impl PromptFilter {
    /// Whether an event for `prompt` matches this filter.
    #[must_use]
    pub fn matches(&self, prompt: &PromptId) -> bool {
        match self {
            Self::Prompt(p) => p == prompt,
            Self::All => true,
        }
    }
}

/// Result of one delivery attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The target took the event.
    Delivered,
    /// The target's queue is full; the event was dropped for it.
    Saturated,
    /// The target is gone (receiver dropped). The listener should be evicted.
    Closed,
}

/// Where events for a listener go.
#[derive(Clone)]
pub enum DeliveryTarget {
    /// Invoke a closure inline on the routing task. Must be cheap; a slow
    /// callback delays delivery to listeners after it in the same pass.
    Callback(Arc<dyn Fn(PromptEvent) + Send + Sync>),
    /// Push onto a bounded channel with `try_send`.
    Channel(mpsc::Sender<PromptEvent>),
}

impl DeliveryTarget {
    /// Wrap a closure.
    #[must_use]
    pub fn callback(f: impl Fn(PromptEvent) + Send + Sync + 'static) -> Self {
        Self::Callback(Arc::new(f))
    }

    /// Wrap the sending half of a channel.
    #[must_use]
    pub fn channel(tx: mpsc::Sender<PromptEvent>) -> Self {
        Self::Channel(tx)
    }

    /// Attempt delivery without blocking.
    pub fn deliver(&self, event: PromptEvent) -> DeliveryOutcome {
        match self {
            Self::Callback(f) => {
                f(event);
                DeliveryOutcome::Delivered
            }
            Self::Channel(tx) => match tx.try_send(event) {
                Ok(()) => DeliveryOutcome::Delivered,
                Err(mpsc::error::TrySendError::Full(_)) => DeliveryOutcome::Saturated,
                Err(mpsc::error::TrySendError::Closed(_)) => DeliveryOutcome::Closed,
            },
        }
    }
}

impl fmt::Debug for DeliveryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Callback(_) => f.write_str("DeliveryTarget::Callback"),
            Self::Channel(_) => f.write_str("DeliveryTarget::Channel"),
        }
    }
}

/// Registration record returned by the registry.
///
/// Opaque to callers: it identifies the registration for
/// `remove_listener` and nothing else. Dropping a handle does not
/// unregister the listener.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ListenerHandle {
    pub(crate) id: ListenerId,
    pub(crate) filter: PromptFilter,
}

impl ListenerHandle {
    /// The listener's unique ID.
    #[must_use]
    pub fn id(&self) -> &ListenerId {
        &self.id
    }

    /// The filter this listener registered with.
    #[must_use]
    pub fn filter(&self) -> &PromptFilter {
        &self.filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_filter_matches_own_prompt() {
        let filter = PromptFilter::Prompt(PromptId::from("p1"));
        assert!(filter.matches(&PromptId::from("p1")));
        assert!(!filter.matches(&PromptId::from("p2")));
    }

    #[test]
    fn wildcard_filter_matches_everything() {
        let filter = PromptFilter::All;
        assert!(filter.matches(&PromptId::from("p1")));
        assert!(filter.matches(&PromptId::from("p2")));
    }

    #[test]
    fn callback_target_delivers_inline() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        let target = DeliveryTarget::callback(move |event| seen2.lock().push(event.kind));

        let outcome = target.deliver(PromptEvent::connection_open());
        assert_eq!(outcome, DeliveryOutcome::Delivered);
        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn channel_target_delivers() {
        let (tx, mut rx) = mpsc::channel(4);
        let target = DeliveryTarget::channel(tx);

        let outcome = target.deliver(PromptEvent::connection_open());
        assert_eq!(outcome, DeliveryOutcome::Delivered);
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn full_channel_reports_saturated() {
        let (tx, _rx) = mpsc::channel(1);
        let target = DeliveryTarget::channel(tx);

        assert_eq!(
            target.deliver(PromptEvent::connection_open()),
            DeliveryOutcome::Delivered
        );
        assert_eq!(
            target.deliver(PromptEvent::connection_open()),
            DeliveryOutcome::Saturated
        );
    }

    #[tokio::test]
    async fn closed_channel_reports_closed() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let target = DeliveryTarget::channel(tx);

        assert_eq!(
            target.deliver(PromptEvent::connection_open()),
            DeliveryOutcome::Closed
        );
    }

    #[test]
    fn debug_does_not_expose_internals() {
        let target = DeliveryTarget::callback(|_| {});
        assert_eq!(format!("{target:?}"), "DeliveryTarget::Callback");
    }
}
