//! Decoded progress events.
//!
//! A [`PromptEvent`] is one unit of progress information, either decoded
//! from a wire frame or synthesized by the client for connection lifecycle
//! changes. Events are immutable once constructed and handed to listeners
//! by value.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::PromptId;

/// Kind tag of a [`PromptEvent`].
///
/// Wire kinds mirror the backend protocol; `ConnectionOpen` and
/// `ConnectionLost` are synthesized locally and never appear on the wire.
/// Unknown wire kinds are dropped by the codec before an event exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Queue/system status snapshot.
    Status,
    /// Execution of a queued prompt began.
    ExecutionStart,
    /// Per-node progress within an executing prompt.
    Progress,
    /// A preview image for the executing prompt is available.
    Preview,
    /// A node (or the whole prompt) finished and produced outputs.
    Executed,
    /// Execution failed.
    ExecutionError,
    /// The client established its connection to the backend.
    ConnectionOpen,
    /// The client lost its connection to the backend.
    ConnectionLost,
}

impl EventKind {
    /// Parse a wire `type` tag. Returns `None` for unknown kinds.
    #[must_use]
    pub fn from_wire(tag: &str) -> Option<Self> {
        match tag {
            "status" => Some(Self::Status),
            "execution_start" => Some(Self::ExecutionStart),
            "progress" => Some(Self::Progress),
            "preview" => Some(Self::Preview),
            "executed" => Some(Self::Executed),
            "execution_error" => Some(Self::ExecutionError),
            _ => None,
        }
    }

    /// The wire tag for this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::ExecutionStart => "execution_start",
            Self::Progress => "progress",
            Self::Preview => "preview",
            Self::Executed => "executed",
            Self::ExecutionError => "execution_error",
            Self::ConnectionOpen => "connection_open",
            Self::ConnectionLost => "connection_lost",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded unit of prompt progress.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PromptEvent {
    /// What happened.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// The prompt this event belongs to. `None` for connection-level
    /// events, which are delivered to every listener.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_id: Option<PromptId>,
    /// Kind-specific payload, kept as raw JSON.
    pub data: Value,
}

impl PromptEvent {
    /// Create an event.
    #[must_use]
    pub fn new(kind: EventKind, prompt_id: Option<PromptId>, data: Value) -> Self {
        Self {
            kind,
            prompt_id,
            data,
        }
    }

    /// Synthesized connection-established event.
    #[must_use]
    pub fn connection_open() -> Self {
        Self::new(EventKind::ConnectionOpen, None, Value::Null)
    }

    /// Synthesized connection-lost event.
    #[must_use]
    pub fn connection_lost() -> Self {
        Self::new(EventKind::ConnectionLost, None, Value::Null)
    }

    /// Whether this is a client-synthesized connection lifecycle event.
    #[must_use]
    pub fn is_connection_event(&self) -> bool {
        matches!(
            self.kind,
            EventKind::ConnectionOpen | EventKind::ConnectionLost
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_kinds_round_trip() {
        for tag in [
            "status",
            "execution_start",
            "progress",
            "preview",
            "executed",
            "execution_error",
        ] {
            let kind = EventKind::from_wire(tag).unwrap();
            assert_eq!(kind.as_str(), tag);
        }
    }

    #[test]
    fn unknown_wire_kind_is_none() {
        assert_eq!(EventKind::from_wire("crystal_ball"), None);
        assert_eq!(EventKind::from_wire(""), None);
    }

    #[test]
    fn connection_kinds_never_parse_from_wire() {
        assert_eq!(EventKind::from_wire("connection_open"), None);
        assert_eq!(EventKind::from_wire("connection_lost"), None);
    }

    #[test]
    fn connection_events_have_no_prompt() {
        let open = PromptEvent::connection_open();
        assert!(open.prompt_id.is_none());
        assert!(open.is_connection_event());

        let lost = PromptEvent::connection_lost();
        assert_eq!(lost.kind, EventKind::ConnectionLost);
        assert!(lost.is_connection_event());
    }

    #[test]
    fn progress_event_is_not_connection_level() {
        let event = PromptEvent::new(
            EventKind::Progress,
            Some(PromptId::from("p1")),
            serde_json::json!({"value": 3, "max": 10}),
        );
        assert!(!event.is_connection_event());
        assert_eq!(event.prompt_id.as_ref().unwrap().as_str(), "p1");
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = PromptEvent::new(
            EventKind::Executed,
            Some(PromptId::from("p2")),
            serde_json::json!({"outputs": {}}),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "executed");
        assert_eq!(json["prompt_id"], "p2");
    }

    #[test]
    fn kind_display_matches_wire_tag() {
        assert_eq!(EventKind::Progress.to_string(), "progress");
        assert_eq!(EventKind::ConnectionLost.to_string(), "connection_lost");
    }
}
