//! Event and event-type value types (spec §3, component A).
//!
//! `EventType` is the label mined over; `Event` is one occurrence of a type,
//! optionally timestamped and carrying a numeric payload. Two reserved
//! singletons, [`EventType::INITIAL`] and [`EventType::TERMINAL`], bracket
//! every trace but are never themselves mined over directly (spec §3).

use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

/// A labeled, equatable, hashable event type.
///
/// `ProcessLabel` exists for distributed logs where the same label can
/// recur per-process and the miner/exporter wants to distinguish them; plain
/// `Label` covers the common single-process case.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// A plain string label, e.g. `"open"`.
    Label(String),
    /// A label tagged with the process that emitted it, e.g. for logs
    /// merged from several distributed components.
    ProcessLabel {
        /// The emitting process's name.
        process: String,
        /// The event label within that process.
        label: String,
    },
    /// Synthetic sentinel injected at the start of every trace.
    Initial,
    /// Synthetic sentinel injected at the end of every trace.
    Terminal,
}

impl EventType {
    /// The shared `INITIAL` sentinel.
    pub const INITIAL: EventType = EventType::Initial;
    /// The shared `TERMINAL` sentinel.
    pub const TERMINAL: EventType = EventType::Terminal;

    /// `true` for either sentinel. Sentinels are injected at trace
    /// boundaries and are never themselves mined over (spec §3).
    pub fn is_sentinel(&self) -> bool {
        matches!(self, EventType::Initial | EventType::Terminal)
    }

    /// A short display label, ignoring process tagging, used by the
    /// invariant text formatter (spec §6).
    pub fn label(&self) -> &str {
        match self {
            EventType::Label(s) => s,
            EventType::ProcessLabel { label, .. } => label,
            EventType::Initial => "INITIAL",
            EventType::Terminal => "TERMINAL",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::Label(s) => write!(f, "{s}"),
            EventType::ProcessLabel { process, label } => write!(f, "{process}::{label}"),
            EventType::Initial => write!(f, "INITIAL"),
            EventType::Terminal => write!(f, "TERMINAL"),
        }
    }
}

/// One occurrence of an [`EventType`] in the input log, before it is placed
/// into a trace graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// The event's type.
    pub event_type: EventType,
    /// Optional scalar time, used for the default `"t"` ordering relation.
    pub time: Option<Timestamp>,
    /// Optional per-event numeric payload (e.g. a duration or byte count
    /// carried alongside the label).
    pub payload: Option<f64>,
}

impl Event {
    /// Constructs an event with no time or payload.
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            time: None,
            payload: None,
        }
    }

    /// Builder-style setter for the scalar time.
    pub fn with_time(mut self, time: Timestamp) -> Self {
        self.time = Some(time);
        self
    }

    /// Builder-style setter for the payload.
    pub fn with_payload(mut self, payload: f64) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Constructs the shared `INITIAL` sentinel event.
    pub fn initial() -> Self {
        Self::new(EventType::INITIAL)
    }

    /// Constructs the shared `TERMINAL` sentinel event.
    pub fn terminal() -> Self {
        Self::new(EventType::TERMINAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_types_are_recognized() {
        assert!(EventType::INITIAL.is_sentinel());
        assert!(EventType::TERMINAL.is_sentinel());
        assert!(!EventType::Label("open".into()).is_sentinel());
    }

    #[test]
    fn process_label_display_qualifies_process() {
        let t = EventType::ProcessLabel {
            process: "worker-1".into(),
            label: "read".into(),
        };
        assert_eq!(t.to_string(), "worker-1::read");
        assert_eq!(t.label(), "read");
    }

    #[test]
    fn builder_methods_set_optional_fields() {
        let e = Event::new(EventType::Label("open".into()))
            .with_time(Timestamp(5))
            .with_payload(1.5);
        assert_eq!(e.time, Some(Timestamp(5)));
        assert_eq!(e.payload, Some(1.5));
    }
}
