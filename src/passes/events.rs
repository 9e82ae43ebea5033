//! Change tracking for pass runs.
//!
//! Passes record one [`Event`] per decision worth auditing: a candidate
//! collected, a candidate dropped (with the reason encoded in the kind), an
//! allocation elided, a check deleted, a block truncated. The host inspects
//! or renders the log after the run; the pass itself never reads it back.

use std::fmt;

use crate::ir::NodeId;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum EventKind {
    /// An allocation site was collected as an elision candidate.
    CandidateCollected,
    /// A candidate was dropped because a consumer escapes it.
    CandidateEscaped,
    /// A candidate was dropped because its composite shape lost a
    /// sub-candidate.
    CandidateInvalidated,
    /// A candidate was dropped because a stack write interferes with it.
    CandidateInterfered,
    /// An allocation was converted to its phantom form.
    AllocationElided,
    /// A consumer of an eliminated allocation was rewritten.
    UseRewritten,
    /// A statically satisfied check on an eliminated allocation was
    /// deleted.
    CheckDeleted,
    /// A variadic call was converted to a fixed-arity or forwarding form.
    CallConverted,
    /// A variadic load was expanded to direct stack stores or converted to
    /// a forwarding form.
    LoadConverted,
    /// A block was truncated at a pseudo-terminal marker.
    BlockTruncated,
    /// Unreachable blocks were deleted after a CFG change.
    BlocksRemoved,
}

/// One recorded change.
#[derive(Debug, Clone)]
pub struct Event {
    kind: EventKind,
    node: Option<NodeId>,
    message: Option<String>,
}

impl Event {
    /// Returns what happened.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Returns the node the event is about, if any.
    #[must_use]
    pub const fn node(&self) -> Option<NodeId> {
        self.node
    }

    /// Returns the free-form detail message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(node) = self.node {
            write!(f, " {node}")?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

/// An append-only log of [`Event`]s.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts recording an event; finish it with the builder's `node` and
    /// `message` methods. The event is committed when the builder drops.
    pub fn record(&mut self, kind: EventKind) -> EventRecord<'_> {
        EventRecord {
            log: self,
            event: Some(Event {
                kind,
                node: None,
                message: None,
            }),
        }
    }

    /// Returns the recorded events in order.
    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Returns the number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Counts events of one kind.
    #[must_use]
    pub fn count(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|e| e.kind() == kind).count()
    }
}

impl fmt::Display for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for event in &self.events {
            writeln!(f, "{event}")?;
        }
        Ok(())
    }
}

/// In-flight event being described; commits on drop.
pub struct EventRecord<'a> {
    log: &'a mut EventLog,
    event: Option<Event>,
}

impl EventRecord<'_> {
    /// Attaches the node the event is about.
    pub fn node(mut self, node: NodeId) -> Self {
        if let Some(event) = &mut self.event {
            event.node = Some(node);
        }
        self
    }

    /// Attaches a free-form detail message.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        if let Some(event) = &mut self.event {
            event.message = Some(message.into());
        }
        self
    }
}

impl Drop for EventRecord<'_> {
    fn drop(&mut self) {
        if let Some(event) = self.event.take() {
            self.log.events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_commits_on_drop() {
        let mut log = EventLog::new();
        log.record(EventKind::CandidateCollected)
            .node(NodeId::new(3))
            .message("rest array");

        assert_eq!(log.len(), 1);
        let event = &log.events()[0];
        assert_eq!(event.kind(), EventKind::CandidateCollected);
        assert_eq!(event.node(), Some(NodeId::new(3)));
        assert_eq!(event.message(), Some("rest array"));
    }

    #[test]
    fn test_count_by_kind() {
        let mut log = EventLog::new();
        log.record(EventKind::AllocationElided).node(NodeId::new(1));
        log.record(EventKind::AllocationElided).node(NodeId::new(2));
        log.record(EventKind::CheckDeleted).node(NodeId::new(3));

        assert_eq!(log.count(EventKind::AllocationElided), 2);
        assert_eq!(log.count(EventKind::CheckDeleted), 1);
        assert_eq!(log.count(EventKind::BlockTruncated), 0);
    }

    #[test]
    fn test_display() {
        let mut log = EventLog::new();
        log.record(EventKind::CandidateEscaped)
            .node(NodeId::new(9))
            .message("stored to the heap");

        let rendered = format!("{log}");
        assert!(rendered.contains("CandidateEscaped v9: stored to the heap"));
    }
}
