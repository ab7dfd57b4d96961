//! Raw events carried from reader threads to the drain step

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque identity of a launched request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(u64);

impl RequestId {
    /// Allocate a fresh, process-unique id
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Kind of a delivered log record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogKind {
    /// A complete line from stdout (or an echoed input line)
    Info,
    /// A chunk from stderr
    Error,
}

/// Payload of a queued event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogEvent {
    /// Decoded text from stdout, not yet split into lines
    InfoChunk(String),
    /// Decoded text from stderr
    ErrorChunk(String),
    /// Text written to the child's stdin, echoed into the output
    InputEcho(String),
    /// Both streams closed; carries the exit code
    EndOfStream(i32),
}

/// A timestamped event addressed to one request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedEvent {
    /// When the event was produced
    pub timestamp: DateTime<Utc>,
    /// The request the event belongs to
    pub request: RequestId,
    /// The event itself
    pub event: LogEvent,
}

impl QueuedEvent {
    /// Stamp an event with the current time
    pub fn new(request: RequestId, event: LogEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            request,
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_are_unique() {
        let a = RequestId::next();
        let b = RequestId::next();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("req-"));
    }

    #[test]
    fn test_event_timestamp_is_recent() {
        let before = Utc::now();
        let event = QueuedEvent::new(RequestId::next(), LogEvent::EndOfStream(0));
        assert!(event.timestamp >= before);
        assert_eq!(event.event, LogEvent::EndOfStream(0));
    }
}
