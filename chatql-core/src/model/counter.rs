use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical counters issued by the sequencer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CounterKind {
    MessageSequence,
}

impl CounterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CounterKind::MessageSequence => "message",
        }
    }
}

impl fmt::Display for CounterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted counter state
///
/// `version` is the optimistic-concurrency token: every successful write
/// bumps it, and a write carrying a stale version is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counter {
    pub kind: CounterKind,
    pub next_value: i64,
    pub version: i64,
}

impl Counter {
    pub fn new(kind: CounterKind) -> Self {
        Self {
            kind,
            next_value: 1,
            version: 0,
        }
    }
}
