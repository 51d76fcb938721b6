//! Session events for observability.

use serde::{Deserialize, Serialize};
use std::fmt;
use tallyboard_ingest::ViewMode;
use uuid::Uuid;

/// Which refresh path a run took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    /// Fetch only, with the current filter parameters.
    Query,
    /// Upload, sheet processing and fetch.
    Full,
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunKind::Query => f.write_str("query"),
            RunKind::Full => f.write_str("full"),
        }
    }
}

/// Events emitted by the dashboard as runs progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum SessionEvent {
    RunStarted {
        run_id: Uuid,
        kind: RunKind,
    },
    /// Aggregate applied; `options` counts the columns that came back with
    /// option lists.
    RunFinished {
        run_id: Uuid,
        kind: RunKind,
        options: usize,
    },
    RunFailed {
        run_id: Uuid,
        kind: RunKind,
        message: String,
    },
    /// A response arrived after the state it was computed for was reset.
    StaleResponseDiscarded {
        run_id: Uuid,
        kind: RunKind,
    },
    /// No source remains; filters and aggregate were emptied.
    SourcesCleared,
    ViewModeChanged {
        mode: ViewMode,
    },
}

/// Callback for session events
pub type SessionEventHandler = Box<dyn Fn(SessionEvent) + Send + Sync>;
