use serde::Serialize;

use crate::shared::types::{PipelineState, TranslationHistoryItem};

/// Everything the backend pushes to the presentation layer.
///
/// Serialized as `{"event": "...", "payload": {...}}` so a frontend bridge
/// can forward it without knowing the variants.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum PipelineEvent {
    StateChanged {
        session_id: String,
        state: PipelineState,
    },
    /// A fragment arrived; `accumulated` is the full text so far
    Partial {
        session_id: String,
        chunk: String,
        accumulated: String,
        char_count: usize,
        word_count: usize,
    },
    Completed {
        session_id: String,
        item: TranslationHistoryItem,
    },
    Failed {
        session_id: String,
        error: String,
        partial: String,
    },
    Cancelled {
        session_id: String,
        partial: String,
    },
    /// A write to the persistence backend failed; in-memory state is unaffected
    PersistenceFailed {
        error: String,
    },
    HistoryUpdated {
        count: usize,
    },
}

impl PipelineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineEvent::StateChanged { .. } => "state_changed",
            PipelineEvent::Partial { .. } => "partial",
            PipelineEvent::Completed { .. } => "completed",
            PipelineEvent::Failed { .. } => "failed",
            PipelineEvent::Cancelled { .. } => "cancelled",
            PipelineEvent::PersistenceFailed { .. } => "persistence_failed",
            PipelineEvent::HistoryUpdated { .. } => "history_updated",
        }
    }
}
