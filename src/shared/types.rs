use serde::{Deserialize, Serialize};
use chrono::Utc;
use uuid::Uuid;

use crate::shared::error::{AppError, AppResult};

/// Current time as milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Which way a translation runs. Each value selects one fixed instruction profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TranslationDirection {
    /// Hindi -> English with the default profiles
    #[default]
    SourceToTarget,
    /// English -> Hindi with the default profiles
    TargetToSource,
}

impl TranslationDirection {
    pub fn toggled(self) -> Self {
        match self {
            TranslationDirection::SourceToTarget => TranslationDirection::TargetToSource,
            TranslationDirection::TargetToSource => TranslationDirection::SourceToTarget,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TranslationDirection::SourceToTarget => "SOURCE_TO_TARGET",
            TranslationDirection::TargetToSource => "TARGET_TO_SOURCE",
        }
    }
}

impl std::fmt::Display for TranslationDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of one translation session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    #[default]
    Idle,
    Requesting,
    Streaming,
    Succeeded,
    Failed,
    Cancelled,
}

impl PipelineState {
    /// True while a request is outstanding
    pub fn is_in_flight(&self) -> bool {
        matches!(self, PipelineState::Requesting | PipelineState::Streaming)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Succeeded | PipelineState::Failed | PipelineState::Cancelled
        )
    }
}

/// Ephemeral request handed to the pipeline. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationRequest {
    pub text: String,
    pub direction: TranslationDirection,
}

impl TranslationRequest {
    pub fn new(text: impl Into<String>, direction: TranslationDirection) -> Self {
        Self {
            text: text.into(),
            direction,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Reject blank input before any network interaction
    pub fn validate(&self) -> AppResult<()> {
        if self.is_blank() {
            return Err(AppError::Validation("Please enter some text to translate".to_string()));
        }
        Ok(())
    }
}

/// One completed translation. Created once at stream completion, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationHistoryItem {
    pub id: String,
    pub original: String,
    pub translated: String,
    pub timestamp: i64,
    pub direction: TranslationDirection,
}

impl TranslationHistoryItem {
    pub fn new(original: String, translated: String, direction: TranslationDirection) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            original,
            translated,
            timestamp: now_millis(),
            direction,
        }
    }
}

/// A rich-text script. `content` is opaque markup stored and forwarded unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    pub id: String,
    pub title: String,
    pub content: String,
    pub last_modified: i64,
}

pub const UNTITLED_SCRIPT: &str = "Untitled Script";

impl Script {
    pub fn new(title: impl Into<String>) -> Self {
        let title = title.into();
        let title = if title.trim().is_empty() {
            UNTITLED_SCRIPT.to_string()
        } else {
            title.trim().to_string()
        };
        Self {
            id: Uuid::new_v4().to_string(),
            title,
            content: String::new(),
            last_modified: now_millis(),
        }
    }

    pub fn touch(&mut self) {
        self.last_modified = now_millis();
    }
}

/// The single persisted record: `{ scripts, history }`.
/// Absent fields read as empty sequences.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub scripts: Vec<Script>,
    #[serde(default)]
    pub history: Vec<TranslationHistoryItem>,
}

/// Partial write: only the fields that are `Some` replace what is stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatePatch {
    pub scripts: Option<Vec<Script>>,
    pub history: Option<Vec<TranslationHistoryItem>>,
}

impl StatePatch {
    pub fn scripts(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Some(scripts),
            history: None,
        }
    }

    pub fn history(history: Vec<TranslationHistoryItem>) -> Self {
        Self {
            scripts: None,
            history: Some(history),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_none() && self.history.is_none()
    }

    /// Merge into `state`, leaving untouched fields unchanged
    pub fn apply_to(self, state: &mut PersistedState) {
        if let Some(scripts) = self.scripts {
            state.scripts = scripts;
        }
        if let Some(history) = self.history {
            state.history = history;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_toggles_both_ways() {
        let d = TranslationDirection::SourceToTarget;
        assert_eq!(d.toggled(), TranslationDirection::TargetToSource);
        assert_eq!(d.toggled().toggled(), d);
    }

    #[test]
    fn in_flight_and_terminal_states_are_disjoint() {
        use PipelineState::*;
        for state in [Idle, Requesting, Streaming, Succeeded, Failed, Cancelled] {
            assert!(!(state.is_in_flight() && state.is_terminal()));
        }
        assert!(!Idle.is_in_flight());
        assert!(!Idle.is_terminal());
    }

    #[test]
    fn blank_requests_are_rejected() {
        let req = TranslationRequest::new(" \n\t ", TranslationDirection::SourceToTarget);
        assert!(req.is_blank());
        assert!(matches!(req.validate(), Err(AppError::Validation(_))));
        assert!(TranslationRequest::new("नमस्ते", TranslationDirection::SourceToTarget)
            .validate()
            .is_ok());
    }

    #[test]
    fn persisted_state_defaults_missing_fields() {
        let state: PersistedState = serde_json::from_str(r#"{"history": []}"#).unwrap();
        assert!(state.scripts.is_empty());
        let state: PersistedState = serde_json::from_str("{}").unwrap();
        assert_eq!(state, PersistedState::default());
    }

    #[test]
    fn script_serializes_last_modified_in_camel_case() {
        let script = Script::new("Scene 1");
        let json = serde_json::to_value(&script).unwrap();
        assert!(json.get("lastModified").is_some());
        assert_eq!(json["title"], "Scene 1");
    }

    #[test]
    fn blank_script_title_falls_back() {
        assert_eq!(Script::new("   ").title, UNTITLED_SCRIPT);
    }

    #[test]
    fn patch_only_replaces_present_fields() {
        let mut state = PersistedState {
            scripts: vec![Script::new("keep me")],
            history: vec![],
        };
        let item = TranslationHistoryItem::new(
            "a".into(),
            "b".into(),
            TranslationDirection::TargetToSource,
        );
        StatePatch::history(vec![item.clone()]).apply_to(&mut state);
        assert_eq!(state.scripts.len(), 1);
        assert_eq!(state.history, vec![item]);
    }
}
