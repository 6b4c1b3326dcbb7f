use crate::api::AppState;
use crate::shared::error::AppResult;
use crate::shared::events::PipelineEvent;
use crate::shared::types::TranslationHistoryItem;

/// Newest first
pub fn get_translation_history(state: &AppState) -> Vec<TranslationHistoryItem> {
    state.history.list()
}

pub fn clear_translation_history(state: &AppState) -> AppResult<()> {
    let result = state.history.clear();
    state.sink.emit(PipelineEvent::HistoryUpdated { count: state.history.len() });
    if let Err(e) = &result {
        state.report(e);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::storage::{InMemoryGateway, PersistenceGateway};
    use crate::core::translator::{FragmentStream, TranslationSource};
    use crate::shared::emit::RecordingSink;
    use crate::shared::settings::AppSettings;
    use crate::shared::types::{PersistedState, TranslationDirection};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Unused;

    #[async_trait]
    impl TranslationSource for Unused {
        async fn translate(&self, _: &str, _: TranslationDirection) -> AppResult<FragmentStream> {
            Ok(FragmentStream::empty())
        }
    }

    #[test]
    fn clear_empties_memory_and_storage() {
        let item = TranslationHistoryItem::new("a".into(), "b".into(), TranslationDirection::SourceToTarget);
        let gateway = Arc::new(InMemoryGateway::with_state(PersistedState {
            scripts: vec![],
            history: vec![item],
        }));
        let sink = RecordingSink::new();
        let state = AppState::with_parts(AppSettings::default(), gateway.clone(), Arc::new(Unused), Arc::new(sink.clone()));
        state.load_persisted();
        assert_eq!(get_translation_history(&state).len(), 1);

        clear_translation_history(&state).unwrap();

        assert!(get_translation_history(&state).is_empty());
        assert!(gateway.load().unwrap().history.is_empty());
        assert_eq!(sink.events(), vec![PipelineEvent::HistoryUpdated { count: 0 }]);
    }

    #[test]
    fn failed_clear_is_reported_as_persistence() {
        let gateway = Arc::new(InMemoryGateway::new());
        gateway.set_write_failure(Some("disk full"));
        let sink = RecordingSink::new();
        let state = AppState::with_parts(AppSettings::default(), gateway, Arc::new(Unused), Arc::new(sink.clone()));

        assert_eq!(clear_translation_history(&state).unwrap_err().kind(), "persistence");
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, PipelineEvent::PersistenceFailed { .. })));
    }
}
