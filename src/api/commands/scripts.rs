//! Script library commands
//!
//! Persistence failures are also published so the UI can flag unsaved work.

use std::path::PathBuf;

use crate::api::AppState;
use crate::core::scripts::{HtmlExporter, ScriptExporter};
use crate::shared::error::AppResult;
use crate::shared::types::Script;

fn reported<T>(state: &AppState, result: AppResult<T>) -> AppResult<T> {
    if let Err(e) = &result {
        state.report(e);
    }
    result
}

pub fn list_scripts(state: &AppState) -> Vec<Script> {
    state.scripts.list()
}

pub fn get_script(state: &AppState, id: &str) -> AppResult<Script> {
    state.scripts.get(id)
}

pub fn create_script(state: &AppState, title: &str) -> AppResult<Script> {
    reported(state, state.scripts.create(title))
}

pub fn save_script(state: &AppState, script: Script) -> AppResult<Script> {
    reported(state, state.scripts.save(script))
}

pub fn rename_script(state: &AppState, id: &str, title: &str) -> AppResult<Script> {
    reported(state, state.scripts.rename(id, title))
}

pub fn delete_script(state: &AppState, id: &str) -> AppResult<()> {
    reported(state, state.scripts.delete(id))
}

/// Export as printable HTML. Defaults to `<data dir>/exports`.
pub async fn export_script(state: &AppState, id: &str, dest: Option<PathBuf>) -> AppResult<PathBuf> {
    let script = state.scripts.get(id)?;
    let dest = match dest {
        Some(dir) => dir,
        None => state.settings().await.data_dir()?.join("exports"),
    };
    HtmlExporter.export(&script, &dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::storage::InMemoryGateway;
    use crate::core::translator::{FragmentStream, TranslationSource};
    use crate::shared::emit::NullSink;
    use crate::shared::settings::AppSettings;
    use crate::shared::types::TranslationDirection;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Unused;

    #[async_trait]
    impl TranslationSource for Unused {
        async fn translate(&self, _: &str, _: TranslationDirection) -> AppResult<FragmentStream> {
            Ok(FragmentStream::empty())
        }
    }

    fn state(data_dir: PathBuf) -> AppState {
        let mut settings = AppSettings::default();
        settings.storage.data_dir = Some(data_dir);
        AppState::with_parts(settings, Arc::new(InMemoryGateway::new()), Arc::new(Unused), Arc::new(NullSink))
    }

    #[tokio::test]
    async fn create_edit_export() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path().to_path_buf());

        let mut script = create_script(&state, "Pilot").unwrap();
        script.content = "<p>FADE IN</p>".into();
        save_script(&state, script.clone()).unwrap();

        let path = export_script(&state, &script.id, None).await.unwrap();
        assert!(path.starts_with(dir.path().join("exports")));
        assert!(std::fs::read_to_string(path).unwrap().contains("<p>FADE IN</p>"));

        rename_script(&state, &script.id, "Pilot v2").unwrap();
        assert_eq!(list_scripts(&state)[0].title, "Pilot v2");
        delete_script(&state, &script.id).unwrap();
        assert!(get_script(&state, &script.id).is_err());
    }
}
