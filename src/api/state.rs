use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{info, warn};

use crate::core::history::HistoryStore;
use crate::core::pipeline::{CancelHandle, TranslationSession};
use crate::core::scripts::ScriptLibrary;
use crate::core::storage::{open_gateway, PersistenceGateway};
use crate::core::translator::{GeminiSource, TranslationSource};
use crate::shared::emit::EventSink;
use crate::shared::error::{AppError, AppResult};
use crate::shared::events::PipelineEvent;
use crate::shared::settings::AppSettings;

/// Everything the commands operate on. One translation session per state.
pub struct AppState {
    settings: RwLock<AppSettings>,
    session: Mutex<TranslationSession>,
    cancel: CancelHandle,
    source: RwLock<Arc<dyn TranslationSource>>,
    pub history: Arc<HistoryStore>,
    pub scripts: ScriptLibrary,
    pub sink: Arc<dyn EventSink>,
}

impl AppState {
    /// Open storage under the configured data dir and load persisted state.
    /// Load failures are reported through the sink and start empty.
    pub fn initialize(settings: AppSettings, sink: Arc<dyn EventSink>) -> AppResult<Self> {
        let data_dir = settings.data_dir()?;
        let gateway = open_gateway(&data_dir);
        let source: Arc<dyn TranslationSource> = Arc::new(GeminiSource::from_settings(&settings));
        let state = Self::with_parts(settings, gateway, source, sink);
        state.load_persisted();
        info!(data_dir = %data_dir.display(), "Application state initialized");
        Ok(state)
    }

    /// Assemble from explicit collaborators without loading anything
    pub fn with_parts(
        settings: AppSettings,
        gateway: Arc<dyn PersistenceGateway>,
        source: Arc<dyn TranslationSource>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let session = TranslationSession::new(settings.translation.timeout());
        let cancel = session.cancel_handle();
        Self {
            settings: RwLock::new(settings),
            session: Mutex::new(session),
            cancel,
            source: RwLock::new(source),
            history: Arc::new(HistoryStore::new(gateway.clone())),
            scripts: ScriptLibrary::new(gateway),
            sink,
        }
    }

    pub fn load_persisted(&self) {
        if let Err(e) = self.history.load() {
            warn!("Failed to load translation history: {}", e);
            self.report(&e);
        }
        if let Err(e) = self.scripts.load() {
            warn!("Failed to load scripts: {}", e);
            self.report(&e);
        }
    }

    /// Surface persistence errors distinctly from everything else
    pub fn report(&self, error: &AppError) {
        if let AppError::Persistence(_) = error {
            self.sink.emit(PipelineEvent::PersistenceFailed { error: error.to_string() });
        }
    }

    pub async fn settings(&self) -> AppSettings {
        self.settings.read().await.clone()
    }

    pub(crate) async fn replace_settings(&self, settings: AppSettings) -> AppResult<()> {
        settings.save().await?;
        *self.source.write().await = Arc::new(GeminiSource::from_settings(&settings));
        *self.settings.write().await = settings;
        Ok(())
    }

    pub async fn source(&self) -> Arc<dyn TranslationSource> {
        self.source.read().await.clone()
    }

    /// Lock the session, refusing if a translation holds it
    pub(crate) fn try_session(&self) -> AppResult<MutexGuard<'_, TranslationSession>> {
        self.session
            .try_lock()
            .map_err(|_| AppError::Validation("A translation is already in progress".to_string()))
    }

    pub fn cancel_handle(&self) -> &CancelHandle {
        &self.cancel
    }
}
