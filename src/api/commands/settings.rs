//! Settings command module
//!
//! Handles application settings persistence.

use crate::api::AppState;
use crate::shared::error::AppResult;
use crate::shared::settings::AppSettings;

/// Get current application settings with secrets masked
pub async fn get_settings(state: &AppState) -> AppResult<AppSettings> {
    Ok(state.settings().await.masked())
}

/// Save application settings. A masked or empty key keeps the stored one.
pub async fn update_settings(state: &AppState, mut settings: AppSettings) -> AppResult<AppSettings> {
    let current = state.settings().await;
    let incoming = settings.api_keys.gemini_api_key.trim();
    if incoming.is_empty() || incoming == current.masked().api_keys.gemini_api_key {
        settings.api_keys.gemini_api_key = current.api_keys.gemini_api_key;
    }
    state.replace_settings(settings.clone()).await?;
    Ok(settings.masked())
}
