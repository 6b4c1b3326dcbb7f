//! Translation command module
//!
//! Streaming translation through the session owned by `AppState`. The
//! session's direction decides which way each request goes.

use tracing::{debug, info};

use crate::api::AppState;
use crate::core::pipeline::TranslationOutcome;
use crate::shared::error::AppResult;
use crate::shared::types::{TranslationDirection, TranslationRequest};

/// Translate `text` in the session's current direction, publishing progress
/// through the state's sink.
///
/// Fails with a validation error for blank text or while another
/// translation is running. Translation failures come back in the outcome.
pub async fn translate_text_stream(state: &AppState, text: impl Into<String>) -> AppResult<TranslationOutcome> {
    let mut session = state.try_session()?;
    let request = TranslationRequest::new(text, session.direction());
    // A blank request never touches the session
    request.validate()?;

    // Cancels from here on reach this run
    state.cancel_handle().arm();
    let settings = state.settings().await;
    session.set_timeout(settings.translation.timeout());

    let source = state.source().await;
    let outcome = session
        .run(request, source.as_ref(), &state.history, state.sink.as_ref())
        .await?;

    if let Some(e) = &outcome.persistence_error {
        debug!("Translation kept in memory only: {}", e);
    }
    Ok(outcome)
}

/// Stop the in-flight translation. No-op when idle.
pub fn cancel_translation(state: &AppState) {
    if !state.cancel_handle().cancel() {
        debug!("Cancel requested with no translation running");
    }
}

/// Flip the session's direction and return the new one
pub fn swap_direction(state: &AppState) -> AppResult<TranslationDirection> {
    let mut session = state.try_session()?;
    let next = session.direction().toggled();
    session.set_direction(next);
    info!(direction = %next, "Translation direction swapped");
    Ok(next)
}

/// Set the direction used by the next request
pub fn set_direction(state: &AppState, direction: TranslationDirection) -> AppResult<()> {
    state.try_session()?.set_direction(direction);
    Ok(())
}
