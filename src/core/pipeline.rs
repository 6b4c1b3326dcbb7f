//! Stream consumer and accumulator.
//!
//! A `TranslationSession` drives one translation at a time through
//! `Idle -> Requesting -> Streaming -> {Succeeded, Failed, Cancelled}`,
//! publishing every transition and every fragment through an `EventSink`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use unicode_segmentation::UnicodeSegmentation;
use uuid::Uuid;

use crate::core::history::HistoryStore;
use crate::core::translator::TranslationSource;
use crate::shared::emit::EventSink;
use crate::shared::error::{AppError, AppResult};
use crate::shared::events::PipelineEvent;
use crate::shared::types::{PipelineState, TranslationDirection, TranslationHistoryItem, TranslationRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CancelState {
    /// No run accepted; cancelling does nothing
    Idle,
    /// A run was accepted and has not reached a terminal state
    Armed,
    Cancelled,
}

/// Cloneable cancellation switch for a session.
///
/// Only an armed run can be cancelled. A cancel that arrives between arming
/// and the first await of the run still takes effect.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<CancelState>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(CancelState::Idle);
        Self { tx: Arc::new(tx) }
    }

    /// Stop the armed translation. Returns false when nothing was armed.
    pub fn cancel(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == CancelState::Armed {
                *state = CancelState::Cancelled;
                true
            } else {
                false
            }
        })
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow() == CancelState::Cancelled
    }

    /// Accept cancels for the run about to start. A pending cancel is kept.
    pub(crate) fn arm(&self) {
        self.tx.send_if_modified(|state| {
            if *state == CancelState::Idle {
                *state = CancelState::Armed;
                true
            } else {
                false
            }
        });
    }

    fn disarm(&self) {
        self.tx.send_replace(CancelState::Idle);
    }

    fn subscribe(&self) -> watch::Receiver<CancelState> {
        self.tx.subscribe()
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Running grapheme and word counts for the accumulated text.
///
/// Everything before the last space seen is settled; each update rescans
/// only the unsettled tail.
#[derive(Debug, Default)]
struct TextStats {
    settled: usize,
    settled_chars: usize,
    settled_words: usize,
}

impl TextStats {
    /// Counts for `text`, which must extend the text of the previous call
    fn update(&mut self, text: &str) -> (usize, usize) {
        let tail = &text[self.settled..];
        let chars = self.settled_chars + tail.graphemes(true).count();
        let words = self.settled_words + tail.unicode_words().count();

        if let Some(pos) = tail.rfind(' ') {
            if pos > 0 {
                let head = &tail[..pos];
                self.settled_chars += head.graphemes(true).count();
                self.settled_words += head.unicode_words().count();
                self.settled += pos;
            }
        }
        (chars, words)
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationOutcome {
    pub session_id: String,
    pub state: PipelineState,
    /// Final text on success, whatever had accumulated otherwise
    pub text: String,
    pub history_item: Option<TranslationHistoryItem>,
    /// Set when the run ended in `Failed`
    pub error: Option<AppError>,
    /// Set when the run succeeded but the history write did not
    pub persistence_error: Option<AppError>,
}

enum Interrupted {
    Cancelled,
    TimedOut,
}

/// Await `fut` unless the cancel flag flips or the deadline passes first
async fn guarded<F: Future>(
    fut: F,
    cancel_rx: &mut watch::Receiver<CancelState>,
    deadline: Option<Instant>,
) -> Result<F::Output, Interrupted> {
    if *cancel_rx.borrow_and_update() == CancelState::Cancelled {
        return Err(Interrupted::Cancelled);
    }

    let expiry = async move {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(fut);
    tokio::pin!(expiry);

    let mut cancel_open = true;
    loop {
        tokio::select! {
            out = &mut fut => return Ok(out),
            _ = &mut expiry => return Err(Interrupted::TimedOut),
            changed = cancel_rx.changed(), if cancel_open => {
                match changed {
                    Ok(()) => {
                        if *cancel_rx.borrow_and_update() == CancelState::Cancelled {
                            return Err(Interrupted::Cancelled);
                        }
                    }
                    Err(_) => cancel_open = false,
                }
            }
        }
    }
}

pub struct TranslationSession {
    id: String,
    state: PipelineState,
    accumulated: String,
    direction: TranslationDirection,
    timeout: Option<Duration>,
    cancel: CancelHandle,
}

impl TranslationSession {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            state: PipelineState::Idle,
            accumulated: String::new(),
            direction: TranslationDirection::default(),
            timeout,
            cancel: CancelHandle::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Accumulated text of the latest run. Kept after failure or cancellation.
    pub fn text(&self) -> &str {
        &self.accumulated
    }

    pub fn direction(&self) -> TranslationDirection {
        self.direction
    }

    pub fn set_direction(&mut self, direction: TranslationDirection) {
        self.direction = direction;
    }

    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    fn transition(&mut self, state: PipelineState, sink: &dyn EventSink) {
        debug!(session = %self.id, from = ?self.state, to = ?state, "State transition");
        self.state = state;
        if state.is_terminal() {
            self.cancel.disarm();
        }
        sink.emit(PipelineEvent::StateChanged {
            session_id: self.id.clone(),
            state,
        });
    }

    fn outcome(&self) -> TranslationOutcome {
        TranslationOutcome {
            session_id: self.id.clone(),
            state: self.state,
            text: self.accumulated.clone(),
            history_item: None,
            error: None,
            persistence_error: None,
        }
    }

    /// Run one translation to a terminal state.
    ///
    /// Blank text returns a `Validation` error and leaves the session as it
    /// was. Translation failures, cancellation and timeouts are reported
    /// through the returned outcome, not as `Err`.
    pub async fn run(
        &mut self,
        request: TranslationRequest,
        source: &dyn TranslationSource,
        history: &Arc<HistoryStore>,
        sink: &dyn EventSink,
    ) -> AppResult<TranslationOutcome> {
        if self.state.is_in_flight() {
            return Err(AppError::Validation("A translation is already in progress".to_string()));
        }
        if let Err(e) = request.validate() {
            self.cancel.disarm();
            return Err(e);
        }

        self.cancel.arm();
        self.accumulated.clear();
        self.direction = request.direction;
        let mut cancel_rx = self.cancel.subscribe();
        let deadline = self.timeout.map(|d| Instant::now() + d);

        info!(
            session = %self.id,
            direction = %request.direction,
            chars = request.text.chars().count(),
            "Translation requested"
        );
        self.transition(PipelineState::Requesting, sink);

        let started = guarded(
            source.translate(&request.text, request.direction),
            &mut cancel_rx,
            deadline,
        )
        .await;

        let mut stream = match started {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Ok(self.fail(e, sink)),
            Err(Interrupted::Cancelled) => return Ok(self.cancelled(sink)),
            Err(Interrupted::TimedOut) => return Ok(self.fail(self.timeout_error(), sink)),
        };

        let mut fragments = 0usize;
        let mut stats = TextStats::default();
        loop {
            match guarded(stream.next(), &mut cancel_rx, deadline).await {
                Ok(Some(Ok(chunk))) => {
                    if self.state == PipelineState::Requesting {
                        self.transition(PipelineState::Streaming, sink);
                    }
                    fragments += 1;
                    self.accumulated.push_str(&chunk);
                    let (char_count, word_count) = stats.update(&self.accumulated);
                    sink.emit(PipelineEvent::Partial {
                        session_id: self.id.clone(),
                        chunk,
                        accumulated: self.accumulated.clone(),
                        char_count,
                        word_count,
                    });
                }
                Ok(Some(Err(e))) => {
                    debug!(session = %self.id, fragments, "Stream terminated with error");
                    return Ok(self.fail(e, sink));
                }
                Ok(None) => break,
                Err(Interrupted::Cancelled) => {
                    stream.close();
                    return Ok(self.cancelled(sink));
                }
                Err(Interrupted::TimedOut) => {
                    stream.close();
                    return Ok(self.fail(self.timeout_error(), sink));
                }
            }
        }

        Ok(self.succeed(request, fragments, history, sink).await)
    }

    async fn succeed(
        &mut self,
        request: TranslationRequest,
        fragments: usize,
        history: &Arc<HistoryStore>,
        sink: &dyn EventSink,
    ) -> TranslationOutcome {
        self.transition(PipelineState::Succeeded, sink);
        info!(session = %self.id, fragments, chars = self.accumulated.chars().count(), "Translation completed");

        let item = TranslationHistoryItem::new(request.text, self.accumulated.clone(), request.direction);
        sink.emit(PipelineEvent::Completed {
            session_id: self.id.clone(),
            item: item.clone(),
        });

        // The store commits synchronously to disk
        let store = Arc::clone(history);
        let entry = item.clone();
        let written = match tokio::task::spawn_blocking(move || store.append(entry)).await {
            Ok(result) => result,
            Err(e) => Err(AppError::Persistence(format!("History write task failed: {}", e))),
        };
        let persistence_error = match written {
            Ok(()) => None,
            Err(e) => {
                warn!(session = %self.id, "History write failed: {}", e);
                sink.emit(PipelineEvent::PersistenceFailed { error: e.to_string() });
                Some(e)
            }
        };
        sink.emit(PipelineEvent::HistoryUpdated { count: history.len() });

        TranslationOutcome {
            history_item: Some(item),
            persistence_error,
            ..self.outcome()
        }
    }

    fn fail(&mut self, error: AppError, sink: &dyn EventSink) -> TranslationOutcome {
        warn!(session = %self.id, partial_chars = self.accumulated.chars().count(), "Translation failed: {}", error);
        self.transition(PipelineState::Failed, sink);
        sink.emit(PipelineEvent::Failed {
            session_id: self.id.clone(),
            error: error.message().to_string(),
            partial: self.accumulated.clone(),
        });
        TranslationOutcome {
            error: Some(error),
            ..self.outcome()
        }
    }

    fn cancelled(&mut self, sink: &dyn EventSink) -> TranslationOutcome {
        info!(session = %self.id, "Translation cancelled");
        self.transition(PipelineState::Cancelled, sink);
        sink.emit(PipelineEvent::Cancelled {
            session_id: self.id.clone(),
            partial: self.accumulated.clone(),
        });
        self.outcome()
    }

    fn timeout_error(&self) -> AppError {
        let secs = self.timeout.map(|d| d.as_secs_f32()).unwrap_or_default();
        AppError::Translation(format!("Translation timed out after {:.0}s", secs))
    }
}

impl Default for TranslationSession {
    fn default() -> Self {
        Self::new(None)
    }
}
