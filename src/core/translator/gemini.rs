use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::stream::{fragment_channel, FragmentSender, FragmentStream, DEFAULT_STREAM_CAPACITY};
use super::TranslationSource;
use crate::shared::error::{AppError, AppResult};
use crate::shared::settings::{AppSettings, InstructionProfiles};
use crate::shared::types::TranslationDirection;

// ---- Wire format ----

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate's parts
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    fn block_reason(&self) -> Option<&str> {
        self.prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
    }
}

/// Map an HTTP failure status to the message shown to the user
fn status_message(status: StatusCode) -> &'static str {
    match status.as_u16() {
        400 => "The translation request was rejected. Please check the input and model settings",
        401 | 403 => "API key is invalid or lacks permission. Please check your settings",
        404 => "Translation model not found. Please check the model name",
        429 => "Too many requests or quota exhausted. Please try again later",
        500..=599 => "Translation service is temporarily unavailable. Please try again later",
        _ => "Translation request failed. Please try again",
    }
}

/// Streaming translation backed by the Gemini `streamGenerateContent` endpoint
pub struct GeminiSource {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
    api_key: Option<String>,
    profiles: InstructionProfiles,
}

impl GeminiSource {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
        api_key: Option<String>,
        profiles: InstructionProfiles,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            temperature,
            api_key,
            profiles,
        }
    }

    pub fn from_settings(settings: &AppSettings) -> Self {
        Self::new(
            settings.translation.effective_base_url(),
            settings.translation.model.clone(),
            settings.translation.temperature,
            settings.resolve_api_key(),
            settings.profiles.clone(),
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:streamGenerateContent?alt=sse", self.base_url, self.model)
    }

    fn build_request(&self, text: &str, direction: TranslationDirection) -> GenerateContentRequest {
        GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: Some(self.profiles.for_direction(direction).to_string()),
                }],
            },
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(text.to_string()),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        }
    }
}

#[async_trait]
impl TranslationSource for GeminiSource {
    async fn translate(&self, text: &str, direction: TranslationDirection) -> AppResult<FragmentStream> {
        if text.trim().is_empty() {
            return Ok(FragmentStream::empty());
        }

        let api_key = self.api_key.clone().ok_or_else(|| {
            AppError::Translation(
                "Gemini API key is not configured. Set GEMINI_API_KEY or run `scriptdesk config set-key`"
                    .to_string(),
            )
        })?;

        let request = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&self.build_request(text, direction));

        info!(model = %self.model, direction = %direction, chars = text.chars().count(), "Starting translation stream");

        let (tx, stream) = fragment_channel(DEFAULT_STREAM_CAPACITY);
        tokio::spawn(async move {
            tokio::select! {
                _ = tx.closed() => debug!("Consumer dropped before the response arrived"),
                response = request.send() => pump_response(response, tx).await,
            }
        });

        Ok(stream)
    }
}

async fn pump_response(response: reqwest::Result<reqwest::Response>, tx: FragmentSender) {
    let response = match response {
        Ok(r) => r,
        Err(e) => {
            error!("Translation request failed: {}", e);
            tx.fail(format!("Network error: {}", e)).await;
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        // Full body goes to the log only
        let detail = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|b| b.error.message)
            .unwrap_or(body);
        error!(status = status.as_u16(), "Gemini API error: {}", detail);
        tx.fail(status_message(status)).await;
        return;
    }

    // The decoder buffers partial UTF-8 sequences split across network chunks
    let events = response.bytes_stream().eventsource();
    tokio::pin!(events);
    let mut fragments = 0usize;

    loop {
        let next = tokio::select! {
            _ = tx.closed() => {
                debug!(fragments, "Consumer dropped, abandoning stream");
                return;
            }
            next = events.next() => next,
        };

        match next {
            Some(Ok(event)) => {
                if !forward_payload(&event.data, &tx, &mut fragments).await {
                    return;
                }
            }
            Some(Err(e)) => {
                warn!(fragments, "Stream read error: {}", e);
                tx.fail(format!("Connection lost while streaming: {}", e)).await;
                return;
            }
            None => {
                debug!(fragments, "Translation stream finished");
                tx.done().await;
                return;
            }
        }
    }
}

/// Returns false when the stream must stop (failure sent or consumer gone)
async fn forward_payload(payload: &str, tx: &FragmentSender, fragments: &mut usize) -> bool {
    let payload = payload.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return true;
    }

    let parsed: GenerateContentResponse = match serde_json::from_str(payload) {
        Ok(p) => p,
        Err(e) => {
            warn!(fragments = *fragments, "Malformed stream event: {}", e);
            tx.clone().fail(format!("Malformed response from translation service: {}", e)).await;
            return false;
        }
    };

    if let Some(reason) = parsed.block_reason() {
        tx.clone().fail(format!("Translation was blocked by the provider ({})", reason)).await;
        return false;
    }

    let text = parsed.text();
    if text.is_empty() {
        return true;
    }
    *fragments += 1;
    tx.fragment(text).await
}
