//! Translation sources.
//!
//! A source turns `(text, direction)` into an ordered stream of text
//! fragments. The pipeline only ever sees the `TranslationSource` trait.

pub mod gemini;
pub mod stream;

use async_trait::async_trait;

use crate::shared::error::AppResult;
use crate::shared::types::TranslationDirection;

pub use crate::shared::settings::InstructionProfiles;
pub use gemini::GeminiSource;
pub use stream::{fragment_channel, FragmentSender, FragmentStream, StreamItem};

#[async_trait]
pub trait TranslationSource: Send + Sync {
    /// Start translating `text`. Blank text yields an empty stream.
    ///
    /// An `Err` here means the request could not be started; failures after
    /// that arrive through the stream.
    async fn translate(&self, text: &str, direction: TranslationDirection) -> AppResult<FragmentStream>;
}
