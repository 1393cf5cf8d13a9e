use crate::config::ModelConfig;
use crate::error::ProviderError;
use async_trait::async_trait;
use std::time::Duration;

/// An image attached to the user half of a request.
#[derive(Debug, Clone)]
pub struct ImageData {
    /// MIME type, e.g. `image/jpeg`.
    pub media_type: &'static str,
    pub bytes: Vec<u8>,
}

/// The user half of a completion request: text, optionally paired with an
/// image for vision-capable backends. Backends without vision ignore the
/// image.
#[derive(Debug, Clone)]
pub struct UserContent {
    pub text: String,
    pub image: Option<ImageData>,
}

impl UserContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, media_type: &'static str, bytes: Vec<u8>) -> Self {
        self.image = Some(ImageData { media_type, bytes });
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// One model reply plus whatever usage accounting the backend reported.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

impl Completion {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
        }
    }
}

/// A text/vision completion backend.
///
/// Implementations must surface transport failures as [`ProviderError`]; the
/// Decision Engine recovers with exactly one fixed-delay retry and treats a
/// second failure as fatal.
#[async_trait]
pub trait CompletionProvider: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Whether screenshots should be attached to requests.
    fn supports_vision(&self) -> bool {
        false
    }

    /// Fixed back-off before the single retry on transport failure.
    fn retry_delay(&self) -> Duration {
        Duration::from_secs(30)
    }

    async fn complete(
        &self,
        system_prompt: &str,
        user: &UserContent,
        params: &ModelConfig,
    ) -> Result<Completion, ProviderError>;
}
