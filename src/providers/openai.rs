use super::http_client::build_http_client;
use super::traits::{Completion, CompletionProvider, TokenUsage, UserContent};
use crate::config::ModelConfig;
use crate::error::ProviderError;
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI chat-completions backend. The primary, vision-capable provider.
#[derive(Debug)]
pub struct OpenAiProvider {
    /// Pre-computed `"Bearer <key>"` header value (avoids `format!` per request).
    cached_auth_header: Option<String>,
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
    detail: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl OpenAiProvider {
    pub fn new(api_key: Option<&str>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Point the provider at a different endpoint (proxies, mock servers).
    pub fn with_base_url(api_key: Option<&str>, base_url: &str) -> Self {
        Self {
            cached_auth_header: api_key.map(|k| format!("Bearer {k}")),
            client: build_http_client(120),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn build_request(system_prompt: &str, user: &UserContent, params: &ModelConfig) -> ChatRequest {
        let mut user_parts = vec![ContentPart::Text {
            text: user.text.clone(),
        }];
        if let Some(image) = &user.image {
            let encoded = base64::engine::general_purpose::STANDARD.encode(&image.bytes);
            user_parts.push(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: format!("data:{};base64,{encoded}", image.media_type),
                    detail: "high",
                },
            });
        }

        ChatRequest {
            model: params.name.clone(),
            messages: vec![
                Message {
                    role: "system",
                    content: vec![ContentPart::Text {
                        text: system_prompt.to_string(),
                    }],
                },
                Message {
                    role: "user",
                    content: user_parts,
                },
            ],
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        }
    }

    fn request_error(&self, err: &reqwest::Error) -> ProviderError {
        ProviderError::Request {
            provider: self.name().to_string(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn supports_vision(&self) -> bool {
        true
    }

    async fn complete(
        &self,
        system_prompt: &str,
        user: &UserContent,
        params: &ModelConfig,
    ) -> Result<Completion, ProviderError> {
        let Some(auth_header) = &self.cached_auth_header else {
            return Err(ProviderError::MissingCredentials {
                provider: self.name().to_string(),
            });
        };

        let request = Self::build_request(system_prompt, user, params);
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", auth_header)
            .timeout(std::time::Duration::from_secs(params.request_timeout_secs))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.request_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                provider: self.name().to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            ProviderError::MalformedResponse {
                provider: self.name().to_string(),
                message: e.to_string(),
            }
        })?;

        let text = parsed
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| ProviderError::MalformedResponse {
                provider: self.name().to_string(),
                message: "response contains no choices".to_string(),
            })?;

        Ok(Completion {
            text,
            usage: parsed.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            }),
        })
    }
}
