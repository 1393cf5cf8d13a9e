use super::http_client::build_http_client;
use super::traits::{Completion, CompletionProvider, UserContent};
use crate::config::ModelConfig;
use crate::error::ProviderError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

/// Baseten raw-prompt backend (Llama deployments). Text-only secondary
/// provider: no structured messages, so the system and user halves are
/// concatenated into a single prompt.
#[derive(Debug)]
pub struct BasetenProvider {
    /// Pre-computed `"Api-Key <key>"` header value.
    cached_auth_header: Option<String>,
    endpoint: Option<String>,
    client: Client,
}

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    prompt: &'a str,
    stream: bool,
    max_tokens: u32,
}

impl BasetenProvider {
    pub fn new(api_key: Option<&str>, endpoint: Option<&str>) -> Self {
        Self {
            cached_auth_header: api_key.map(|k| format!("Api-Key {k}")),
            endpoint: endpoint.map(str::to_string),
            client: build_http_client(120),
        }
    }

    fn join_prompt(system_prompt: &str, user: &UserContent) -> String {
        format!(
            "This is the system prompt: {system_prompt}\nThis is the user prompt: {}",
            user.text
        )
    }
}

#[async_trait]
impl CompletionProvider for BasetenProvider {
    fn name(&self) -> &'static str {
        "baseten"
    }

    /// Secondary provider backs off for 10s instead of the primary's 30s.
    fn retry_delay(&self) -> Duration {
        Duration::from_secs(10)
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
        let Some(endpoint) = &self.endpoint else {
            return Err(ProviderError::Request {
                provider: self.name().to_string(),
                message: "no model endpoint configured (set BASETEN_MODEL_URL)".to_string(),
            });
        };

        let prompt = Self::join_prompt(system_prompt, user);
        let response = self
            .client
            .post(endpoint)
            .header("Authorization", auth_header)
            .timeout(Duration::from_secs(params.request_timeout_secs))
            .json(&PredictRequest {
                prompt: &prompt,
                stream: false,
                max_tokens: params.max_tokens,
            })
            .send()
            .await
            .map_err(|e| ProviderError::Request {
                provider: self.name().to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                provider: self.name().to_string(),
                status: status.as_u16(),
                body,
            });
        }

        // Deployments stream raw text; there is no envelope to parse.
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::MalformedResponse {
                provider: self.name().to_string(),
                message: e.to_string(),
            })?;

        Ok(Completion::text_only(text))
    }
}
