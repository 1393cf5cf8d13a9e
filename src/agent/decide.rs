//! Decision Engine: formats an observation and task into a model request,
//! invokes the completion provider, and extracts a validated turn from the
//! reply.

use crate::actions::{parser, Action, Turn};
use crate::config::ModelConfig;
use crate::env::Observation;
use crate::error::{DecisionError, Result};
use crate::prompt;
use crate::providers::{Completion, CompletionProvider, UserContent};

use super::Task;
use std::sync::Arc;

pub struct DecisionEngine {
    provider: Arc<dyn CompletionProvider>,
    model: ModelConfig,
    element_sample: usize,
}

impl DecisionEngine {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        model: ModelConfig,
        element_sample: usize,
    ) -> Self {
        Self {
            provider,
            model,
            element_sample,
        }
    }

    /// One decision for the current frame: exactly one action, or several
    /// `input_text` calls when the model fills a form.
    pub async fn decide(
        &self,
        task: &Task,
        observation: &Observation,
        history_window: usize,
    ) -> Result<Turn> {
        tracing::info!(url = %observation.url, "calculating next action");
        let system = self.system_block(prompt::SYSTEM_PROMPT, observation);
        let user = self.user_content(task, observation, history_window);
        let completion = self.complete_with_retry(&system, &user).await?;
        tracing::debug!(reply = %completion.text, "model reply");
        let code = extract_code(&completion.text)?;
        Ok(parser::parse_turn(code)?)
    }

    /// Multi-candidate mode: exactly 10 distinct proposals for the current
    /// frame, for offline ranking. Shares the request/parse contract with
    /// [`Self::decide`] but never executes anything.
    pub async fn propose_candidates(
        &self,
        task: &Task,
        observation: &Observation,
        history_window: usize,
    ) -> Result<Vec<Action>> {
        tracing::info!(url = %observation.url, "proposing candidate actions");
        let system = self.system_block(prompt::CANDIDATE_SYSTEM_PROMPT, observation);
        let user = self.user_content(task, observation, history_window);
        let completion = self.complete_with_retry(&system, &user).await?;
        let code = extract_code(&completion.text)?;
        Ok(parser::parse_candidates(code)?)
    }

    fn system_block(&self, base: &str, observation: &Observation) -> String {
        match prompt::element_sample(observation, self.element_sample) {
            Some(sample) => format!("{base}{sample}"),
            None => base.to_string(),
        }
    }

    fn user_content(
        &self,
        task: &Task,
        observation: &Observation,
        history_window: usize,
    ) -> UserContent {
        let mut content =
            UserContent::text(prompt::user_message(task, observation, history_window));
        if self.provider.supports_vision() {
            if let Some(screenshot) = &observation.screenshot {
                content = content.with_image("image/jpeg", screenshot.clone());
            }
        }
        content
    }

    /// Transport failures are retried exactly once after the provider's
    /// fixed back-off; a second failure propagates as fatal.
    async fn complete_with_retry(
        &self,
        system: &str,
        user: &UserContent,
    ) -> Result<Completion> {
        match self.provider.complete(system, user, &self.model).await {
            Ok(completion) => Ok(completion),
            Err(first) => {
                let delay = self.provider.retry_delay();
                tracing::warn!(
                    provider = self.provider.name(),
                    error = %first,
                    delay_secs = delay.as_secs(),
                    "completion call failed, retrying once"
                );
                tokio::time::sleep(delay).await;
                Ok(self.provider.complete(system, user, &self.model).await?)
            }
        }
    }
}

/// Slice out the code block between the literal marker and the closing
/// fence. The extracted text is handed verbatim to the action parser.
pub fn extract_code(text: &str) -> std::result::Result<&str, DecisionError> {
    let start = text
        .find(prompt::CODE_MARKER)
        .ok_or(DecisionError::MissingCodeBlock)?
        + prompt::CODE_MARKER.len();
    let rest = &text[start..];
    let end = rest.find("```").ok_or(DecisionError::UnterminatedCodeBlock)?;
    Ok(&rest[..end])
}
