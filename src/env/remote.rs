//! HTTP-backed browser session: a thin reqwest client for a browser sidecar
//! that owns the actual Playwright/annotation machinery. The sidecar speaks
//! JSON and ships screenshots base64-encoded.

use super::{MarkedElement, Observation, ObservationSource, SessionFactory, TaskStatus};
use crate::actions::Action;
use crate::providers::http_client::build_http_client;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Observation as the sidecar serializes it. The terminal state arrives as
/// two independent booleans; they collapse into [`TaskStatus`] here, checking
/// success first, so the rest of the crate never sees the ambiguous encoding.
#[derive(Debug, Deserialize)]
struct WireObservation {
    url: String,
    #[serde(default)]
    marked_elements: BTreeMap<u32, MarkedElement>,
    #[serde(default)]
    screenshot: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    log_history: Vec<String>,
    #[serde(default)]
    has_succeeded: bool,
    #[serde(default)]
    has_failed: bool,
    #[serde(default)]
    output: Option<Map<String, Value>>,
}

impl WireObservation {
    fn into_observation(self) -> Result<Observation> {
        let status = if self.has_succeeded {
            TaskStatus::Success
        } else if self.has_failed {
            TaskStatus::Failed
        } else {
            TaskStatus::InProgress
        };
        let screenshot = self
            .screenshot
            .map(|b64| {
                base64::engine::general_purpose::STANDARD
                    .decode(b64.as_bytes())
                    .context("screenshot is not valid base64")
            })
            .transpose()?;
        Ok(Observation {
            url: self.url,
            marked_elements: self.marked_elements,
            screenshot,
            error_message: self.error_message.filter(|m| !m.is_empty()),
            log_history: self.log_history,
            status,
            output: self.output,
        })
    }
}

#[derive(Debug, Serialize)]
struct StepBody<'a> {
    action: &'a Action,
    elements: &'a BTreeMap<u32, MarkedElement>,
}

#[derive(Debug, Deserialize)]
struct SessionCreated {
    session_id: String,
}

/// One remote browser session, exclusively owned by one control loop.
#[derive(Debug)]
pub struct RemoteBrowser {
    client: reqwest::Client,
    base: url::Url,
    session_id: String,
}

impl RemoteBrowser {
    fn endpoint(&self, suffix: &str) -> Result<url::Url> {
        self.base
            .join(&format!("session/{}/{suffix}", self.session_id))
            .context("invalid sidecar endpoint")
    }

    async fn fetch_observation(
        &self,
        endpoint: url::Url,
        body: &impl Serialize,
    ) -> Result<Observation> {
        let response = self
            .client
            .post(endpoint)
            .json(body)
            .send()
            .await
            .context("browser sidecar unreachable")?;
        if !response.status().is_success() {
            bail!("browser sidecar returned HTTP {}", response.status());
        }
        let wire: WireObservation = response
            .json()
            .await
            .context("browser sidecar returned malformed observation")?;
        wire.into_observation()
    }
}

#[async_trait]
impl ObservationSource for RemoteBrowser {
    async fn reset(&mut self, url: &str) -> Result<Observation> {
        let endpoint = self.endpoint("reset")?;
        self.fetch_observation(endpoint, &serde_json::json!({ "url": url }))
            .await
    }

    async fn step(
        &mut self,
        action: &Action,
        elements: &BTreeMap<u32, MarkedElement>,
    ) -> Result<Observation> {
        let endpoint = self.endpoint("step")?;
        self.fetch_observation(endpoint, &StepBody { action, elements })
            .await
    }
}

/// Opens sessions against a browser sidecar at a base URL.
pub struct RemoteBrowserFactory {
    client: reqwest::Client,
    base: url::Url,
}

impl RemoteBrowserFactory {
    pub fn new(base_url: &str) -> Result<Self> {
        let base = url::Url::parse(base_url).context("invalid browser sidecar URL")?;
        Ok(Self {
            client: build_http_client(120),
            base,
        })
    }
}

#[async_trait]
impl SessionFactory for RemoteBrowserFactory {
    async fn open(&self) -> Result<Box<dyn ObservationSource>> {
        let endpoint = self.base.join("session").context("invalid sidecar URL")?;
        let response = self
            .client
            .post(endpoint)
            .send()
            .await
            .context("browser sidecar unreachable")?;
        if !response.status().is_success() {
            bail!(
                "browser sidecar refused to open a session: HTTP {}",
                response.status()
            );
        }
        let created: SessionCreated = response
            .json()
            .await
            .context("browser sidecar returned malformed session response")?;
        tracing::debug!(session_id = %created.session_id, "opened browser session");
        Ok(Box::new(RemoteBrowser {
            client: self.client.clone(),
            base: self.base.clone(),
            session_id: created.session_id,
        }))
    }
}
