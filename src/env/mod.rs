//! Browser environment contracts: the observation snapshot the agent reasons
//! over, and the traits a browser backend implements to produce it.

pub mod remote;

use crate::actions::Action;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use strum::Display;

/// Terminal state machine for one task.
///
/// A tagged union rather than a pair of booleans, so "succeeded and failed at
/// the same time" is unrepresentable. Derived purely from the current
/// observation; the control loop stores no status of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[strum(serialize = "IN_PROGRESS")]
    InProgress,
    #[strum(serialize = "SUCCESS")]
    Success,
    #[strum(serialize = "FAILED")]
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskStatus::InProgress)
    }
}

/// Viewport-relative box of a marked element, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// One interactable element the annotator marked on the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkedElement {
    /// Lower-cased HTML tag name (`button`, `input`, ...).
    pub tag: String,
    /// Visible text, possibly empty.
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub bounds: BoundingBox,
}

/// Immutable snapshot of page state produced after every browser interaction.
///
/// Element ids are unique and visually ordered within one observation only;
/// the next observation may renumber everything, which is why the control
/// loop resolves each action against the frame it was chosen from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub url: String,
    #[serde(default)]
    pub marked_elements: BTreeMap<u32, MarkedElement>,
    /// Raw image bytes of the annotated screenshot, when the backend took one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<Vec<u8>>,
    /// Non-empty only if the previous action raised an execution error.
    #[serde(default)]
    pub error_message: Option<String>,
    /// Append-only, one entry per successfully attempted action.
    #[serde(default)]
    pub log_history: Vec<String>,
    pub status: TaskStatus,
    /// Populated only at successful termination.
    #[serde(default)]
    pub output: Option<Map<String, Value>>,
}

impl Observation {
    /// Blank in-progress snapshot for a URL, before any page data arrived.
    pub fn initial(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            marked_elements: BTreeMap::new(),
            screenshot: None,
            error_message: None,
            log_history: Vec::new(),
            status: TaskStatus::InProgress,
            output: None,
        }
    }

    /// Next snapshot carrying a validation error back to the model.
    ///
    /// Used when an action was rejected before ever reaching the browser:
    /// page state is unchanged, only `error_message` differs.
    pub fn with_error(&self, message: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.error_message = Some(message.into());
        next
    }

    /// Next snapshot after a sub-agent ran to completion: the child's outcome
    /// is appended to the action log so the model can use it, and any stale
    /// execution error is cleared.
    pub fn after_subtask(
        &self,
        status: TaskStatus,
        output: Option<&Map<String, Value>>,
        log_message: &str,
    ) -> Self {
        let rendered = match output {
            Some(map) => serde_json::to_string(map).unwrap_or_else(|_| "{}".to_string()),
            None => "null".to_string(),
        };
        let mut next = self.clone();
        next.error_message = None;
        next.log_history
            .push(format!("{log_message} [sub-task {status}, output: {rendered}]"));
        next
    }
}

/// A positioned browser session the control loop drives.
///
/// `reset` navigates to a URL and returns the first observation; `step`
/// applies one validated action. `elements` is the marked-element map of the
/// frame the action's ids refer to — never assumed to match the frame the
/// step produces.
#[async_trait]
pub trait ObservationSource: Send + std::fmt::Debug {
    async fn reset(&mut self, url: &str) -> anyhow::Result<Observation>;

    async fn step(
        &mut self,
        action: &Action,
        elements: &BTreeMap<u32, MarkedElement>,
    ) -> anyhow::Result<Observation>;
}

/// Opens fresh browser sessions. One session is exclusively owned by one
/// control loop for the task's lifetime; sub-agents get their own.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> anyhow::Result<Box<dyn ObservationSource>>;
}
