//! The fixed action vocabulary the model is allowed to drive the browser
//! with, plus the strict parser that turns model output into it.

pub mod parser;

use crate::error::ActionError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
}

/// One validated operation from the fixed vocabulary.
///
/// Constructed only by [`parser`]; never partially applied — either the whole
/// call is well-formed or the turn is rejected before reaching the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Invoke the default activation on an element.
    Click { element_id: u32 },
    /// Set or append text in a field. `clear_before_input` replaces existing
    /// content. Contractually never valid on a combobox.
    InputText {
        element_id: u32,
        text: String,
        clear_before_input: bool,
        log_message: String,
    },
    /// Attach local files to a file-input-triggering element.
    UploadFiles {
        element_id: u32,
        files: Vec<String>,
        log_message: String,
    },
    Scroll {
        direction: ScrollDirection,
        log_message: String,
    },
    ComboboxSelect {
        element_id: u32,
        option: String,
        log_message: String,
    },
    /// Terminate the task, setting the terminal status and optional output.
    Finish {
        did_succeed: bool,
        output: Option<Map<String, Value>>,
        reason: String,
    },
    /// Delegate a sub-task to a nested agent on another page. Blocks the
    /// parent until the child reaches a terminal status.
    Act {
        url: String,
        task: String,
        log_message: String,
        #[serde(default)]
        args: Map<String, Value>,
    },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Click { .. } => "click",
            Action::InputText { .. } => "input_text",
            Action::UploadFiles { .. } => "upload_files",
            Action::Scroll { .. } => "scroll",
            Action::ComboboxSelect { .. } => "combobox_select",
            Action::Finish { .. } => "finish",
            Action::Act { .. } => "act",
        }
    }

    pub fn log_message(&self) -> Option<&str> {
        match self {
            Action::Click { .. } | Action::Finish { .. } => None,
            Action::InputText { log_message, .. }
            | Action::UploadFiles { log_message, .. }
            | Action::Scroll { log_message, .. }
            | Action::ComboboxSelect { log_message, .. }
            | Action::Act { log_message, .. } => Some(log_message),
        }
    }
}

/// Everything the model asked to do in one reply.
///
/// Holds exactly one action, except the documented form-filling exemption:
/// several calls are accepted iff every one of them is `input_text`.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    actions: Vec<Action>,
}

impl Turn {
    /// Enforce the one-action-per-turn contract at construction.
    pub fn from_calls(actions: Vec<Action>) -> Result<Self, ActionError> {
        match actions.len() {
            0 => Err(ActionError::EmptyTurn),
            1 => Ok(Self { actions }),
            n => {
                if actions.iter().all(|a| matches!(a, Action::InputText { .. })) {
                    Ok(Self { actions })
                } else {
                    Err(ActionError::MultipleCalls { count: n })
                }
            }
        }
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }
}
