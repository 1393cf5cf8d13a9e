//! The control loop: owns the task, the action budget, and the termination
//! state machine. Strictly sequential — every action is fully executed and
//! observed before the next decision is requested.

pub mod decide;

pub use decide::DecisionEngine;

use crate::actions::Action;
use crate::config::Config;
use crate::env::{Observation, SessionFactory, TaskStatus};
use crate::error::AgentError;
use crate::providers::CompletionProvider;
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// What to do and with which arguments. Immutable after creation; owned
/// exclusively by one control loop for its lifetime.
#[derive(Debug, Clone)]
pub struct Task {
    pub description: String,
    pub args: Map<String, Value>,
}

impl Task {
    pub fn new(description: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            description: description.into(),
            args,
        }
    }
}

/// Terminal result of one task run.
pub type TaskOutcome = (TaskStatus, Option<Map<String, Value>>);

pub struct Agent {
    engine: DecisionEngine,
    sessions: Arc<dyn SessionFactory>,
    history_window: usize,
}

impl Agent {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        sessions: Arc<dyn SessionFactory>,
        config: &Config,
    ) -> Self {
        Self {
            engine: DecisionEngine::new(
                provider,
                config.model.clone(),
                config.agent.element_sample,
            ),
            sessions,
            history_window: config.agent.history_window,
        }
    }

    /// Drive a task to a terminal status, or to budget exhaustion.
    ///
    /// Fatal errors mid-task (malformed model reply, provider down after its
    /// retry, browser transport failure) abort as `Failed` with the reason
    /// logged; the last observation's output is preserved and returned
    /// rather than discarded. Only failure to open the session at all is an
    /// `Err`, since no progress exists to preserve at that point.
    pub async fn run(
        &self,
        url: &str,
        task: &Task,
        max_actions: u32,
    ) -> anyhow::Result<TaskOutcome> {
        let mut source = self.sessions.open().await?;
        let mut observation = source.reset(url).await?;

        for _ in 0..max_actions {
            let turn = match self
                .engine
                .decide(task, &observation, self.history_window)
                .await
            {
                Ok(turn) => turn,
                Err(AgentError::Action(err)) => {
                    // Malformed action: not a crash. The error text rides the
                    // next observation so the model can correct itself. The
                    // iteration still counts against the budget.
                    tracing::warn!(error = %err, "rejected model action");
                    observation = observation.with_error(err.to_string());
                    continue;
                }
                Err(err) => {
                    tracing::error!(error = %err, "fatal error, aborting task");
                    return Ok((TaskStatus::Failed, observation.output.clone()));
                }
            };

            // Ids resolve against the frame they were chosen from; the next
            // observation may renumber everything.
            let frame = observation.marked_elements.clone();
            for action in turn.actions() {
                if let Some(log_message) = action.log_message() {
                    tracing::info!(action = action.name(), "{log_message}");
                }
                observation = match action {
                    Action::Act {
                        url: sub_url,
                        task: sub_task,
                        log_message,
                        args,
                    } => {
                        let child = Task::new(sub_task.clone(), args.clone());
                        match self.run_nested(sub_url, child, max_actions).await {
                            Ok((status, output)) => {
                                observation.after_subtask(status, output.as_ref(), log_message)
                            }
                            Err(err) => {
                                tracing::error!(error = %err, "sub-agent session failed");
                                observation
                                    .after_subtask(TaskStatus::Failed, None, log_message)
                            }
                        }
                    }
                    other => match source.step(other, &frame).await {
                        Ok(next) => next,
                        Err(err) => {
                            tracing::error!(error = %err, "browser step failed, aborting task");
                            return Ok((TaskStatus::Failed, observation.output.clone()));
                        }
                    },
                };
            }

            if observation.status.is_terminal() {
                return Ok((observation.status, observation.output.clone()));
            }
        }

        tracing::warn!(
            max_actions,
            "action budget exhausted without completing the task"
        );
        Ok((TaskStatus::Failed, observation.output.clone()))
    }

    /// Boxed recursion point for `act`: the child runs to completion inside
    /// the parent's future, with its own session and its own budget, leaving
    /// the parent's counter untouched.
    fn run_nested<'a>(
        &'a self,
        url: &'a str,
        task: Task,
        max_actions: u32,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<TaskOutcome>> + Send + 'a>> {
        Box::pin(async move { self.run(url, &task, max_actions).await })
    }
}
