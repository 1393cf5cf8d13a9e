//! End-to-end control-loop tests against a scripted completion backend and an
//! in-memory browser session.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use webagent::actions::Action;
use webagent::config::{Config, ModelConfig};
use webagent::env::{MarkedElement, Observation, ObservationSource, SessionFactory, TaskStatus};
use webagent::error::ProviderError;
use webagent::providers::{Completion, CompletionProvider, UserContent};
use webagent::{Agent, Task};

fn reply(code: &str) -> String {
    format!("Reasoning:\nscripted.\n\nCode:\n```python\n{code}\n```\n")
}

/// Replies with a fixed script, one entry per completion call. A `None` entry
/// simulates a transport failure. The last entry repeats if the script runs
/// out, and every user prompt is recorded for assertions.
#[derive(Debug)]
struct ScriptedProvider {
    script: Vec<Option<String>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    fn new(script: Vec<Option<String>>) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn prompt(&self, index: usize) -> String {
        self.prompts.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn retry_delay(&self) -> Duration {
        Duration::from_millis(0)
    }

    async fn complete(
        &self,
        _system: &str,
        user: &UserContent,
        _params: &ModelConfig,
    ) -> Result<Completion, ProviderError> {
        self.prompts.lock().unwrap().push(user.text.clone());
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let entry = self
            .script
            .get(call)
            .or_else(|| self.script.last())
            .expect("script must not be empty");
        match entry {
            Some(text) => Ok(Completion::text_only(text.clone())),
            None => Err(ProviderError::Request {
                provider: "scripted".into(),
                message: "connection reset".into(),
            }),
        }
    }
}

/// In-memory browser session: `finish` terminates, everything else produces
/// the next in-progress frame and records what was executed.
#[derive(Debug)]
struct FakeBrowser {
    url: String,
    log: Vec<String>,
    executed: Arc<Mutex<Vec<Action>>>,
}

#[async_trait]
impl ObservationSource for FakeBrowser {
    async fn reset(&mut self, url: &str) -> anyhow::Result<Observation> {
        self.url = url.to_string();
        let mut obs = Observation::initial(url);
        obs.marked_elements.insert(
            1,
            MarkedElement {
                tag: "button".into(),
                text: "Submit".into(),
                bounds: Default::default(),
            },
        );
        Ok(obs)
    }

    async fn step(
        &mut self,
        action: &Action,
        _elements: &BTreeMap<u32, MarkedElement>,
    ) -> anyhow::Result<Observation> {
        self.executed.lock().unwrap().push(action.clone());
        let mut obs = Observation::initial(&self.url);
        if let Action::Finish {
            did_succeed,
            output,
            reason,
        } = action
        {
            self.log.push(reason.clone());
            obs.status = if *did_succeed {
                TaskStatus::Success
            } else {
                TaskStatus::Failed
            };
            obs.output = if *did_succeed { output.clone() } else { None };
        } else {
            self.log.push(format!("executed {}", action.name()));
        }
        obs.log_history = self.log.clone();
        Ok(obs)
    }
}

struct FakeSessions {
    opened: AtomicUsize,
    executed: Arc<Mutex<Vec<Action>>>,
}

impl FakeSessions {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            opened: AtomicUsize::new(0),
            executed: Arc::new(Mutex::new(Vec::new())),
        })
    }
}

#[async_trait]
impl SessionFactory for FakeSessions {
    async fn open(&self) -> anyhow::Result<Box<dyn ObservationSource>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeBrowser {
            url: String::new(),
            log: Vec::new(),
            executed: self.executed.clone(),
        }))
    }
}

fn agent(provider: Arc<ScriptedProvider>, sessions: Arc<FakeSessions>) -> Agent {
    Agent::new(provider, sessions, &Config::default())
}

fn task(description: &str) -> Task {
    Task::new(description, Map::new())
}

#[tokio::test]
async fn successful_finish_returns_output() {
    let provider = ScriptedProvider::new(vec![Some(reply(
        r#"actions.finish(True, {"order_id": "A-17"}, "order placed")"#,
    ))]);
    let sessions = FakeSessions::new();
    let (status, output) = agent(provider.clone(), sessions)
        .run("https://shop.example", &task("buy a pencil"), 5)
        .await
        .unwrap();

    assert_eq!(status, TaskStatus::Success);
    assert_eq!(output.unwrap()["order_id"], Value::String("A-17".into()));
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn failed_finish_returns_no_output() {
    let provider = ScriptedProvider::new(vec![Some(reply(
        r#"actions.finish(False, None, "out of stock")"#,
    ))]);
    let sessions = FakeSessions::new();
    let (status, output) = agent(provider, sessions)
        .run("https://shop.example", &task("buy a pencil"), 5)
        .await
        .unwrap();

    assert_eq!(status, TaskStatus::Failed);
    assert!(output.is_none());
}

#[tokio::test]
async fn budget_exhaustion_fails_after_exact_count() {
    let provider = ScriptedProvider::new(vec![Some(reply("actions.click(1)"))]);
    let sessions = FakeSessions::new();
    let (status, output) = agent(provider.clone(), sessions.clone())
        .run("https://shop.example", &task("buy a pencil"), 3)
        .await
        .unwrap();

    assert_eq!(status, TaskStatus::Failed);
    assert!(output.is_none());
    assert_eq!(provider.calls(), 3);
    assert_eq!(sessions.executed.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn one_provider_failure_is_invisible_to_the_loop() {
    let provider = ScriptedProvider::new(vec![
        None,
        Some(reply(r#"actions.finish(True, None, "done")"#)),
    ]);
    let sessions = FakeSessions::new();
    let (status, _) = agent(provider.clone(), sessions)
        .run("https://shop.example", &task("buy a pencil"), 5)
        .await
        .unwrap();

    assert_eq!(status, TaskStatus::Success);
    // failed call + retry, both inside one loop iteration
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn repeated_provider_failure_aborts_as_failed() {
    let provider = ScriptedProvider::new(vec![None, None]);
    let sessions = FakeSessions::new();
    let (status, output) = agent(provider.clone(), sessions)
        .run("https://shop.example", &task("buy a pencil"), 5)
        .await
        .unwrap();

    assert_eq!(status, TaskStatus::Failed);
    assert!(output.is_none());
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn rejected_action_feeds_error_back_and_burns_budget() {
    let provider = ScriptedProvider::new(vec![
        Some(reply("actions.frobnicate(1)")),
        Some(reply(r#"actions.finish(True, None, "done")"#)),
    ]);
    let sessions = FakeSessions::new();
    let (status, _) = agent(provider.clone(), sessions.clone())
        .run("https://shop.example", &task("buy a pencil"), 5)
        .await
        .unwrap();

    assert_eq!(status, TaskStatus::Success);
    // the rejected turn never reached the browser
    assert_eq!(sessions.executed.lock().unwrap().len(), 1);
    // the second prompt carries the validation error text
    let second = provider.prompt(1);
    assert!(second.contains("Execution error"));
    assert!(second.contains("frobnicate"));
}

#[tokio::test]
async fn rejected_actions_alone_exhaust_the_budget() {
    let provider = ScriptedProvider::new(vec![Some(reply("actions.click()"))]);
    let sessions = FakeSessions::new();
    let (status, _) = agent(provider.clone(), sessions.clone())
        .run("https://shop.example", &task("buy a pencil"), 2)
        .await
        .unwrap();

    assert_eq!(status, TaskStatus::Failed);
    assert_eq!(provider.calls(), 2);
    assert!(sessions.executed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn multiple_input_text_calls_run_in_one_turn() {
    let provider = ScriptedProvider::new(vec![
        Some(reply(concat!(
            "actions.input_text(1, \"jo@example.com\", True, \"fill email\")\n",
            "actions.input_text(2, \"secret\", True, \"fill password\")",
        ))),
        Some(reply(r#"actions.finish(True, None, "done")"#)),
    ]);
    let sessions = FakeSessions::new();
    let (status, _) = agent(provider.clone(), sessions.clone())
        .run("https://shop.example", &task("log in"), 5)
        .await
        .unwrap();

    assert_eq!(status, TaskStatus::Success);
    // both fills plus the finish, but only two decisions
    assert_eq!(sessions.executed.lock().unwrap().len(), 3);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn nested_act_runs_in_its_own_session() {
    let provider = ScriptedProvider::new(vec![
        // parent: delegate to a sub-agent
        Some(reply(
            r#"actions.act("https://mail.example", "read the code", "fetch auth code")"#,
        )),
        // child: finish with output
        Some(reply(r#"actions.finish(True, {"code": "9431"}, "found it")"#)),
        // parent: finish using the sub-task outcome
        Some(reply(r#"actions.finish(True, {"code": "9431"}, "done")"#)),
    ]);
    let sessions = FakeSessions::new();
    let mut config = Config::default();
    config.agent.history_window = 3;
    let agent = Agent::new(provider.clone(), sessions.clone(), &config);
    let (status, output) = agent
        .run("https://shop.example", &task("check out with 2fa"), 2)
        .await
        .unwrap();

    assert_eq!(status, TaskStatus::Success);
    assert_eq!(output.unwrap()["code"], Value::String("9431".into()));
    // one session for the parent, one for the child
    assert_eq!(sessions.opened.load(Ordering::SeqCst), 2);
    // the parent finished within a 2-action budget: the sub-task cost it one
    assert_eq!(provider.calls(), 3);
    // the parent's third prompt sees the child's outcome in the action log
    let third = provider.prompt(2);
    assert!(third.contains("fetch auth code"));
    assert!(third.contains("SUCCESS"));
    assert!(third.contains("9431"));
}

#[tokio::test]
async fn history_window_limits_prompt_log() {
    let provider = ScriptedProvider::new(vec![Some(reply("actions.click(1)"))]);
    let sessions = FakeSessions::new();
    let mut config = Config::default();
    config.agent.history_window = 1;
    let agent = Agent::new(provider.clone(), sessions, &config);
    let (_, _) = agent
        .run("https://shop.example", &task("buy a pencil"), 3)
        .await
        .unwrap();

    // third decision: two clicks in the log, window of one keeps only the last
    let third = provider.prompt(2);
    assert!(third.contains("Log of last actions"));
    assert_eq!(third.matches("executed click").count(), 1);
}
