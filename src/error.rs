use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `webagent`.
///
/// Each subsystem defines its own error variant. The control loop matches on
/// these to decide recovery strategy (feed back, retry, or abort); internal
/// glue continues to use `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum AgentError {
    // ── Decision Engine ─────────────────────────────────────────────────
    #[error("decision: {0}")]
    Decision(#[from] DecisionError),

    // ── Action vocabulary / parser ──────────────────────────────────────
    #[error("action: {0}")]
    Action(#[from] ActionError),

    // ── Completion provider ─────────────────────────────────────────────
    #[error("provider: {0}")]
    Provider(#[from] ProviderError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Decision Engine errors ─────────────────────────────────────────────────

/// The model response violated the reply format contract. Never retried;
/// propagates to the caller of `decide`.
#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("model response contains no code block marker")]
    MissingCodeBlock,

    #[error("code block opened but never closed with a ``` fence")]
    UnterminatedCodeBlock,
}

// ─── Action parser errors ───────────────────────────────────────────────────

/// The model proposed a malformed or disallowed action. Surfaced to the
/// control loop, which feeds the message back through the next observation's
/// `error_message` instead of crashing the task.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("unknown action `{0}`")]
    UnknownAction(String),

    #[error("keyword arguments are not allowed (got `{argument}` in `{action}`)")]
    KeywordArgument { action: String, argument: String },

    #[error("`{action}` expects {expected} argument(s), got {got}")]
    Arity {
        action: String,
        expected: usize,
        got: usize,
    },

    #[error("`{action}` argument {index}: {message}")]
    BadArgument {
        action: String,
        index: usize,
        message: String,
    },

    #[error("{count} action calls in one turn; only one is allowed (or several input_text calls when filling a form)")]
    MultipleCalls { count: usize },

    #[error("code block contains no action call")]
    EmptyTurn,

    #[error("syntax error in action call: {0}")]
    Syntax(String),

    #[error("expected exactly 10 distinct candidate actions, got {got}")]
    CandidateCount { got: usize },

    #[error("candidate list contains duplicate actions")]
    DuplicateCandidates,
}

// ─── Completion provider errors ─────────────────────────────────────────────

/// Transport-level failure talking to a completion backend. Recovered once
/// via a fixed-delay retry; a second failure is fatal for the task.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider {provider} request failed: {message}")]
    Request { provider: String, message: String },

    #[error("provider {provider} returned HTTP {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("provider {provider} returned a malformed response: {message}")]
    MalformedResponse { provider: String, message: String },

    #[error("provider {provider} has no credentials configured")]
    MissingCredentials { provider: String },
}

// ─── Config errors ──────────────────────────────────────────────────────────

/// Startup-time config failures. Surfaced to the caller through `anyhow`
/// rather than the runtime [`AgentError`] hierarchy: by the time a task is
/// running, configuration is already resolved.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("failed to parse config: {0}")]
    Parse(String),
}

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_error_displays_correctly() {
        let err = AgentError::Decision(DecisionError::MissingCodeBlock);
        assert!(err.to_string().contains("no code block marker"));
    }

    #[test]
    fn action_arity_displays_counts() {
        let err = AgentError::Action(ActionError::Arity {
            action: "click".into(),
            expected: 1,
            got: 3,
        });
        assert!(err.to_string().contains("expects 1"));
        assert!(err.to_string().contains("got 3"));
    }

    #[test]
    fn provider_status_displays_code() {
        let err = AgentError::Provider(ProviderError::Status {
            provider: "openai".into(),
            status: 429,
            body: "rate limited".into(),
        });
        assert!(err.to_string().contains("429"));
    }

    #[test]
    fn config_errors_name_their_phase() {
        assert!(ConfigError::Load("webagent.toml: denied".into())
            .to_string()
            .contains("failed to load"));
        assert!(ConfigError::Parse("expected table".into())
            .to_string()
            .contains("failed to parse"));
        // startup path: config errors surface through anyhow, not AgentError
        let err: anyhow::Error = ConfigError::Parse("expected table".into()).into();
        assert!(err.to_string().contains("failed to parse"));
    }

    #[test]
    fn anyhow_interop() {
        let anyhow_err = anyhow::anyhow!("something went wrong");
        let agent_err: AgentError = anyhow_err.into();
        assert!(agent_err.to_string().contains("something went wrong"));
    }

    #[test]
    fn action_errors_are_distinct_from_decision_errors() {
        let action = AgentError::Action(ActionError::EmptyTurn);
        let decision = AgentError::Decision(DecisionError::MissingCodeBlock);
        assert!(matches!(action, AgentError::Action(_)));
        assert!(matches!(decision, AgentError::Decision(_)));
    }
}
