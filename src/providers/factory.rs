use super::baseten::BasetenProvider;
use super::openai::OpenAiProvider;
use super::traits::CompletionProvider;
use std::sync::Arc;

/// Resolve an API key for a provider from config and environment variables.
///
/// Resolution order:
/// 1. Explicitly provided `api_key` parameter (trimmed, filtered if empty)
/// 2. Provider-specific environment variable
/// 3. Generic fallback variables (`WEBAGENT_API_KEY`, `API_KEY`)
fn resolve_api_key(name: &str, explicit_api_key: Option<&str>) -> Option<String> {
    if let Some(key) = explicit_api_key.map(str::trim).filter(|k| !k.is_empty()) {
        return Some(key.to_string());
    }

    let provider_env_candidates: &[&str] = match name {
        "openai" => &["OPENAI_API_KEY"],
        "baseten" | "llama" => &["BASETEN_API_KEY"],
        _ => &[],
    };

    for env_var in provider_env_candidates {
        if let Ok(value) = std::env::var(env_var) {
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }

    for env_var in ["WEBAGENT_API_KEY", "API_KEY"] {
        if let Ok(value) = std::env::var(env_var) {
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }

    None
}

/// Build a completion backend by name, with env-var credential resolution.
/// Backend choice is configuration, not call-site duplication.
pub fn create_provider(
    name: &str,
    api_key: Option<&str>,
) -> anyhow::Result<Arc<dyn CompletionProvider>> {
    let resolved_key = resolve_api_key(name, api_key);
    let api_key = resolved_key.as_deref();
    match name {
        "openai" => Ok(Arc::new(OpenAiProvider::new(api_key))),
        "baseten" | "llama" => {
            let endpoint = std::env::var("BASETEN_MODEL_URL").ok();
            Ok(Arc::new(BasetenProvider::new(api_key, endpoint.as_deref())))
        }
        other => anyhow::bail!("unknown provider `{other}` (expected `openai` or `baseten`)"),
    }
}
