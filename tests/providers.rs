//! HTTP wire-level tests for the completion backends and the browser sidecar
//! client, against a mock server.

use serde_json::json;
use webagent::actions::Action;
use webagent::config::ModelConfig;
use webagent::env::remote::RemoteBrowserFactory;
use webagent::env::{SessionFactory, TaskStatus};
use webagent::error::ProviderError;
use webagent::providers::{BasetenProvider, CompletionProvider, OpenAiProvider, UserContent};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn openai_parses_reply_and_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({ "model": "gpt-4o" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "actions.click(3)" } }],
            "usage": { "prompt_tokens": 120, "completion_tokens": 8 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OpenAiProvider::with_base_url(Some("sk-test"), &server.uri());
    let completion = provider
        .complete("system", &UserContent::text("user"), &ModelConfig::default())
        .await
        .unwrap();

    assert_eq!(completion.text, "actions.click(3)");
    let usage = completion.usage.unwrap();
    assert_eq!(usage.prompt_tokens, 120);
    assert_eq!(usage.completion_tokens, 8);
}

#[tokio::test]
async fn openai_surfaces_http_status_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let provider = OpenAiProvider::with_base_url(Some("sk-test"), &server.uri());
    let err = provider
        .complete("system", &UserContent::text("user"), &ModelConfig::default())
        .await
        .unwrap_err();

    match err {
        ProviderError::Status { status, body, .. } => {
            assert_eq!(status, 429);
            assert_eq!(body, "rate limited");
        }
        other => panic!("expected a status error, got {other}"),
    }
}

#[tokio::test]
async fn openai_rejects_empty_choices() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let provider = OpenAiProvider::with_base_url(Some("sk-test"), &server.uri());
    let err = provider
        .complete("system", &UserContent::text("user"), &ModelConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::MalformedResponse { .. }));
}

#[tokio::test]
async fn baseten_posts_joined_prompt_and_returns_raw_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/predict"))
        .and(header("Authorization", "Api-Key bt-test"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Reasoning: done"))
        .expect(1)
        .mount(&server)
        .await;

    let endpoint = format!("{}/predict", server.uri());
    let provider = BasetenProvider::new(Some("bt-test"), Some(&endpoint));
    let completion = provider
        .complete("system", &UserContent::text("user"), &ModelConfig::default())
        .await
        .unwrap();

    assert_eq!(completion.text, "Reasoning: done");
    assert!(completion.usage.is_none());
}

#[tokio::test]
async fn sidecar_session_opens_resets_and_steps() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/session"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "session_id": "s-42" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/session/s-42/reset"))
        .and(body_partial_json(json!({ "url": "https://shop.example" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "url": "https://shop.example",
            "marked_elements": {
                "1": { "tag": "button", "text": "Checkout" }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/session/s-42/step"))
        .and(body_partial_json(json!({
            "action": { "action": "click", "element_id": 1 }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "url": "https://shop.example/cart",
            "has_succeeded": true,
            "output": { "total": "12.50" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let factory = RemoteBrowserFactory::new(&format!("{}/", server.uri())).unwrap();
    let mut session = factory.open().await.unwrap();

    let first = session.reset("https://shop.example").await.unwrap();
    assert_eq!(first.status, TaskStatus::InProgress);
    assert_eq!(first.marked_elements[&1].text, "Checkout");

    let next = session
        .step(&Action::Click { element_id: 1 }, &first.marked_elements)
        .await
        .unwrap();
    assert_eq!(next.status, TaskStatus::Success);
    assert_eq!(next.output.unwrap()["total"], "12.50");
}

#[tokio::test]
async fn sidecar_refusal_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/session"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let factory = RemoteBrowserFactory::new(&format!("{}/", server.uri())).unwrap();
    let err = factory.open().await.unwrap_err();
    assert!(err.to_string().contains("refused"));
}
