use mockito::Matcher;
use newsdigest::llm::remote::RemoteLlmProvider;
use newsdigest::llm::{LlmProvider, LlmRequest};
use serde_json::json;

const COMPLETION: &str = r#"{
    "model": "google/gemini-2.5-flash-preview-05-20",
    "choices": [{
        "message": {
            "role": "assistant",
            "content": "{\"date\": \"2025-01-01\", \"executive_summary\": \"Quiet day.\", \"stories\": []}"
        },
        "finish_reason": "stop"
    }],
    "usage": {
        "prompt_tokens": 120,
        "completion_tokens": 30,
        "total_tokens": 150
    }
}"#;

#[tokio::test]
async fn test_remote_provider_with_mock() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("POST", "/")
        .match_header("authorization", "Bearer fake-api-key")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(COMPLETION)
        .create_async()
        .await;

    let provider = RemoteLlmProvider::new(server.url(), "fake-api-key", "google/gemini-2.5-flash-preview-05-20");

    let request = LlmRequest {
        prompt: "Test prompt".to_string(),
        max_tokens: Some(100),
        temperature: Some(0.7),
        timeout_seconds: Some(10),
        ..LlmRequest::default()
    };

    let response = provider.generate(request).await.expect("completion");
    assert!(response.content.contains("executive_summary"));
    assert_eq!(response.usage.prompt_tokens, 120);
    assert_eq!(response.usage.completion_tokens, 30);
    assert_eq!(response.usage.total_tokens, 150);
    assert_eq!(response.model, "google/gemini-2.5-flash-preview-05-20");

    mock.assert_async().await;
}

#[tokio::test]
async fn test_openrouter_headers_and_json_mode() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("POST", "/api/v1/chat/completions")
        .match_header("http-referer", "https://example.com")
        .match_header("x-title", "AI-News-Digest")
        .match_body(Matcher::PartialJson(json!({
            "model": "test-model",
            "max_tokens": 2048,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": "Be terse."},
                {"role": "user", "content": "Summarize today."}
            ]
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(COMPLETION)
        .create_async()
        .await;

    let provider = RemoteLlmProvider::new(
        format!("{}/api/v1/chat/completions", server.url()),
        "fake-api-key",
        "test-model",
    )
    .with_defaults(10, 2048, 0.3)
    .with_header("HTTP-Referer", "https://example.com")
    .with_header("X-Title", "AI-News-Digest");

    let request = LlmRequest {
        system: Some("Be terse.".to_string()),
        prompt: "Summarize today.".to_string(),
        json_mode: true,
        ..LlmRequest::default()
    };

    provider.generate(request).await.expect("completion");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_plain_request_omits_response_format() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("POST", "/")
        .match_body(Matcher::Regex(r#"^\{"model":"test-model","messages":\[\{"role":"user""#.to_string()))
        .with_status(200)
        .with_body(COMPLETION)
        .create_async()
        .await;
    let strict = server
        .mock("POST", "/")
        .match_body(Matcher::Regex("response_format".to_string()))
        .expect(0)
        .create_async()
        .await;

    let provider = RemoteLlmProvider::new(server.url(), "fake-api-key", "test-model");
    provider
        .generate(LlmRequest {
            prompt: "Hello".to_string(),
            ..LlmRequest::default()
        })
        .await
        .expect("completion");

    mock.assert_async().await;
    strict.assert_async().await;
}

#[tokio::test]
async fn test_missing_usage_defaults_to_zero() {
    let mut server = mockito::Server::new_async().await;

    let _mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_body(r#"{"choices": [{"message": {"role": "assistant", "content": "ok"}}]}"#)
        .create_async()
        .await;

    let provider = RemoteLlmProvider::new(server.url(), "fake-api-key", "fallback-model");
    let response = provider
        .generate(LlmRequest {
            prompt: "Hello".to_string(),
            ..LlmRequest::default()
        })
        .await
        .expect("completion");

    assert_eq!(response.content, "ok");
    assert_eq!(response.usage.total_tokens, 0);
    assert_eq!(response.model, "fallback-model");
}

#[tokio::test]
async fn test_empty_choices_is_an_error() {
    let mut server = mockito::Server::new_async().await;

    let _mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_body(r#"{"choices": []}"#)
        .create_async()
        .await;

    let provider = RemoteLlmProvider::new(server.url(), "fake-api-key", "test-model");
    let err = provider
        .generate(LlmRequest {
            prompt: "Hello".to_string(),
            ..LlmRequest::default()
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no choices"));
}

#[tokio::test]
async fn test_remote_provider_error_handling() {
    let mut server = mockito::Server::new_async().await;

    // Mock API error
    let mock = server
        .mock("POST", "/")
        .with_status(429)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error": {"message": "Rate limit exceeded"}}"#)
        .create_async()
        .await;

    let provider = RemoteLlmProvider::new(server.url(), "fake-api-key", "test-model");

    let request = LlmRequest {
        prompt: "Test".to_string(),
        ..LlmRequest::default()
    };

    let result = provider.generate(request).await;

    assert!(result.is_err());
    let err = result.unwrap_err();
    assert!(err.to_string().contains("429"));
    assert!(err.to_string().contains("Rate limit exceeded"));

    mock.assert_async().await;
}

#[tokio::test]
async fn test_remote_provider_timeout() {
    let mut server = mockito::Server::new_async().await;

    // Mock slow response
    let _mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_chunked_body(|w| {
            std::thread::sleep(std::time::Duration::from_secs(3));
            w.write_all(b"too late")
        })
        .create_async()
        .await;

    let provider = RemoteLlmProvider::new(server.url(), "fake-api-key", "test-model");

    let request = LlmRequest {
        prompt: "Test".to_string(),
        timeout_seconds: Some(1),
        ..LlmRequest::default()
    };

    let result = provider.generate(request).await;

    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("timed out"));
}
