use super::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer, batch_size: u32) -> OllamaClient {
    let address = server.address();
    let config = OllamaConfig {
        host: address.ip().to_string(),
        port: address.port(),
        embedding_model: "embed-test".to_string(),
        generation_model: "chat-test".to_string(),
        batch_size,
        ..OllamaConfig::default()
    };
    OllamaClient::new(&config)
        .expect("should create client")
        .with_timeout(Duration::from_secs(5))
}

/// ureq is blocking, so run client calls off the async worker
async fn blocking<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
    tokio::task::spawn_blocking(f)
        .await
        .expect("blocking task should not panic")
}

#[test]
fn test_client_configuration() {
    let config = OllamaConfig {
        host: "test-host".to_string(),
        port: 1234,
        batch_size: 0,
        ..OllamaConfig::default()
    };
    let client = OllamaClient::new(&config).expect("should create client");

    assert_eq!(client.base_url().host_str(), Some("test-host"));
    assert_eq!(client.base_url().port(), Some(1234));
    assert_eq!(client.model_id(), "nomic-embed-text:latest");
    assert_eq!(client.generation_model(), "llama3.2:latest");
    assert_eq!(client.batch_size, 1);
}

#[tokio::test]
async fn test_embed_batch_splits_requests() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"model": "embed-test"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"embeddings": [[1.0, 0.0], [0.0, 1.0]]})),
        )
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server, 2);
    let texts: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
    let embeddings = blocking(move || client.embed_batch(&texts))
        .await
        .expect("should embed");

    assert_eq!(embeddings.len(), 4);
    assert_eq!(embeddings[2], vec![1.0, 0.0]);
}

#[tokio::test]
async fn test_embed_single_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"input": ["hello"]})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[0.5, 0.25, 0.125]]})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, 8);
    let embedding = blocking(move || client.embed("hello"))
        .await
        .expect("should embed");

    assert_eq!(embedding, vec![0.5, 0.25, 0.125]);
}

#[tokio::test]
async fn test_embed_count_mismatch_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[1.0]]})))
        .mount(&server)
        .await;

    let client = client_for(&server, 8);
    let texts = vec!["one".to_string(), "two".to_string()];
    let result = blocking(move || client.embed_batch(&texts)).await;

    assert!(matches!(result, Err(RagError::EmbeddingService(_))));
}

#[tokio::test]
async fn test_embed_server_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 8);
    let result = blocking(move || client.embed("text")).await;

    match result {
        Err(RagError::EmbeddingService(message)) => assert!(message.contains("500")),
        other => panic!("expected embedding service error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_complete_returns_message_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({
            "model": "chat-test",
            "stream": false,
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "Context:\n\n\nQuestion: hi\n\nAnswer:"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "chat-test",
            "message": {"role": "assistant", "content": "  Hello there.\n"},
            "done": true
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, 8);
    let answer = blocking(move || {
        client.complete("be brief", "Context:\n\n\nQuestion: hi\n\nAnswer:")
    })
    .await
    .expect("should complete");

    assert_eq!(answer, "Hello there.");
}

#[tokio::test]
async fn test_complete_maps_429_to_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let client = client_for(&server, 8);
    let result = blocking(move || client.complete("sys", "prompt")).await;

    assert!(matches!(result, Err(GenerationError::RateLimited(_))));
}

#[tokio::test]
async fn test_complete_maps_other_failures_to_service_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "model not found"})))
        .mount(&server)
        .await;

    let client = client_for(&server, 8);
    let result = blocking(move || client.complete("sys", "prompt")).await;

    assert!(matches!(result, Err(GenerationError::Service(_))));
}

#[tokio::test]
async fn test_health_check_requires_both_models() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": "embed-test"}, {"name": "other"}]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, 8);
    let result = blocking(move || client.health_check()).await;

    match result {
        Err(RagError::Config(message)) => assert!(message.contains("chat-test")),
        other => panic!("expected missing model error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_health_check_passes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                {"name": "embed-test", "size": 274302450},
                {"name": "chat-test", "digest": "abc"}
            ]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, 8);
    let models = blocking({
        let client = client.clone();
        move || client.list_models()
    })
    .await
    .expect("should list models");
    assert_eq!(models.len(), 2);

    blocking(move || client.health_check())
        .await
        .expect("health check should pass");
}
