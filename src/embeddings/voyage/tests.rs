use super::*;
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, header, method, path},
};

const DIM: usize = 64;

fn test_config(base_url: &str) -> EmbeddingConfig {
    EmbeddingConfig {
        base_url: base_url.to_string(),
        dimension: DIM as u32,
        batch_size: 2,
        ..EmbeddingConfig::default()
    }
}

fn client_for(server: &MockServer) -> VoyageClient {
    VoyageClient::new(&test_config(&server.uri()), "test-key")
        .expect("should build client")
        .with_retry_policy(RetryPolicy::new(2, Duration::ZERO))
}

fn vector(value: f32) -> Vec<f32> {
    vec![value; DIM]
}

#[test]
fn rejects_invalid_configuration() {
    let mut config = test_config("not a url");
    assert!(matches!(
        VoyageClient::new(&config, "key"),
        Err(RagError::Config(_))
    ));

    config.base_url = "http://localhost:9".to_string();
    config.batch_size = 0;
    assert!(matches!(
        VoyageClient::new(&config, "key"),
        Err(RagError::Config(_))
    ));
}

#[test]
fn debug_output_hides_api_key() {
    let client = VoyageClient::new(&test_config("http://localhost:9"), "very-secret-key")
        .expect("should build client");
    assert!(!format!("{:?}", client).contains("very-secret-key"));
}

#[tokio::test(flavor = "multi_thread")]
async fn embeds_documents_in_input_order() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({"input_type": "document"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"embedding": vector(2.0), "index": 1},
                {"embedding": vector(1.0), "index": 0},
            ]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let texts = vec!["premier".to_string(), "second".to_string()];
    let vectors = client.embed(&texts).await.expect("should embed");

    assert_eq!(vectors, vec![vector(1.0), vector(2.0)]);
}

#[tokio::test(flavor = "multi_thread")]
async fn splits_requests_into_batches() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(body_partial_json(json!({"input": ["a", "b"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"embedding": vector(0.1), "index": 0},
                {"embedding": vector(0.2), "index": 1},
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(body_partial_json(json!({"input": ["c"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"embedding": vector(0.3), "index": 0}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let texts: Vec<String> = ["a", "b", "c"].iter().map(ToString::to_string).collect();
    let vectors = client.embed(&texts).await.expect("should embed all batches");

    assert_eq!(vectors, vec![vector(0.1), vector(0.2), vector(0.3)]);
}

#[tokio::test(flavor = "multi_thread")]
async fn query_embedding_uses_query_input_type() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(body_partial_json(json!({"input_type": "query"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"embedding": vector(0.5), "index": 0}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let query = client
        .embed_query("concerts de jazz")
        .await
        .expect("should embed query");

    assert_eq!(query, vector(0.5));
    assert_eq!(client.dimension(), DIM);
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_input_makes_no_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let vectors = client.embed(&[]).await.expect("should short-circuit");
    assert!(vectors.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn persistent_rate_limit_surfaces_after_retries() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = client.embed_query("jazz").await;

    assert!(matches!(result, Err(RagError::RateLimit { ref service }) if service == "embedding"));
}

#[tokio::test(flavor = "multi_thread")]
async fn server_error_is_a_service_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = client.embed(&["x".to_string()]).await;

    assert!(matches!(result, Err(RagError::Service(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn wrong_dimension_is_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"embedding": [0.1, 0.2, 0.3], "index": 0}]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = client.embed(&["x".to_string()]).await;

    assert!(matches!(result, Err(RagError::Service(ref m)) if m.contains("dimensions")));
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_vectors_are_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"embedding": vector(1.0), "index": 0}]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let texts = vec!["a".to_string(), "b".to_string()];
    let result = client.embed(&texts).await;

    assert!(matches!(result, Err(RagError::Service(ref m)) if m.contains("mismatch")));
}

#[tokio::test(flavor = "multi_thread")]
async fn keeps_path_prefix_of_base_url() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/proxy/voyage/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"embedding": vector(0.7), "index": 0}]
        })))
        .expect(2)
        .mount(&server)
        .await;

    for base in ["proxy/voyage", "proxy/voyage/"] {
        let client = VoyageClient::new(&test_config(&format!("{}/{}", server.uri(), base)), "test-key")
            .expect("should build client");
        let query = client
            .embed_query("expositions")
            .await
            .expect("should embed through the gateway");
        assert_eq!(query, vector(0.7));
    }
}
