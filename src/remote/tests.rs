use super::*;
use std::cell::Cell;

#[test]
fn classify_rate_limit_is_distinct() {
    let error = RemoteService::Embedding.classify(&ureq::Error::StatusCode(429));
    assert!(matches!(error, RagError::RateLimit { ref service } if service == "embedding"));

    let error = RemoteService::Generation.classify(&ureq::Error::StatusCode(429));
    assert!(matches!(error, RagError::RateLimit { ref service } if service == "generation"));
}

#[test]
fn classify_other_failures_by_service() {
    let error = RemoteService::Embedding.classify(&ureq::Error::StatusCode(503));
    assert!(matches!(error, RagError::Service(ref m) if m.contains("503")));

    let error = RemoteService::Embedding.classify(&ureq::Error::StatusCode(401));
    assert!(matches!(error, RagError::Service(ref m) if m.contains("authentication")));

    let error = RemoteService::Embedding.classify(&ureq::Error::ConnectionFailed);
    assert!(matches!(error, RagError::Service(ref m) if m.contains("transport")));

    let error = RemoteService::Generation.classify(&ureq::Error::StatusCode(500));
    assert!(matches!(error, RagError::Generation(ref m) if m.contains("500")));

    let error = RemoteService::Generation.classify(&ureq::Error::HostNotFound);
    assert!(matches!(error, RagError::Generation(_)));
}

#[test]
fn api_key_is_redacted_in_debug_output() {
    let key = ApiKey::new("sk-secret");
    assert_eq!(key.expose(), "sk-secret");
    assert!(!format!("{:?}", key).contains("sk-secret"));
}

#[test]
fn backoff_doubles() {
    let policy = RetryPolicy::new(4, Duration::from_millis(100));
    assert_eq!(policy.delay_for(1), Duration::from_millis(100));
    assert_eq!(policy.delay_for(2), Duration::from_millis(200));
    assert_eq!(policy.delay_for(3), Duration::from_millis(400));
}

#[test]
fn rate_limits_are_retried_up_to_the_bound() {
    let attempts = Cell::new(0);
    let policy = RetryPolicy::new(2, Duration::ZERO);

    let result = call_with_retry(RemoteService::Embedding, policy, || {
        attempts.set(attempts.get() + 1);
        Err(ureq::Error::StatusCode(429))
    });

    assert!(matches!(result, Err(RagError::RateLimit { .. })));
    assert_eq!(attempts.get(), 3);
}

#[test]
fn rate_limit_then_success() {
    let attempts = Cell::new(0);
    let policy = RetryPolicy::new(3, Duration::ZERO);

    let result = call_with_retry(RemoteService::Embedding, policy, || {
        attempts.set(attempts.get() + 1);
        if attempts.get() == 1 {
            Err(ureq::Error::StatusCode(429))
        } else {
            Ok("{}".to_string())
        }
    });

    assert_eq!(result.expect("second attempt should succeed"), "{}");
    assert_eq!(attempts.get(), 2);
}

#[test]
fn other_failures_are_not_retried() {
    let attempts = Cell::new(0);
    let policy = RetryPolicy::new(5, Duration::ZERO);

    let result = call_with_retry(RemoteService::Generation, policy, || {
        attempts.set(attempts.get() + 1);
        Err(ureq::Error::StatusCode(500))
    });

    assert!(matches!(result, Err(RagError::Generation(_))));
    assert_eq!(attempts.get(), 1);
}

#[test]
fn no_retry_policy_fails_fast() {
    let attempts = Cell::new(0);

    let result = call_with_retry(RemoteService::Embedding, RetryPolicy::none(), || {
        attempts.set(attempts.get() + 1);
        Err(ureq::Error::StatusCode(429))
    });

    assert!(matches!(result, Err(RagError::RateLimit { .. })));
    assert_eq!(attempts.get(), 1);
}

#[test]
fn base_url_always_ends_with_a_slash() {
    let root = base_url("https://api.voyageai.com").expect("should parse");
    assert_eq!(
        root.join("v1/embeddings").expect("should join").as_str(),
        "https://api.voyageai.com/v1/embeddings"
    );

    for raw in ["https://gateway.example/voyage", "https://gateway.example/voyage/"] {
        let url = base_url(raw).expect("should parse");
        assert_eq!(
            url.join("v1/embeddings").expect("should join").as_str(),
            "https://gateway.example/voyage/v1/embeddings"
        );
    }

    assert!(base_url("not a url").is_err());
}
