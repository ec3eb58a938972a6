//! Transport negotiation against mock HTTP backends: relay-first, one
//! direct-to-provider fallback, no retry loop.

use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use candor::api::BackendClient;
use candor::errors::SessionError;
use candor::transport::Negotiator;

const OFFER: &str = "v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\ns=-\r\n";
const ANSWER: &str = "v=0\r\no=- 2 2 IN IP4 0.0.0.0\r\ns=-\r\n";

fn negotiator(backend: &MockServer, provider: &MockServer) -> Negotiator {
    Negotiator::new(
        BackendClient::new(backend.uri()),
        format!("{}/v1/realtime", provider.uri()),
        "gpt-4o-realtime-preview",
    )
}

#[tokio::test]
async fn test_relay_path_preferred() {
    let backend = MockServer::start().await;
    let provider = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/sessions/s1/relay"))
        .and(header("content-type", "application/sdp"))
        .and(body_string(OFFER))
        .respond_with(ResponseTemplate::new(200).set_body_string(ANSWER))
        .expect(1)
        .mount(&backend)
        .await;

    let answer = negotiator(&backend, &provider)
        .negotiate("s1", OFFER)
        .await
        .unwrap();
    assert_eq!(answer, ANSWER);
    // No token minted, no direct call.
    assert!(provider.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_fallback_mints_token_and_posts_direct() {
    let backend = MockServer::start().await;
    let provider = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/sessions/s1/relay"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&backend)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/sessions/s1/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "client_secret": "ek_test" })),
        )
        .expect(1)
        .mount(&backend)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/realtime"))
        .and(query_param("model", "gpt-4o-realtime-preview"))
        .and(header("authorization", "Bearer ek_test"))
        .and(header("content-type", "application/sdp"))
        .respond_with(ResponseTemplate::new(201).set_body_string(ANSWER))
        .expect(1)
        .mount(&provider)
        .await;

    let answer = negotiator(&backend, &provider)
        .negotiate("s1", OFFER)
        .await
        .unwrap();
    assert_eq!(answer, ANSWER);
}

#[tokio::test]
async fn test_both_paths_failing_reports_last_status() {
    let backend = MockServer::start().await;
    let provider = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/sessions/s1/relay"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&backend)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/sessions/s1/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "client_secret": "ek_test" })),
        )
        .mount(&backend)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/realtime"))
        .respond_with(ResponseTemplate::new(403).set_body_string("invalid ephemeral key"))
        .mount(&provider)
        .await;

    let err = negotiator(&backend, &provider)
        .negotiate("s1", OFFER)
        .await
        .unwrap_err();
    match err {
        SessionError::Negotiation { status, body } => {
            assert_eq!(status, 403);
            assert!(body.contains("invalid ephemeral key"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_token_mint_failure_surfaces() {
    let backend = MockServer::start().await;
    let provider = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/sessions/s1/relay"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&backend)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/sessions/s1/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("no session"))
        .mount(&backend)
        .await;

    let err = negotiator(&backend, &provider)
        .negotiate("s1", OFFER)
        .await
        .unwrap_err();
    match err {
        SessionError::Negotiation { status, .. } => assert_eq!(status, 401),
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(provider.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_backend_client_endpoints() {
    use candor::api::Backend;

    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/sessions/s1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "sessionId": "s1",
            "systemPrompt": "interview prompt",
            "useAlternateProvider": true
        })))
        .mount(&backend)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/sessions/s1/status"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&backend)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/sessions/s1/transcript"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&backend)
        .await;

    let client = BackendClient::new(backend.uri());
    let descriptor = client.fetch_session("s1").await.unwrap();
    assert!(descriptor.use_alternate_provider);
    client.update_status("s1", "in-progress").await.unwrap();
    client
        .save_transcript("s1", "ASSISTANT: Welcome.")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_recording_upload_is_multipart() {
    use candor::session::recording::MediaSink;

    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/sessions/s1/recordings"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&backend)
        .await;

    let client = BackendClient::new(backend.uri());
    client
        .upload("s1", "combined", vec![1, 2, 3])
        .await
        .unwrap();

    let requests = backend.received_requests().await.unwrap();
    let content_type = requests[0]
        .headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(content_type.starts_with("multipart/form-data"));
}
