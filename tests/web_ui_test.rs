use axum::http::StatusCode;
use axum_test::TestServer;
use banter::{web_server, ChatService, CompletionGateway, Config};
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(api_key: Option<&str>, api_base: &str) -> Config {
    Config::new(api_key.map(str::to_string), api_base)
        .with_template_dir(concat!(env!("CARGO_MANIFEST_DIR"), "/templates"))
        .with_static_dir(concat!(env!("CARGO_MANIFEST_DIR"), "/static"))
}

fn test_server(config: &Config) -> TestServer {
    let service = Arc::new(ChatService::from_config(config));
    TestServer::new(web_server::router(config, service)).unwrap()
}

async fn mock_reply(server: &MockServer, text: &str) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": text}}]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_index_renders_empty_session() {
    let api = MockServer::start().await;
    let server = test_server(&test_config(Some("sk-test"), &api.uri()));

    let response = server.get("/").await;
    response.assert_status_ok();
    let html = response.text();
    assert!(html.contains("<title>AI Chatbot</title>"));
    assert!(html.contains("Connected"));
    assert!(html.contains(r#"<option value="gpt-4o" selected>GPT-4o</option>"#));
    // The system persona is never shown
    assert!(!html.contains("helpful and friendly"));
}

#[test_log::test(tokio::test)]
async fn test_submit_appends_exchange_and_redirects() {
    let api = MockServer::start().await;
    mock_reply(&api, "Hi! How can I help?").await;
    let server = test_server(&test_config(Some("sk-test"), &api.uri()));

    let response = server.post("/chat").form(&[("message", "Hello")]).await;
    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(response.header("location"), "/");

    let state: Value = server.get("/api/state").await.json();
    assert_eq!(state["status"]["message_count"], 2);
    assert_eq!(state["messages"][0], json!({"role": "user", "content": "Hello"}));
    assert_eq!(
        state["messages"][1],
        json!({"role": "assistant", "content": "Hi! How can I help?"})
    );

    let html = server.get("/").await.text();
    assert!(html.contains("Hi! How can I help?"));
}

#[tokio::test]
async fn test_message_content_is_escaped() {
    let api = MockServer::start().await;
    mock_reply(&api, "<b>bold</b>").await;
    let server = test_server(&test_config(Some("sk-test"), &api.uri()));

    server.post("/chat").form(&[("message", "<script>x</script>")]).await;
    let html = server.get("/").await.text();
    assert!(!html.contains("<script>x</script>"));
    assert!(html.contains("&lt;b&gt;bold"));
}

#[tokio::test]
async fn test_failed_completion_shows_notice_once() {
    let api = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key provided"}
        })))
        .mount(&api)
        .await;
    let server = test_server(&test_config(Some("sk-wrong"), &api.uri()));

    server
        .post("/chat")
        .form(&[("message", "Hello")])
        .await
        .assert_status(StatusCode::SEE_OTHER);

    let html = server.get("/").await.text();
    assert!(html.contains("Error: authentication rejected"));
    assert!(html.contains("Incorrect API key provided"));

    // Transient: gone on the next render, but the unanswered message stays
    let state: Value = server.get("/api/state").await.json();
    assert!(state["notice"].is_null());
    assert_eq!(state["status"]["message_count"], 1);
    assert_eq!(state["messages"][0]["role"], "user");
}

#[tokio::test]
async fn test_blank_submission_does_not_call_api() {
    let api = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&api)
        .await;
    let server = test_server(&test_config(Some("sk-test"), &api.uri()));

    server.post("/chat").form(&[("message", "   ")]).await;
    let state: Value = server.get("/api/state").await.json();
    assert_eq!(state["status"]["message_count"], 0);
}

#[tokio::test]
async fn test_settings_and_reset() {
    let api = MockServer::start().await;
    mock_reply(&api, "Sure.").await;
    let server = test_server(&test_config(Some("sk-test"), &api.uri()));

    server
        .post("/settings")
        .form(&[("model", "gpt-4o-mini"), ("temperature", "2.0")])
        .await
        .assert_status(StatusCode::SEE_OTHER);
    server.post("/chat").form(&[("message", "Hello")]).await;

    let state: Value = server.get("/api/state").await.json();
    assert_eq!(state["status"]["model"], "GPT-4o mini");
    assert_eq!(state["settings"]["temperature"], 2.0);
    assert_eq!(state["status"]["message_count"], 2);

    server
        .post("/reset")
        .await
        .assert_status(StatusCode::SEE_OTHER);
    let state: Value = server.get("/api/state").await.json();
    assert_eq!(state["status"]["message_count"], 0);
    assert_eq!(state["settings"]["model"], "gpt-4o-mini");
    assert_eq!(state["settings"]["temperature"], 2.0);

    let requests = api.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["model"], "gpt-4o-mini");
    assert_eq!(body["temperature"], 2.0);
}

#[tokio::test]
async fn test_invalid_settings_are_rejected_with_notice() {
    let api = MockServer::start().await;
    let server = test_server(&test_config(Some("sk-test"), &api.uri()));

    server
        .post("/settings")
        .form(&[("model", "gpt-5"), ("temperature", "0.5")])
        .await
        .assert_status(StatusCode::SEE_OTHER);

    let state: Value = server.get("/api/state").await.json();
    assert_eq!(state["settings"]["model"], "gpt-4o");
    assert!(state["notice"]["message"]
        .as_str()
        .unwrap()
        .contains("unknown model 'gpt-5'"));
}

#[tokio::test]
async fn test_missing_credential_halts_session() {
    let api = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&api)
        .await;
    let server = test_server(&test_config(None, &api.uri()));

    let html = server.get("/").await.text();
    assert!(html.contains("OPENAI_API_KEY not found in environment variables!"));
    assert!(!html.contains(r#"action="/chat""#));

    for route in ["/chat", "/reset"] {
        server
            .post(route)
            .form(&[("message", "Hello")])
            .await
            .assert_status(StatusCode::SERVICE_UNAVAILABLE);
    }
    let state: Value = server.get("/api/state").await.json();
    assert_eq!(state["halted"], true);
    assert_eq!(state["status"]["connected"], false);
}

#[tokio::test]
async fn test_missing_template_is_server_error() {
    let api = MockServer::start().await;
    let empty = tempfile::tempdir().unwrap();
    let config = test_config(Some("sk-test"), &api.uri()).with_template_dir(empty.path());
    let server = test_server(&config);

    let response = server.get("/").await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.text().contains("Internal Server Error"));
}

#[tokio::test]
async fn test_static_assets_are_served() {
    let api = MockServer::start().await;
    let server = test_server(&test_config(Some("sk-test"), &api.uri()));

    let response = server.get("/static/app.js").await;
    response.assert_status_ok();
    assert!(response.text().contains("WebSocket"));
}
