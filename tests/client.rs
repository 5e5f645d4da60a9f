//! End-to-end tests: a real server on a loopback port driven through
//! `MockServerClient` and plain HTTP requests.

use expectation_mock_server::{
    AppState, ClientError, Expectation, MockServer, MockServerClient, ServerSettings, Store,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;

struct TestServer {
    base_url: String,
    store: Arc<Store>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn start_server() -> TestServer {
    let store = Arc::new(Store::new());
    let state = AppState::new(Arc::clone(&store), ServerSettings::default()).unwrap();
    let server = MockServer::bind("127.0.0.1:0".parse().unwrap(), state)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();

    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(server.serve_with_shutdown(async {
        let _ = rx.await;
    }));

    TestServer {
        base_url: format!("http://{addr}"),
        store,
        shutdown: Some(tx),
    }
}

fn expectation(method: &str, path: &str, mock: &str) -> Expectation {
    Expectation {
        method: method.into(),
        path: path.into(),
        mock: mock.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_register_serve_and_check() {
    let server = start_server().await;
    let client = MockServerClient::new(&server.base_url).unwrap();

    let id = client
        .create_expectation(&expectation("GET", "/ping", "pong"))
        .await
        .unwrap();

    let status = client.check_expectation(id).await.unwrap();
    assert!(!status.matched);

    let body = reqwest::get(format!("{}/ping", server.base_url))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "pong");

    let status = client.check_expectation(id).await.unwrap();
    assert!(status.matched);
    assert_eq!(status.matched_count, 1);
    assert_eq!(server.store.get_history(false).len(), 1);
}

#[tokio::test]
async fn test_post_body_regex_with_headers() {
    let server = start_server().await;
    let client = MockServerClient::new(&server.base_url).unwrap();

    let mut headers = HashMap::new();
    headers.insert("Content-Type".to_string(), "application/json".to_string());
    let id = client
        .create_expectation(&Expectation {
            method: "POST".into(),
            path: r"^/users/\d+$".into(),
            request: r#""name":"\w+""#.into(),
            status: 201,
            headers,
            mock: r#"{"created":true}"#.to_string(),
        })
        .await
        .unwrap();

    let http = reqwest::Client::new();
    let resp = http
        .post(format!("{}/users/42", server.base_url))
        .body(r#"{"name":"alice"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "application/json"
    );
    assert_eq!(resp.text().await.unwrap(), r#"{"created":true}"#);

    let resp = http
        .post(format!("{}/users/abc", server.base_url))
        .body(r#"{"name":"alice"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);

    assert_eq!(client.check_expectation(id).await.unwrap().matched_count, 1);
}

#[tokio::test]
async fn test_update_list_and_remove() {
    let server = start_server().await;
    let client = MockServerClient::new(&server.base_url).unwrap();

    let first = client
        .create_expectation(&expectation("GET", "/a", "a"))
        .await
        .unwrap();
    let second = client
        .create_expectation(&expectation("GET", "/b", "b"))
        .await
        .unwrap();

    client
        .update_expectation(first, &expectation("GET", "/a", "updated"))
        .await
        .unwrap();

    let list = client.get_expectations().await.unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].id, first);
    assert_eq!(list[0].expectation.mock, "updated");
    assert_eq!(list[1].id, second);

    client.remove_expectation(first).await.unwrap();
    assert_eq!(client.get_expectations().await.unwrap().len(), 1);

    match client.remove_expectation(first).await {
        Err(ClientError::Server { status, .. }) => assert_eq!(status, 404),
        other => panic!("expected not found, got {other:?}"),
    }
    match client.check_expectation(first).await {
        Err(ClientError::Server { status, .. }) => assert_eq!(status, 404),
        other => panic!("expected not found, got {other:?}"),
    }
}

#[tokio::test]
async fn test_invalid_pattern_rejected() {
    let server = start_server().await;
    let client = MockServerClient::new(&server.base_url).unwrap();

    let err = client
        .create_expectation(&expectation("GET", "[", "x"))
        .await
        .unwrap_err();
    match err {
        ClientError::Server { status, message } => {
            assert_eq!(status, 400);
            assert!(message.contains("invalid path pattern"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(server.store.is_empty());
}

#[tokio::test]
async fn test_history_page_served() {
    let server = start_server().await;

    reqwest::get(format!("{}/unknown", server.base_url))
        .await
        .unwrap();

    let resp = reqwest::get(format!("{}/", server.base_url)).await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let html = resp.text().await.unwrap();
    assert!(html.contains("/unknown"));
}
