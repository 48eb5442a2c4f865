//! HTTP behaviour of the Alertmanager handler and the cluster client,
//! exercised against a local server that replays canned responses.

use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use podwatch::Error;
use podwatch::cache::{WatchEvent, WatchSource};
use podwatch::config::AlertmanagerConfig;
use podwatch::controller::LogSource;
use podwatch::handlers::{AlertmanagerHandler, Event, Handler};
use podwatch::kube::watch::event_stream_with_limit;
use podwatch::kube::{Auth, KubeClient, KubeConfig};
use podwatch::model::Pod;
use secrecy::SecretString;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

const OK_EMPTY: &str = "HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
const STREAM_HEAD: &str =
    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\nconnection: close\r\n\r\n";

/// Accept one connection, capture the request, then write `parts` with a
/// pause between each so the client sees them as separate chunks.
async fn serve_once(parts: Vec<String>) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        for part in parts {
            socket.write_all(part.as_bytes()).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        socket.shutdown().await.ok();
        request
    });
    (format!("http://{addr}"), handle)
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let body_len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + body_len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    )
}

fn event() -> Event {
    Event {
        namespace: "prod".to_string(),
        name: "web".to_string(),
        container: "app".to_string(),
        reason: "CrashLoopBackOff".to_string(),
        message: "back-off".to_string(),
        logs: vec!["panic: boom".to_string()],
        detected_at: Utc::now(),
    }
}

fn alertmanager(
    address: String,
    username: Option<&str>,
    password: Option<&str>,
) -> AlertmanagerHandler {
    AlertmanagerHandler::new(&AlertmanagerConfig {
        address,
        username: username.map(str::to_string),
        password: password.map(SecretString::from),
    })
    .unwrap()
}

// ---------------------------------------------------------------------------
// Alertmanager
// ---------------------------------------------------------------------------

#[tokio::test]
async fn alertmanager_error_status_fails_the_dispatch() {
    let (url, server) = serve_once(vec![response("500 Internal Server Error", "boom")]).await;
    let handler = alertmanager(url, None, None);

    let result = handler.handle(event()).await;
    match result {
        Err(Error::Handler(msg)) => {
            assert!(msg.contains("500"));
            assert!(msg.contains("boom"));
        }
        other => panic!("expected handler error, got {other:?}"),
    }
    server.await.unwrap();
}

#[tokio::test]
async fn alertmanager_posts_alert_with_basic_auth() {
    let (url, server) = serve_once(vec![OK_EMPTY.to_string()]).await;
    let handler = alertmanager(url, Some("admin"), Some("secret"));

    handler.handle(event()).await.unwrap();
    let request = server.await.unwrap();

    assert!(request.starts_with("POST /api/v2/alerts "));
    assert!(request.to_ascii_lowercase().contains("authorization: basic "));
    // base64("admin:secret")
    assert!(request.contains("YWRtaW46c2VjcmV0"));
    assert!(request.contains(r#""alertname":"podwatcher""#));
    assert!(request.contains(r#""container":"app""#));
}

#[tokio::test]
async fn alertmanager_skips_auth_without_password() {
    let (url, server) = serve_once(vec![OK_EMPTY.to_string()]).await;
    let handler = alertmanager(url, Some("admin"), None);

    handler.handle(event()).await.unwrap();
    let request = server.await.unwrap();
    assert!(!request.to_ascii_lowercase().contains("authorization:"));
}

#[tokio::test]
async fn alertmanager_skips_auth_without_username() {
    let (url, server) = serve_once(vec![OK_EMPTY.to_string()]).await;
    let handler = alertmanager(url, None, Some("secret"));

    handler.handle(event()).await.unwrap();
    let request = server.await.unwrap();
    assert!(!request.to_ascii_lowercase().contains("authorization:"));
}

// ---------------------------------------------------------------------------
// Kubernetes client
// ---------------------------------------------------------------------------

fn client(url: &str, namespace: &str) -> KubeClient {
    let mut config = KubeConfig::for_server(url);
    config.auth = Auth::Bearer(SecretString::from("t0ken"));
    KubeClient::new(&config, namespace).unwrap()
}

#[tokio::test]
async fn list_returns_pods_and_version() {
    let body = r#"{"kind":"PodList","metadata":{"resourceVersion":"5"},"items":[
        {"metadata":{"name":"web","namespace":"prod","resourceVersion":"4"}}]}"#;
    let (url, server) = serve_once(vec![response("200 OK", body)]).await;

    let list = client(&url, "prod").list().await.unwrap();
    assert_eq!(list.resource_version, "5");
    assert_eq!(list.items.len(), 1);
    assert_eq!(list.items[0].metadata.name, "web");

    let request = server.await.unwrap();
    assert!(request.starts_with("GET /api/v1/namespaces/prod/pods "));
    assert!(request.contains("Bearer t0ken"));
}

#[tokio::test]
async fn list_across_all_namespaces() {
    let (url, server) = serve_once(vec![response("200 OK", r#"{"items":[]}"#)]).await;
    let list = client(&url, "").list().await.unwrap();
    assert!(list.items.is_empty());
    assert!(server.await.unwrap().starts_with("GET /api/v1/pods "));
}

#[tokio::test]
async fn api_error_status_is_reported() {
    let (url, server) = serve_once(vec![response("403 Forbidden", "pods is forbidden")]).await;
    let result = client(&url, "prod").list().await;
    match result {
        Err(Error::Kube { status, message }) => {
            assert_eq!(status, 403);
            assert_eq!(message, "pods is forbidden");
        }
        other => panic!("expected kube error, got {:?}", other.map(|l| l.items.len())),
    }
    server.await.unwrap();
}

#[tokio::test]
async fn watch_reassembles_split_lines_and_stops_on_error_event() {
    let added = r#"{"type":"ADDED","object":{"metadata":{"name":"a","resourceVersion":"6"}}}"#;
    let changed = r#"{"type":"MODIFIED","object":{"metadata":{"name":"b","resourceVersion":"7"}}}"#;
    let error = r#"{"type":"ERROR","object":{"code":410,"reason":"Expired","message":"too old"}}"#;
    let (first, second) = added.split_at(30);
    let (url, server) = serve_once(vec![
        STREAM_HEAD.to_string(),
        first.to_string(),
        format!("{second}\n{changed}"),
        format!("\n\n{error}\n"),
    ])
    .await;

    let client = client(&url, "prod").watch_timeout(Duration::from_secs(7));
    let mut stream = client.watch("5").await.unwrap();

    match stream.next().await {
        Some(Ok(WatchEvent::Added(pod))) => {
            assert_eq!(pod.metadata.resource_version.as_deref(), Some("6"))
        }
        other => panic!("expected added event, got {other:?}"),
    }
    assert!(matches!(stream.next().await, Some(Ok(WatchEvent::Modified(_)))));
    match stream.next().await {
        Some(Err(Error::Watch(msg))) => assert!(msg.contains("410")),
        other => panic!("expected watch error, got {other:?}"),
    }
    assert!(stream.next().await.is_none());

    let request = server.await.unwrap();
    assert!(request.starts_with("GET /api/v1/namespaces/prod/pods?"));
    assert!(request.contains("watch=true"));
    assert!(request.contains("resourceVersion=5"));
    assert!(request.contains("timeoutSeconds=7"));
}

#[tokio::test]
async fn watch_rejects_oversized_lines() {
    let long_line = format!(r#"{{"type":"ADDED","object":{{"pad":"{}"}}}}"#, "x".repeat(200));
    let (url, server) = serve_once(vec![STREAM_HEAD.to_string(), format!("{long_line}\n")]).await;

    let response = reqwest::get(&url).await.unwrap();
    let mut stream = event_stream_with_limit::<Pod>(response, 64);
    assert!(matches!(stream.next().await, Some(Err(Error::Watch(_)))));
    server.await.unwrap();
}

#[tokio::test]
async fn tail_logs_requests_container_and_line_count() {
    let (url, server) = serve_once(vec![response("200 OK", "line one\nline two\n")]).await;

    let logs = client(&url, "prod")
        .tail_logs("prod", "web", "app", 20)
        .await
        .unwrap();
    assert_eq!(logs, "line one\nline two\n");

    let request = server.await.unwrap();
    assert!(request.starts_with("GET /api/v1/namespaces/prod/pods/web/log?"));
    assert!(request.contains("container=app"));
    assert!(request.contains("tailLines=20"));
}
