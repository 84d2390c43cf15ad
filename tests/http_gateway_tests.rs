// ABOUTME: End-to-end HTTP + WebSocket coverage of the gateway router against MockContainer.

use editor_gateway::http::{create_router, AppState};
use futures_util::{SinkExt, StreamExt};
use session_core::{Bridge, BridgeTunables, Container, MockContainer, SessionManager, WsConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message as WsMessage;

fn test_state() -> AppState {
    // Leaked deliberately: each test needs its workspace root to outlive the
    // spawned server task, which runs for the rest of the process.
    let base_path = tempfile::tempdir().unwrap().into_path();
    let factory: session_core::ContainerFactory =
        Arc::new(|| Arc::new(MockContainer::default()) as Arc<dyn Container>);
    let manager = Arc::new(SessionManager::new(base_path, factory));
    let ws_config = WsConfig::default();
    let bridge = Bridge::new(
        BridgeTunables::default(),
        ws_config.ping_interval,
        ws_config.read_timeout,
    );
    AppState {
        manager,
        bridge,
        ws_config,
    }
}

async fn spawn_server() -> (String, tokio::task::JoinHandle<()>) {
    let app = create_router(test_state());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("127.0.0.1:{}", addr.port()), handle)
}

#[tokio::test]
async fn health_reports_ok() {
    let (addr, _server) = spawn_server().await;
    let client = reqwest::Client::new();
    let resp = client
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn create_session_returns_endpoint() {
    let (addr, _server) = spawn_server().await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{addr}/sessions"))
        .json(&serde_json::json!({"repo": ""}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 201);
    let body: serde_json::Value = resp.json().await.unwrap();
    let endpoint = body["endpoint"].as_str().unwrap();
    assert!(endpoint.starts_with("sessions/"));
}

#[tokio::test]
async fn unupgraded_get_renders_the_terminal_page() {
    let (addr, _server) = spawn_server().await;
    let client = reqwest::Client::new();
    let create: serde_json::Value = client
        .post(format!("http://{addr}/sessions"))
        .json(&serde_json::json!({"repo": ""}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let endpoint = create["endpoint"].as_str().unwrap().to_string();

    let resp = client
        .get(format!("http://{addr}/{endpoint}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body = resp.text().await.unwrap();
    assert!(body.contains("WebSocket"));
}

/// S2 — a second WebSocket attach to an already-claimed token is rejected.
#[tokio::test]
async fn claiming_a_session_twice_is_rejected() {
    let (addr, _server) = spawn_server().await;
    let client = reqwest::Client::new();
    let create: serde_json::Value = client
        .post(format!("http://{addr}/sessions"))
        .json(&serde_json::json!({"repo": ""}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let token = create["endpoint"]
        .as_str()
        .unwrap()
        .trim_start_matches("sessions/")
        .to_string();

    let ws_url = format!("ws://{addr}/sessions/{token}");
    let (mut socket, _resp) = tokio_tungstenite::connect_async(&ws_url).await.unwrap();

    let second = tokio_tungstenite::connect_async(&ws_url).await;
    assert!(second.is_err(), "second attach should be rejected");

    let _ = socket.send(WsMessage::Close(None)).await;
}

/// GET /sessions/<unknown> with an upgrade header is rejected with 404.
#[tokio::test]
async fn attaching_an_unknown_token_is_rejected() {
    let (addr, _server) = spawn_server().await;
    let ws_url = format!("ws://{addr}/sessions/does-not-exist");
    let result = tokio_tungstenite::connect_async(&ws_url).await;
    assert!(result.is_err());
}

/// S1 — a full round trip: attach, write to the shell, read the echoed output.
#[tokio::test]
async fn attach_and_echo_round_trip() {
    let (addr, _server) = spawn_server().await;
    let client = reqwest::Client::new();
    let create: serde_json::Value = client
        .post(format!("http://{addr}/sessions"))
        .json(&serde_json::json!({"repo": ""}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let endpoint = create["endpoint"].as_str().unwrap().to_string();

    let ws_url = format!("ws://{addr}/{endpoint}");
    let (mut socket, _resp) = tokio_tungstenite::connect_async(&ws_url).await.unwrap();

    socket
        .send(WsMessage::Binary(b"echo hello-gateway\n".to_vec()))
        .await
        .unwrap();

    let mut saw_echo = false;
    for _ in 0..20 {
        match tokio::time::timeout(Duration::from_secs(2), socket.next()).await {
            Ok(Some(Ok(WsMessage::Binary(data)))) => {
                if String::from_utf8_lossy(&data).contains("hello-gateway") {
                    saw_echo = true;
                    break;
                }
            }
            Ok(Some(Ok(_))) => continue,
            _ => break,
        }
    }
    assert!(saw_echo, "expected the shell to echo back the written bytes");
}
