//! End-to-end tests for the live channel
//!
//! A real server on 127.0.0.1:0, a real snapshot file, and a WebSocket
//! client. Writers go through the store exactly as agent processes do.

use agentboard_core::{AgentEvent, DashboardState, EventStatus};
use agentboard_observability::HealthResponse;
use agentboard_server::{BroadcastConfig, BroadcastServer, ServerConfig, ViewerMessage};
use agentboard_storage::{FileMetricsStore, MetricsStore, StoreConfig};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    store: FileMetricsStore,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<anyhow::Result<()>>,
    _dir: TempDir,
}

impl TestServer {
    async fn start(broadcast: BroadcastConfig) -> Self {
        let dir = TempDir::new().unwrap();
        let store_config = StoreConfig::at(dir.path().join("dashboard.json")).with_project_name("e2e");
        let config = ServerConfig {
            store: store_config.clone(),
            broadcast,
            ..Default::default()
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = BroadcastServer::new(config).unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve(listener, async move {
            let _ = stopped.await;
        }));

        Self {
            addr,
            store: FileMetricsStore::new(store_config),
            stop: Some(stop),
            handle,
            _dir: dir,
        }
    }

    async fn connect(&self) -> Client {
        let (client, _) = connect_async(format!("ws://{}/ws", self.addr)).await.unwrap();
        client
    }

    async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let result = tokio::time::timeout(Duration::from_secs(5), self.handle).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
    }
}

fn fast_broadcast() -> BroadcastConfig {
    BroadcastConfig {
        poll_interval_ms: 50,
        heartbeat_interval_ms: 60_000,
        watch_filesystem: false,
        ..Default::default()
    }
}

fn success(agent: &str) -> AgentEvent {
    AgentEvent::new(agent, EventStatus::Success, Utc::now(), 5.0).with_tokens(100, 50)
}

/// Next state message, skipping control frames
async fn next_message(client: &mut Client) -> ViewerMessage {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = frame {
            return ViewerMessage::parse(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn test_viewer_gets_initial_then_update_after_ingest() {
    let server = TestServer::start(fast_broadcast()).await;
    let mut client = server.connect().await;

    let initial = next_message(&mut client).await;
    assert!(matches!(initial, ViewerMessage::Initial { .. }));
    assert!(initial.data().agents.is_empty());
    assert_eq!(initial.data().project_name, "e2e");

    let store = FileMetricsStore::new(server.store.config().clone());
    tokio::task::spawn_blocking(move || store.ingest(success("coding")))
        .await
        .unwrap()
        .unwrap();

    let update = next_message(&mut client).await;
    match &update {
        ViewerMessage::Update { data, .. } => {
            let profile = &data.agents["coding"];
            assert_eq!(profile.total_invocations, 1);
            assert_eq!(profile.successful_invocations, 1);
            assert_eq!(data.total_tokens, 150);
        }
        other => panic!("expected update, got {:?}", other),
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_late_viewer_initial_reflects_existing_snapshot() {
    let server = TestServer::start(fast_broadcast()).await;
    server.store.ingest(success("review")).unwrap();

    // Wait for the broadcaster to pick up the write
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let mut client = server.connect().await;
        let initial = next_message(&mut client).await;
        if initial.data().agent("review").is_some() {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "snapshot never picked up");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_ping_pong_is_not_a_state_change() {
    let server = TestServer::start(fast_broadcast()).await;
    let mut client = server.connect().await;
    next_message(&mut client).await;

    client.send(Message::text("ping")).await.unwrap();
    let reply = tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(reply.to_text().unwrap(), "pong");

    // No update follows the ping
    let quiet = tokio::time::timeout(Duration::from_millis(300), client.next()).await;
    assert!(quiet.is_err());

    server.shutdown().await;
}

#[tokio::test]
async fn test_heartbeat_resends_state_without_change() {
    let server = TestServer::start(BroadcastConfig {
        heartbeat_interval_ms: 100,
        ..fast_broadcast()
    })
    .await;
    let mut client = server.connect().await;
    let initial = next_message(&mut client).await;

    let beat = next_message(&mut client).await;
    assert!(matches!(beat, ViewerMessage::Update { .. }));
    assert_eq!(beat.data(), initial.data());

    server.shutdown().await;
}

#[tokio::test]
async fn test_one_viewer_leaving_does_not_affect_another() {
    let server = TestServer::start(fast_broadcast()).await;
    let mut staying = server.connect().await;
    let mut leaving = server.connect().await;
    next_message(&mut staying).await;
    next_message(&mut leaving).await;

    leaving.close(None).await.unwrap();
    drop(leaving);

    server.store.ingest(success("coding")).unwrap();
    let update = next_message(&mut staying).await;
    assert!(update.data().agent("coding").is_some());

    server.shutdown().await;
}

#[tokio::test]
async fn test_idle_viewer_is_closed() {
    let server = TestServer::start(BroadcastConfig {
        idle_timeout_secs: 1,
        ..fast_broadcast()
    })
    .await;
    let mut client = server.connect().await;
    next_message(&mut client).await;

    // Stay silent; the server closes the connection
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(frame) = client.next().await {
            match frame {
                Ok(Message::Close(_)) | Err(_) => return true,
                Ok(_) => continue,
            }
        }
        true
    })
    .await;
    assert!(matches!(closed, Ok(true)));

    server.shutdown().await;
}

#[tokio::test]
async fn test_pull_endpoint_and_health() {
    let server = TestServer::start(fast_broadcast()).await;
    server.store.ingest(success("coding")).unwrap();
    let client = reqwest::Client::new();

    let health: HealthResponse = client
        .get(format!("http://{}/healthz", server.addr))
        .send()
        .await
        .unwrap()
        .error_for_status()
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.viewers, 0);

    // The pull endpoint serves whatever the broadcaster last published
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let state: DashboardState = client
            .get(format!("http://{}/api/state", server.addr))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(state.project_name, "e2e");
        if let Some(profile) = state.agent("coding") {
            assert_eq!(profile.total_invocations, 1);
            assert_eq!(state.total_tokens, 150);
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "snapshot never picked up");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    server.shutdown().await;
}
