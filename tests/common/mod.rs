//! Common Test Utilities
//!
//! Shared helpers, fixtures, and test infrastructure.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{body::Body, http::Request, Router};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tower::ServiceExt;

use convo_server::application::services::ChatServiceImpl;
use convo_server::config::{PresenceMode, Settings};
use convo_server::infrastructure::memory::InMemoryChatStore;
use convo_server::presentation::http::create_router;
use convo_server::presentation::websocket::{Gateway, GatewayConfig};
use convo_server::startup::AppState;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Test application: a real server on a random port over the in-memory store
pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryChatStore>,
    pub gateway: Arc<Gateway>,
    pub addr: std::net::SocketAddr,
}

impl TestApp {
    /// Spawn a server with default settings
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    /// Spawn a server after adjusting its settings
    pub async fn spawn_with(configure: impl FnOnce(&mut Settings)) -> Self {
        let mut settings = Settings::in_memory().expect("in-memory settings");
        settings.presence.mode = PresenceMode::PerUser;
        configure(&mut settings);

        let store = Arc::new(InMemoryChatStore::new());
        let chat = Arc::new(ChatServiceImpl::new(
            store.clone(),
            store.clone(),
            settings.dispatch.enforce_membership,
        ));
        let gateway = Arc::new(Gateway::new(chat, GatewayConfig::from(&settings)));

        let state = AppState {
            gateway: Arc::clone(&gateway),
            settings: Arc::new(settings),
            membership: store.clone(),
            db: None,
        };
        let router = create_router(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = router.clone();
        tokio::spawn(async move {
            axum::serve(listener, server).await.unwrap();
        });

        Self {
            router,
            store,
            gateway,
            addr,
        }
    }

    /// Make a GET request to the application
    pub async fn get(&self, uri: &str) -> axum::response::Response {
        self.router
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    /// GET and parse the JSON body
    pub async fn get_json(&self, uri: &str) -> (axum::http::StatusCode, Value) {
        let response = self.get(uri).await;
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    /// Open a WebSocket as `user_id` and wait until the server registered it
    pub async fn connect(&self, user_id: i64) -> TestClient {
        let before = self.gateway.connection_count();
        let url = format!("ws://{}/api/v1/chat/ws/{}", self.addr, user_id);
        let (ws, _) = connect_async(url).await.expect("websocket connect");
        self.wait_for_connections(before + 1).await;
        TestClient { ws }
    }

    /// Close a client and wait until the server released it
    pub async fn disconnect(&self, client: TestClient) {
        let before = self.gateway.connection_count();
        client.close().await;
        self.wait_for_connections(before - 1).await;
    }

    async fn wait_for_connections(&self, expected: usize) {
        tokio::time::timeout(RECV_TIMEOUT, async {
            while self.gateway.connection_count() != expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("connection count did not settle");
    }
}

/// WebSocket client side of one connection
pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    pub async fn send_text(&mut self, text: &str) {
        self.ws.send(Message::Text(text.into())).await.unwrap();
    }

    pub async fn send_json(&mut self, value: Value) {
        self.send_text(&value.to_string()).await;
    }

    /// Next text frame, or `None` if nothing arrives in time
    pub async fn recv_text(&mut self) -> Option<String> {
        self.recv_text_within(RECV_TIMEOUT).await
    }

    async fn recv_text_within(&mut self, wait: Duration) -> Option<String> {
        loop {
            match tokio::time::timeout(wait, self.ws.next()).await {
                Ok(Some(Ok(Message::Text(text)))) => return Some(text.as_str().to_owned()),
                Ok(Some(Ok(_))) => continue,
                _ => return None,
            }
        }
    }

    /// Next JSON frame whose `type` is `kind`, skipping others
    pub async fn recv_type(&mut self, kind: &str) -> Value {
        loop {
            let text = self
                .recv_text()
                .await
                .unwrap_or_else(|| panic!("no `{}` frame received", kind));
            let Ok(value) = serde_json::from_str::<Value>(&text) else {
                continue;
            };
            if value["type"] == kind {
                return value;
            }
        }
    }

    /// Assert no frame of type `kind` arrives within a short window
    pub async fn expect_no(&mut self, kind: &str) {
        while let Some(text) = self.recv_text_within(Duration::from_millis(200)).await {
            if let Ok(value) = serde_json::from_str::<Value>(&text) {
                assert_ne!(value["type"], kind, "unexpected frame: {}", text);
            }
        }
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}
