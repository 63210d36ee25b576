#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::panic,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    missing_debug_implementations,
    unreachable_pub
)]

use futures::{SinkExt, StreamExt};
use huddle_server::adapters::memory::MemoryStore;
use huddle_server::api::{self, MgmtState};
use huddle_server::adapters::database;
use huddle_server::config::{Config, StorageConfig};
use huddle_server::services::chat_hub::ChatHub;
use huddle_server::storage::Store;
use huddle_server::AppBuilder;
use serde_json::{Value, json};
use sqlx::PgPool;
use std::sync::{Arc, Once};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

static INIT: Once = Once::new();

pub const INDEX_HTML: &str = "<!doctype html><title>huddle</title>";
pub const APP_JS: &str = "console.log('huddle');";

pub fn setup_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into())
            .add_directive("huddle_server=debug".parse().unwrap())
            .add_directive("tower=warn".parse().unwrap())
            .add_directive("hyper=warn".parse().unwrap())
            .add_directive("reqwest=warn".parse().unwrap())
            .add_directive("tungstenite=warn".parse().unwrap());

        let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
    });
}

pub fn get_test_config() -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.server.mgmt_port = 0;
    config.auth.jwt_secret = Some("test_secret".to_string());
    config.storage.health_timeout_ms = 500;
    config
}

/// Connects to `DATABASE_URL` and applies the migrations. Returns `None` when
/// the variable is unset so the Postgres suites can be skipped locally.
pub async fn get_test_pool() -> Option<PgPool> {
    setup_tracing();
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        tracing::warn!("DATABASE_URL not set, skipping Postgres test");
        return None;
    };

    let config = StorageConfig { database_url, connect_attempts: 1, ..StorageConfig::default() };
    let pool = database::init_pool(&config).await.expect("Failed to connect to DB. Is Postgres running?");
    database::run_migrations(&pool).await.expect("Failed to run migrations");

    Some(pool)
}

pub fn generate_username(prefix: &str) -> String {
    format!("{prefix}_{}", &uuid::Uuid::new_v4().simple().to_string()[..8])
}

pub struct TestApp {
    pub server_url: String,
    pub ws_url: String,
    pub mgmt_url: String,
    pub client: reqwest::Client,
    pub store: Arc<MemoryStore>,
    pub hub: ChatHub,
    pub shutdown_tx: watch::Sender<bool>,
    _static_dir: TempDir,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_config(get_test_config()).await
    }

    pub async fn spawn_with_config(mut config: Config) -> Self {
        setup_tracing();

        let static_dir = tempfile::tempdir().unwrap();
        std::fs::write(static_dir.path().join("index.html"), INDEX_HTML).unwrap();
        std::fs::write(static_dir.path().join("app.js"), APP_JS).unwrap();
        config.server.static_dir = static_dir.path().to_path_buf();

        let store = Arc::new(MemoryStore::new());
        let app = AppBuilder::new(config.clone()).with_store(Store::from_backend(Arc::clone(&store))).build().unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mgmt_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mgmt_addr = mgmt_listener.local_addr().unwrap();

        let hub = app.chat_hub.clone();
        let router = api::app_router(config, app.services, shutdown_rx.clone());
        let mgmt = api::mgmt_router(MgmtState { health_service: app.health_service });

        let mut api_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = api_rx.wait_for(|&s| s).await;
                })
                .await
                .unwrap();
        });
        tokio::spawn(async move {
            axum::serve(mgmt_listener, mgmt).await.unwrap();
        });

        Self {
            server_url: format!("http://{addr}"),
            ws_url: format!("ws://{addr}/chat"),
            mgmt_url: format!("http://{mgmt_addr}"),
            client: reqwest::Client::new(),
            store,
            hub,
            shutdown_tx,
            _static_dir: static_dir,
        }
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> (reqwest::StatusCode, Value) {
        let resp = self.client.post(format!("{}{path}", self.server_url)).json(body).send().await.unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }

    pub async fn register(&self, username: &str, password: &str) -> (reqwest::StatusCode, Value) {
        self.post_json("/register", &json!({ "username": username, "password": password })).await
    }

    pub async fn login(&self, username: &str, password: &str) -> (reqwest::StatusCode, Value) {
        self.post_json("/login", &json!({ "username": username, "password": password })).await
    }

    /// Registers and logs in, returning the chat token.
    pub async fn login_token(&self, username: &str) -> String {
        self.register(username, "password123").await;
        let (_, body) = self.login(username, "password123").await;
        body["token"].as_str().unwrap().to_string()
    }

    /// Connects and consumes the initial `loadMessages` frame.
    pub async fn connect(&self) -> (ChatClient, Vec<Value>) {
        let mut client = self.connect_raw(&self.ws_url).await;
        let history = client.expect_history().await;
        (client, history)
    }

    pub async fn connect_with_token(&self, token: &str) -> (ChatClient, Vec<Value>) {
        let mut client = self.connect_raw(&format!("{}?token={token}", self.ws_url)).await;
        let history = client.expect_history().await;
        (client, history)
    }

    pub async fn connect_raw(&self, url: &str) -> ChatClient {
        let (stream, _) = tokio_tungstenite::connect_async(url).await.expect("Failed to connect");
        ChatClient { stream }
    }

    /// Waits until the hub has registered `count` connections.
    pub async fn wait_for_connections(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.hub.connection_count() != count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("connection count never settled");
    }
}

pub struct ChatClient {
    pub stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl ChatClient {
    pub async fn send_chat(&mut self, username: &str, text: &str) {
        self.send_raw(json!({ "event": "chatMessage", "data": { "username": username, "text": text } }).to_string())
            .await;
    }

    pub async fn send_raw(&mut self, frame: String) {
        self.stream.send(Message::text(frame)).await.unwrap();
    }

    /// Next JSON event, skipping control frames. `None` on timeout or close.
    pub async fn next_event_timeout(&mut self, timeout: Duration) -> Option<Value> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, self.stream.next()).await {
                Ok(Some(Ok(Message::Text(text)))) => return Some(serde_json::from_str(text.as_str()).unwrap()),
                Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => {}
                _ => return None,
            }
        }
    }

    pub async fn next_event(&mut self) -> Value {
        self.next_event_timeout(Duration::from_secs(5)).await.expect("expected an event")
    }

    pub async fn expect_history(&mut self) -> Vec<Value> {
        let event = self.next_event().await;
        assert_eq!(event["event"], "loadMessages");
        event["data"].as_array().unwrap().clone()
    }

    pub async fn expect_chat_message(&mut self) -> Value {
        let event = self.next_event().await;
        assert_eq!(event["event"], "chatMessage");
        event["data"].clone()
    }

    pub async fn receive_raw_timeout(
        &mut self,
        timeout: Duration,
    ) -> Option<Result<Message, tokio_tungstenite::tungstenite::Error>> {
        tokio::time::timeout(timeout, self.stream.next()).await.ok().flatten()
    }
}
