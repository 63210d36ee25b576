pub(crate) mod session;

use crate::config::WsConfig;
use crate::services::chat_hub::ChatHub;
use crate::services::gateway::session::Session;
use axum::extract::ws::WebSocket;
use opentelemetry::{
    global,
    metrics::{Counter, UpDownCounter},
};

#[derive(Clone, Debug)]
pub(crate) struct Metrics {
    pub(crate) active_connections: UpDownCounter<i64>,
    pub(crate) frames_rejected_total: Counter<u64>,
}

impl Metrics {
    #[must_use]
    pub(crate) fn new() -> Self {
        let meter = global::meter("huddle-server");
        Self {
            active_connections: meter
                .i64_up_down_counter("websocket_active_connections")
                .with_description("Number of active WebSocket connections")
                .build(),
            frames_rejected_total: meter
                .u64_counter("websocket_frames_rejected_total")
                .with_description("Inbound frames that could not be decoded")
                .build(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs chat sessions for upgraded WebSocket connections.
#[derive(Clone, Debug)]
pub struct GatewayService {
    hub: ChatHub,
    config: WsConfig,
    metrics: Metrics,
}

impl GatewayService {
    #[must_use]
    pub fn new(hub: ChatHub, config: WsConfig) -> Self {
        Self { hub, config, metrics: Metrics::new() }
    }

    /// Drives one connection until the client leaves or the server shuts down.
    /// `identity` is the username bound by a login token, if the client sent one.
    pub async fn handle_socket(
        &self,
        socket: WebSocket,
        identity: Option<String>,
        request_id: String,
        shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) {
        let session = Session {
            identity,
            request_id,
            socket,
            hub: self.hub.clone(),
            metrics: self.metrics.clone(),
            config: self.config.clone(),
            shutdown_rx,
        };

        session.run().await;
    }
}
