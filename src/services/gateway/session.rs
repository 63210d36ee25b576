use crate::api::schemas::chat::{ClientEvent, ServerEvent};
use crate::config::WsConfig;
use crate::error::AppError;
use crate::services::chat_hub::ChatHub;
use crate::services::gateway::Metrics;
use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket, close_code};
use futures::{SinkExt, StreamExt};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

pub(crate) struct Session {
    pub(crate) identity: Option<String>,
    pub(crate) request_id: String,
    pub(crate) socket: WebSocket,
    pub(crate) hub: ChatHub,
    pub(crate) metrics: Metrics,
    pub(crate) config: WsConfig,
    pub(crate) shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

impl Session {
    #[tracing::instrument(
        name = "websocket_session",
        skip(self),
        fields(
            request_id = %self.request_id,
            username = self.identity.as_deref().unwrap_or(""),
            otel.kind = "server",
            ws.session_id = %Uuid::new_v4()
        )
    )]
    pub(crate) async fn run(self) {
        let Self { identity, socket, hub, metrics, config, mut shutdown_rx, .. } = self;

        metrics.active_connections.add(1, &[]);
        tracing::info!("WebSocket connected");

        // Registered before history is read so nothing broadcast in between is lost.
        let mut connection = hub.connect();
        let (mut ws_sink, mut ws_stream) = socket.split();

        let replayed: HashSet<Uuid> = match hub.history().await {
            Ok(history) => {
                let ids = history.iter().map(|m| m.id).collect();
                match serde_json::to_string(&ServerEvent::LoadMessages(&history)) {
                    Ok(frame) => {
                        if ws_sink.send(WsMessage::Text(frame.into())).await.is_err() {
                            metrics.active_connections.add(-1, &[]);
                            return;
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "Failed to encode message history"),
                }
                ids
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to load message history");
                HashSet::new()
            }
        };

        let ping_interval = Duration::from_secs(config.ping_interval_secs.max(1));
        let idle_limit = ping_interval + Duration::from_secs(config.ping_timeout_secs);
        let mut heartbeat = tokio::time::interval_at(Instant::now() + ping_interval, ping_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_seen = Instant::now();

        loop {
            if *shutdown_rx.borrow() {
                tracing::info!("Shutdown signal received, closing WebSocket");
                let _ = ws_sink
                    .send(WsMessage::Close(Some(CloseFrame {
                        code: close_code::AWAY,
                        reason: "Server shutting down".into(),
                    })))
                    .await;
                break;
            }

            tokio::select! {
                biased;

                res = shutdown_rx.changed() => {
                    if res.is_err() { break; }
                }

                // Deliveries drain before the next inbound frame so a fast sender
                // never overflows its own queue
                msg = connection.recv() => {
                    let Some(msg) = msg else { break };
                    if replayed.contains(&msg.id) {
                        continue;
                    }
                    match serde_json::to_string(&ServerEvent::ChatMessage(&msg)) {
                        Ok(frame) => {
                            if ws_sink.send(WsMessage::Text(frame.into())).await.is_err() { break; }
                        }
                        Err(e) => tracing::error!(error = %e, "Failed to encode chat message"),
                    }
                }

                msg = ws_stream.next() => {
                    last_seen = Instant::now();
                    let continue_loop = match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            match serde_json::from_str::<ClientEvent>(text.as_str()) {
                                Ok(ClientEvent::ChatMessage(submitted)) => {
                                    // A bound connection always speaks as its token's user
                                    let username = identity.clone().unwrap_or(submitted.username);
                                    match hub.submit(username, submitted.text).await {
                                        Ok(_) | Err(AppError::Validation(_)) => {}
                                        Err(e) => {
                                            tracing::error!(error = %e, "Failed to persist chat message, dropping it");
                                        }
                                    }
                                }
                                Err(e) => {
                                    tracing::warn!(error = %e, "Failed to decode WebSocket frame");
                                    metrics.frames_rejected_total.add(1, &[]);
                                }
                            }
                            true
                        }
                        Some(Ok(WsMessage::Binary(_))) => {
                            tracing::warn!("Received unexpected binary frame");
                            metrics.frames_rejected_total.add(1, &[]);
                            true
                        }
                        Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => true,
                        Some(Ok(WsMessage::Close(_)) | Err(_)) | None => false,
                    };

                    if !continue_loop { break; }
                }

                _ = heartbeat.tick() => {
                    if last_seen.elapsed() > idle_limit {
                        tracing::info!("Heartbeat timed out, closing WebSocket");
                        break;
                    }
                    if ws_sink.send(WsMessage::Ping(Default::default())).await.is_err() { break; }
                }
            }
        }

        let _ = ws_sink.close().await;
        drop(connection);

        metrics.active_connections.add(-1, &[]);
        tracing::info!("WebSocket disconnected");
    }
}
