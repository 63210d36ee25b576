use crate::config::ChatConfig;
use crate::domain::message::Message;
use crate::error::{AppError, Result};
use crate::storage::MessageStore;
use dashmap::DashMap;
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

const ANONYMOUS: &str = "anonymous";

#[derive(Clone, Debug)]
struct Metrics {
    messages_total: Counter<u64>,
    deliveries_dropped_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("huddle-server");
        Self {
            messages_total: meter
                .u64_counter("chat_messages_total")
                .with_description("Chat messages submitted, by outcome")
                .build(),
            deliveries_dropped_total: meter
                .u64_counter("chat_deliveries_dropped_total")
                .with_description("Broadcast deliveries dropped because a connection was full or gone")
                .build(),
        }
    }
}

/// Owns the set of live chat connections and fans persisted messages out to them.
#[derive(Clone, Debug)]
pub struct ChatHub {
    messages: Arc<dyn MessageStore>,
    connections: Arc<DashMap<Uuid, mpsc::Sender<Arc<Message>>>>,
    config: ChatConfig,
    outbound_buffer_size: usize,
    metrics: Metrics,
}

impl ChatHub {
    #[must_use]
    pub fn new(messages: Arc<dyn MessageStore>, config: ChatConfig, outbound_buffer_size: usize) -> Self {
        Self {
            messages,
            connections: Arc::new(DashMap::new()),
            config,
            outbound_buffer_size: outbound_buffer_size.max(1),
            metrics: Metrics::new(),
        }
    }

    /// Registers a new connection. Broadcasts are queued on the returned
    /// handle from this point on; dropping it unregisters the connection.
    #[must_use]
    pub fn connect(&self) -> Connection {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.outbound_buffer_size);
        self.connections.insert(id, tx);
        tracing::debug!(connection_id = %id, "Connection registered");

        Connection { id, rx, hub: self.clone() }
    }

    fn disconnect(&self, id: Uuid) {
        if self.connections.remove(&id).is_some() {
            tracing::debug!(connection_id = %id, "Connection unregistered");
        }
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// The most recent messages, oldest first.
    ///
    /// # Errors
    /// Returns an error if the message store cannot be read.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn history(&self) -> Result<Vec<Message>> {
        self.messages.recent(self.config.history_limit).await
    }

    /// Persists a submitted message and, once the write has completed,
    /// broadcasts it to every connection including the sender's.
    ///
    /// # Errors
    /// Returns `AppError::Validation` for empty or oversized text and the
    /// store's error if the write fails. Nothing is broadcast on error.
    #[tracing::instrument(skip(self, text), fields(message_id = tracing::field::Empty), err(level = "warn"))]
    pub async fn submit(&self, username: String, text: String) -> Result<Arc<Message>> {
        if text.trim().is_empty() {
            return Err(AppError::Validation("Message text is required".to_string()));
        }
        if text.chars().count() > self.config.max_message_len {
            return Err(AppError::Validation(format!(
                "Message must be at most {} characters",
                self.config.max_message_len
            )));
        }

        let username = if username.trim().is_empty() { ANONYMOUS.to_string() } else { username };
        let message = Message::new(username, text);
        tracing::Span::current().record("message_id", tracing::field::display(message.id));

        if let Err(e) = self.messages.insert(&message).await {
            self.metrics.messages_total.add(1, &[KeyValue::new("status", "error")]);
            return Err(e);
        }
        self.metrics.messages_total.add(1, &[KeyValue::new("status", "stored")]);

        let message = Arc::new(message);
        let delivered = self.broadcast(&message);
        tracing::debug!(delivered, "Message broadcast");

        Ok(message)
    }

    /// Queues `message` on every registered connection. Returns how many
    /// connections accepted it.
    pub fn broadcast(&self, message: &Arc<Message>) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();

        for entry in self.connections.iter() {
            match entry.value().try_send(Arc::clone(message)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(connection_id = %entry.key(), "Outbound buffer full, dropping message");
                    self.metrics.deliveries_dropped_total.add(1, &[KeyValue::new("reason", "buffer_full")]);
                }
                Err(TrySendError::Closed(_)) => {
                    closed.push(*entry.key());
                    self.metrics.deliveries_dropped_total.add(1, &[KeyValue::new("reason", "closed")]);
                }
            }
        }

        // Removed outside the iteration to avoid deadlocking on the shard lock
        for id in closed {
            self.disconnect(id);
        }

        delivered
    }
}

/// A registered chat connection.
#[derive(Debug)]
pub struct Connection {
    id: Uuid,
    rx: mpsc::Receiver<Arc<Message>>,
    hub: ChatHub,
}

impl Connection {
    /// Waits for the next broadcast addressed to this connection.
    pub async fn recv(&mut self) -> Option<Arc<Message>> {
        self.rx.recv().await
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.hub.disconnect(self.id);
    }
}
