#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod storage;
pub mod telemetry;

use crate::api::ServiceContainer;
use crate::config::{Config, StorageBackend};
use crate::services::auth_service::AuthService;
use crate::services::chat_hub::ChatHub;
use crate::services::gateway::GatewayService;
use crate::services::health_service::HealthService;
use crate::storage::Store;
use std::sync::Arc;
use tokio::sync::watch;

/// Wired application components, ready to be mounted on routers.
#[derive(Debug)]
pub struct App {
    pub services: ServiceContainer,
    pub health_service: HealthService,
    pub chat_hub: ChatHub,
}

#[derive(Debug)]
pub struct AppBuilder {
    config: Config,
    store: Option<Store>,
}

impl AppBuilder {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config, store: None }
    }

    #[must_use]
    pub fn with_store(mut self, store: Store) -> Self {
        self.store = Some(store);
        self
    }

    /// Builds the services over the configured store.
    ///
    /// # Errors
    /// Returns an error if no store was supplied.
    pub fn build(self) -> anyhow::Result<App> {
        let store = self.store.ok_or_else(|| anyhow::anyhow!("Store is required"))?;

        let auth_service = AuthService::new(store.users, self.config.auth.clone());
        let chat_hub =
            ChatHub::new(store.messages, self.config.chat.clone(), self.config.websocket.outbound_buffer_size);
        let gateway_service = GatewayService::new(chat_hub.clone(), self.config.websocket.clone());
        let health_service = HealthService::new(store.health, self.config.storage.health_timeout_ms);

        Ok(App { services: ServiceContainer { auth_service, gateway_service }, health_service, chat_hub })
    }
}

/// Connects the configured persistence backend. For Postgres this retries the
/// connection and applies migrations.
///
/// # Errors
/// Returns an error if the database stays unreachable or a migration fails.
pub async fn connect_store(config: &Config) -> anyhow::Result<Store> {
    match config.storage.backend {
        StorageBackend::Postgres => {
            let pool = adapters::database::init_pool(&config.storage).await?;
            adapters::database::run_migrations(&pool).await?;
            tracing::info!("Database connected");
            Ok(adapters::database::store(pool))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage, data will not survive a restart");
            Ok(Store::from_backend(Arc::new(adapters::memory::MemoryStore::new())))
        }
    }
}

/// Flips `shutdown_tx` on SIGINT or SIGTERM.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {},
            () = terminate => {},
        }

        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });
}

/// Routes panics through tracing so they reach the structured log.
pub fn setup_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info.location().map(ToString::to_string).unwrap_or_default();
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_default();
        tracing::error!(panic.location = %location, panic.payload = %payload, "Panic occurred");
    }));
}
