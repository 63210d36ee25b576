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

use huddle_server::api::MgmtState;
use huddle_server::config::Config;
use huddle_server::{AppBuilder, telemetry};
use std::net::SocketAddr;
use tokio::sync::watch;
use tracing::Instrument;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    let telemetry_guard = telemetry::init_telemetry(&config.telemetry)?;

    huddle_server::setup_panic_hook();

    let boot_span = tracing::info_span!("boot_server");
    let boot = async {
        // Phase 1: Infrastructure
        let store = match huddle_server::connect_store(&config).await {
            Ok(store) => store,
            Err(e) => {
                tracing::error!(error = %e, "Storage connection failed, exiting");
                return Err(e);
            }
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        huddle_server::spawn_signal_handler(shutdown_tx.clone());

        // Phase 2: Component wiring
        let app = AppBuilder::new(config.clone()).with_store(store).build()?;

        // Phase 3: Listeners and routers
        let app_router = huddle_server::api::app_router(config.clone(), app.services, shutdown_rx.clone());
        let mgmt_app = huddle_server::api::mgmt_router(MgmtState { health_service: app.health_service });

        let api_addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
        let mgmt_addr: SocketAddr = format!("{}:{}", config.server.host, config.server.mgmt_port).parse()?;

        let api_listener = tokio::net::TcpListener::bind(api_addr).await?;
        let mgmt_listener = tokio::net::TcpListener::bind(mgmt_addr).await?;

        tracing::info!(address = %api_addr, "listening");
        tracing::info!(address = %mgmt_addr, "management server listening");

        Ok::<_, anyhow::Error>((api_listener, mgmt_listener, app_router, mgmt_app, shutdown_tx, shutdown_rx, app.chat_hub))
    };

    let (api_listener, mgmt_listener, app_router, mgmt_app, shutdown_tx, shutdown_rx, chat_hub) =
        match boot.instrument(boot_span).await {
            Ok(parts) => parts,
            Err(e) => {
                telemetry_guard.shutdown();
                return Err(e);
            }
        };

    // Phase 4: Serve
    let mut api_rx = shutdown_rx.clone();
    let api_server = axum::serve(api_listener, app_router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            let _ = api_rx.wait_for(|&s| s).await;
        });

    let mut mgmt_rx = shutdown_rx.clone();
    let mgmt_server = axum::serve(mgmt_listener, mgmt_app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            let _ = mgmt_rx.wait_for(|&s| s).await;
        });

    if let Err(e) = tokio::try_join!(api_server, mgmt_server) {
        tracing::error!(error = %e, "Server error");
    }

    // Phase 5: Let open chat sessions send their close frames
    let _ = shutdown_tx.send(true);
    let drained = tokio::time::timeout(std::time::Duration::from_secs(config.server.shutdown_timeout_secs), async {
        while chat_hub.connection_count() > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
    })
    .await;

    if drained.is_ok() {
        tracing::info!("All chat sessions closed.");
    } else {
        tracing::warn!(remaining = chat_hub.connection_count(), "Timeout waiting for chat sessions to close.");
    }

    telemetry_guard.shutdown();
    Ok(())
}
