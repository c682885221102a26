use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use persona_chat_server::build_router;
use persona_chat_server::config::Settings;
use persona_chat_server::services::{purge_storage, GeminiService};
use persona_chat_server::state::AppState;
use persona_chat_server::utils::init_logger;

// Not #[tokio::main]: the blocking Gemini client must be built outside any
// runtime, so the runtime is started by hand afterwards.
fn main() -> Result<()> {
    let _log_guard = init_logger()?;

    info!("🚀 Starting Persona Chat Server...");

    let settings = Settings::load()?;
    settings.require_api_key()?;
    info!("✅ Configuration loaded");

    if settings.storage.purge_on_startup {
        let report = purge_storage(&[
            &settings.storage.upload_dir,
            &settings.storage.history_dir,
        ]);
        if report.failures > 0 {
            warn!("Startup purge left {} entries behind", report.failures);
        }
    }

    let backend = Arc::new(GeminiService::new(settings.gemini.clone())?);
    info!(
        "✅ Gemini client ready (detection: {}, chat: {})",
        settings.gemini.detection_model, settings.gemini.chat_model
    );

    let addr = SocketAddr::from((
        settings
            .server
            .host
            .parse::<std::net::IpAddr>()
            .with_context(|| format!("invalid server.host '{}'", settings.server.host))?,
        settings.server.port,
    ));

    let state = AppState::new(settings, backend)?;
    let app = build_router(state);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("🎯 Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Server stopped");
        Ok::<_, anyhow::Error>(())
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
