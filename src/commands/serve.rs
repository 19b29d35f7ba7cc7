use colored::*;
use eyre::{Context, Result};

use crate::config::Config;
use crate::eventlog::api::eventlog_route;
use crate::eventlog::{AppState, EventLog, SchemaRegistry, create_router};

/// Registry with the built-in schema plus every configured schema file
pub fn load_registry(config: &Config) -> Result<SchemaRegistry> {
    let mut registry = SchemaRegistry::with_builtin().context("Failed to register built-in schema")?;
    for path in &config.server.schema_files {
        registry
            .register_file(path)
            .context(format!("Failed to register schema from {}", path.display()))?;
    }
    Ok(registry)
}

/// Run the event log server until Ctrl+C
pub fn run(bind: Option<String>, config: &Config) -> Result<()> {
    let server = &config.server;
    let bind = bind.unwrap_or_else(|| server.bind.clone());

    let registry = load_registry(config)?;
    log::info!("Registered {} schemas", registry.len());

    let eventlog = EventLog::new(registry, server);
    let app = create_router(AppState::new(eventlog, server.token.clone()), &server.base_url);

    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    rt.block_on(async {
        let listener = tokio::net::TcpListener::bind(&bind)
            .await
            .context(format!("Failed to bind {}", bind))?;

        println!(
            "{} Event log listening on http://{}{}",
            "✓".green(),
            bind,
            eventlog_route(&server.base_url).cyan()
        );
        log::info!("Server listening on {}", bind);

        let shutdown_signal = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            log::info!("Received shutdown signal");
        };

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .context("Server failed")
    })?;

    log::info!("Server shutdown complete");
    Ok(())
}
