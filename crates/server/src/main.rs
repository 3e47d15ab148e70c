mod bootstrap;
mod health;
mod orchestrator;
mod webhook;

use std::time::Duration;

use anyhow::Result;
use textback_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use textback_core::config::LogFormat;

    let level = config.logging.level.parse::<tracing::Level>().unwrap_or(tracing::Level::INFO);
    let builder = tracing_subscriber::fmt().with_target(false).with_max_level(level);

    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging settings come from config, so config has to load first.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
    )
    .await?;

    let router = webhook::router(app.webhook_state());
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        business_id = "unknown",
        conversation_id = "unknown",
        bind_address = %address,
        signature_enforcement = app.config.sms.validate_signatures,
        "webhook endpoint listening"
    );

    let drain = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let server = axum::serve(listener, router).with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
    });

    tokio::select! {
        result = server => result?,
        () = drain_deadline(drain) => {
            tracing::warn!(
                event_name = "system.server.drain_timeout",
                correlation_id = "shutdown",
                business_id = "unknown",
                conversation_id = "unknown",
                "in-flight requests did not drain in time; exiting"
            );
        }
    }

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        business_id = "unknown",
        conversation_id = "unknown",
        "textback-server stopping"
    );

    Ok(())
}

/// Completes one drain window after the shutdown signal arrives. Racing this
/// against the server bounds how long connection draining may take.
async fn drain_deadline(drain: Duration) {
    let _ = tokio::signal::ctrl_c().await;
    tokio::time::sleep(drain).await;
}
