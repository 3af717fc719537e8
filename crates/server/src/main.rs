mod bootstrap;
mod health;
mod miniapp;
mod webhook;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use secrecy::ExposeSecret;
use storytime_bot::{PollingRunner, ReconnectPolicy, TelegramUpdateSource};
use storytime_core::config::{AppConfig, BotMode, LoadOptions};
use storytime_core::errors::ApplicationError;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::bootstrap::Application;

fn init_logging(config: &AppConfig) {
    use storytime_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default()).map_err(ApplicationError::from)?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(
        event_name = "system.http.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "http endpoint started"
    );

    let router = http_router(&app);
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.wait_for(|stopped| *stopped).await;
            })
            .await
    });

    let transport_result = run_transport(&app).await;

    info!(event_name = "system.server.stopping", correlation_id = "shutdown", "storytime-server stopping");
    let _ = stop_tx.send(true);
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    match tokio::time::timeout(grace, server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(error))) => {
            warn!(event_name = "system.http.error", error = %error, "http endpoint failed")
        }
        Ok(Err(error)) => {
            warn!(event_name = "system.http.error", error = %error, "http endpoint task failed")
        }
        Err(_) => warn!(
            event_name = "system.http.shutdown_timeout",
            grace_secs = grace.as_secs(),
            "http endpoint did not stop in time"
        ),
    }

    transport_result
}

fn http_router(app: &Application) -> Router {
    let router = health::router(health::HealthState::new(Arc::clone(&app.repo), app.config.telegram.mode))
        .merge(miniapp::router(miniapp::MiniAppState::new(
            Arc::clone(&app.repo),
            Arc::clone(&app.authorizer),
            &app.config.telegram.bot_token,
        )));
    match app.config.telegram.mode {
        BotMode::Polling => router,
        BotMode::Webhook => {
            let secret = app
                .config
                .telegram
                .webhook_secret
                .as_ref()
                .map(|secret| secret.expose_secret().to_owned());
            router.merge(webhook::router(webhook::WebhookState::new(
                Arc::clone(&app.dispatcher),
                secret,
            )))
        }
    }
}

/// Drives the configured transport until ctrl-c or a fatal polling error.
async fn run_transport(app: &Application) -> Result<()> {
    match app.config.telegram.mode {
        BotMode::Polling => {
            let source = Arc::new(TelegramUpdateSource::new(
                Arc::clone(&app.client),
                app.config.telegram.poll_timeout_secs,
            ));
            let runner =
                PollingRunner::new(source, Arc::clone(&app.dispatcher), ReconnectPolicy::default());
            info!(event_name = "system.server.started", correlation_id = "bootstrap", mode = "polling", "storytime-server started");

            tokio::select! {
                result = runner.start() => {
                    if let Err(polling_error) = &result {
                        error!(event_name = "system.polling.stopped", error = %polling_error, "update polling gave up");
                    }
                    result?;
                }
                signal = tokio::signal::ctrl_c() => signal?,
            }
        }
        BotMode::Webhook => {
            let url = app.config.telegram.webhook_url.as_deref().unwrap_or_default();
            app.client.set_webhook(url, app.config.telegram.webhook_secret.as_ref()).await?;
            info!(
                event_name = "system.server.started",
                correlation_id = "bootstrap",
                mode = "webhook",
                webhook_url = %url,
                "storytime-server started"
            );
            tokio::signal::ctrl_c().await?;
        }
    }
    Ok(())
}
