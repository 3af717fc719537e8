//! Push transport: Telegram posts each update to `/telegram-webhook`.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use storytime_bot::{Dispatcher, Update};
use storytime_core::webapp::secrets_match;
use tracing::{debug, warn};

pub const WEBHOOK_PATH: &str = "/telegram-webhook";
pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

#[derive(Clone)]
pub struct WebhookState {
    dispatcher: Arc<Dispatcher>,
    secret: Option<String>,
}

impl WebhookState {
    pub fn new(dispatcher: Arc<Dispatcher>, secret: Option<String>) -> Self {
        Self { dispatcher, secret }
    }
}

pub fn router(state: WebhookState) -> Router {
    Router::new().route(WEBHOOK_PATH, post(receive)).with_state(state)
}

/// Answers as soon as the update is decoded; dispatch runs on its own task
/// so a slow handler never makes Telegram retry the delivery.
pub async fn receive(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(expected) = state.secret.as_deref() {
        let presented = headers.get(SECRET_HEADER).and_then(|value| value.to_str().ok());
        if !presented.is_some_and(|presented| secrets_match(expected, presented)) {
            warn!(event_name = "ingress.webhook.rejected", "webhook secret mismatch");
            return StatusCode::UNAUTHORIZED;
        }
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(error) => {
            warn!(event_name = "ingress.webhook.malformed", error = %error, "could not decode update");
            return StatusCode::BAD_REQUEST;
        }
    };

    let update_id = update.update_id;
    match update.into_inbound() {
        Some(inbound) => {
            let dispatcher = Arc::clone(&state.dispatcher);
            tokio::spawn(async move {
                dispatcher.dispatch(inbound).await;
            });
        }
        None => {
            debug!(
                event_name = "ingress.update.skipped",
                correlation_id = update_id,
                "unsupported update type"
            );
        }
    }
    StatusCode::OK
}
