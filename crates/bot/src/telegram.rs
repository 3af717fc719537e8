//! Minimal Telegram Bot API client: long polling, replies with inline
//! keyboards, callback acknowledgements and webhook registration.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use storytime_core::config::TelegramConfig;
use storytime_core::dialog::{ReplySurface, UserId};
use thiserror::Error;
use tracing::debug;

use crate::events::{InboundUpdate, UpdateKind};
use crate::gateway::{GatewayError, MessageGateway};
use crate::keyboard::{Keyboard, OutboundMessage};
use crate::polling::{TransportError, UpdateSource};

const REQUEST_SLACK_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("failed to build http client: {0}")]
    Client(String),
    #[error("telegram request `{method}` failed: {message}")]
    Http { method: &'static str, message: String },
    #[error("telegram rejected `{method}`: {description}")]
    Api { method: &'static str, description: String },
}

/// Envelope every Bot API method answers with.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
    pub message_thread_id: Option<i32>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct User {
    pub id: i64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    pub data: Option<String>,
}

impl Update {
    /// `None` for update types the bot does not handle (edits, stickers, ...).
    pub fn into_inbound(self) -> Option<InboundUpdate> {
        if let Some(query) = self.callback_query {
            let surface = query.message.as_ref().map_or(ReplySurface::new(query.from.id, None), |message| {
                ReplySurface::new(message.chat.id, message.message_thread_id)
            });
            return Some(InboundUpdate {
                update_id: self.update_id,
                user: UserId(query.from.id),
                surface,
                kind: UpdateKind::Button { callback_id: query.id, payload: query.data.unwrap_or_default() },
            });
        }

        let message = self.message?;
        let user = message.from?;
        Some(InboundUpdate {
            update_id: self.update_id,
            user: UserId(user.id),
            surface: ReplySurface::new(message.chat.id, message.message_thread_id),
            kind: UpdateKind::Text(message.text?),
        })
    }
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_thread_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a Keyboard>,
}

impl<'a> From<&'a OutboundMessage> for SendMessageRequest<'a> {
    fn from(message: &'a OutboundMessage) -> Self {
        Self {
            chat_id: message.surface.chat_id,
            text: &message.text,
            message_thread_id: message.surface.thread_id,
            reply_markup: message.keyboard.as_ref(),
        }
    }
}

pub struct TelegramClient {
    http: Client,
    api_base_url: String,
    token: SecretString,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Result<Self, TelegramError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs + REQUEST_SLACK_SECS))
            .build()
            .map_err(|error| TelegramError::Client(error.without_url().to_string()))?;
        Ok(Self {
            http,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token: SecretString::from(config.bot_token.expose_secret().to_owned()),
        })
    }

    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TelegramError> {
        let mut params = json!({
            "timeout": timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        if let Some(offset) = offset {
            params["offset"] = json!(offset);
        }
        self.call("getUpdates", &params).await
    }

    pub async fn send_message(&self, message: &OutboundMessage) -> Result<(), TelegramError> {
        let _: serde_json::Value =
            self.call("sendMessage", &SendMessageRequest::from(message)).await?;
        Ok(())
    }

    pub async fn answer_callback_query(&self, callback_id: &str) -> Result<(), TelegramError> {
        let _: bool =
            self.call("answerCallbackQuery", &json!({ "callback_query_id": callback_id })).await?;
        Ok(())
    }

    pub async fn set_webhook(
        &self,
        url: &str,
        secret: Option<&SecretString>,
    ) -> Result<(), TelegramError> {
        let mut params = json!({
            "url": url,
            "allowed_updates": ["message", "callback_query"],
        });
        if let Some(secret) = secret {
            params["secret_token"] = json!(secret.expose_secret());
        }
        let _: bool = self.call("setWebhook", &params).await?;
        Ok(())
    }

    /// Required before `getUpdates` works on a bot that had a webhook.
    pub async fn delete_webhook(&self) -> Result<(), TelegramError> {
        let _: bool = self.call("deleteWebhook", &json!({})).await?;
        Ok(())
    }

    async fn call<P, R>(&self, method: &'static str, params: &P) -> Result<R, TelegramError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/bot{}/{method}", self.api_base_url, self.token.expose_secret());
        // Errors must not carry the URL; it contains the bot token.
        let http_error = |error: reqwest::Error| TelegramError::Http {
            method,
            message: error.without_url().to_string(),
        };

        let response = self.http.post(url).json(params).send().await.map_err(http_error)?;
        let body: ApiResponse<R> = response.json().await.map_err(http_error)?;
        decode_response(method, body)
    }
}

fn decode_response<R>(method: &'static str, body: ApiResponse<R>) -> Result<R, TelegramError> {
    match body {
        ApiResponse { ok: true, result: Some(result), .. } => Ok(result),
        ApiResponse { description, .. } => Err(TelegramError::Api {
            method,
            description: description.unwrap_or_else(|| "no description".to_string()),
        }),
    }
}

#[async_trait]
impl MessageGateway for TelegramClient {
    async fn send(&self, message: &OutboundMessage) -> Result<(), GatewayError> {
        self.send_message(message).await.map_err(|error| GatewayError::Send(error.to_string()))
    }

    async fn acknowledge(&self, callback_id: &str) -> Result<(), GatewayError> {
        self.answer_callback_query(callback_id)
            .await
            .map_err(|error| GatewayError::Acknowledge(error.to_string()))
    }
}

/// `getUpdates` long polling with a confirmed-offset cursor.
pub struct TelegramUpdateSource {
    client: Arc<TelegramClient>,
    timeout_secs: u64,
    offset: Mutex<Option<i64>>,
}

impl TelegramUpdateSource {
    pub fn new(client: Arc<TelegramClient>, timeout_secs: u64) -> Self {
        Self { client, timeout_secs, offset: Mutex::new(None) }
    }
}

#[async_trait]
impl UpdateSource for TelegramUpdateSource {
    async fn connect(&self) -> Result<(), TransportError> {
        self.client.delete_webhook().await.map_err(|error| TransportError::Connect(error.to_string()))
    }

    async fn next_batch(&self) -> Result<Option<Vec<InboundUpdate>>, TransportError> {
        let offset = *self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        let updates = self
            .client
            .get_updates(offset, self.timeout_secs)
            .await
            .map_err(|error| TransportError::Receive(error.to_string()))?;

        if let Some(last) = updates.iter().map(|update| update.update_id).max() {
            *self.offset.lock().unwrap_or_else(PoisonError::into_inner) = Some(last + 1);
        }

        let batch = updates
            .into_iter()
            .filter_map(|update| {
                let update_id = update.update_id;
                let inbound = update.into_inbound();
                if inbound.is_none() {
                    debug!(event_name = "ingress.update.skipped", correlation_id = update_id, "unsupported update type");
                }
                inbound
            })
            .collect();
        Ok(Some(batch))
    }
}
