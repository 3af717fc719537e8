use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use thiserror::Error;

use crate::keyboard::OutboundMessage;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("message delivery failed: {0}")]
    Send(String),
    #[error("button acknowledgement failed: {0}")]
    Acknowledge(String),
}

/// Outbound side of the chat transport.
#[async_trait]
pub trait MessageGateway: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<(), GatewayError>;

    /// Stops the client-side spinner on a pressed button.
    async fn acknowledge(&self, callback_id: &str) -> Result<(), GatewayError>;
}

/// Keeps every outbound message and acknowledgement in memory.
#[derive(Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<OutboundMessage>>,
    acknowledged: Mutex<Vec<String>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|message| message.text).collect()
    }

    pub fn acknowledged(&self) -> Vec<String> {
        self.acknowledged.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl MessageGateway for RecordingGateway {
    async fn send(&self, message: &OutboundMessage) -> Result<(), GatewayError> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).push(message.clone());
        Ok(())
    }

    async fn acknowledge(&self, callback_id: &str) -> Result<(), GatewayError> {
        self.acknowledged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(callback_id.to_owned());
        Ok(())
    }
}
