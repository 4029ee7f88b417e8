//! Wire events and the delivery-channel seam
//!
//! The transport (WebSocket framing, auth, CORS) is an external collaborator;
//! the relay only assumes a bidirectional message channel. Inbound payloads
//! deserialize into [`ClientEvent`], outbound emissions serialize from
//! [`ServerEvent`], and [`DeliveryChannel`] is the seam the orchestrator and
//! pacer emit through. Both validate liveness before emitting and bail out
//! silently when the connection is gone.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prompt profile for a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    Tarot,
    Astro,
}

impl ChatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatMode::Tarot => "tarot",
            ChatMode::Astro => "astro",
        }
    }
}

/// Events arriving from the client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    UserMessage {
        message: String,
    },

    #[serde(rename_all = "camelCase")]
    TypingStatus {
        is_typing: bool,
    },

    StopAiResponse,

    EndChat,

    #[serde(rename_all = "camelCase")]
    SetChatMode {
        mode: ChatMode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        initial_message: Option<String>,
    },
}

/// Events emitted to the client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Echo confirmation for a received user message
    MessageReceived {
        id: String,
        text: String,
        sender: String,
        timestamp: DateTime<Utc>,
    },

    /// One pacer emission
    AiBlock {
        text: String,
        group: i64,
        timestamp: DateTime<Utc>,
    },

    /// Buffer drained or stop acknowledged
    AiComplete,

    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// The channel disconnected mid-operation
#[derive(Debug, Error)]
#[error("delivery channel closed")]
pub struct ChannelError;

/// Outbound seam owned by the transport
///
/// `is_connected` must be cheap; it is consulted before every emission and
/// before installing a freshly generated buffer.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    fn is_connected(&self) -> bool;

    async fn send(&self, event: ServerEvent) -> Result<(), ChannelError>;
}
