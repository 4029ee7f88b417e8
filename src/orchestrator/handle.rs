//! OrchestratorHandle - client interface to a connection's actor

use eyre::{Result, eyre};
use tokio::sync::mpsc;

use crate::channel::{ChatMode, ClientEvent};

use super::messages::OrchestratorMsg;

/// Handle for feeding events to a connection's orchestrator
///
/// Cloneable; all operations are async sends into the actor's queue. A send
/// fails only when the actor has already terminated (end-chat/disconnect).
#[derive(Clone)]
pub struct OrchestratorHandle {
    tx: mpsc::Sender<OrchestratorMsg>,
    conn: String,
}

impl OrchestratorHandle {
    pub(crate) fn new(tx: mpsc::Sender<OrchestratorMsg>, conn: String) -> Self {
        Self { tx, conn }
    }

    /// The connection id this handle addresses
    pub fn conn(&self) -> &str {
        &self.conn
    }

    async fn send(&self, msg: OrchestratorMsg) -> Result<()> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| eyre!("orchestrator for {} has terminated", self.conn))
    }

    /// Route a decoded client event to the actor
    pub async fn client_event(&self, event: ClientEvent) -> Result<()> {
        match event {
            ClientEvent::UserMessage { message } => self.user_message(message).await,
            ClientEvent::TypingStatus { is_typing } => self.typing_status(is_typing).await,
            ClientEvent::StopAiResponse => self.stop().await,
            ClientEvent::EndChat => self.end_chat().await,
            ClientEvent::SetChatMode { mode, initial_message } => {
                self.set_chat_mode(mode, initial_message).await
            }
        }
    }

    pub async fn user_message(&self, text: impl Into<String>) -> Result<()> {
        self.send(OrchestratorMsg::UserMessage { text: text.into() }).await
    }

    pub async fn typing_status(&self, is_typing: bool) -> Result<()> {
        self.send(OrchestratorMsg::TypingStatus { is_typing }).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(OrchestratorMsg::StopResponse).await
    }

    pub async fn end_chat(&self) -> Result<()> {
        self.send(OrchestratorMsg::EndChat).await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.send(OrchestratorMsg::Disconnect).await
    }

    pub async fn set_chat_mode(&self, mode: ChatMode, initial_message: Option<String>) -> Result<()> {
        self.send(OrchestratorMsg::SetChatMode { mode, initial_message }).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.send(OrchestratorMsg::PauseDelivery).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.send(OrchestratorMsg::ResumeDelivery).await
    }
}
