//! Connection registry and health reporting
//!
//! The relay is the process-wide root: it owns the session store, the shared
//! LLM client, and the map from connection id to orchestrator handle. The
//! transport calls [`Relay::connect`] when it accepts a connection and routes
//! decoded client events through the returned handle; when the actor
//! terminates (end-chat or disconnect) it deregisters itself.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;

use crate::channel::DeliveryChannel;
use crate::config::Config;
use crate::llm::{self, LlmClient};
use crate::orchestrator::{Orchestrator, OrchestratorHandle};
use crate::profile::ProfileProvider;
use crate::session::SessionStore;

/// Payload for the transport's health endpoint
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "aiEnabled")]
    pub ai_enabled: bool,
    #[serde(rename = "activeUsers")]
    pub active_users: usize,
}

/// Process-wide relay state
pub struct Relay {
    store: Arc<SessionStore>,
    llm: Option<Arc<dyn LlmClient>>,
    profiles: Option<Arc<dyn ProfileProvider>>,
    conns: Arc<Mutex<HashMap<String, OrchestratorHandle>>>,
}

impl Relay {
    pub fn new(llm: Option<Arc<dyn LlmClient>>, profiles: Option<Arc<dyn ProfileProvider>>) -> Self {
        Self {
            store: Arc::new(SessionStore::new()),
            llm,
            profiles,
            conns: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Build from configuration; a missing API key leaves AI flows disabled
    /// but the relay running.
    pub fn from_config(config: &Config) -> Self {
        Self::new(llm::create_client(&config.llm), None)
    }

    /// Attach a profile provider (chart / user data backend)
    pub fn with_profile_provider(mut self, provider: Arc<dyn ProfileProvider>) -> Self {
        self.profiles = Some(provider);
        self
    }

    pub fn ai_enabled(&self) -> bool {
        self.llm.is_some()
    }

    /// Register a new connection: spawns its orchestrator actor and returns
    /// the handle the transport routes events through. The actor deregisters
    /// itself when it terminates.
    pub async fn connect(&self, conn_id: &str, channel: Arc<dyn DeliveryChannel>) -> OrchestratorHandle {
        info!(conn = %conn_id, "connection registered");

        let (orchestrator, handle) = Orchestrator::new(
            conn_id,
            self.store.clone(),
            self.llm.clone(),
            self.profiles.clone(),
            channel,
        );

        self.conns.lock().await.insert(conn_id.to_string(), handle.clone());

        let conns = self.conns.clone();
        let conn_id = conn_id.to_string();
        tokio::spawn(async move {
            orchestrator.run().await;
            conns.lock().await.remove(&conn_id);
            info!(conn = %conn_id, "connection deregistered");
        });

        handle
    }

    /// Handle for an already-registered connection
    pub async fn handle_for(&self, conn_id: &str) -> Option<OrchestratorHandle> {
        self.conns.lock().await.get(conn_id).cloned()
    }

    pub async fn active_users(&self) -> usize {
        self.conns.lock().await.len()
    }

    pub async fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "ok",
            timestamp: Utc::now(),
            ai_enabled: self.ai_enabled(),
            active_users: self.active_users().await,
        }
    }
}
