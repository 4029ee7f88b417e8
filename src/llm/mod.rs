//! LLM client module
//!
//! Two operations back the relay: buffer generation (history in, timed
//! blocks out) and the mid-stream relevance check. The trait seam keeps the
//! orchestrator vendor-agnostic; [`GeminiClient`] is the shipped backend.

use std::sync::Arc;

mod client;
mod error;
mod gemini;
mod types;

pub use client::LlmClient;
#[cfg(test)]
pub(crate) use client::mock;
pub use error::LlmError;
pub use gemini::GeminiClient;
pub use types::{GenerateRequest, RelevanceRequest};

use crate::config::LlmConfig;

/// Build the configured LLM client, or None when no API key is available
/// (the relay then runs with AI flows disabled).
pub fn create_client(config: &LlmConfig) -> Option<Arc<dyn LlmClient>> {
    match GeminiClient::from_config(config) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::warn!(error = %e, "LLM client unavailable, AI flows disabled");
            None
        }
    }
}
