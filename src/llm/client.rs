//! LlmClient trait definition

use async_trait::async_trait;

use crate::session::Block;

use super::{GenerateRequest, LlmError, RelevanceRequest};

/// Stateless LLM client - each call is independent
///
/// The relay hands the full conversation history to every `generate_buffer`
/// call, so no conversation state lives behind this seam. Relevance-check
/// failures are absorbed by the caller (treated as "do not interrupt"), which
/// keeps an unreachable backend from causing interrupt thrash.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Produce a fresh buffer of timed blocks from the conversation
    async fn generate_buffer(&self, request: GenerateRequest) -> Result<Vec<Block>, LlmError>;

    /// Decide whether the remaining pending blocks are still appropriate
    /// given the latest user messages
    async fn relevance_check(&self, request: RelevanceRequest) -> Result<bool, LlmError>;
}
