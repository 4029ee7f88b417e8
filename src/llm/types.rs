//! LLM request types

use crate::channel::ChatMode;
use crate::profile::ProfileContext;
use crate::session::{Block, HistoryEntry};

/// Everything needed to generate a fresh block buffer
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Full conversation history, ordered
    pub history: Vec<HistoryEntry>,

    /// Not-yet-sent blocks from the prior buffer, carried forward so the
    /// model may continue an interrupted thought
    pub pending_blocks: Vec<Block>,

    /// Optional user profile payload
    pub profile: Option<ProfileContext>,

    /// Selects the system prompt
    pub mode: ChatMode,
}

/// Inputs for the mid-stream relevance check
#[derive(Debug, Clone)]
pub struct RelevanceRequest {
    /// Tail of the conversation (latest user messages included)
    pub recent_history: Vec<HistoryEntry>,

    /// Blocks already delivered from the current buffer
    pub sent_blocks: Vec<Block>,

    /// Blocks still awaiting delivery
    pub pending_blocks: Vec<Block>,
}
