//! Session state types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channel::ChatMode;

/// One unit of paced output from the LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Text to deliver (non-empty)
    pub text: String,

    /// Seconds the "typing" of this block should take; the pacer clamps the
    /// effective delay to a one-second minimum
    #[serde(rename = "typingTime")]
    pub typing_time: f64,

    /// Contiguous blocks sharing a group form an indivisible thought
    pub group: i64,
}

impl Block {
    pub fn new(text: impl Into<String>, typing_time: f64, group: i64) -> Self {
        Self {
            text: text.into(),
            typing_time,
            group,
        }
    }
}

/// Ordered block sequence plus the delivery cursor
///
/// Invariants: `0 <= cursor <= blocks.len()`; when the cursor is past the
/// end the buffer is complete and there is no current group.
#[derive(Debug, Clone, Default)]
pub struct Buffer {
    pub blocks: Vec<Block>,
    pub cursor: usize,
    /// Cursor past the end, or forcibly terminated by a stop
    pub complete: bool,
    pub paused: bool,
}

impl Buffer {
    pub fn new(blocks: Vec<Block>) -> Self {
        let complete = blocks.is_empty();
        Self {
            blocks,
            cursor: 0,
            complete,
            paused: false,
        }
    }

    /// The block the cursor points at, without advancing
    pub fn next_block(&self) -> Option<&Block> {
        if self.complete {
            return None;
        }
        self.blocks.get(self.cursor)
    }

    /// Group of the block at the cursor, or None when exhausted
    pub fn current_group(&self) -> Option<i64> {
        if self.complete {
            return None;
        }
        self.blocks.get(self.cursor).map(|b| b.group)
    }

    /// Advance the cursor; marks the buffer complete when it passes the end
    pub fn advance(&mut self) {
        if self.cursor < self.blocks.len() {
            self.cursor += 1;
        }
        if self.cursor >= self.blocks.len() {
            self.complete = true;
        }
    }

    /// Blocks not yet emitted; empty once the buffer is complete (a forced
    /// stop discards the tail rather than carrying it forward)
    pub fn pending(&self) -> Vec<Block> {
        if self.complete {
            return Vec::new();
        }
        self.blocks.get(self.cursor..).unwrap_or_default().to_vec()
    }

    /// Blocks already emitted
    pub fn sent(&self) -> Vec<Block> {
        self.blocks.get(..self.cursor.min(self.blocks.len())).unwrap_or_default().to_vec()
    }

    /// Whether the in-flight thought (the group of the last emitted block)
    /// has fully drained.
    ///
    /// True when nothing has been emitted yet, when the cursor is past the
    /// end, or when no block at or after the cursor shares the previous
    /// block's group.
    pub fn is_current_group_complete(&self) -> bool {
        if self.cursor >= self.blocks.len() {
            return true;
        }
        let Some(prev) = self.cursor.checked_sub(1) else {
            return true;
        };
        let group = self.blocks[prev].group;
        !self.blocks[self.cursor..].iter().any(|b| b.group == group)
    }
}

/// Role of a history entry author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One conversation turn; append-only within a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Typing indicator state
///
/// `should_use_idle_timer` is gated: it only becomes true after an
/// interrupt's group-delay settle or after the post-response follow-up timer
/// was displaced by typing. A fired idle timer checks and clears it, so a
/// fire that lost its cancel race exits without effect.
#[derive(Debug, Clone, Default)]
pub struct TypingState {
    pub is_typing: bool,
    pub last_typing_time: Option<DateTime<Utc>>,
    pub should_use_idle_timer: bool,
}

/// Mid-stream relevance-check state
#[derive(Debug, Clone, Default)]
pub struct UpdateCheckState {
    /// A positive relevance check requested a regeneration
    pub needs_update: bool,
    /// The pacer is draining the in-flight group before cutover
    pub waiting_for_group: bool,
    pub last_check_time: Option<DateTime<Utc>>,
}

/// Post-response follow-up state
///
/// `user_messaged` is the gate preventing infinite self-talk: the follow-up
/// timer only starts if the user contributed a real message this cycle.
#[derive(Debug, Clone, Default)]
pub struct EndUpdateState {
    pub timer_active: bool,
    pub timer_start_time: Option<DateTime<Utc>>,
    pub user_messaged: bool,
}

/// Everything the relay tracks for one connection
#[derive(Debug, Clone)]
pub struct Session {
    pub history: Vec<HistoryEntry>,
    pub buffer: Buffer,
    pub typing: TypingState,
    pub update_check: UpdateCheckState,
    pub end_update: EndUpdateState,
    pub mode: ChatMode,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            history: Vec::new(),
            buffer: Buffer::default(),
            typing: TypingState::default(),
            update_check: UpdateCheckState::default(),
            end_update: EndUpdateState::default(),
            mode: ChatMode::Tarot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_abc() -> Buffer {
        Buffer::new(vec![
            Block::new("a", 1.0, 1),
            Block::new("b", 1.0, 1),
            Block::new("c", 1.0, 2),
        ])
    }

    #[test]
    fn test_buffer_cursor_and_groups() {
        let mut buf = buffer_abc();
        assert_eq!(buf.current_group(), Some(1));
        assert_eq!(buf.next_block().unwrap().text, "a");
        assert!(!buf.complete);

        buf.advance();
        assert_eq!(buf.current_group(), Some(1));
        buf.advance();
        assert_eq!(buf.current_group(), Some(2));
        buf.advance();

        assert!(buf.complete);
        assert_eq!(buf.current_group(), None);
        assert!(buf.next_block().is_none());
    }

    #[test]
    fn test_empty_buffer_is_complete() {
        let buf = Buffer::new(vec![]);
        assert!(buf.complete);
        assert_eq!(buf.current_group(), None);
    }

    #[test]
    fn test_pending_and_sent_split() {
        let mut buf = buffer_abc();
        buf.advance();
        assert_eq!(buf.sent().len(), 1);
        assert_eq!(buf.pending().len(), 2);
        assert_eq!(buf.pending()[0].text, "b");
    }

    #[test]
    fn test_forced_completion_discards_pending() {
        let mut buf = buffer_abc();
        buf.advance();
        buf.complete = true;
        assert!(buf.pending().is_empty());
        assert!(buf.next_block().is_none());
    }

    #[test]
    fn test_group_complete_before_first_emission() {
        let buf = buffer_abc();
        assert!(buf.is_current_group_complete());
    }

    #[test]
    fn test_group_complete_mid_group() {
        let mut buf = buffer_abc();
        buf.advance(); // emitted "a", cursor at "b" which shares group 1
        assert!(!buf.is_current_group_complete());
    }

    #[test]
    fn test_group_complete_at_boundary() {
        let mut buf = buffer_abc();
        buf.advance();
        buf.advance(); // emitted group 1 entirely, cursor at group 2
        assert!(buf.is_current_group_complete());
    }

    #[test]
    fn test_group_complete_when_exhausted() {
        let mut buf = buffer_abc();
        buf.advance();
        buf.advance();
        buf.advance();
        assert!(buf.is_current_group_complete());
    }

    #[test]
    fn test_block_deserializes_wire_names() {
        let block: Block = serde_json::from_str(r#"{"text":"hi","typingTime":1.5,"group":2}"#).unwrap();
        assert_eq!(block.text, "hi");
        assert_eq!(block.typing_time, 1.5);
        assert_eq!(block.group, 2);
    }
}
