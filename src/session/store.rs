//! Process-wide session map
//!
//! One mutex guards the whole map; every operation locks, touches exactly one
//! session, and releases. Sessions are created lazily on first access and
//! removed explicitly on end-chat / disconnect. Cross-session operations do
//! not exist, so the single-session atomicity contract falls out of the lock.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::channel::ChatMode;

use super::types::{Block, HistoryEntry, Session};

#[derive(Default)]
pub struct SessionStore {
    inner: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against the (lazily created) session for `conn`
    async fn with_session<T>(&self, conn: &str, f: impl FnOnce(&mut Session) -> T) -> T {
        let mut inner = self.inner.lock().await;
        let session = inner.entry(conn.to_string()).or_default();
        f(session)
    }

    /// Remove all state for a connection
    pub async fn clear(&self, conn: &str) {
        debug!(%conn, "clearing session");
        self.inner.lock().await.remove(conn);
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    // === History ===

    pub async fn append_user_message(&self, conn: &str, text: impl Into<String>) {
        self.with_session(conn, |s| s.history.push(HistoryEntry::user(text.into()))).await
    }

    pub async fn append_model_message(&self, conn: &str, text: impl Into<String>) {
        self.with_session(conn, |s| s.history.push(HistoryEntry::model(text.into()))).await
    }

    /// Snapshot the history; `tail` limits to the last N entries
    pub async fn history_snapshot(&self, conn: &str, tail: Option<usize>) -> Vec<HistoryEntry> {
        self.with_session(conn, |s| {
            let start = tail.map_or(0, |n| s.history.len().saturating_sub(n));
            s.history[start..].to_vec()
        })
        .await
    }

    // === Buffer ===

    /// Install a fresh buffer with the cursor at zero, clearing pause state
    pub async fn install_buffer(&self, conn: &str, blocks: Vec<Block>) {
        self.with_session(conn, |s| {
            debug!(%conn, blocks = blocks.len(), "installing buffer");
            s.buffer = super::types::Buffer::new(blocks);
        })
        .await
    }

    /// The block at the cursor, without advancing
    pub async fn next_block(&self, conn: &str) -> Option<Block> {
        self.with_session(conn, |s| s.buffer.next_block().cloned()).await
    }

    /// Advance the cursor, returning the new current group
    pub async fn advance_cursor(&self, conn: &str) -> Option<i64> {
        self.with_session(conn, |s| {
            s.buffer.advance();
            s.buffer.current_group()
        })
        .await
    }

    pub async fn current_group(&self, conn: &str) -> Option<i64> {
        self.with_session(conn, |s| s.buffer.current_group()).await
    }

    pub async fn pending_blocks(&self, conn: &str) -> Vec<Block> {
        self.with_session(conn, |s| s.buffer.pending()).await
    }

    pub async fn sent_blocks(&self, conn: &str) -> Vec<Block> {
        self.with_session(conn, |s| s.buffer.sent()).await
    }

    pub async fn is_current_group_complete(&self, conn: &str) -> bool {
        self.with_session(conn, |s| s.buffer.is_current_group_complete()).await
    }

    /// Force-terminate the buffer (stop flow)
    pub async fn mark_buffer_complete(&self, conn: &str) {
        self.with_session(conn, |s| s.buffer.complete = true).await
    }

    pub async fn is_buffer_complete(&self, conn: &str) -> bool {
        self.with_session(conn, |s| s.buffer.complete).await
    }

    pub async fn set_paused(&self, conn: &str, paused: bool) {
        self.with_session(conn, |s| s.buffer.paused = paused).await
    }

    pub async fn is_paused(&self, conn: &str) -> bool {
        self.with_session(conn, |s| s.buffer.paused).await
    }

    // === Typing state ===

    pub async fn set_typing(&self, conn: &str, is_typing: bool) {
        self.with_session(conn, |s| {
            s.typing.is_typing = is_typing;
            s.typing.last_typing_time = Some(Utc::now());
        })
        .await
    }

    pub async fn is_typing(&self, conn: &str) -> bool {
        self.with_session(conn, |s| s.typing.is_typing).await
    }

    pub async fn set_idle_timer_gate(&self, conn: &str, enabled: bool) {
        self.with_session(conn, |s| s.typing.should_use_idle_timer = enabled).await
    }

    pub async fn idle_timer_gate(&self, conn: &str) -> bool {
        self.with_session(conn, |s| s.typing.should_use_idle_timer).await
    }

    // === Update-check state ===

    /// Record a relevance-check outcome; a positive verdict stamps the check time
    pub async fn set_needs_update(&self, conn: &str, needs_update: bool) {
        self.with_session(conn, |s| {
            s.update_check.needs_update = needs_update;
            if needs_update {
                s.update_check.last_check_time = Some(Utc::now());
            }
        })
        .await
    }

    pub async fn needs_update(&self, conn: &str) -> bool {
        self.with_session(conn, |s| s.update_check.needs_update).await
    }

    pub async fn set_waiting_for_group(&self, conn: &str, waiting: bool) {
        self.with_session(conn, |s| s.update_check.waiting_for_group = waiting).await
    }

    pub async fn waiting_for_group(&self, conn: &str) -> bool {
        self.with_session(conn, |s| s.update_check.waiting_for_group).await
    }

    // === End-update state ===

    pub async fn set_end_update_active(&self, conn: &str, active: bool) {
        self.with_session(conn, |s| {
            s.end_update.timer_active = active;
            s.end_update.timer_start_time = active.then(Utc::now);
        })
        .await
    }

    pub async fn end_update_active(&self, conn: &str) -> bool {
        self.with_session(conn, |s| s.end_update.timer_active).await
    }

    pub async fn set_user_messaged(&self, conn: &str, messaged: bool) {
        self.with_session(conn, |s| s.end_update.user_messaged = messaged).await
    }

    pub async fn user_messaged(&self, conn: &str) -> bool {
        self.with_session(conn, |s| s.end_update.user_messaged).await
    }

    // === Chat mode ===

    pub async fn set_mode(&self, conn: &str, mode: ChatMode) {
        self.with_session(conn, |s| s.mode = mode).await
    }

    pub async fn mode(&self, conn: &str) -> ChatMode {
        self.with_session(conn, |s| s.mode).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks_abc() -> Vec<Block> {
        vec![
            Block::new("a", 1.0, 1),
            Block::new("b", 1.0, 1),
            Block::new("c", 1.0, 2),
        ]
    }

    #[tokio::test]
    async fn test_lazy_creation_and_clear() {
        let store = SessionStore::new();
        assert!(store.is_empty().await);

        store.append_user_message("conn-1", "hi").await;
        assert_eq!(store.len().await, 1);

        store.clear("conn-1").await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_history_tail() {
        let store = SessionStore::new();
        for i in 0..5 {
            store.append_user_message("c", format!("m{i}")).await;
        }

        let all = store.history_snapshot("c", None).await;
        assert_eq!(all.len(), 5);

        let tail = store.history_snapshot("c", Some(2)).await;
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].content, "m3");

        let oversized = store.history_snapshot("c", Some(20)).await;
        assert_eq!(oversized.len(), 5);
    }

    #[tokio::test]
    async fn test_buffer_install_and_advance() {
        let store = SessionStore::new();
        store.install_buffer("c", blocks_abc()).await;

        assert!(!store.is_buffer_complete("c").await);
        assert_eq!(store.next_block("c").await.unwrap().text, "a");
        assert_eq!(store.current_group("c").await, Some(1));

        assert_eq!(store.advance_cursor("c").await, Some(1));
        assert_eq!(store.advance_cursor("c").await, Some(2));
        assert_eq!(store.advance_cursor("c").await, None);
        assert!(store.is_buffer_complete("c").await);
        assert_eq!(store.pending_blocks("c").await.len(), 0);
    }

    #[tokio::test]
    async fn test_install_resets_pause_and_cursor() {
        let store = SessionStore::new();
        store.install_buffer("c", blocks_abc()).await;
        store.advance_cursor("c").await;
        store.set_paused("c", true).await;

        store.install_buffer("c", vec![Block::new("x", 1.0, 1)]).await;
        assert!(!store.is_paused("c").await);
        assert_eq!(store.next_block("c").await.unwrap().text, "x");
    }

    #[tokio::test]
    async fn test_mark_complete_forces_termination() {
        let store = SessionStore::new();
        store.install_buffer("c", blocks_abc()).await;
        store.mark_buffer_complete("c").await;

        assert!(store.is_buffer_complete("c").await);
        assert!(store.next_block("c").await.is_none());
        assert_eq!(store.current_group("c").await, None);
    }

    #[tokio::test]
    async fn test_group_complete_tracks_last_emitted() {
        let store = SessionStore::new();
        store.install_buffer("c", blocks_abc()).await;

        // Nothing emitted yet
        assert!(store.is_current_group_complete("c").await);

        store.advance_cursor("c").await; // emitted "a", "b" shares its group
        assert!(!store.is_current_group_complete("c").await);

        store.advance_cursor("c").await; // group 1 drained
        assert!(store.is_current_group_complete("c").await);
    }

    #[tokio::test]
    async fn test_flag_round_trips() {
        let store = SessionStore::new();

        store.set_typing("c", true).await;
        assert!(store.is_typing("c").await);

        store.set_idle_timer_gate("c", true).await;
        assert!(store.idle_timer_gate("c").await);

        store.set_needs_update("c", true).await;
        store.set_waiting_for_group("c", true).await;
        assert!(store.needs_update("c").await);
        assert!(store.waiting_for_group("c").await);

        store.set_end_update_active("c", true).await;
        assert!(store.end_update_active("c").await);
        store.set_end_update_active("c", false).await;
        assert!(!store.end_update_active("c").await);

        store.set_user_messaged("c", true).await;
        assert!(store.user_messaged("c").await);

        store.set_mode("c", ChatMode::Astro).await;
        assert_eq!(store.mode("c").await, ChatMode::Astro);
    }
}
