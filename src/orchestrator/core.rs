//! Orchestrator actor implementation
//!
//! The actor weaves four strands for one connection: message ingestion, the
//! typing-idle timer chain, the mid-stream relevance check, and block-by-block
//! delivery with a post-completion follow-up. Ordering inside a regeneration
//! is load-bearing: timers are cancelled and the pacer stopped before the LLM
//! call, and channel liveness is re-checked before a fresh buffer is
//! installed, so a response that arrives after a disconnect is dropped.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::channel::{ChatMode, DeliveryChannel, ServerEvent};
use crate::llm::{GenerateRequest, LlmClient, RelevanceRequest};
use crate::pacer::{Pacer, effective_delay};
use crate::profile::{self, ProfileProvider};
use crate::session::SessionStore;
use crate::timers::{TimerKind, Timers};

use super::handle::OrchestratorHandle;
use super::messages::OrchestratorMsg;

/// History tail handed to the relevance check
const RELEVANCE_HISTORY_TAIL: usize = 20;

/// Queue depth for one connection's events
const EVENT_QUEUE_DEPTH: usize = 64;

/// The per-connection state machine
pub struct Orchestrator {
    conn: String,
    store: Arc<SessionStore>,
    llm: Option<Arc<dyn LlmClient>>,
    profiles: Option<Arc<dyn ProfileProvider>>,
    channel: Arc<dyn DeliveryChannel>,
    timers: Timers,
    pacer: Pacer,
    rx: mpsc::Receiver<OrchestratorMsg>,
}

impl Orchestrator {
    /// Build the actor and its handle; the caller spawns [`Orchestrator::run`]
    pub fn new(
        conn: impl Into<String>,
        store: Arc<SessionStore>,
        llm: Option<Arc<dyn LlmClient>>,
        profiles: Option<Arc<dyn ProfileProvider>>,
        channel: Arc<dyn DeliveryChannel>,
    ) -> (Self, OrchestratorHandle) {
        let conn = conn.into();
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);

        let orchestrator = Self {
            timers: Timers::new(conn.clone(), tx.clone()),
            pacer: Pacer::new(conn.clone(), tx.clone()),
            conn: conn.clone(),
            store,
            llm,
            profiles,
            channel,
            rx,
        };

        let handle = OrchestratorHandle::new(tx, conn);
        (orchestrator, handle)
    }

    /// Run the actor until a terminal event
    pub async fn run(mut self) {
        info!(conn = %self.conn, "orchestrator started");

        while let Some(msg) = self.rx.recv().await {
            match msg {
                OrchestratorMsg::UserMessage { text } => self.handle_user_message(text).await,
                OrchestratorMsg::TypingStatus { is_typing } => self.handle_typing_status(is_typing).await,
                OrchestratorMsg::StopResponse => self.handle_stop().await,
                OrchestratorMsg::EndChat => {
                    self.handle_stop().await;
                    self.cleanup().await;
                    break;
                }
                OrchestratorMsg::Disconnect => {
                    self.cleanup().await;
                    break;
                }
                OrchestratorMsg::SetChatMode { mode, initial_message } => {
                    self.handle_set_chat_mode(mode, initial_message).await
                }
                OrchestratorMsg::PauseDelivery => self.handle_pause().await,
                OrchestratorMsg::ResumeDelivery => self.handle_resume().await,
                OrchestratorMsg::Timer(kind) => self.handle_timer(kind).await,
                OrchestratorMsg::PacerTick { seq } => self.handle_pacer_tick(seq).await,
            }
        }

        info!(conn = %self.conn, "orchestrator stopped");
    }

    /// Emit over the channel if it is still live; false means it was not
    async fn emit(&self, event: ServerEvent) -> bool {
        if !self.channel.is_connected() {
            return false;
        }
        self.channel.send(event).await.is_ok()
    }

    // === Client events ===

    async fn handle_user_message(&mut self, text: String) {
        debug!(conn = %self.conn, "user message received");

        self.emit(ServerEvent::MessageReceived {
            id: Uuid::now_v7().to_string(),
            text: text.clone(),
            sender: "user".to_string(),
            timestamp: Utc::now(),
        })
        .await;

        self.store.append_user_message(&self.conn, text).await;
        self.store.set_user_messaged(&self.conn, true).await;

        self.timers.cancel_typing();
        self.store.set_typing(&self.conn, false).await;
        self.store.set_idle_timer_gate(&self.conn, false).await;

        self.timers.cancel(TimerKind::EndUpdate);
        self.store.set_end_update_active(&self.conn, false).await;

        if self.pacer.is_sending() && !self.store.is_buffer_complete(&self.conn).await {
            self.interrupt_flow().await;
        } else {
            self.regenerate_now().await;
        }
    }

    async fn handle_typing_status(&mut self, is_typing: bool) {
        debug!(conn = %self.conn, is_typing, "typing status");
        self.store.set_typing(&self.conn, is_typing).await;

        if is_typing {
            self.timers.cancel_typing();
            self.timers.cancel(TimerKind::GroupDelay);

            if self.store.end_update_active(&self.conn).await {
                // Typing displaces the follow-up timer; the idle timer takes
                // over once the user stops.
                self.timers.cancel(TimerKind::EndUpdate);
                self.store.set_end_update_active(&self.conn, false).await;
                self.store.set_idle_timer_gate(&self.conn, true).await;
            }

            self.timers.set(TimerKind::MaxTyping);
        } else {
            self.timers.cancel_typing();

            if self.store.idle_timer_gate(&self.conn).await {
                self.timers.set(TimerKind::TypingIdle);
            }
        }
    }

    async fn handle_stop(&mut self) {
        info!(conn = %self.conn, "stopping response");
        self.timers.cancel_all();
        self.store.set_end_update_active(&self.conn, false).await;
        self.pacer.stop();
        self.store.mark_buffer_complete(&self.conn).await;
        self.emit(ServerEvent::AiComplete).await;
    }

    async fn handle_set_chat_mode(&mut self, mode: ChatMode, initial_message: Option<String>) {
        info!(conn = %self.conn, mode = mode.as_str(), "chat mode set");
        self.store.set_mode(&self.conn, mode).await;

        if let Some(message) = initial_message {
            self.handle_user_message(message).await;
        }
    }

    async fn handle_pause(&mut self) {
        debug!(conn = %self.conn, "pausing delivery");
        self.pacer.stop();
        self.store.set_paused(&self.conn, true).await;
    }

    async fn handle_resume(&mut self) {
        if !self.store.is_paused(&self.conn).await {
            return;
        }
        debug!(conn = %self.conn, "resuming delivery");
        self.store.set_paused(&self.conn, false).await;

        if let Some(block) = self.store.next_block(&self.conn).await {
            self.pacer.schedule(effective_delay(&block));
        }
    }

    async fn cleanup(&mut self) {
        info!(conn = %self.conn, "cleaning up connection");
        self.timers.cancel_all();
        self.pacer.stop();
        self.store.clear(&self.conn).await;
    }

    // === Timer fires ===
    //
    // Cancellation races firing, so every branch re-reads the gate that was
    // set when its timer was armed and exits when it has vanished.

    async fn handle_timer(&mut self, kind: TimerKind) {
        match kind {
            TimerKind::TypingIdle => {
                if !self.store.idle_timer_gate(&self.conn).await {
                    debug!(conn = %self.conn, "stale typingIdle fire");
                    return;
                }
                self.store.set_idle_timer_gate(&self.conn, false).await;
                self.store.set_user_messaged(&self.conn, false).await;
                self.regenerate_now().await;
            }

            TimerKind::MaxTyping => {
                if !self.store.is_typing(&self.conn).await {
                    debug!(conn = %self.conn, "stale maxTyping fire");
                    return;
                }
                info!(conn = %self.conn, "user typing too long, regenerating");
                self.store.set_user_messaged(&self.conn, false).await;
                self.regenerate_now().await;
            }

            TimerKind::GroupDelay => {
                if !self.store.needs_update(&self.conn).await {
                    debug!(conn = %self.conn, "stale groupDelay fire");
                    return;
                }
                // Either way the idle gate opens; if the user is mid-typing
                // the typing-stopped event arms the idle timer instead.
                self.store.set_idle_timer_gate(&self.conn, true).await;
                if !self.store.is_typing(&self.conn).await {
                    self.timers.set(TimerKind::TypingIdle);
                }
            }

            TimerKind::EndUpdate => {
                if !self.store.end_update_active(&self.conn).await {
                    debug!(conn = %self.conn, "stale endUpdate fire");
                    return;
                }
                info!(conn = %self.conn, "follow-up timer fired");
                self.store.set_end_update_active(&self.conn, false).await;
                self.store.set_user_messaged(&self.conn, false).await;
                self.regenerate_now().await;
            }
        }
    }

    // === Interrupt flow ===

    async fn interrupt_flow(&mut self) {
        info!(conn = %self.conn, "buffer sending; running relevance check");

        let Some(llm) = self.llm.clone() else {
            return;
        };

        let request = RelevanceRequest {
            recent_history: self.store.history_snapshot(&self.conn, Some(RELEVANCE_HISTORY_TAIL)).await,
            sent_blocks: self.store.sent_blocks(&self.conn).await,
            pending_blocks: self.store.pending_blocks(&self.conn).await,
        };

        // Errors are absorbed as "keep going" so a flaky backend can never
        // cause an interrupt loop.
        let needs_update = match llm.relevance_check(request).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(conn = %self.conn, error = %e, "relevance check failed, leaving delivery undisturbed");
                false
            }
        };

        if !needs_update {
            self.store.set_needs_update(&self.conn, false).await;
            return;
        }

        info!(conn = %self.conn, "pending blocks stale, scheduling regeneration");
        self.store.set_needs_update(&self.conn, true).await;

        if self.store.is_current_group_complete(&self.conn).await {
            // Already at a thought boundary: cut over now.
            self.pacer.stop();
            self.start_group_delay();
        } else {
            // Let the in-flight thought drain; the group-complete callback
            // picks this up.
            self.store.set_waiting_for_group(&self.conn, true).await;
        }
    }

    fn start_group_delay(&mut self) {
        self.timers.set(TimerKind::GroupDelay);
    }

    // === Regeneration ===

    async fn regenerate_now(&mut self) {
        info!(conn = %self.conn, "generating response");

        self.timers.cancel_all();
        self.store.set_end_update_active(&self.conn, false).await;
        self.pacer.stop();

        let Some(llm) = self.llm.clone() else {
            warn!(conn = %self.conn, "AI disabled, rejecting generation");
            self.emit(ServerEvent::Error {
                message: "AI responses are not available".to_string(),
                error: None,
            })
            .await;
            return;
        };

        let request = GenerateRequest {
            history: self.store.history_snapshot(&self.conn, None).await,
            pending_blocks: self.store.pending_blocks(&self.conn).await,
            profile: profile::resolve(self.profiles.as_deref(), &self.conn).await,
            mode: self.store.mode(&self.conn).await,
        };

        match llm.generate_buffer(request).await {
            Ok(blocks) => {
                if !self.channel.is_connected() {
                    debug!(conn = %self.conn, "channel closed during generation, dropping buffer");
                    return;
                }

                debug!(conn = %self.conn, blocks = blocks.len(), "installing fresh buffer");
                self.store.install_buffer(&self.conn, blocks).await;
                self.store.set_needs_update(&self.conn, false).await;
                self.store.set_waiting_for_group(&self.conn, false).await;
                self.start_pacing().await;
            }
            Err(e) => {
                warn!(conn = %self.conn, error = %e, "buffer generation failed");
                self.emit(ServerEvent::Error {
                    message: "AI response failed".to_string(),
                    error: Some(e.to_string()),
                })
                .await;
                self.store.mark_buffer_complete(&self.conn).await;
            }
        }
    }

    /// Begin the emission chain for the installed buffer
    async fn start_pacing(&mut self) {
        if !self.channel.is_connected() {
            self.pacer.stop();
            return;
        }
        self.store.set_paused(&self.conn, false).await;

        match self.store.next_block(&self.conn).await {
            Some(block) => self.pacer.schedule(effective_delay(&block)),
            None => self.on_buffer_complete().await,
        }
    }

    // === Emission step ===

    async fn handle_pacer_tick(&mut self, seq: u64) {
        if !self.pacer.accept_tick(seq) {
            debug!(conn = %self.conn, seq, "stale pacer tick");
            return;
        }

        if !self.channel.is_connected() {
            debug!(conn = %self.conn, "channel dead, stopping pacer");
            self.pacer.stop();
            return;
        }

        if self.store.is_paused(&self.conn).await {
            return;
        }

        if self.store.needs_update(&self.conn).await && !self.store.waiting_for_group(&self.conn).await {
            // The orchestrator requested a clean interrupt; release the
            // chain without firing callbacks. It owns what happens next.
            debug!(conn = %self.conn, "interrupt pending, releasing emission chain");
            return;
        }

        let Some(block) = self.store.next_block(&self.conn).await else {
            self.on_buffer_complete().await;
            return;
        };

        let delivered = self
            .emit(ServerEvent::AiBlock {
                text: block.text.clone(),
                group: block.group,
                timestamp: Utc::now(),
            })
            .await;
        if !delivered {
            self.pacer.stop();
            return;
        }

        self.store.append_model_message(&self.conn, &block.text).await;

        let previous_group = block.group;
        match self.store.advance_cursor(&self.conn).await {
            None => {
                // Exhausted; buffer-complete wins over the final group's
                // boundary.
                self.on_buffer_complete().await;
            }
            Some(new_group) => {
                if new_group != previous_group {
                    self.on_group_complete(previous_group).await;
                }
                if let Some(next) = self.store.next_block(&self.conn).await {
                    self.pacer.schedule(effective_delay(&next));
                }
            }
        }
    }

    async fn on_group_complete(&mut self, group: i64) {
        debug!(conn = %self.conn, group, "group complete");

        if self.store.needs_update(&self.conn).await && self.store.waiting_for_group(&self.conn).await {
            self.store.set_waiting_for_group(&self.conn, false).await;
            self.start_group_delay();
        }
    }

    async fn on_buffer_complete(&mut self) {
        info!(conn = %self.conn, "buffer complete");
        self.emit(ServerEvent::AiComplete).await;

        if self.store.needs_update(&self.conn).await {
            self.start_group_delay();
        } else if self.store.user_messaged(&self.conn).await {
            self.timers.set(TimerKind::EndUpdate);
            self.store.set_end_update_active(&self.conn, true).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockLlmClient;
    use crate::session::Block;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::time::Duration;

    /// Channel that records emissions and can be flipped dead
    pub struct RecordingChannel {
        connected: AtomicBool,
        events: Mutex<Vec<ServerEvent>>,
    }

    impl RecordingChannel {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                connected: AtomicBool::new(true),
                events: Mutex::new(Vec::new()),
            })
        }

        pub fn disconnect(&self) {
            self.connected.store(false, Ordering::SeqCst);
        }

        pub fn events(&self) -> Vec<ServerEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DeliveryChannel for RecordingChannel {
        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        async fn send(&self, event: ServerEvent) -> Result<(), crate::channel::ChannelError> {
            if !self.is_connected() {
                return Err(crate::channel::ChannelError);
            }
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    fn spawn_actor(
        llm: Option<Arc<dyn LlmClient>>,
    ) -> (OrchestratorHandle, Arc<RecordingChannel>, Arc<SessionStore>) {
        let store = Arc::new(SessionStore::new());
        let channel = RecordingChannel::new();
        let (orchestrator, handle) =
            Orchestrator::new("conn-1", store.clone(), llm, None, channel.clone());
        tokio::spawn(orchestrator.run());
        (handle, channel, store)
    }

    fn block_names(events: &[ServerEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                ServerEvent::AiBlock { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_toggle_leaves_only_max_typing() {
        let llm = Arc::new(MockLlmClient::new(
            vec![Ok(vec![Block::new("nudge", 1.0, 1)])],
            vec![],
        ));
        let (handle, _channel, store) = spawn_actor(Some(llm.clone()));

        handle.typing_status(true).await.unwrap();
        handle.typing_status(false).await.unwrap();
        handle.typing_status(true).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(store.is_typing("conn-1").await);
        // The gate was never opened, so no idle timer is armed: nothing
        // regenerates inside the 5s idle horizon.
        assert!(!store.idle_timer_gate("conn-1").await);
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(llm.generate_calls(), 0);

        // Only maxTyping survived the toggling; it fires 30s after the last
        // typing(true) and does not count as a user message.
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(llm.generate_calls(), 1);
        assert!(!store.user_messaged("conn-1").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_relevance_false_leaves_delivery_undisturbed() {
        let llm = Arc::new(MockLlmClient::new(
            vec![
                Ok(vec![Block::new("a", 1.0, 1), Block::new("b", 1.0, 1)]),
            ],
            vec![false],
        ));
        let (handle, channel, store) = spawn_actor(Some(llm.clone()));

        handle.user_message("hi").await.unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(block_names(&channel.events()), vec!["a"]);

        // Mid-stream message; verdict says the rest still fits.
        handle.user_message("ok").await.unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(llm.relevance_calls(), 1);
        assert_eq!(llm.generate_calls(), 1);
        assert_eq!(block_names(&channel.events()), vec!["a", "b"]);
        assert!(!store.needs_update("conn-1").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_failure_reports_error_and_recovers() {
        let llm = Arc::new(MockLlmClient::new(
            vec![
                Err(crate::llm::LlmError::BackendUnavailable {
                    message: "overloaded".to_string(),
                }),
                Ok(vec![Block::new("hello", 1.0, 1)]),
            ],
            vec![],
        ));
        let (handle, channel, store) = spawn_actor(Some(llm.clone()));

        handle.user_message("hi").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let events = channel.events();
        assert!(
            events.iter().any(|e| matches!(e, ServerEvent::Error { .. })),
            "expected an error event, got {events:?}"
        );
        assert!(store.is_buffer_complete("conn-1").await);

        // The user can retry by sending another message.
        handle.user_message("hi again").await.unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(block_names(&channel.events()), vec!["hello"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cleans_session() {
        let (handle, _channel, store) = spawn_actor(None);

        handle.user_message("hi").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(store.len().await, 1);

        handle.disconnect().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(store.is_empty().await);

        // Terminated actor rejects further events.
        assert!(handle.user_message("anyone there?").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_and_resume_delivery() {
        let llm = Arc::new(MockLlmClient::new(
            vec![Ok(vec![Block::new("a", 1.0, 1), Block::new("b", 1.0, 1)])],
            vec![],
        ));
        let (handle, channel, _store) = spawn_actor(Some(llm));

        handle.user_message("hi").await.unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(block_names(&channel.events()), vec!["a"]);

        handle.pause().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(block_names(&channel.events()), vec!["a"]);

        handle.resume().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(block_names(&channel.events()), vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_chat_mode_injects_initial_message() {
        let llm = Arc::new(MockLlmClient::new(
            vec![Ok(vec![Block::new("the stars align", 1.0, 1)])],
            vec![],
        ));
        let (handle, channel, store) = spawn_actor(Some(llm));

        handle
            .set_chat_mode(ChatMode::Astro, Some("read my chart".to_string()))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(store.mode("conn-1").await, ChatMode::Astro);
        assert_eq!(block_names(&channel.events()), vec!["the stars align"]);
        let history = store.history_snapshot("conn-1", None).await;
        assert_eq!(history[0].content, "read my chart");
    }
}
