//! chatrelay - Real-time conversational relay for paced AI responses
//!
//! chatrelay sits between a chat client and an LLM backend. The backend
//! returns responses pre-segmented into timed "blocks"; the relay delivers
//! those blocks over the client channel with realistic typing delays, and
//! decides in-flight whether a newer user message has made the pending
//! response stale (interrupting and regenerating at a group boundary if so).
//!
//! # Core Concepts
//!
//! - **One actor per connection**: every client event, timer fire, and pacer
//!   tick for a connection is processed by a single task, one at a time
//! - **Blocks and groups**: a block is one paced emission; contiguous blocks
//!   sharing a group form an indivisible thought during interrupt cutover
//! - **Conservative interrupts**: a relevance check that fails is treated as
//!   "keep going" so an unreachable backend can never cause interrupt thrash
//!
//! # Modules
//!
//! - [`orchestrator`] - Per-connection state machine
//! - [`pacer`] - Timed block delivery
//! - [`session`] - Per-connection state and the process-wide store
//! - [`timers`] - Named single-shot timers
//! - [`llm`] - LLM client trait and Gemini implementation
//! - [`channel`] - Wire events and the delivery-channel seam
//! - [`relay`] - Connection registry and health reporting

pub mod channel;
pub mod cli;
pub mod config;
pub mod llm;
pub mod orchestrator;
pub mod pacer;
pub mod profile;
pub mod prompts;
pub mod relay;
pub mod session;
pub mod timers;

// Re-export commonly used types
pub use channel::{ChannelError, ChatMode, ClientEvent, DeliveryChannel, ServerEvent};
pub use config::{Config, LlmConfig, ProfileConfig};
pub use llm::{GeminiClient, GenerateRequest, LlmClient, LlmError, RelevanceRequest};
pub use orchestrator::{Orchestrator, OrchestratorHandle, OrchestratorMsg};
pub use profile::{NoopProfileProvider, ProfileContext, ProfileProvider};
pub use relay::{HealthStatus, Relay};
pub use session::{Block, HistoryEntry, Role, Session, SessionStore};
pub use timers::{TimerKind, Timers};
