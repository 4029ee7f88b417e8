//! Message types for the orchestrator actor

use crate::channel::ChatMode;
use crate::timers::TimerKind;

/// Everything a connection's actor reacts to
#[derive(Debug, Clone)]
pub enum OrchestratorMsg {
    /// The user sent a message
    UserMessage { text: String },

    /// The user started or stopped typing
    TypingStatus { is_typing: bool },

    /// The user asked to stop the in-flight response
    StopResponse,

    /// The user ended the chat; terminal
    EndChat,

    /// The transport dropped the connection; terminal
    Disconnect,

    /// Switch prompt profile, optionally injecting a first message
    SetChatMode {
        mode: ChatMode,
        initial_message: Option<String>,
    },

    /// Suspend block delivery without discarding the buffer
    PauseDelivery,

    /// Resume a paused delivery
    ResumeDelivery,

    /// A named timer fired
    Timer(TimerKind),

    /// The pacer's next-block sleep elapsed
    PacerTick { seq: u64 },
}
