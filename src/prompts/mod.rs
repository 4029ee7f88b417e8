//! Prompt rendering
//!
//! Renders the embedded Handlebars templates with per-call context. The
//! generation prompt varies by chat mode; the relevance prompt is shared.

mod embedded;

use eyre::{Context, Result};
use handlebars::Handlebars;
use serde::Serialize;

use crate::channel::ChatMode;
use crate::session::{Block, HistoryEntry};

#[derive(Serialize)]
struct GenerationParams {
    profile: Option<String>,
    pending: Option<String>,
    format: &'static str,
}

#[derive(Serialize)]
struct RelevanceParams {
    history: String,
    sent: String,
    pending: String,
}

fn registry() -> Handlebars<'static> {
    let mut hb = Handlebars::new();
    hb.register_escape_fn(handlebars::no_escape);
    hb
}

fn render_history(history: &[HistoryEntry]) -> String {
    history
        .iter()
        .map(|entry| {
            let who = match entry.role {
                crate::session::Role::User => "user",
                crate::session::Role::Model => "you",
            };
            format!("{who}: {}", entry.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_blocks(blocks: &[Block]) -> String {
    if blocks.is_empty() {
        return "(none)".to_string();
    }
    blocks
        .iter()
        .map(|b| format!("- {}", b.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render the generation system prompt for a chat mode
pub fn generation_prompt(
    mode: ChatMode,
    profile: Option<&serde_json::Value>,
    pending: &[Block],
) -> Result<String> {
    let template = match mode {
        ChatMode::Tarot => embedded::TAROT_SYSTEM,
        ChatMode::Astro => embedded::ASTRO_SYSTEM,
    };

    let params = GenerationParams {
        profile: profile.map(|p| p.to_string()),
        pending: (!pending.is_empty()).then(|| render_blocks(pending)),
        format: embedded::BLOCK_FORMAT,
    };

    registry()
        .render_template(template, &params)
        .context("failed to render generation prompt")
}

/// Render the relevance-check prompt
pub fn relevance_prompt(
    recent_history: &[HistoryEntry],
    sent: &[Block],
    pending: &[Block],
) -> Result<String> {
    let params = RelevanceParams {
        history: render_history(recent_history),
        sent: render_blocks(sent),
        pending: render_blocks(pending),
    };

    registry()
        .render_template(embedded::RELEVANCE_CHECK, &params)
        .context("failed to render relevance prompt")
}
