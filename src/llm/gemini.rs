//! Gemini API client implementation
//!
//! Implements [`LlmClient`] against the generateContent endpoint. Buffer
//! generation retries transient failures with jittered exponential backoff;
//! the relevance check is a single cheap attempt because its caller absorbs
//! errors anyway.

use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::prompts;
use crate::session::{Block, HistoryEntry, Role};

use super::{GenerateRequest, LlmClient, LlmError, RelevanceRequest};

/// HTTP statuses worth another attempt
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504 | 529)
}

/// Gemini API client
pub struct GeminiClient {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    max_retries: u32,
    retry_base: Duration,
}

impl GeminiClient {
    /// Create a new client from configuration
    ///
    /// Reads the API key from the environment variable named in config.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .get_api_key()
            .map_err(|e| LlmError::BadResponse(e.to_string()))?;

        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(LlmError::Network)?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.clone(),
            http,
            max_retries: config.max_retries.max(1),
            retry_base: Duration::from_millis(config.retry_base_ms),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }

    /// Build the request body from a system prompt and conversation turns
    fn build_request_body(system: &str, history: &[HistoryEntry]) -> serde_json::Value {
        let contents: Vec<serde_json::Value> = history
            .iter()
            .map(|entry| {
                let role = match entry.role {
                    Role::User => "user",
                    Role::Model => "model",
                };
                serde_json::json!({
                    "role": role,
                    "parts": [{"text": entry.content}],
                })
            })
            .collect();

        serde_json::json!({
            "system_instruction": {"parts": [{"text": system}]},
            "contents": contents,
        })
    }

    /// One request/response cycle, returning the concatenated candidate text
    async fn call(&self, body: &serde_json::Value) -> Result<String, LlmError> {
        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", self.api_key.clone())
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(LlmError::Network)?;

        let status = response.status().as_u16();

        if is_retryable_status(status) {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::BackendUnavailable {
                message: format!("status {status}: {message}"),
            });
        }

        if !(200..300).contains(&status) {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::BadResponse(format!("API error {status}: {message}")));
        }

        let envelope: GeminiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::BadResponse(format!("response envelope did not parse: {e}")))?;

        if let Some(feedback) = envelope.prompt_feedback
            && let Some(reason) = feedback.block_reason
        {
            return Err(LlmError::BackendRefused {
                message: format!("prompt blocked: {reason}"),
            });
        }

        let candidate = envelope
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::BadResponse("no candidates in response".to_string()))?;

        if let Some(reason) = &candidate.finish_reason
            && matches!(reason.as_str(), "SAFETY" | "PROHIBITED_CONTENT" | "BLOCKLIST")
        {
            return Err(LlmError::BackendRefused {
                message: format!("candidate blocked: {reason}"),
            });
        }

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(LlmError::BadResponse("empty candidate text".to_string()));
        }

        Ok(text)
    }

    /// Retry transient failures with jittered exponential backoff
    async fn call_with_retries(&self, body: &serde_json::Value) -> Result<String, LlmError> {
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_base.as_millis() as u64 * 2u64.pow(attempt - 1);
                let jitter: f64 = rand::rng().random_range(0.75..1.25);
                let delay = Duration::from_millis((backoff as f64 * jitter) as u64);
                warn!(attempt, ?delay, "retrying after transient backend error");
                tokio::time::sleep(delay).await;
            }

            match self.call(body).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() => {
                    debug!(attempt, error = %e, "transient backend error");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::BadResponse("retries exhausted".to_string())))
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate_buffer(&self, request: GenerateRequest) -> Result<Vec<Block>, LlmError> {
        let system = prompts::generation_prompt(
            request.mode,
            request.profile.as_ref().map(|p| &p.payload),
            &request.pending_blocks,
        )
        .map_err(|e| LlmError::BadResponse(e.to_string()))?;

        let body = Self::build_request_body(&system, &request.history);
        let text = self.call_with_retries(&body).await?;
        extract_blocks(&text)
    }

    async fn relevance_check(&self, request: RelevanceRequest) -> Result<bool, LlmError> {
        let prompt = prompts::relevance_prompt(
            &request.recent_history,
            &request.sent_blocks,
            &request.pending_blocks,
        )
        .map_err(|e| LlmError::BadResponse(e.to_string()))?;

        let turns = vec![HistoryEntry::user(prompt)];
        let body = Self::build_request_body("", &turns);
        let text = self.call(&body).await?;
        parse_verdict(&text)
    }
}

/// Pull the JSON block array out of the model text, tolerating markdown
/// fences and stray prose around the payload
fn extract_json_payload(text: &str) -> &str {
    let mut trimmed = text.trim();

    if let Some(rest) = trimmed.strip_prefix("```json").or_else(|| trimmed.strip_prefix("```")) {
        trimmed = rest.strip_suffix("```").unwrap_or(rest).trim();
    }

    if !trimmed.starts_with('[')
        && let (Some(start), Some(end)) = (trimmed.find('['), trimmed.rfind(']'))
        && start < end
    {
        return &trimmed[start..=end];
    }

    trimmed
}

/// Parse and validate the block array
fn extract_blocks(text: &str) -> Result<Vec<Block>, LlmError> {
    let payload = extract_json_payload(text);
    let blocks: Vec<Block> = serde_json::from_str(payload)
        .map_err(|e| LlmError::BadResponse(format!("block array did not parse: {e}")))?;

    if blocks.is_empty() {
        return Err(LlmError::BadResponse("empty block array".to_string()));
    }

    for (i, block) in blocks.iter().enumerate() {
        if block.text.trim().is_empty() {
            return Err(LlmError::BadResponse(format!("block {i} has empty text")));
        }
        if !block.typing_time.is_finite() || block.typing_time < 0.0 {
            return Err(LlmError::BadResponse(format!(
                "block {i} has invalid typingTime {}",
                block.typing_time
            )));
        }
    }

    Ok(blocks)
}

/// Interpret the relevance verdict from the leading token
fn parse_verdict(text: &str) -> Result<bool, LlmError> {
    let normalized = text.trim().to_lowercase();
    let token: String = normalized.chars().take_while(|c| c.is_alphanumeric()).collect();

    match token.as_str() {
        "yes" | "true" => Ok(true),
        "no" | "false" => Ok(false),
        _ => Err(LlmError::BadResponse(format!("unparseable verdict: {text:?}"))),
    }
}

// Gemini API response types

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_blocks_plain_array() {
        let blocks = extract_blocks(r#"[{"text":"hey","typingTime":1,"group":1}]"#).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, "hey");
    }

    #[test]
    fn test_extract_blocks_fenced() {
        let text = "```json\n[{\"text\":\"hey\",\"typingTime\":1.5,\"group\":2}]\n```";
        let blocks = extract_blocks(text).unwrap();
        assert_eq!(blocks[0].group, 2);
    }

    #[test]
    fn test_extract_blocks_with_surrounding_prose() {
        let text = "Here is the reading:\n[{\"text\":\"the moon\",\"typingTime\":2,\"group\":1}]\nHope that helps!";
        let blocks = extract_blocks(text).unwrap();
        assert_eq!(blocks[0].text, "the moon");
    }

    #[test]
    fn test_extract_blocks_rejects_empty_text() {
        let err = extract_blocks(r#"[{"text":"  ","typingTime":1,"group":1}]"#).unwrap_err();
        assert!(matches!(err, LlmError::BadResponse(_)));
    }

    #[test]
    fn test_extract_blocks_rejects_negative_time() {
        let err = extract_blocks(r#"[{"text":"x","typingTime":-2,"group":1}]"#).unwrap_err();
        assert!(matches!(err, LlmError::BadResponse(_)));
    }

    #[test]
    fn test_extract_blocks_rejects_empty_array() {
        assert!(extract_blocks("[]").is_err());
        assert!(extract_blocks("not json at all").is_err());
    }

    #[test]
    fn test_parse_verdict() {
        assert!(parse_verdict("yes").unwrap());
        assert!(parse_verdict("Yes, regenerate.").unwrap());
        assert!(!parse_verdict("NO").unwrap());
        assert!(!parse_verdict("no - still fits").unwrap());
        assert!(parse_verdict("maybe").is_err());
    }

    #[test]
    fn test_build_request_body_roles() {
        let history = vec![HistoryEntry::user("hi"), HistoryEntry::model("hello")];
        let body = GeminiClient::build_request_body("system text", &history);

        assert_eq!(body["system_instruction"]["parts"][0]["text"], "system text");
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][1]["parts"][0]["text"], "hello");
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(529));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(404));
    }
}
