//! Claude-backed [`TextGenerator`].
//!
//! Each request is a one-shot `claude-agent-sdk-rs` query with no tools: the
//! rendered prompt is the user turn and a short system prompt pins the
//! response format.

use async_trait::async_trait;
use claude_agent_sdk_rs::{ClaudeAgentOptions, ContentBlock, Message, PermissionMode, SystemPrompt};
use tracing::{debug, error, instrument};

use crate::error::CoreError;
use crate::generate::{GenerationRequest, ResponseFormat, TextGenerator};

const TEXT_SYSTEM_PROMPT: &str = "You are an academic planning assistant for university \
students. Answer concisely in plain text.";

const JSON_SYSTEM_PROMPT: &str = "You are an academic planning assistant for university \
students. Respond with a single JSON object exactly matching the format requested in the \
prompt. Do not add commentary or markdown.";

/// Text generator backed by the Claude Agent SDK.
#[derive(Debug, Clone, Default)]
pub struct ClaudeGenerator {
    /// Model name; `None` uses the SDK default.
    model: Option<String>,
}

impl ClaudeGenerator {
    pub fn new(model: Option<String>) -> Self {
        Self { model }
    }

    fn options(&self, format: ResponseFormat) -> ClaudeAgentOptions {
        let system_prompt = match format {
            ResponseFormat::Text => TEXT_SYSTEM_PROMPT,
            ResponseFormat::Json => JSON_SYSTEM_PROMPT,
        };
        ClaudeAgentOptions {
            system_prompt: Some(SystemPrompt::Text(system_prompt.to_owned())),
            permission_mode: Some(PermissionMode::Plan),
            model: self.model.clone(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl TextGenerator for ClaudeGenerator {
    #[instrument(skip(self, request), fields(stage = %request.stage))]
    async fn generate(&self, request: GenerationRequest) -> Result<String, CoreError> {
        // The SDK exposes no sampling or length controls; both hints are dropped.
        debug!(
            temperature = request.temperature,
            max_tokens = ?request.max_tokens,
            "querying claude"
        );
        let options = self.options(request.format);
        let messages = claude_agent_sdk_rs::query(&request.prompt, Some(options))
            .await
            .map_err(|e| {
                error!(error = %e, "claude query failed");
                CoreError::Generation(format!(
                    "{} query failed: {e}. Check your network connection and API credentials.",
                    request.stage
                ))
            })?;
        collect_response(&request.stage, &messages)
    }
}

/// Join the assistant text blocks of a finished query, surfacing an error
/// result as `CoreError::Generation`.
fn collect_response(stage: &str, messages: &[Message]) -> Result<String, CoreError> {
    let mut text = String::new();
    for msg in messages {
        match msg {
            Message::Assistant(assistant) => {
                for block in &assistant.message.content {
                    if let ContentBlock::Text(text_block) = block {
                        text.push_str(&text_block.text);
                        text.push('\n');
                    }
                }
            }
            Message::Result(result) if result.is_error => {
                return Err(CoreError::Generation(format!(
                    "{stage} failed: {}",
                    result.result.as_deref().unwrap_or("unknown error")
                )));
            }
            _ => {}
        }
    }
    if text.trim().is_empty() {
        return Err(CoreError::Generation(format!("{stage} returned no text")));
    }
    Ok(text)
}
