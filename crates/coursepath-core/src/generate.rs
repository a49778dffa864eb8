//! Text generation collaborator.
//!
//! Every step that needs natural-language work (intent classification,
//! rephrasing, elective selection, reconciliation, scheduling, summaries)
//! renders a prompt template and hands it to a [`TextGenerator`]. The core
//! treats the generator as a pure `prompt -> text` function and validates
//! whatever comes back.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Shape of the response a stage expects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResponseFormat {
    #[default]
    Text,
    /// A single JSON object, no surrounding prose.
    Json,
}

/// One call to the generation collaborator.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Template name the prompt was rendered from (`select`, `schedule`, ...).
    pub stage: String,
    /// Fully rendered prompt.
    pub prompt: String,
    pub format: ResponseFormat,
    /// Sampling temperature hint. Implementations may ignore it.
    pub temperature: f32,
    /// Output length cap, if configured.
    pub max_tokens: Option<u32>,
}

/// Produces text for a rendered prompt.
#[async_trait]
pub trait TextGenerator: Send + Sync + fmt::Debug {
    /// Generate a response.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Generation` if the backend cannot produce a
    /// response.
    async fn generate(&self, request: GenerationRequest) -> Result<String, CoreError>;
}

/// Extract the JSON object from a response that may be wrapped in a
/// markdown code fence or surrounded by prose.
pub(crate) fn extract_json_object(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (start < end).then(|| &response[start..=end])
}
