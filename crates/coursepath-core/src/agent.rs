//! Agent runner module (internal).
//!
//! Joins the prompt manager and the [`TextGenerator`]: a stage names a
//! template and supplies its context, the runner renders it, calls the
//! generator and, for JSON stages, parses the response. A response that does
//! not parse is a fatal error for that stage.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, error, instrument};

use crate::config::{EngineConfig, ProjectConfig};
use crate::error::CoreError;
use crate::generate::{GenerationRequest, ResponseFormat, TextGenerator, extract_json_object};

/// Renders prompt templates and runs them through the text generator.
#[derive(Debug)]
pub(crate) struct AgentRunner {
    /// Prompt manager for rendering templates.
    prompt_manager: coursepath_pm::PromptManager,
    /// Backend producing the responses.
    generator: Arc<dyn TextGenerator>,
    /// CLI override, else `agent.maxTokens`.
    max_tokens: Option<u32>,
}

impl AgentRunner {
    /// Create a new agent runner.
    ///
    /// Loads the built-in templates, then any directories listed in
    /// `prompts.include` (relative paths resolve against the data directory).
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Prompt` if templates cannot be loaded.
    #[instrument(skip_all)]
    pub(crate) fn new(
        config: &EngineConfig,
        project_config: &ProjectConfig,
        generator: Arc<dyn TextGenerator>,
    ) -> Result<Self, CoreError> {
        let mut pm = coursepath_pm::PromptManager::new()?;

        for dir in &project_config.prompts.include {
            let resolved = if dir.is_absolute() {
                dir.clone()
            } else {
                config.data_dir().join(dir)
            };
            if resolved.is_dir() {
                pm.load_dir(&resolved)?;
                debug!(dir = %resolved.display(), "loaded custom prompt directory");
            }
        }

        Ok(Self {
            prompt_manager: pm,
            generator,
            max_tokens: config.max_tokens().or(project_config.agent.max_tokens),
        })
    }

    /// Render `template` and return the generator's text response.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Prompt` if rendering fails and
    /// `CoreError::Generation` if the generator fails.
    #[instrument(skip(self, context))]
    pub(crate) async fn text(
        &self,
        template: &str,
        context: &serde_json::Value,
        temperature: f32,
    ) -> Result<String, CoreError> {
        let response = self
            .generate(template, context, ResponseFormat::Text, temperature)
            .await?;
        Ok(response.trim().to_owned())
    }

    /// Render `template` and parse the generator's response as `T`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::MalformedResponse` if the response is not a JSON
    /// object matching `T`, plus the errors of [`text`](Self::text).
    #[instrument(skip(self, context))]
    pub(crate) async fn json<T: DeserializeOwned>(
        &self,
        template: &str,
        context: &serde_json::Value,
        temperature: f32,
    ) -> Result<T, CoreError> {
        let response = self
            .generate(template, context, ResponseFormat::Json, temperature)
            .await?;
        parse_json_response(template, &response)
    }

    async fn generate(
        &self,
        template: &str,
        context: &serde_json::Value,
        format: ResponseFormat,
        temperature: f32,
    ) -> Result<String, CoreError> {
        let prompt = self.prompt_manager.render(template, context)?;
        debug!(stage = template, prompt_len = prompt.len(), "generating");
        self.generator
            .generate(GenerationRequest {
                stage: template.to_owned(),
                prompt,
                format,
                temperature,
                max_tokens: self.max_tokens,
            })
            .await
            .inspect_err(|e| error!(stage = template, error = %e, "generation failed"))
    }

    /// Returns a reference to the internal prompt manager.
    #[cfg(test)]
    pub(crate) fn prompt_manager(&self) -> &coursepath_pm::PromptManager {
        &self.prompt_manager
    }
}

/// Parse a JSON-stage response.
fn parse_json_response<T: DeserializeOwned>(stage: &str, response: &str) -> Result<T, CoreError> {
    let malformed = |reason: String| CoreError::MalformedResponse {
        stage: stage.to_owned(),
        reason,
    };
    let object = extract_json_object(response)
        .ok_or_else(|| malformed("response contains no JSON object".to_owned()))?;
    serde_json::from_str(object).map_err(|e| malformed(e.to_string()))
}
