//! Configuration types for coursepath-core.
//!
//! This module defines [`EngineConfig`] (CLI-level overrides), [`ProjectConfig`]
//! (from `<data_dir>/config.yaml`), and all sub-configuration types. During
//! engine initialization, CLI flags in `EngineConfig` take precedence over
//! values read from `ProjectConfig`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

// ── Engine Configuration (CLI-level) ─────────────────────────

/// Engine configuration provided by the CLI layer.
///
/// Contains the data directory (config, logs, stored sessions) and optional
/// overrides for the generation model.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use coursepath_core::EngineConfig;
///
/// let config = EngineConfig::builder()
///     .data_dir(PathBuf::from("/tmp/coursepath"))
///     .model("claude-sonnet-4-20250514")
///     .build();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct EngineConfig {
    /// Directory holding `config.yaml`, `sessions/` and `logs/`.
    data_dir: PathBuf,

    /// Override generation model (takes precedence over config.yaml).
    #[builder(default, setter(strip_option, into))]
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,

    /// Override max tokens per generation (takes precedence over config.yaml).
    #[builder(default, setter(strip_option))]
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

impl EngineConfig {
    /// Returns the data directory.
    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    /// Returns the model override, if set.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Returns the max tokens override, if set.
    pub fn max_tokens(&self) -> Option<u32> {
        self.max_tokens
    }

    /// Returns the path to `config.yaml`.
    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.yaml")
    }

    /// Returns the directory where session snapshots are stored.
    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.join("sessions")
    }

    /// Returns the directory where log files are written.
    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

// ── Project Configuration (config.yaml) ─────────────────────

/// Project-level configuration, deserialized from `config.yaml`.
///
/// All fields have serde defaults so that missing keys produce valid
/// configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    /// Generation model settings.
    #[serde(default)]
    pub agent: AgentProjectConfig,

    /// Prompt template search paths.
    #[serde(default)]
    pub prompts: PromptsConfig,

    /// Catalog lookup sizes.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Plan construction knobs.
    #[serde(default)]
    pub planning: PlanningConfig,

    /// Session persistence.
    #[serde(default)]
    pub sessions: SessionsConfig,
}

// ── Sub-configuration types ──────────────────────────────────

/// Generation model settings. CLI overrides in [`EngineConfig`] take precedence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProjectConfig {
    /// Model to use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Max tokens per generation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Additional directories searched for prompt template overrides, in order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptsConfig {
    #[serde(default)]
    pub include: Vec<PathBuf>,
}

/// Top-K sizes for each catalog lookup site.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalConfig {
    /// Results per query against the regular course collection.
    #[serde(default = "default_regular_top_k")]
    pub regular_top_k: usize,

    /// Results per query against the special topics collection.
    #[serde(default = "default_special_top_k")]
    pub special_top_k: usize,

    /// Results per title lookup (course details, short-term planning).
    #[serde(default = "default_title_top_k")]
    pub title_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            regular_top_k: default_regular_top_k(),
            special_top_k: default_special_top_k(),
            title_top_k: default_title_top_k(),
        }
    }
}

/// Plan construction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanningConfig {
    /// Selection attempts allowed per requested plan. The selection loop
    /// stops after `max_number_of_plans * max_attempts_per_plan` attempts
    /// even if duplicates kept it short of the requested plan count.
    #[serde(default = "default_max_attempts_per_plan")]
    pub max_attempts_per_plan: u32,

    /// Credits a plan may exceed `max_credits` by.
    #[serde(default = "default_credit_tolerance")]
    pub credit_tolerance: u32,

    /// Title similarity at or above which two courses count as the same
    /// topic. `None` disables the check.
    #[serde(default = "default_topic_similarity_threshold")]
    pub topic_similarity_threshold: Option<f32>,

    /// Maximum number of short-term suggestions returned.
    #[serde(default = "default_max_short_term_suggestions")]
    pub max_short_term_suggestions: usize,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            max_attempts_per_plan: default_max_attempts_per_plan(),
            credit_tolerance: default_credit_tolerance(),
            topic_similarity_threshold: default_topic_similarity_threshold(),
            max_short_term_suggestions: default_max_short_term_suggestions(),
        }
    }
}

/// Session persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionsConfig {
    /// Store completed sessions so later reschedule requests can find them.
    #[serde(default = "default_true")]
    pub persist: bool,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            persist: default_true(),
        }
    }
}

// ── Default value functions for serde ────────────────────────

fn default_true() -> bool {
    true
}

fn default_regular_top_k() -> usize {
    15
}

fn default_special_top_k() -> usize {
    1
}

fn default_title_top_k() -> usize {
    3
}

fn default_max_attempts_per_plan() -> u32 {
    2
}

fn default_credit_tolerance() -> u32 {
    1
}

fn default_topic_similarity_threshold() -> Option<f32> {
    Some(0.9)
}

fn default_max_short_term_suggestions() -> usize {
    6
}

// ── Config loading ───────────────────────────────────────────

/// Load [`ProjectConfig`] from `config.yaml`.
///
/// If the file does not exist, returns the default configuration.
///
/// # Errors
///
/// Returns `CoreError::Io` if the file exists but cannot be read.
/// Returns `CoreError::Yaml` if the file contains invalid YAML.
pub fn load_project_config(config_path: &Path) -> Result<ProjectConfig, crate::CoreError> {
    if !config_path.exists() {
        return Ok(ProjectConfig::default());
    }
    let content = std::fs::read_to_string(config_path)?;
    if content.trim().is_empty() {
        return Ok(ProjectConfig::default());
    }
    let config: ProjectConfig = serde_yaml::from_str(&content)?;
    Ok(config)
}
