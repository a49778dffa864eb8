//! Degree plan construction for a conversational course-planning assistant.
//!
//! [`Engine::respond`] classifies a student's message and answers it:
//! greetings, course details, short-term suggestions, multi-semester plans
//! built by the planning pipeline, and edits to a stored plan.

mod agent;
mod assist;
mod catalog;
mod claude;
mod config;
mod course;
mod embed;
mod engine;
mod error;
mod events;
mod generate;
mod intent;
mod pipeline;
mod plan;
mod session;
mod store;
mod workflow;

#[cfg(test)]
mod test_support;

pub use assist::Suggestion;
pub use catalog::{CatalogIndex, CatalogRecord, Collection, InMemoryCatalog};
pub use claude::ClaudeGenerator;
pub use config::{
    AgentProjectConfig, EngineConfig, PlanningConfig, ProjectConfig, PromptsConfig,
    RetrievalConfig, SessionsConfig, load_project_config,
};
pub use course::{Course, CourseRole, CreditHours, ScheduledCourse};
pub use embed::{Embedder, HashingEmbedder, cosine_similarity};
pub use engine::Engine;
pub use error::CoreError;
pub use events::{Response, ResponseEvent, ResponseStream, Stage};
pub use generate::{GenerationRequest, ResponseFormat, TextGenerator};
pub use intent::Intent;
pub use pipeline::AppliedReplacement;
pub use plan::{ElectivePlan, Replacement, Semester, SemesterPlan};
pub use session::{Request, SessionPatch, SessionState};
pub use store::SessionStore;
