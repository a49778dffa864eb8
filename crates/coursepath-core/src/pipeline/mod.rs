//! The plan-construction pipeline.
//!
//! Stages run strictly in order: rephrase and retrieve, select electives
//! (looped until enough distinct plans exist), deduplicate, reconcile
//! credits, schedule semesters, then repair duplicates and top up credits.
//! Rescheduling works later on a stored session.
//!
//! Each stage reads a [`SessionState`](crate::SessionState) and returns a
//! [`SessionPatch`](crate::SessionPatch); the workflow applies the patches.

mod dedup;
mod reconcile;
mod repair;
mod reschedule;
mod retrieve;
mod schedule;
mod select;

use std::sync::Arc;

use crate::agent::AgentRunner;
use crate::catalog::CatalogIndex;
use crate::config::{PlanningConfig, RetrievalConfig};
use crate::embed::Embedder;

pub(crate) use dedup::{dedup_plans, distinct_count};
pub(crate) use reconcile::reconcile_plans;
pub(crate) use repair::{resolve_duplicates, top_up_credits};
pub use reschedule::AppliedReplacement;
pub(crate) use reschedule::{apply_replacements, extract_replacements, select_plan, summarize};
pub(crate) use retrieve::{rephrase, retrieve_candidates};
pub(crate) use schedule::schedule_plans;
pub(crate) use select::select_electives;

/// Collaborators and settings shared by every stage.
///
/// Cheap to clone so it can move into the spawned request task.
#[derive(Debug, Clone)]
pub(crate) struct PipelineContext {
    pub(crate) agent: Arc<AgentRunner>,
    pub(crate) catalog: Arc<dyn CatalogIndex>,
    pub(crate) embedder: Arc<dyn Embedder>,
    pub(crate) retrieval: RetrievalConfig,
    pub(crate) planning: PlanningConfig,
}

/// Serialize courses for a prompt.
pub(crate) fn courses_json<T: serde::Serialize>(courses: &T) -> String {
    serde_json::to_string_pretty(courses).unwrap_or_else(|_| "[]".to_owned())
}

/// A course number reference in generator output.
#[derive(Debug, serde::Deserialize)]
struct CourseRef {
    course_number: String,
}

impl CourseRef {
    fn normalized(&self) -> String {
        self.course_number.trim().to_ascii_uppercase()
    }
}
