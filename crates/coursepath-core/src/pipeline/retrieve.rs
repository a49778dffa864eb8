//! Goal rephrasing and candidate retrieval.

use std::collections::HashSet;

use serde_json::json;
use tracing::{debug, info, instrument};

use super::PipelineContext;
use crate::catalog::{Collection, into_courses};
use crate::course::Course;
use crate::error::CoreError;
use crate::session::{SessionPatch, SessionState};

/// Expand the goal into a richer retrieval query.
///
/// # Errors
///
/// Returns prompt and generation errors.
#[instrument(skip_all)]
pub(crate) async fn rephrase(
    ctx: &PipelineContext,
    state: &SessionState,
) -> Result<SessionPatch, CoreError> {
    let context = json!({
        "query": state.goal,
        "college": state.college,
        "department": state.department,
    });
    let rephrased = ctx.agent.text("rephrase", &context, 0.7).await?;
    debug!(len = rephrased.len(), "goal rephrased");
    Ok(SessionPatch {
        rephrased_query: Some(rephrased),
        ..Default::default()
    })
}

/// Pull candidate electives from the catalog.
///
/// Runs three lookups (rephrased goal and raw goal against the regular
/// collection, rephrased goal against special topics), skips malformed
/// records, core courses and zero-credit courses, and de-duplicates by course
/// number. Candidates not yet in the final course list are returned in the
/// patch for appending.
#[instrument(skip_all)]
pub(crate) fn retrieve_candidates(
    ctx: &PipelineContext,
    state: &SessionState,
) -> (Vec<Course>, SessionPatch) {
    let rephrased = if state.rephrased_query.trim().is_empty() {
        state.goal.as_str()
    } else {
        state.rephrased_query.trim()
    };
    let raw_query = format!("{} {} {}.", state.goal, state.college, state.department);

    let records = [
        ctx.catalog
            .nearest(rephrased, ctx.retrieval.regular_top_k, Collection::Regular),
        ctx.catalog
            .nearest(&raw_query, ctx.retrieval.regular_top_k, Collection::Regular),
        ctx.catalog.nearest(
            rephrased,
            ctx.retrieval.special_top_k,
            Collection::SpecialTopics,
        ),
    ]
    .concat();

    let mut seen = HashSet::new();
    let candidates: Vec<Course> = into_courses(records)
        .into_iter()
        .filter(|c| c.credits() > 0 && !state.is_core(&c.course_number))
        .filter(|c| seen.insert(c.course_number.clone()))
        .collect();

    let appended: Vec<Course> = candidates
        .iter()
        .filter(|c| {
            !state
                .final_course_list
                .iter()
                .any(|known| known.course_number == c.course_number)
        })
        .cloned()
        .collect();

    info!(
        candidates = candidates.len(),
        new = appended.len(),
        "retrieved candidates"
    );
    (
        candidates,
        SessionPatch {
            appended_courses: appended,
            ..Default::default()
        },
    )
}
