//! Elective selection.
//!
//! The generator proposes an elective subset for one plan slot; the proposal
//! is then checked deterministically against the candidate pool: unknown
//! numbers, core courses, repeats and topic collisions are dropped, and the
//! subset is topped up from the pool until it covers the elective budget.

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use super::{CourseRef, PipelineContext, courses_json};
use crate::course::Course;
use crate::embed::{Embedder, most_similar, text_similarity};
use crate::error::CoreError;
use crate::plan::{ElectivePlan, average_credit};
use crate::session::{SessionPatch, SessionState};

/// Strategies rotated across plan slots so alternatives differ.
const VARIETY_DIRECTIVES: &[&str] = &[
    "Maximize specialization: select courses that dive deep into one area to build expert-level mastery.",
    "Optimize versatility: choose a wide range of topics across subfields to prepare for multiple career paths or interests.",
    "Target outcomes: pick courses based on concrete goals like job readiness, portfolio building, or research publication.",
    "Follow curiosity: let personal interest or passion drive the selection, even if it doesn't align directly with formal goals.",
];

const FALLBACK_DIRECTIVE: &str = "Create a unique combination different from typical recommendations.";

/// Directive for a 1-based plan number.
pub(crate) fn variety_directive(plan_number: usize) -> &'static str {
    plan_number
        .checked_sub(1)
        .and_then(|i| VARIETY_DIRECTIVES.get(i))
        .copied()
        .unwrap_or(FALLBACK_DIRECTIVE)
}

#[derive(Debug, Deserialize)]
struct SelectionReply {
    #[serde(default)]
    courses: Vec<CourseRef>,
}

/// Select one elective plan from `candidates` and append it to the plan set.
///
/// The returned patch carries the grown plan list and the incremented plan
/// counter.
///
/// # Errors
///
/// Returns `CoreError::EmptyCandidatePool` when no usable candidate remains
/// after excluding core courses, `CoreError::MalformedResponse` for bad
/// generator output, plus prompt and generation errors.
#[instrument(skip_all, fields(plan_number = state.plan_counter + 1))]
pub(crate) async fn select_electives(
    ctx: &PipelineContext,
    state: &SessionState,
    candidates: &[Course],
) -> Result<SessionPatch, CoreError> {
    let threshold = ctx.planning.topic_similarity_threshold;
    let embedder = ctx.embedder.as_ref();

    let pool: Vec<&Course> = candidates
        .iter()
        .filter(|c| !state.is_core(&c.course_number))
        .filter(|c| !duplicates_core_title(embedder, state, c, threshold))
        .collect();
    let avg = average_credit(pool.iter().copied())
        .filter(|avg| *avg > 0)
        .ok_or(CoreError::EmptyCandidatePool)?;

    let remaining = state.remaining_credits();
    let num_subjects = (remaining / avg).max(1);
    let plan_number = state.plan_counter + 1;

    let context = json!({
        "plan_number": plan_number,
        "variety_instruction": variety_directive(plan_number),
        "query": state.goal,
        "rephrased_query": state.rephrased_query,
        "remaining_credits": remaining,
        "num_subjects_to_add": num_subjects,
        "department": state.department,
        "college": state.college,
        "core_course_numbers": state.core_course_numbers().join(", "),
        "max_credits": state.max_credits,
        "core_credits": state.core_credits(),
        "core_courses_json": courses_json(&state.core_courses),
        "candidates_json": courses_json(&pool),
    });
    let reply: SelectionReply = ctx.agent.json("select", &context, 0.9).await?;

    let mut chosen: Vec<Course> = Vec::new();
    for course_ref in &reply.courses {
        let number = course_ref.normalized();
        let Some(course) = pool.iter().find(|c| c.course_number == number) else {
            warn!(course = %number, "dropping course not in candidate pool");
            continue;
        };
        if chosen.iter().any(|c| c.course_number == number) {
            continue;
        }
        if collides(embedder, &chosen, course, threshold) {
            debug!(course = %number, "dropping topic duplicate");
            continue;
        }
        chosen.push((*course).clone());
    }

    top_up_from_pool(embedder, state, &pool, &mut chosen, remaining, threshold);

    let plan = ElectivePlan::new(chosen);
    info!(
        courses = plan.len(),
        credits = plan.credits(),
        budget = remaining,
        "electives selected"
    );
    if plan.credits() < remaining {
        warn!(
            credits = plan.credits(),
            budget = remaining,
            "candidate pool cannot cover the elective budget"
        );
    }

    let mut plans = state.plans.clone();
    plans.push(plan);
    Ok(SessionPatch {
        plans: Some(plans),
        plan_counter: Some(plan_number),
        ..Default::default()
    })
}

/// Add pool courses most similar to the goal until `budget` is covered.
fn top_up_from_pool(
    embedder: &dyn Embedder,
    state: &SessionState,
    pool: &[&Course],
    chosen: &mut Vec<Course>,
    budget: u32,
    threshold: Option<f32>,
) {
    let goal = format!("{} {}", state.goal, state.rephrased_query);
    loop {
        let credits: u32 = chosen.iter().map(Course::credits).sum();
        if credits >= budget {
            return;
        }
        let remaining: Vec<&Course> = pool
            .iter()
            .copied()
            .filter(|c| !chosen.iter().any(|k| k.course_number == c.course_number))
            .filter(|c| !collides(embedder, chosen, c, threshold))
            .collect();
        let texts: Vec<String> = remaining.iter().map(|c| c.similarity_text()).collect();
        let Some(idx) = most_similar(embedder, &goal, &texts) else {
            return;
        };
        debug!(course = %remaining[idx].course_number, "topping up selection");
        chosen.push(remaining[idx].clone());
    }
}

/// Whether `course` covers the same topic as an already chosen course.
fn collides(
    embedder: &dyn Embedder,
    chosen: &[Course],
    course: &Course,
    threshold: Option<f32>,
) -> bool {
    let Some(threshold) = threshold else {
        return false;
    };
    chosen
        .iter()
        .any(|c| text_similarity(embedder, &c.title, &course.title) >= threshold)
}

/// Whether `course` repeats a core course under another number.
fn duplicates_core_title(
    embedder: &dyn Embedder,
    state: &SessionState,
    course: &Course,
    threshold: Option<f32>,
) -> bool {
    state.core_courses.iter().any(|core| {
        core.title.eq_ignore_ascii_case(&course.title)
            || threshold
                .is_some_and(|t| text_similarity(embedder, &core.title, &course.title) >= t)
    })
}
