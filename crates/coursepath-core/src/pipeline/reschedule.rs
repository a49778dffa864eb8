//! Reschedule engine.
//!
//! Works on a stored session in one pass: pick the target plan, extract an
//! `old -> new` mapping from the student's request, apply it, then summarize.
//! A replacement that matches nothing leaves the original course in place.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use super::{PipelineContext, courses_json};
use crate::catalog::{Collection, into_courses};
use crate::course::{Course, CourseRole, ScheduledCourse};
use crate::error::CoreError;
use crate::plan::{ElectivePlan, Replacement, SemesterPlan};
use crate::session::{SessionPatch, SessionState};

/// A replacement value naming a course directly.
static COURSE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]+\d{4}$").expect("valid regex"));

/// A swap that was carried out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedReplacement {
    pub old: Course,
    pub new: Course,
}

#[derive(Debug, Deserialize)]
struct ExtractReply {
    #[serde(default)]
    replacements: Vec<ReplacementEntry>,
}

#[derive(Debug, Deserialize)]
struct ReplacementEntry {
    old: String,
    #[serde(default)]
    new: Option<String>,
}

/// Point the session at plan `plan_number` (1-based).
///
/// # Errors
///
/// Returns `CoreError::PlanNotFound` when the session has no such plan.
pub(crate) fn select_plan(state: &SessionState, plan_number: usize) -> Result<SessionPatch, CoreError> {
    let available = state.semester_plans.len();
    if plan_number == 0 || plan_number > available {
        return Err(CoreError::PlanNotFound {
            requested: plan_number,
            available,
        });
    }
    Ok(SessionPatch {
        reschedule_plan_index: Some(plan_number - 1),
        ..Default::default()
    })
}

fn target_plan(state: &SessionState) -> Result<(usize, &SemesterPlan), CoreError> {
    let not_found = |requested| CoreError::PlanNotFound {
        requested,
        available: state.semester_plans.len(),
    };
    let index = state.reschedule_plan_index.ok_or_else(|| not_found(0))?;
    let plan = state
        .semester_plans
        .get(index)
        .ok_or_else(|| not_found(index + 1))?;
    Ok((index, plan))
}

/// Ask the generator which courses of the target plan to replace.
///
/// Entries whose old course is not in the plan, or whose replacement is
/// empty, are discarded; the first entry per old course wins.
///
/// # Errors
///
/// Returns `CoreError::PlanNotFound` without a selected plan and
/// `CoreError::MalformedResponse` for bad generator output.
#[instrument(skip_all)]
pub(crate) async fn extract_replacements(
    ctx: &PipelineContext,
    state: &SessionState,
    request: &str,
) -> Result<SessionPatch, CoreError> {
    let (_, plan) = target_plan(state)?;
    let numbers = plan.course_numbers();
    let context = json!({
        "plan_course_numbers": numbers.join(", "),
        "request": request,
        "goal": state.goal,
        "college": state.college,
        "department": state.department,
    });
    let reply: ExtractReply = ctx.agent.json("reschedule/extract", &context, 0.0).await?;

    let mut replacements: Vec<Replacement> = Vec::new();
    for entry in reply.replacements {
        let old = entry.old.trim().to_ascii_uppercase();
        let new = entry.new.map(|n| n.trim().to_owned()).unwrap_or_default();
        if new.is_empty() || new.eq_ignore_ascii_case("null") {
            debug!(old = %old, "skipping entry without replacement");
            continue;
        }
        if !numbers.contains(&old.as_str()) {
            warn!(old = %old, "skipping replacement for course outside the plan");
            continue;
        }
        if replacements.iter().any(|r| r.old == old) {
            continue;
        }
        replacements.push(Replacement { old, new });
    }
    info!(count = replacements.len(), "replacements extracted");

    Ok(SessionPatch {
        pending_replacements: Some(replacements),
        ..Default::default()
    })
}

/// Resolve a replacement value to a catalog course.
fn resolve(ctx: &PipelineContext, value: &str) -> Option<Course> {
    let upper = value.to_ascii_uppercase();
    let records = if COURSE_NUMBER.is_match(&upper) {
        ctx.catalog.by_numbers(&[upper])
    } else {
        ctx.catalog.nearest(value, 1, Collection::for_title(value))
    };
    into_courses(records).into_iter().next()
}

/// Apply the pending replacements to the target plan.
///
/// Each swap keeps the slot of the replaced course. The new course is core
/// only if it is one of the session's core courses, otherwise an elective.
/// Totals are recomputed from scratch afterwards.
///
/// # Errors
///
/// Returns `CoreError::PlanNotFound` without a selected plan.
#[instrument(skip_all, fields(pending = state.pending_replacements.len()))]
pub(crate) fn apply_replacements(
    ctx: &PipelineContext,
    state: &SessionState,
) -> Result<(SessionPatch, Vec<AppliedReplacement>), CoreError> {
    let (index, plan) = target_plan(state)?;
    let mut plan = plan.clone();
    let mut applied = Vec::new();

    for replacement in &state.pending_replacements {
        let Some(slot) = plan.semesters.iter().enumerate().find_map(|(s, semester)| {
            semester
                .courses
                .iter()
                .position(|c| c.course_number() == replacement.old)
                .map(|c| (s, c))
        }) else {
            continue;
        };

        let Some(course) = resolve(ctx, &replacement.new) else {
            warn!(old = %replacement.old, new = %replacement.new, "replacement matches no course, keeping original");
            continue;
        };
        if plan.contains(&course.course_number) {
            warn!(old = %replacement.old, new = %course.course_number, "replacement already in plan, keeping original");
            continue;
        }

        let (s, c) = slot;
        let previous = plan.semesters[s].courses[c].clone();
        info!(old = %replacement.old, new = %course.course_number, "replacing course");
        applied.push(AppliedReplacement {
            old: previous.course,
            new: course.clone(),
        });
        let role = if state.is_core(&course.course_number) {
            CourseRole::Core
        } else {
            CourseRole::Elective
        };
        plan.semesters[s].courses[c] = ScheduledCourse::new(
            course,
            role,
            format!("Replaces {} at the student's request.", replacement.old),
        );
    }

    plan.recompute_totals();
    plan.mark_credits(state.max_credits);

    let mut plans = state.plans.clone();
    if let Some(electives) = plans.get_mut(index) {
        *electives = ElectivePlan::new(plan.electives());
    }
    let mut semester_plans = state.semester_plans.clone();
    semester_plans[index] = plan;

    Ok((
        SessionPatch {
            plans: Some(plans),
            semester_plans: Some(semester_plans),
            pending_replacements: Some(Vec::new()),
            ..Default::default()
        },
        applied,
    ))
}

/// The change list heading a rescheduled plan.
fn change_list(plan_number: usize, applied: &[AppliedReplacement]) -> String {
    let mut text = format!("Here's your updated Plan {plan_number}:\n");
    if applied.is_empty() {
        text.push_str("No courses were replaced.");
    } else {
        text.push_str("Successfully Replaced:");
        for (i, r) in applied.iter().enumerate() {
            text.push_str(&format!(
                "\n{}. {} - {} ---> {} - {}",
                i + 1,
                r.old.course_number,
                r.old.title,
                r.new.course_number,
                r.new.title
            ));
        }
    }
    text
}

/// Build the summary for the rescheduled plan and store it as its rationale.
///
/// # Errors
///
/// Returns `CoreError::PlanNotFound` without a selected plan, plus prompt and
/// generation errors.
#[instrument(skip_all, fields(applied = applied.len()))]
pub(crate) async fn summarize(
    ctx: &PipelineContext,
    state: &SessionState,
    applied: &[AppliedReplacement],
) -> Result<(SessionPatch, String), CoreError> {
    let (index, plan) = target_plan(state)?;
    let context = json!({
        "goal": state.goal,
        "plan_json": courses_json(plan),
    });
    let rationale = ctx.agent.text("reschedule/summary", &context, 0.5).await?;
    let summary = format!("{}\n{}", change_list(plan.plan_number, applied), rationale);

    let mut semester_plans = state.semester_plans.clone();
    semester_plans[index].rationale = summary.clone();
    Ok((
        SessionPatch {
            semester_plans: Some(semester_plans),
            ..Default::default()
        },
        summary,
    ))
}
