//! Credit reconciliation.
//!
//! Each elective plan is nudged toward the elective budget `R`: the generator
//! is asked to add or remove roughly the right number of courses, the answer
//! is validated against the final course list, and the adjusted plan is kept
//! only if core plus electives reaches `max_credits`. Otherwise the original
//! plan is kept unchanged.

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use super::{CourseRef, PipelineContext, courses_json};
use crate::course::Course;
use crate::error::CoreError;
use crate::plan::ElectivePlan;
use crate::session::{SessionPatch, SessionState};

/// Direction of a credit adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Add,
    Remove,
}

impl Action {
    fn as_str(self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Remove => "REMOVE",
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReconcileReply {
    #[serde(default)]
    final_plan: Vec<CourseRef>,
    #[serde(default)]
    reasoning: String,
}

/// Reconcile every plan in the plan set.
///
/// # Errors
///
/// Returns `CoreError::MalformedResponse` for bad generator output, plus
/// prompt and generation errors.
#[instrument(skip_all, fields(plans = state.plans.len()))]
pub(crate) async fn reconcile_plans(
    ctx: &PipelineContext,
    state: &SessionState,
) -> Result<SessionPatch, CoreError> {
    let mut reconciled = Vec::with_capacity(state.plans.len());
    for plan in &state.plans {
        reconciled.push(reconcile_plan(ctx, state, plan).await?);
    }
    Ok(SessionPatch {
        plans: Some(reconciled),
        ..Default::default()
    })
}

async fn reconcile_plan(
    ctx: &PipelineContext,
    state: &SessionState,
    plan: &ElectivePlan,
) -> Result<ElectivePlan, CoreError> {
    let budget = i64::from(state.remaining_credits());
    let current = i64::from(plan.credits());
    let diff = budget - current;
    if diff == 0 {
        debug!("plan already on budget");
        return Ok(plan.clone());
    }

    let action = if diff > 0 { Action::Add } else { Action::Remove };
    let average = plan.average_credit().max(1);
    let count = (diff.unsigned_abs() / u64::from(average)).max(1);

    let available: Vec<&Course> = state
        .final_course_list
        .iter()
        .filter(|c| !plan.contains(&c.course_number) && !state.is_core(&c.course_number))
        .collect();
    if action == Action::Add && available.is_empty() {
        warn!("no courses available to add, keeping plan");
        return Ok(plan.clone());
    }

    let context = json!({
        "query": state.goal,
        "department": state.department,
        "college": state.college,
        "action": action.as_str(),
        "abs_credit_diff": diff.unsigned_abs(),
        "average_credit": average,
        "course_count": count,
        "current_plan_json": courses_json(&plan.courses),
        "available_courses_json": courses_json(&available),
        "max_credits": state.max_credits,
    });
    let reply: ReconcileReply = ctx.agent.json("reconcile", &context, 0.3).await?;

    let adjusted = ElectivePlan::new(reply.final_plan.iter().filter_map(|r| {
        let number = r.normalized();
        let found = plan
            .courses
            .iter()
            .chain(available.iter().copied())
            .find(|c| c.course_number == number);
        if found.is_none() {
            warn!(course = %number, "dropping unknown course from adjusted plan");
        }
        found.cloned()
    }));

    if adjusted.credits() + state.core_credits() >= state.max_credits {
        info!(
            action = action.as_str(),
            before = plan.credits(),
            after = adjusted.credits(),
            reasoning = %reply.reasoning,
            "plan adjusted"
        );
        Ok(adjusted)
    } else {
        warn!(
            action = action.as_str(),
            before = plan.credits(),
            after = adjusted.credits(),
            "adjustment misses the credit target, keeping original plan"
        );
        Ok(plan.clone())
    }
}
