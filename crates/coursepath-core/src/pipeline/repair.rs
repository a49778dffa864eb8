//! Cross-plan repair: duplicate resolution and credit top-up.
//!
//! Both passes work on the scheduled plans without consulting the generator.
//! Candidates always come from the session's final course list minus the
//! plan's own courses and the core courses.

use std::collections::HashSet;

use tracing::{debug, info, instrument, warn};

use crate::course::{Course, CourseRole, ScheduledCourse};
use crate::embed::{Embedder, most_similar};
use crate::plan::{ElectivePlan, SemesterPlan};
use crate::session::{SessionPatch, SessionState};

/// Courses from the final course list usable as additions to `plan`.
fn unused_courses<'a>(state: &'a SessionState, plan: &SemesterPlan) -> Vec<&'a Course> {
    state
        .final_course_list
        .iter()
        .filter(|c| c.credits() > 0)
        .filter(|c| !state.is_core(&c.course_number) && !plan.contains(&c.course_number))
        .collect()
}

/// Replace repeated courses within each plan with the most similar unused
/// course.
///
/// Walking semesters in order, the second and later occurrences of a course
/// number are swapped for the unused course whose text is closest to the
/// repeated course; semester and plan totals move by the credit delta. With
/// no unused course left the repeat is removed instead.
#[instrument(skip_all, fields(plans = state.semester_plans.len()))]
pub(crate) fn resolve_duplicates(state: &SessionState, embedder: &dyn Embedder) -> SessionPatch {
    let mut plans = state.semester_plans.clone();
    for plan in &mut plans {
        resolve_plan_duplicates(state, embedder, plan);
    }
    finish(state, plans)
}

fn resolve_plan_duplicates(state: &SessionState, embedder: &dyn Embedder, plan: &mut SemesterPlan) {
    let mut pool = unused_courses(state, plan);
    let mut seen: HashSet<String> = HashSet::new();

    for s in 0..plan.semesters.len() {
        let mut c = 0;
        while c < plan.semesters[s].courses.len() {
            let number = plan.semesters[s].courses[c].course_number().to_owned();
            if seen.insert(number.clone()) {
                c += 1;
                continue;
            }

            let duplicate_credits = plan.semesters[s].courses[c].credits();
            let target = plan.semesters[s].courses[c].course.similarity_text();
            let texts: Vec<String> = pool.iter().map(|course| course.similarity_text()).collect();

            match most_similar(embedder, &target, &texts) {
                Some(idx) => {
                    let replacement = pool.remove(idx).clone();
                    info!(
                        plan = plan.plan_number,
                        duplicate = %number,
                        replacement = %replacement.course_number,
                        "replacing duplicate course"
                    );
                    let new_credits = replacement.credits();
                    seen.insert(replacement.course_number.clone());
                    plan.semesters[s].courses[c] = ScheduledCourse::new(
                        replacement,
                        CourseRole::Elective,
                        format!("Replaces a repeated {number}."),
                    );
                    adjust(plan, s, duplicate_credits, new_credits);
                    c += 1;
                }
                None => {
                    warn!(plan = plan.plan_number, duplicate = %number, "no replacement available, removing duplicate");
                    plan.semesters[s].courses.remove(c);
                    adjust(plan, s, duplicate_credits, 0);
                }
            }
        }
    }
}

/// Move semester `s` and plan totals from `old` to `new` credits.
fn adjust(plan: &mut SemesterPlan, s: usize, old: u32, new: u32) {
    let semester = &mut plan.semesters[s];
    semester.total_credits = (semester.total_credits + new).saturating_sub(old);
    plan.total_credits = (plan.total_credits + new).saturating_sub(old);
}

/// Add unused courses to plans short of `max_credits`.
///
/// For each semester below the per-semester limit, the course added is one
/// whose credits equal the available headroom (or the largest smaller value
/// that has a match), preferring the course closest to the student's goal.
/// Headroom is also capped so the plan stays within `max_credits +
/// tolerance`. Stops per plan once the target is reached or nothing fits.
#[instrument(skip_all, fields(plans = state.semester_plans.len()))]
pub(crate) fn top_up_credits(
    state: &SessionState,
    embedder: &dyn Embedder,
    tolerance: u32,
) -> SessionPatch {
    let goal = format!("{} {}", state.goal, state.rephrased_query);
    let ceiling = state.max_credits + tolerance;
    let mut plans = state.semester_plans.clone();

    for plan in &mut plans {
        if plan.total_credits >= state.max_credits {
            continue;
        }
        let mut pool = unused_courses(state, plan);
        for s in 0..plan.semesters.len() {
            while plan.total_credits < state.max_credits {
                let headroom = state
                    .max_creds_per_sem
                    .saturating_sub(plan.semesters[s].total_credits)
                    .min(ceiling.saturating_sub(plan.total_credits));
                let Some(idx) = pick_by_credits(embedder, &goal, &pool, headroom) else {
                    break;
                };
                let course = pool.remove(idx).clone();
                debug!(
                    plan = plan.plan_number,
                    semester = plan.semesters[s].number,
                    course = %course.course_number,
                    "adding course to reach credit target"
                );
                let credits = course.credits();
                plan.semesters[s].courses.push(ScheduledCourse::new(
                    course,
                    CourseRole::Elective,
                    "Added to reach the credit requirement.",
                ));
                adjust(plan, s, 0, credits);
            }
        }
        if plan.total_credits < state.max_credits {
            warn!(
                plan = plan.plan_number,
                total = plan.total_credits,
                target = state.max_credits,
                "plan remains short of the credit target"
            );
        }
    }
    finish(state, plans)
}

/// Index in `pool` of the best course with exactly `headroom` credits,
/// stepping the credit value down until some course matches.
fn pick_by_credits(
    embedder: &dyn Embedder,
    goal: &str,
    pool: &[&Course],
    headroom: u32,
) -> Option<usize> {
    (1..=headroom).rev().find_map(|credits| {
        let matching: Vec<usize> = pool
            .iter()
            .enumerate()
            .filter(|(_, c)| c.credits() == credits)
            .map(|(i, _)| i)
            .collect();
        let texts: Vec<String> = matching.iter().map(|i| pool[*i].similarity_text()).collect();
        most_similar(embedder, goal, &texts).map(|best| matching[best])
    })
}

/// Mark credit status and refresh the elective plans from the schedules.
fn finish(state: &SessionState, mut plans: Vec<SemesterPlan>) -> SessionPatch {
    for plan in &mut plans {
        plan.mark_credits(state.max_credits);
    }
    let electives = plans
        .iter()
        .map(|p| ElectivePlan::new(p.electives()))
        .collect();
    SessionPatch {
        plans: Some(electives),
        semester_plans: Some(plans),
        ..Default::default()
    }
}
