//! Semester scheduling.
//!
//! The generator drafts a semester-by-semester arrangement; the draft is then
//! normalized deterministically so that every core course appears exactly
//! once, capstones come last, prerequisites precede their dependents and the
//! term count and per-semester loads stay inside the requested bounds.
//! Credit totals are always recomputed from the placed courses. Duplicates
//! the draft may contain are left for the repair stage.

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use super::{PipelineContext, courses_json};
use crate::course::{CourseRole, ScheduledCourse};
use crate::error::CoreError;
use crate::plan::{ElectivePlan, Semester, SemesterPlan};
use crate::session::{SessionPatch, SessionState};

type Draft = Vec<Vec<ScheduledCourse>>;

/// Allowed number of semesters for a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TermBounds {
    pub(crate) min_terms: u32,
    pub(crate) max_terms: u32,
}

impl TermBounds {
    /// `[max(1, ceil(max/max_per_sem)), max(2, ceil(max/min_per_sem))]`.
    pub(crate) fn new(max_credits: u32, min_per_sem: u32, max_per_sem: u32) -> Self {
        let min_terms = max_credits.div_ceil(max_per_sem.max(1)).max(1);
        let max_terms = max_credits
            .div_ceil(min_per_sem.max(1))
            .max(2)
            .max(min_terms);
        Self {
            min_terms,
            max_terms,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScheduleReply {
    #[serde(default)]
    semester_schedule: Vec<DraftSemester>,
    #[serde(default)]
    reason_behind_planning: String,
}

#[derive(Debug, Deserialize)]
struct DraftSemester {
    #[serde(default)]
    semester: Option<u32>,
    #[serde(default)]
    courses: Vec<DraftCourse>,
}

#[derive(Debug, Deserialize)]
struct DraftCourse {
    course_number: String,
    #[serde(default)]
    reason: String,
}

/// Schedule every elective plan, narrowing each plan to the electives that
/// were actually placed.
///
/// # Errors
///
/// Returns `CoreError::MalformedResponse` for bad generator output, plus
/// prompt and generation errors.
#[instrument(skip_all, fields(plans = state.plans.len()))]
pub(crate) async fn schedule_plans(
    ctx: &PipelineContext,
    state: &SessionState,
) -> Result<SessionPatch, CoreError> {
    let mut semester_plans = Vec::with_capacity(state.plans.len());
    let mut narrowed = Vec::with_capacity(state.plans.len());
    for (idx, plan) in state.plans.iter().enumerate() {
        let scheduled = schedule_plan(ctx, state, idx + 1, plan).await?;
        narrowed.push(ElectivePlan::new(scheduled.electives()));
        semester_plans.push(scheduled);
    }
    Ok(SessionPatch {
        plans: Some(narrowed),
        semester_plans: Some(semester_plans),
        ..Default::default()
    })
}

async fn schedule_plan(
    ctx: &PipelineContext,
    state: &SessionState,
    plan_number: usize,
    plan: &ElectivePlan,
) -> Result<SemesterPlan, CoreError> {
    let bounds = TermBounds::new(
        state.max_credits,
        state.min_creds_per_sem,
        state.max_creds_per_sem,
    );
    let min_electives = state
        .remaining_credits()
        .div_ceil(plan.average_credit().max(1))
        .saturating_sub(1);

    let context = json!({
        "plan_number": plan_number,
        "query": state.goal,
        "department": state.department,
        "college": state.college,
        "min_creds_per_sem": state.min_creds_per_sem,
        "max_creds_per_sem": state.max_creds_per_sem,
        "min_terms": bounds.min_terms,
        "max_terms": bounds.max_terms,
        "max_credits": state.max_credits,
        "max_allowed_credits": state.max_credits + ctx.planning.credit_tolerance,
        "core_courses_json": courses_json(&state.core_courses),
        "elective_courses_json": courses_json(&plan.courses),
        "min_electives": min_electives,
    });
    let reply: ScheduleReply = ctx.agent.json("schedule", &context, 0.2).await?;

    let draft = resolve_draft(reply.semester_schedule, state, plan);
    let semesters = Normalizer {
        state,
        bounds,
    }
    .run(draft);

    let mut scheduled = SemesterPlan::new(plan_number, semesters, reply.reason_behind_planning);
    scheduled.mark_credits(state.max_credits);
    info!(
        plan_number,
        semesters = scheduled.semesters.len(),
        total_credits = scheduled.total_credits,
        "plan scheduled"
    );
    Ok(scheduled)
}

/// Map the generator's course numbers onto known courses, dropping anything
/// that is neither a core course nor one of the plan's electives.
fn resolve_draft(
    mut semesters: Vec<DraftSemester>,
    state: &SessionState,
    plan: &ElectivePlan,
) -> Draft {
    semesters.sort_by_key(|s| s.semester.unwrap_or(u32::MAX));
    semesters
        .into_iter()
        .map(|semester| {
            semester
                .courses
                .into_iter()
                .filter_map(|draft| {
                    let number = draft.course_number.trim().to_ascii_uppercase();
                    if let Some(core) = state.core_courses.iter().find(|c| c.course_number == number)
                    {
                        return Some(ScheduledCourse::new(core.clone(), CourseRole::Core, draft.reason));
                    }
                    if let Some(elective) = plan.courses.iter().find(|c| c.course_number == number) {
                        return Some(ScheduledCourse::new(
                            elective.clone(),
                            CourseRole::Elective,
                            draft.reason,
                        ));
                    }
                    warn!(course = %number, "dropping unknown course from schedule");
                    None
                })
                .collect::<Vec<_>>()
        })
        .filter(|courses| !courses.is_empty())
        .collect()
}

fn load(courses: &[ScheduledCourse]) -> u32 {
    courses.iter().map(ScheduledCourse::credits).sum()
}

/// Deterministic repair of a drafted schedule.
struct Normalizer<'a> {
    state: &'a SessionState,
    bounds: TermBounds,
}

impl Normalizer<'_> {
    fn max_terms(&self) -> usize {
        self.bounds.max_terms as usize
    }

    fn min_terms(&self) -> usize {
        self.bounds.min_terms as usize
    }

    fn max_load(&self) -> u32 {
        self.state.max_creds_per_sem
    }

    fn run(&self, mut draft: Draft) -> Vec<Semester> {
        self.insert_missing_core(&mut draft);
        self.order_prerequisites(&mut draft);
        self.fold_excess_terms(&mut draft);
        self.spill_overloaded(&mut draft);
        self.move_capstones_last(&mut draft);
        self.merge_underfull(&mut draft);
        draft.retain(|courses| !courses.is_empty());

        draft
            .into_iter()
            .zip(1..)
            .map(|(courses, number)| Semester::new(number, courses))
            .collect()
    }

    fn insert_missing_core(&self, draft: &mut Draft) {
        for core in &self.state.core_courses {
            let present = draft
                .iter()
                .flatten()
                .any(|c| c.course_number() == core.course_number);
            if present {
                continue;
            }
            debug!(course = %core.course_number, "inserting missing core course");
            let course = ScheduledCourse::new(core.clone(), CourseRole::Core, "Required core course.");
            match draft
                .iter()
                .position(|s| load(s) + course.credits() <= self.max_load())
            {
                Some(idx) => draft[idx].push(course),
                None => draft.push(vec![course]),
            }
        }
    }

    /// Push courses after the semester of their latest in-plan prerequisite.
    fn order_prerequisites(&self, draft: &mut Draft) {
        let course_count: usize = draft.iter().map(Vec::len).sum();
        // Each move pushes a course strictly later, so cycles are cut off by
        // bounding the number of moves.
        let mut budget = course_count * course_count.max(1);
        'scan: while budget > 0 {
            for i in 0..draft.len() {
                for j in 0..draft[i].len() {
                    let course = &draft[i][j];
                    let latest = course
                        .course
                        .prerequisite_numbers()
                        .iter()
                        .filter(|p| **p != course.course_number())
                        .filter_map(|p| {
                            draft
                                .iter()
                                .rposition(|s| s.iter().any(|c| c.course_number() == p.as_str()))
                        })
                        .max();
                    if let Some(latest) = latest.filter(|l| *l >= i) {
                        let moved = draft[i].remove(j);
                        debug!(course = %moved.course_number(), to = latest + 1, "moving after prerequisite");
                        if latest + 1 >= draft.len() {
                            draft.push(Vec::new());
                        }
                        draft[latest + 1].push(moved);
                        budget -= 1;
                        continue 'scan;
                    }
                }
            }
            break;
        }
    }

    /// Collapse semesters beyond the maximum term count into earlier ones.
    fn fold_excess_terms(&self, draft: &mut Draft) {
        let max_terms = self.max_terms();
        while draft.len() > max_terms {
            let Some(extra) = draft.pop() else { break };
            for course in extra {
                if let Some(idx) = draft
                    .iter()
                    .rposition(|s| load(s) + course.credits() <= self.max_load())
                {
                    draft[idx].push(course);
                } else if course.role == CourseRole::Core {
                    self.place_core(draft, course, None);
                } else {
                    warn!(course = %course.course_number(), "dropping elective that does not fit");
                }
            }
        }
    }

    /// Move courses out of semesters over the credit limit, forward first.
    fn spill_overloaded(&self, draft: &mut Draft) {
        let mut i = 0;
        while i < draft.len() {
            while load(&draft[i]) > self.max_load() {
                let Some(pos) = spill_candidate(draft, i) else {
                    break;
                };
                let course = draft[i].remove(pos);
                if i + 1 < draft.len() {
                    draft[i + 1].push(course);
                } else if draft.len() < self.max_terms() {
                    draft.push(vec![course]);
                } else if let Some(idx) = (0..draft.len())
                    .find(|idx| *idx != i && load(&draft[*idx]) + course.credits() <= self.max_load())
                {
                    draft[idx].push(course);
                } else if course.role == CourseRole::Core {
                    if !self.place_core(draft, course, Some(i)) {
                        break;
                    }
                } else {
                    warn!(course = %course.course_number(), "dropping elective that does not fit");
                }
            }
            i += 1;
        }
    }

    /// Put a core course in a semester other than `skip`, pushing electives
    /// out of it when that makes room. Returns `false` when no semester can
    /// take it; the course then goes to the lightest semester (or back to
    /// `skip`) over the limit.
    fn place_core(&self, draft: &mut Draft, course: ScheduledCourse, skip: Option<usize>) -> bool {
        let credits = course.credits();
        let room = (0..draft.len()).rev().filter(|idx| Some(*idx) != skip).find(|idx| {
            let core_load: u32 = draft[*idx]
                .iter()
                .filter(|c| c.role == CourseRole::Core)
                .map(ScheduledCourse::credits)
                .sum();
            core_load + credits <= self.max_load()
        });
        if let Some(idx) = room {
            while load(&draft[idx]) + credits > self.max_load() {
                let Some(pos) = most_advanced_elective(&draft[idx]) else {
                    break;
                };
                let evicted = draft[idx].remove(pos);
                warn!(
                    course = %evicted.course_number(),
                    core = %course.course_number(),
                    "dropping elective to make room for core course"
                );
            }
            draft[idx].push(course);
            return true;
        }

        warn!(course = %course.course_number(), "core courses exceed the per-semester limit");
        let target = skip.or_else(|| (0..draft.len()).min_by_key(|idx| load(&draft[*idx])));
        match target {
            Some(idx) => draft[idx].push(course),
            None => draft.push(vec![course]),
        }
        false
    }

    /// Capstone, project and thesis core courses go in the final semester.
    fn move_capstones_last(&self, draft: &mut Draft) {
        draft.retain(|courses| !courses.is_empty());
        let Some(last) = draft.len().checked_sub(1) else {
            return;
        };
        let mut capstones = Vec::new();
        for semester in &mut draft[..last] {
            let mut k = 0;
            while k < semester.len() {
                if semester[k].role == CourseRole::Core && semester[k].course.is_capstone() {
                    capstones.push(semester.remove(k));
                } else {
                    k += 1;
                }
            }
        }
        if capstones.is_empty() {
            return;
        }
        draft[last].extend(capstones);

        // Make room in the final semester by moving electives earlier, then
        // core courses that are not capstones.
        while load(&draft[last]) > self.max_load() {
            let pos = draft[last]
                .iter()
                .rposition(|c| c.role == CourseRole::Elective)
                .or_else(|| {
                    draft[last]
                        .iter()
                        .rposition(|c| c.role == CourseRole::Core && !c.course.is_capstone())
                });
            let Some(pos) = pos else {
                warn!(semester = last + 1, "capstones alone exceed the per-semester limit");
                break;
            };
            let course = draft[last].remove(pos);
            let target = (0..last).rev().find(|idx| {
                let moved = std::slice::from_ref(&course);
                load(&draft[*idx]) + course.credits() <= self.max_load()
                    && !draft[*idx..].iter().any(|s| depends_on(moved, s))
                    && !depends_on(&draft[*idx], moved)
            });
            match (target, course.role) {
                (Some(idx), _) => draft[idx].push(course),
                (None, CourseRole::Elective) => {
                    warn!(course = %course.course_number(), "dropping elective that does not fit");
                }
                (None, CourseRole::Core) => {
                    warn!(course = %course.course_number(), "no earlier semester can take core course");
                    draft[last].push(course);
                    break;
                }
            }
        }
    }

    /// Merge semesters under the minimum load into a neighbour when the
    /// combined load fits, enough terms remain and no prerequisite would end
    /// up in the same semester as its dependent.
    fn merge_underfull(&self, draft: &mut Draft) {
        draft.retain(|courses| !courses.is_empty());
        let min_load = self.state.min_creds_per_sem;
        let mut i = 0;
        while i < draft.len() {
            if draft.len() <= self.min_terms() || load(&draft[i]) >= min_load {
                i += 1;
                continue;
            }
            let current = load(&draft[i]);
            let last = draft.len() - 1;
            let into_previous = i > 0
                && load(&draft[i - 1]) + current <= self.max_load()
                && !depends_on(&draft[i], &draft[i - 1]);
            let into_next = i < last
                && load(&draft[i + 1]) + current <= self.max_load()
                && !depends_on(&draft[i + 1], &draft[i]);
            if into_previous && i < last {
                let courses = draft.remove(i);
                draft[i - 1].extend(courses);
                i -= 1;
            } else if into_next {
                let mut courses = draft.remove(i);
                courses.append(&mut draft[i]);
                draft[i] = courses;
            } else if into_previous {
                // Keep the final semester (and its capstones) last.
                let mut courses = draft.remove(i - 1);
                courses.append(&mut draft[i - 1]);
                draft[i - 1] = courses;
                i -= 1;
            } else {
                i += 1;
            }
        }
    }
}

/// Whether any course in `later` lists a course in `earlier` as a prerequisite.
fn depends_on(later: &[ScheduledCourse], earlier: &[ScheduledCourse]) -> bool {
    later.iter().any(|c| {
        c.course
            .prerequisite_numbers()
            .iter()
            .any(|p| earlier.iter().any(|e| p == e.course_number()))
    })
}

fn most_advanced_elective(courses: &[ScheduledCourse]) -> Option<usize> {
    courses
        .iter()
        .enumerate()
        .filter(|(_, c)| c.role == CourseRole::Elective)
        .max_by_key(|(_, c)| c.course.level().unwrap_or(0))
        .map(|(pos, _)| pos)
}

/// Course to move out of overloaded semester `i`.
///
/// Electives go before core courses and capstones go last; within that,
/// courses the next semester does not depend on go first, then the most
/// advanced.
fn spill_candidate(draft: &Draft, i: usize) -> Option<usize> {
    let next = draft.get(i + 1).map(Vec::as_slice).unwrap_or_default();
    draft[i]
        .iter()
        .enumerate()
        .max_by_key(|(_, c)| {
            let is_capstone = c.role == CourseRole::Core && c.course.is_capstone();
            (
                c.role == CourseRole::Elective,
                !is_capstone,
                !depends_on(next, std::slice::from_ref(*c)),
                c.course.level().unwrap_or(0),
            )
        })
        .map(|(pos, _)| pos)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::course::Course;
    use crate::session::Request;
    use crate::test_support::{ScriptedGenerator, catalog_course, course, pipeline_context};

    /// Core: DS5110 (4) and the DS5500 capstone (4). Max 20 credits, 4 to 12
    /// per semester: between 2 and 5 semesters.
    fn state(electives: &[&str]) -> SessionState {
        let request = Request::builder()
            .session_id("s")
            .query("data scientist")
            .max_credits(20)
            .min_creds_per_sem(4)
            .max_creds_per_sem(12)
            .build();
        let mut state = SessionState::new(
            &request,
            vec![catalog_course("DS5110"), catalog_course("DS5500")],
        );
        state.plans = vec![ElectivePlan::new(electives.iter().map(|n| catalog_course(n)))];
        state
    }

    fn reply(semesters: &[&[&str]]) -> String {
        let schedule: Vec<_> = semesters
            .iter()
            .enumerate()
            .map(|(i, courses)| {
                json!({
                    "semester": i + 1,
                    "courses": courses
                        .iter()
                        .map(|n| json!({"course_number": n, "type": "elective", "reason": "fits"}))
                        .collect::<Vec<_>>(),
                    "total_credits": 999,
                })
            })
            .collect();
        json!({
            "plan_number": 1,
            "semester_schedule": schedule,
            "reason_behind_planning": "Foundations first.",
        })
        .to_string()
    }

    async fn schedule(state: &SessionState, draft: &[&[&str]]) -> (SemesterPlan, ElectivePlan) {
        let generator = Arc::new(ScriptedGenerator::default());
        generator.push("schedule", reply(draft));
        let ctx = pipeline_context(generator);
        let patch = schedule_plans(&ctx, state).await.expect("should schedule");
        let plan = patch.semester_plans.expect("semester plans should be set").remove(0);
        let narrowed = patch.plans.expect("plans should be set").remove(0);
        (plan, narrowed)
    }

    fn semester_numbers(plan: &SemesterPlan) -> Vec<Vec<&str>> {
        plan.semesters
            .iter()
            .map(|s| s.courses.iter().map(ScheduledCourse::course_number).collect())
            .collect()
    }

    fn loads(plan: &SemesterPlan) -> Vec<u32> {
        plan.semesters.iter().map(|s| s.total_credits).collect()
    }

    /// Term count within bounds and no semester over the limit.
    fn assert_upper_bounds(plan: &SemesterPlan, state: &SessionState) {
        let bounds = TermBounds::new(
            state.max_credits,
            state.min_creds_per_sem,
            state.max_creds_per_sem,
        );
        let terms = plan.semesters.len() as u32;
        assert!(terms >= bounds.min_terms && terms <= bounds.max_terms, "{terms} terms");
        for semester in &plan.semesters {
            assert_eq!(semester.total_credits, load(&semester.courses));
        }
        assert!(
            loads(plan).iter().all(|l| *l <= state.max_creds_per_sem),
            "semester over the limit: {:?}",
            loads(plan)
        );
    }

    /// Upper bounds plus every semester at or above the minimum load, for
    /// course sets where that minimum is reachable.
    fn assert_bounds(plan: &SemesterPlan, state: &SessionState) {
        assert_upper_bounds(plan, state);
        assert!(
            loads(plan).iter().all(|l| *l >= state.min_creds_per_sem),
            "semester under the minimum: {:?}",
            loads(plan)
        );
    }

    /// Core courses only, with no elective plan.
    fn core_state(core: &[(&str, u32)], max_credits: u32, min_per_sem: u32) -> SessionState {
        let request = Request::builder()
            .session_id("s")
            .query("data scientist")
            .max_credits(max_credits)
            .min_creds_per_sem(min_per_sem)
            .max_creds_per_sem(12)
            .build();
        let core = core
            .iter()
            .map(|(number, credits)| course(number, &format!("Course {number}"), *credits))
            .collect();
        let mut state = SessionState::new(&request, core);
        state.plans = vec![ElectivePlan::new(Vec::new())];
        state
    }

    #[test]
    fn test_should_compute_term_bounds() {
        assert_eq!(
            TermBounds::new(32, 4, 12),
            TermBounds { min_terms: 3, max_terms: 8 }
        );
        assert_eq!(
            TermBounds::new(12, 6, 12),
            TermBounds { min_terms: 1, max_terms: 2 }
        );
        assert_eq!(
            TermBounds::new(30, 10, 10),
            TermBounds { min_terms: 3, max_terms: 3 }
        );
    }

    #[tokio::test]
    async fn test_should_schedule_and_recompute_totals() {
        let state = state(&["DS5220", "CS6220"]);
        let (plan, narrowed) =
            schedule(&state, &[&["DS5110", "DS5220"], &["CS6220", "DS5500"]]).await;

        assert_eq!(
            semester_numbers(&plan),
            vec![vec!["DS5110", "DS5220"], vec!["CS6220", "DS5500"]]
        );
        assert_eq!(plan.semesters[0].total_credits, 8);
        assert_eq!(plan.total_credits, 16);
        assert!(!plan.credits_met);
        assert_eq!(plan.rationale, "Foundations first.");
        assert_eq!(plan.semesters[0].courses[0].role, CourseRole::Core);
        assert_eq!(plan.semesters[0].courses[1].role, CourseRole::Elective);
        assert_eq!(plan.semesters[1].courses[0].reason, "fits");
        assert_eq!(narrowed.key(), vec!["CS6220", "DS5220"]);
        assert_bounds(&plan, &state);
    }

    #[tokio::test]
    async fn test_should_drop_unknown_and_insert_missing_core() {
        let state = state(&["DS5220", "CS6220"]);
        let (plan, _) = schedule(&state, &[&["XX9999", "CS6220"], &["DS5220"]]).await;

        let numbers = plan.course_numbers();
        assert!(!numbers.contains(&"XX9999"));
        assert_eq!(numbers.iter().filter(|n| **n == "DS5110").count(), 1);
        assert_eq!(numbers.iter().filter(|n| **n == "DS5500").count(), 1);
        assert_bounds(&plan, &state);
    }

    #[tokio::test]
    async fn test_should_move_capstone_to_last_semester() {
        let state = state(&["CS6220", "CS6140"]);
        let (plan, _) = schedule(&state, &[&["DS5500", "DS5110"], &["CS6220", "CS6140"]]).await;

        let last = plan.semesters.last().expect("should have semesters");
        assert!(last.contains("DS5500"));
        assert!(!plan.semesters[0].contains("DS5500"));
        assert_bounds(&plan, &state);
    }

    #[tokio::test]
    async fn test_should_place_course_after_its_prerequisite() {
        let state = state(&["DS5220", "DS7200"]);
        let (plan, _) = schedule(&state, &[&["DS5110", "DS7200", "DS5220"], &["DS5500"]]).await;

        let semester_of = |number: &str| {
            plan.semesters
                .iter()
                .position(|s| s.contains(number))
                .expect("course should be scheduled")
        };
        assert!(semester_of("DS5220") < semester_of("DS7200"));
        assert_eq!(semester_of("DS5500"), plan.semesters.len() - 1);
        assert_bounds(&plan, &state);
    }

    #[tokio::test]
    async fn test_should_fold_semesters_beyond_max_terms() {
        let mut state = state(&["DS5220", "CS6220", "CS6140"]);
        // 20 credits at 10 to 12 per semester: exactly 2 terms.
        state.min_creds_per_sem = 10;
        let (plan, narrowed) = schedule(
            &state,
            &[&["DS5110"], &["CS6220"], &["CS6140"], &["DS5220"], &["DS5500"]],
        )
        .await;

        assert_eq!(plan.semesters.len(), 2);
        assert!(plan.semesters[1].contains("DS5500"));
        assert_upper_bounds(&plan, &state);
        // Whatever was dropped to fit is no longer part of the elective plan.
        assert_eq!(narrowed.len(), plan.electives().len());
    }

    #[tokio::test]
    async fn test_should_spill_overloaded_semester_forward() {
        let state = state(&["DS5220", "CS6220", "CS6140"]);
        let (plan, _) = schedule(
            &state,
            &[&["DS5110", "CS6220", "CS6140", "DS5220"], &["DS5500"]],
        )
        .await;

        assert_eq!(plan.total_credits, 20);
        assert!(plan.semesters.last().expect("semesters").contains("DS5500"));
        assert_bounds(&plan, &state);
    }

    #[tokio::test]
    async fn test_should_spill_core_courses_from_overloaded_semester() {
        let state = core_state(
            &[("AA1000", 4), ("BB1000", 4), ("CC1000", 4), ("DD1000", 4), ("EE1000", 4)],
            20,
            4,
        );
        let (plan, _) = schedule(
            &state,
            &[&["AA1000", "BB1000", "CC1000", "DD1000"], &["EE1000"]],
        )
        .await;

        assert_eq!(loads(&plan), vec![12, 8]);
        assert_eq!(plan.total_credits, 20);
        assert!(plan.semesters[1].contains("DD1000"));
        assert_bounds(&plan, &state);
    }

    #[tokio::test]
    async fn test_should_fold_core_courses_by_dropping_electives() {
        // 10 to 12 credits per semester over 20 credits: exactly 2 terms.
        let mut state = core_state(
            &[("AA1000", 4), ("BB1000", 4), ("CC1000", 4), ("DD1000", 4)],
            20,
            10,
        );
        state.plans = vec![ElectivePlan::new(
            ["EL5001", "EL5002", "EL5003"]
                .iter()
                .map(|n| course(n, &format!("Elective {n}"), 4)),
        )];
        let (plan, narrowed) = schedule(
            &state,
            &[
                &["AA1000", "EL5001", "EL5002"],
                &["BB1000", "EL5003"],
                &["CC1000"],
                &["DD1000"],
            ],
        )
        .await;

        assert_eq!(loads(&plan), vec![12, 12]);
        for core in ["AA1000", "BB1000", "CC1000", "DD1000"] {
            assert!(plan.contains(core), "{core} should be scheduled");
        }
        assert!(!plan.contains("EL5003"));
        assert_eq!(narrowed.key(), vec!["EL5001", "EL5002"]);
        assert_bounds(&plan, &state);
    }

    #[tokio::test]
    async fn test_should_merge_underfull_middle_semester_forward() {
        let mut state = state(&["DS5220", "DS7200", "CS6220"]);
        state.min_creds_per_sem = 6;
        let (plan, _) = schedule(
            &state,
            &[&["DS5110", "DS5220"], &["DS7200"], &["CS6220", "DS5500"]],
        )
        .await;

        // Merging back would put DS7200 beside its prerequisite DS5220.
        assert_eq!(
            semester_numbers(&plan),
            vec![vec!["DS5110", "DS5220"], vec!["DS7200", "CS6220", "DS5500"]]
        );
        assert_eq!(loads(&plan), vec![8, 11]);
        assert_bounds(&plan, &state);
    }

    #[tokio::test]
    async fn test_should_merge_underfull_final_semester_keeping_capstone_last() {
        let mut state = state(&["DS5220", "CS6220", "CS6140"]);
        state.min_creds_per_sem = 6;
        let (plan, _) = schedule(
            &state,
            &[&["DS5110", "DS5220"], &["CS6220", "CS6140"], &["DS5500"]],
        )
        .await;

        assert_eq!(
            semester_numbers(&plan),
            vec![vec!["DS5110", "DS5220"], vec!["CS6220", "CS6140", "DS5500"]]
        );
        assert_eq!(loads(&plan), vec![8, 12]);
        assert_bounds(&plan, &state);
    }

    #[tokio::test]
    async fn test_should_narrow_plan_to_scheduled_electives() {
        let state = state(&["DS5220", "CS6220", "CS6140"]);
        let (_, narrowed) = schedule(&state, &[&["DS5110", "CS6220"], &["DS5220", "DS5500"]]).await;
        assert_eq!(narrowed.key(), vec!["CS6220", "DS5220"]);
    }

    #[tokio::test]
    async fn test_should_pass_term_bounds_to_generator() {
        let state = state(&["DS5220"]);
        let generator = Arc::new(ScriptedGenerator::default());
        generator.push("schedule", reply(&[&["DS5110", "DS5220"], &["DS5500"]]));
        let ctx = pipeline_context(Arc::clone(&generator));
        schedule_plans(&ctx, &state).await.expect("should schedule");

        let prompt = &generator.calls_for("schedule")[0].prompt;
        assert!(prompt.contains("Number of semesters: 2 to 5"));
        assert!(prompt.contains("at most 21"));
    }

    #[tokio::test]
    async fn test_should_fail_on_malformed_schedule() {
        let state = state(&["DS5220"]);
        let generator = Arc::new(ScriptedGenerator::default());
        generator.push("schedule", "{\"semester_schedule\": \"soon\"}");
        let ctx = pipeline_context(generator);
        let err = schedule_plans(&ctx, &state).await.expect_err("should fail");
        assert!(matches!(err, CoreError::MalformedResponse { .. }));
    }

    #[test]
    fn test_should_keep_duplicates_for_repair() {
        let state = state(&["DS5220"]);
        let course: Course = catalog_course("DS5220");
        let draft = vec![
            vec![ScheduledCourse::new(catalog_course("DS5110"), CourseRole::Core, "")],
            vec![ScheduledCourse::new(course.clone(), CourseRole::Elective, "")],
            vec![
                ScheduledCourse::new(course, CourseRole::Elective, ""),
                ScheduledCourse::new(catalog_course("DS5500"), CourseRole::Core, ""),
            ],
        ];
        let semesters = Normalizer {
            state: &state,
            bounds: TermBounds::new(20, 4, 12),
        }
        .run(draft);
        let count = semesters
            .iter()
            .flat_map(|s| &s.courses)
            .filter(|c| c.course_number() == "DS5220")
            .count();
        assert_eq!(count, 2);
    }
}
