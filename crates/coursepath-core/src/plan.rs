//! Plan types: elective subsets and semester-by-semester schedules.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::course::{Course, CourseRole, ScheduledCourse, total_credits};

/// Average credit assumed when a plan has no courses to average over.
pub const DEFAULT_AVERAGE_CREDIT: u32 = 3;

// ── Elective plan ────────────────────────────────────────────

/// One elective subset produced by the selector. Course numbers are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectivePlan {
    pub courses: Vec<Course>,
}

impl ElectivePlan {
    /// Build a plan, keeping the first occurrence of each course number.
    pub fn new(courses: impl IntoIterator<Item = Course>) -> Self {
        let mut seen = HashSet::new();
        let courses = courses
            .into_iter()
            .filter(|c| seen.insert(c.course_number.clone()))
            .collect();
        Self { courses }
    }

    /// Identity of the plan: its sorted course numbers.
    pub fn key(&self) -> Vec<String> {
        let mut numbers: Vec<String> = self
            .courses
            .iter()
            .map(|c| c.course_number.clone())
            .collect();
        numbers.sort();
        numbers
    }

    pub fn credits(&self) -> u32 {
        total_credits(&self.courses)
    }

    pub fn contains(&self, course_number: &str) -> bool {
        self.courses.iter().any(|c| c.course_number == course_number)
    }

    pub fn len(&self) -> usize {
        self.courses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }

    /// Integer average credit per course, [`DEFAULT_AVERAGE_CREDIT`] when
    /// empty.
    pub fn average_credit(&self) -> u32 {
        average_credit(&self.courses).unwrap_or(DEFAULT_AVERAGE_CREDIT)
    }
}

/// Integer average credit of `courses`, `None` when empty.
pub fn average_credit<'a>(courses: impl IntoIterator<Item = &'a Course>) -> Option<u32> {
    let (count, total) = courses
        .into_iter()
        .fold((0_u32, 0_u32), |(n, sum), c| (n + 1, sum + c.credits()));
    (count > 0).then(|| total / count)
}

// ── Semester plan ────────────────────────────────────────────

/// A semester of a schedule. `total_credits` is always recomputed from
/// `courses`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Semester {
    pub number: u32,
    pub courses: Vec<ScheduledCourse>,
    pub total_credits: u32,
}

impl Semester {
    pub fn new(number: u32, courses: Vec<ScheduledCourse>) -> Self {
        let mut semester = Self {
            number,
            courses,
            total_credits: 0,
        };
        semester.recompute();
        semester
    }

    /// Recompute `total_credits` from the member courses.
    pub fn recompute(&mut self) {
        self.total_credits = self.courses.iter().map(ScheduledCourse::credits).sum();
    }

    pub fn contains(&self, course_number: &str) -> bool {
        self.courses.iter().any(|c| c.course_number() == course_number)
    }
}

/// A complete schedule for one elective plan plus the core courses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemesterPlan {
    /// 1-based position among the session's plans.
    pub plan_number: usize,
    pub semesters: Vec<Semester>,
    pub total_credits: u32,
    #[serde(default)]
    pub rationale: String,
    /// Whether `total_credits` reaches the requested `max_credits`.
    #[serde(default)]
    pub credits_met: bool,
}

impl SemesterPlan {
    pub fn new(plan_number: usize, semesters: Vec<Semester>, rationale: impl Into<String>) -> Self {
        let mut plan = Self {
            plan_number,
            semesters,
            total_credits: 0,
            rationale: rationale.into(),
            credits_met: false,
        };
        plan.recompute_totals();
        plan
    }

    /// Recompute every semester total and the plan total from scratch.
    pub fn recompute_totals(&mut self) {
        for semester in &mut self.semesters {
            semester.recompute();
        }
        self.total_credits = self.semesters.iter().map(|s| s.total_credits).sum();
    }

    /// Set `credits_met` against `max_credits`.
    pub fn mark_credits(&mut self, max_credits: u32) {
        self.credits_met = self.total_credits >= max_credits;
    }

    /// All scheduled courses in semester order.
    pub fn courses(&self) -> impl Iterator<Item = &ScheduledCourse> {
        self.semesters.iter().flat_map(|s| s.courses.iter())
    }

    /// Course numbers in semester order (may contain repeats before repair).
    pub fn course_numbers(&self) -> Vec<&str> {
        self.courses().map(ScheduledCourse::course_number).collect()
    }

    pub fn contains(&self, course_number: &str) -> bool {
        self.courses().any(|c| c.course_number() == course_number)
    }

    /// Elective courses in semester order.
    pub fn electives(&self) -> Vec<Course> {
        self.courses()
            .filter(|c| c.role == CourseRole::Elective)
            .map(|c| c.course.clone())
            .collect()
    }
}

/// A requested course swap on a stored plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
    /// Course number currently in the plan.
    pub old: String,
    /// A course number or a free-text description of the wanted course.
    pub new: String,
}
