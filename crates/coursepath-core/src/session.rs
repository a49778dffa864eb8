//! Per-conversation session state.
//!
//! A [`SessionState`] is created fresh for each planning request. Pipeline
//! stages read it by shared reference and return a [`SessionPatch`]; the
//! orchestrator merges patches with [`SessionState::apply`], so no stage ever
//! mutates state another stage is still reading.

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::course::{Course, total_credits};
use crate::error::CoreError;
use crate::plan::{ElectivePlan, Replacement, SemesterPlan};

/// A request to the assistant.
///
/// # Examples
///
/// ```
/// use coursepath_core::Request;
///
/// let request = Request::builder()
///     .session_id("thread-1")
///     .query("I want to become a data scientist")
///     .college("Khoury College of Computer Sciences")
///     .department("Data Science")
///     .core_course_numbers(vec!["DS5110".to_owned()])
///     .max_credits(32)
///     .build();
/// assert!(request.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct Request {
    /// Conversation key; a later reschedule request must reuse it.
    #[builder(setter(into))]
    pub session_id: String,

    /// The student's message.
    #[builder(setter(into))]
    pub query: String,

    #[builder(default, setter(into))]
    pub college: String,

    #[builder(default, setter(into))]
    pub department: String,

    #[builder(default)]
    pub core_course_numbers: Vec<String>,

    #[builder(default = 32)]
    pub max_credits: u32,

    #[builder(default = 4)]
    pub min_creds_per_sem: u32,

    #[builder(default = 12)]
    pub max_creds_per_sem: u32,

    #[builder(default = 2)]
    pub max_number_of_plans: usize,
}

impl Request {
    /// Check the request before any stage runs.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidRequest` describing the first problem found.
    pub fn validate(&self) -> Result<(), CoreError> {
        let invalid = |msg: &str| Err(CoreError::InvalidRequest(msg.to_owned()));
        if !is_valid_session_id(&self.session_id) {
            return invalid("session id must be non-empty and use only letters, digits, '-' or '_'");
        }
        if self.query.trim().is_empty() {
            return invalid("query must not be empty");
        }
        if self.max_credits == 0 {
            return invalid("max_credits must be positive");
        }
        if self.min_creds_per_sem == 0 {
            return invalid("min_creds_per_sem must be positive");
        }
        if self.min_creds_per_sem > self.max_creds_per_sem {
            return invalid("min_creds_per_sem must not exceed max_creds_per_sem");
        }
        if self.max_number_of_plans == 0 {
            return invalid("max_number_of_plans must be at least 1");
        }
        Ok(())
    }

    /// Core course numbers, trimmed, upper-cased and de-duplicated.
    pub fn normalized_core_numbers(&self) -> Vec<String> {
        let mut numbers: Vec<String> = Vec::new();
        for number in &self.core_course_numbers {
            let normalized = number.trim().to_ascii_uppercase();
            if !normalized.is_empty() && !numbers.contains(&normalized) {
                numbers.push(normalized);
            }
        }
        numbers
    }
}

/// Session ids become file names, so they are restricted to a safe alphabet.
pub fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Everything the pipeline knows about one conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    /// The student's original goal.
    pub goal: String,
    /// Latest rephrased retrieval query.
    #[serde(default)]
    pub rephrased_query: String,
    pub college: String,
    pub department: String,
    pub core_courses: Vec<Course>,
    pub max_credits: u32,
    pub min_creds_per_sem: u32,
    pub max_creds_per_sem: u32,
    pub max_number_of_plans: usize,
    /// Append-only union of every course retrieved in this session.
    #[serde(default)]
    pub final_course_list: Vec<Course>,
    /// Elective plans currently alive.
    #[serde(default)]
    pub plans: Vec<ElectivePlan>,
    /// Selection attempts so far; picks the variety directive, never reset.
    #[serde(default)]
    pub plan_counter: usize,
    #[serde(default)]
    pub semester_plans: Vec<SemesterPlan>,
    /// Zero-based index of the plan under edit.
    #[serde(default)]
    pub reschedule_plan_index: Option<usize>,
    #[serde(default)]
    pub pending_replacements: Vec<Replacement>,
}

impl SessionState {
    /// Fresh state for a planning request whose core courses were resolved.
    pub fn new(request: &Request, core_courses: Vec<Course>) -> Self {
        Self {
            session_id: request.session_id.clone(),
            goal: request.query.trim().to_owned(),
            college: request.college.clone(),
            department: request.department.clone(),
            core_courses,
            max_credits: request.max_credits,
            min_creds_per_sem: request.min_creds_per_sem,
            max_creds_per_sem: request.max_creds_per_sem,
            max_number_of_plans: request.max_number_of_plans,
            ..Default::default()
        }
    }

    pub fn core_credits(&self) -> u32 {
        total_credits(&self.core_courses)
    }

    /// Elective credit budget `R = max_credits - core_credits`.
    pub fn remaining_credits(&self) -> u32 {
        self.max_credits.saturating_sub(self.core_credits())
    }

    pub fn is_core(&self, course_number: &str) -> bool {
        self.core_courses
            .iter()
            .any(|c| c.course_number == course_number)
    }

    pub fn core_course_numbers(&self) -> Vec<String> {
        self.core_courses
            .iter()
            .map(|c| c.course_number.clone())
            .collect()
    }

    /// Merge a stage's patch into the state.
    ///
    /// Appended courses already present (by course number) are ignored, so
    /// the final course list only ever grows by new courses.
    pub fn apply(&mut self, patch: SessionPatch) {
        for course in patch.appended_courses {
            if !self
                .final_course_list
                .iter()
                .any(|c| c.course_number == course.course_number)
            {
                self.final_course_list.push(course);
            }
        }
        if let Some(rephrased) = patch.rephrased_query {
            self.rephrased_query = rephrased;
        }
        if let Some(plans) = patch.plans {
            self.plans = plans;
        }
        if let Some(counter) = patch.plan_counter {
            self.plan_counter = counter;
        }
        if let Some(semester_plans) = patch.semester_plans {
            self.semester_plans = semester_plans;
        }
        if let Some(index) = patch.reschedule_plan_index {
            self.reschedule_plan_index = Some(index);
        }
        if let Some(replacements) = patch.pending_replacements {
            self.pending_replacements = replacements;
        }
    }
}

/// Changes a stage wants made to the session. Unset fields leave the state
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub rephrased_query: Option<String>,
    /// Courses to add to the final course list.
    pub appended_courses: Vec<Course>,
    pub plans: Option<Vec<ElectivePlan>>,
    pub plan_counter: Option<usize>,
    pub semester_plans: Option<Vec<SemesterPlan>>,
    pub reschedule_plan_index: Option<usize>,
    pub pending_replacements: Option<Vec<Replacement>>,
}
