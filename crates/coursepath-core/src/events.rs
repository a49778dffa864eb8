//! Event types for CLI consumption.
//!
//! [`Engine::respond`](crate::Engine::respond) returns a [`ResponseStream`].
//! Every pipeline stage announces itself with a [`ResponseEvent::Progress`]
//! event carrying a human-readable label; the stream ends with either
//! [`ResponseEvent::Completed`] or [`ResponseEvent::Error`].

use serde::Serialize;

use crate::assist::Suggestion;
use crate::course::Course;
use crate::error::CoreError;
use crate::pipeline::AppliedReplacement;
use crate::plan::SemesterPlan;

// ── Stages ───────────────────────────────────────────────────

/// A pipeline step, as reported to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    CheckIntent,
    ResetPlans,
    Rephrase,
    Retrieve,
    SelectElectives,
    DedupPlans,
    Reconcile,
    Schedule,
    ResolveDuplicates,
    TopUpCredits,
    ExtractPlanIndex,
    ExtractReplacements,
    ReplaceCourses,
    SummarizeReschedule,
    ExtractCourses,
    LookupCourses,
    SummarizeCourses,
    ExtractRequirements,
    LookupShortTermCourses,
    BuildShortTermPlan,
    Greeting,
}

impl Stage {
    /// Label shown to the user while the stage runs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::CheckIntent => "Checking User Intent",
            Self::ResetPlans => "Cleaning Up",
            Self::Rephrase => "Rephrasing Query",
            Self::Retrieve | Self::LookupCourses | Self::LookupShortTermCourses => {
                "Searching the Database"
            }
            Self::SelectElectives | Self::Reconcile => "Filtering the Courses",
            Self::DedupPlans => "Checking For Duplicate Courses",
            Self::Schedule => "Building up the plan",
            Self::ResolveDuplicates => "Checking for Duplicates",
            Self::TopUpCredits => "Final Check in Progress",
            Self::ExtractPlanIndex => "Extracting the plan",
            Self::ExtractReplacements => "Extracting Courses Details from user's Query",
            Self::ReplaceCourses => "Replacing Courses",
            Self::SummarizeReschedule | Self::SummarizeCourses => "Summarizing",
            Self::ExtractRequirements => "Extracting the future Requirements",
            Self::BuildShortTermPlan => "Sorting and filtering the courses",
            Self::ExtractCourses => "Extracting Courses from user's Query",
            Self::Greeting => "Done",
        }
    }
}

// ── Response ─────────────────────────────────────────────────

/// Final result of a request.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Greeting {
        message: String,
    },
    CourseDetails {
        courses: Vec<Course>,
    },
    Schedule {
        plans: Vec<SemesterPlan>,
    },
    ShortTermPlan {
        suggestions: Vec<Suggestion>,
        explanation: String,
    },
    Rescheduled {
        plan: SemesterPlan,
        replaced: Vec<AppliedReplacement>,
        summary: String,
    },
}

// ── Response stream ──────────────────────────────────────────

/// Handle for consuming the progress of a request.
#[derive(Debug)]
pub struct ResponseStream {
    event_rx: tokio::sync::mpsc::Receiver<ResponseEvent>,
}

impl ResponseStream {
    pub(crate) fn new(event_rx: tokio::sync::mpsc::Receiver<ResponseEvent>) -> Self {
        Self { event_rx }
    }

    /// Get the next event.
    ///
    /// Returns `None` once the request has finished and the channel closed.
    pub async fn next(&mut self) -> Option<ResponseEvent> {
        self.event_rx.recv().await
    }

    /// Drain the stream, returning the final response.
    ///
    /// # Errors
    ///
    /// Returns the error the request failed with, or `CoreError::Other` if
    /// the stream closed without a result.
    pub async fn into_response(mut self) -> Result<Response, CoreError> {
        while let Some(event) = self.next().await {
            match event {
                ResponseEvent::Completed(response) => return Ok(*response),
                ResponseEvent::Error(e) => return Err(e),
                _ => {}
            }
        }
        Err(CoreError::Other(anyhow::anyhow!(
            "response stream closed without a result"
        )))
    }
}

/// Events emitted while a request runs.
#[derive(Debug)]
pub enum ResponseEvent {
    /// A stage started.
    Progress(Stage),

    /// The selection loop produced a plan.
    PlanProgress {
        /// 1-based number of distinct plans so far.
        current: usize,
        /// Requested number of plans.
        max: usize,
    },

    /// The request finished successfully.
    Completed(Box<Response>),

    /// The request failed; nothing was persisted.
    Error(CoreError),
}

impl ResponseEvent {
    /// Text to show for progress events.
    pub fn label(&self) -> Option<String> {
        match self {
            Self::Progress(stage) => Some(stage.label().to_owned()),
            Self::PlanProgress { current, max } => Some(format!("Working on plan {current}/{max}")),
            Self::Completed(_) => Some("Done".to_owned()),
            Self::Error(_) => None,
        }
    }
}
