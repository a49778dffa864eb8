//! Request workflow.
//!
//! Classifies the student's message and runs the matching operation in a
//! background task, reporting progress through [`ResponseEvent`]s consumed
//! via [`ResponseStream`].
//!
//! # Edge cases
//!
//! - **Duplicate plans**: the selection loop stops after
//!   `max_number_of_plans × maxAttemptsPerPlan` attempts even if fewer
//!   distinct plans were produced; the pipeline continues with what it has.
//! - **Empty retrieval**: an attempt whose candidates are all core or
//!   zero-credit courses is skipped; the request fails with
//!   `CoreError::EmptyCandidatePool` only when no attempt produced a plan.
//! - **Reschedule without a stored session**: fails with
//!   `CoreError::SessionNotFound`.
//! - **Failures**: the first stage error ends the request with a
//!   [`ResponseEvent::Error`]; nothing is persisted.

use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::assist;
use crate::catalog::into_courses;
use crate::course::Course;
use crate::engine::Engine;
use crate::error::CoreError;
use crate::events::{Response, ResponseEvent, ResponseStream, Stage};
use crate::intent::{Intent, classify};
use crate::pipeline::{
    self, PipelineContext, apply_replacements, distinct_count, extract_replacements, select_plan,
};
use crate::session::{Request, SessionState};
use crate::store::SessionStore;

/// Channel buffer size for response events.
const EVENT_CHANNEL_SIZE: usize = 64;

/// Owned state for the background task, since `Engine` itself cannot be
/// moved into a `tokio::spawn`.
#[derive(Debug)]
struct RequestContext {
    pipeline: PipelineContext,
    /// Session store; `None` when persistence is disabled.
    store: Option<SessionStore>,
}

/// Sends progress events, failing once the consumer has gone away.
#[derive(Debug)]
struct Progress {
    tx: mpsc::Sender<ResponseEvent>,
}

impl Progress {
    async fn stage(&self, stage: Stage) -> Result<(), CoreError> {
        self.send(ResponseEvent::Progress(stage)).await
    }

    async fn plans(&self, current: usize, max: usize) -> Result<(), CoreError> {
        self.send(ResponseEvent::PlanProgress { current, max }).await
    }

    async fn send(&self, event: ResponseEvent) -> Result<(), CoreError> {
        send_event(&self.tx, event)
            .await
            .map_err(|()| CoreError::Other(anyhow::anyhow!("response stream closed")))
    }
}

/// Start handling a request.
///
/// Validates the request, then spawns a background task that classifies
/// and answers it.
///
/// # Errors
///
/// Returns `CoreError::InvalidRequest` if the request fails validation.
#[instrument(skip_all, fields(session = %request.session_id))]
pub(crate) async fn run_request(engine: &Engine, request: Request) -> Result<ResponseStream, CoreError> {
    request.validate()?;

    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
    let stream = ResponseStream::new(event_rx);

    let ctx = RequestContext {
        pipeline: engine.pipeline_context(),
        store: engine
            .project_config()
            .sessions
            .persist
            .then(|| engine.store().clone()),
    };

    tokio::spawn(async move {
        execute_request(ctx, request, event_tx).await;
    });

    Ok(stream)
}

/// Answer the request, finishing with a completed or error event.
#[instrument(skip_all, fields(session = %request.session_id))]
async fn execute_request(ctx: RequestContext, request: Request, event_tx: mpsc::Sender<ResponseEvent>) {
    let progress = Progress {
        tx: event_tx.clone(),
    };
    let event = match respond(&ctx, &request, &progress).await {
        Ok(response) => ResponseEvent::Completed(Box::new(response)),
        Err(e) => {
            error!(error = %e, "request failed");
            ResponseEvent::Error(e)
        }
    };
    let _ = send_event(&event_tx, event).await;
}

async fn respond(ctx: &RequestContext, request: &Request, progress: &Progress) -> Result<Response, CoreError> {
    progress.stage(Stage::CheckIntent).await?;
    let intent = classify(&ctx.pipeline.agent, &request.query).await?;
    info!(%intent, "intent classified");

    match intent {
        Intent::Greeting => {
            progress.stage(Stage::Greeting).await?;
            let message = assist::greet(&ctx.pipeline, request).await?;
            Ok(Response::Greeting { message })
        }
        Intent::CourseDetails => course_details(&ctx.pipeline, request, progress).await,
        Intent::ShortTermPlanning => short_term_plan(&ctx.pipeline, request, progress).await,
        Intent::BuildSchedule => {
            let state = build_schedule(&ctx.pipeline, request, progress).await?;
            persist(ctx, &state)?;
            Ok(Response::Schedule {
                plans: state.semester_plans,
            })
        }
        Intent::Reschedule(plan_number) => reschedule(ctx, request, plan_number, progress).await,
    }
}

async fn course_details(
    ctx: &PipelineContext,
    request: &Request,
    progress: &Progress,
) -> Result<Response, CoreError> {
    progress.stage(Stage::ExtractCourses).await?;
    let refs = assist::extract_course_references(ctx, request).await?;
    progress.stage(Stage::LookupCourses).await?;
    let found = assist::lookup_course_references(ctx, &refs);
    progress.stage(Stage::SummarizeCourses).await?;
    let courses = assist::rank_courses(found, &request.college, &request.department);
    info!(count = courses.len(), "course details found");
    Ok(Response::CourseDetails { courses })
}

async fn short_term_plan(
    ctx: &PipelineContext,
    request: &Request,
    progress: &Progress,
) -> Result<Response, CoreError> {
    progress.stage(Stage::ExtractRequirements).await?;
    let topics = assist::propose_topics(ctx, request).await?;
    progress.stage(Stage::LookupShortTermCourses).await?;
    let pool = assist::lookup_topics(ctx, &topics);
    progress.stage(Stage::BuildShortTermPlan).await?;
    let (suggestions, explanation) = assist::build_short_term_plan(ctx, request, &pool).await?;
    Ok(Response::ShortTermPlan {
        suggestions,
        explanation,
    })
}

/// Look up every requested core course.
///
/// # Errors
///
/// Returns `CoreError::UnknownCoreCourses` listing the numbers the catalog
/// does not know.
fn resolve_core_courses(ctx: &PipelineContext, request: &Request) -> Result<Vec<Course>, CoreError> {
    let numbers = request.normalized_core_numbers();
    let found = into_courses(ctx.catalog.by_numbers(&numbers));
    let missing: Vec<String> = numbers
        .iter()
        .filter(|n| !found.iter().any(|c| &c.course_number == *n))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(CoreError::UnknownCoreCourses(missing));
    }
    Ok(found)
}

/// Run the plan-construction pipeline from a fresh session.
#[instrument(skip_all, fields(max_plans = request.max_number_of_plans))]
async fn build_schedule(
    ctx: &PipelineContext,
    request: &Request,
    progress: &Progress,
) -> Result<SessionState, CoreError> {
    let core = resolve_core_courses(ctx, request)?;
    progress.stage(Stage::ResetPlans).await?;
    let mut state = SessionState::new(request, core);

    let max_plans = state.max_number_of_plans;
    let max_attempts = max_plans.saturating_mul(ctx.planning.max_attempts_per_plan.max(1) as usize);
    let mut attempts = 0;
    while distinct_count(&state.plans) < max_plans && attempts < max_attempts {
        attempts += 1;
        debug!(attempt = attempts, "selection attempt");

        progress.stage(Stage::Rephrase).await?;
        state.apply(pipeline::rephrase(ctx, &state).await?);

        progress.stage(Stage::Retrieve).await?;
        let (candidates, patch) = pipeline::retrieve_candidates(ctx, &state);
        state.apply(patch);

        progress.stage(Stage::SelectElectives).await?;
        match pipeline::select_electives(ctx, &state, &candidates).await {
            Ok(patch) => state.apply(patch),
            Err(CoreError::EmptyCandidatePool) => {
                warn!(attempt = attempts, "no usable candidates, skipping attempt");
                continue;
            }
            Err(e) => return Err(e),
        }
        progress.plans(distinct_count(&state.plans), max_plans).await?;
    }
    if state.plans.is_empty() {
        return Err(CoreError::EmptyCandidatePool);
    }
    let distinct = distinct_count(&state.plans);
    if distinct < max_plans {
        warn!(distinct, requested = max_plans, attempts, "attempt limit reached");
    }

    progress.stage(Stage::DedupPlans).await?;
    state.apply(pipeline::dedup_plans(&state));

    progress.stage(Stage::Reconcile).await?;
    state.apply(pipeline::reconcile_plans(ctx, &state).await?);

    progress.stage(Stage::Schedule).await?;
    state.apply(pipeline::schedule_plans(ctx, &state).await?);

    progress.stage(Stage::ResolveDuplicates).await?;
    state.apply(pipeline::resolve_duplicates(&state, ctx.embedder.as_ref()));

    progress.stage(Stage::TopUpCredits).await?;
    state.apply(pipeline::top_up_credits(
        &state,
        ctx.embedder.as_ref(),
        ctx.planning.credit_tolerance,
    ));

    info!(
        plans = state.semester_plans.len(),
        met = state.semester_plans.iter().filter(|p| p.credits_met).count(),
        "schedule complete"
    );
    Ok(state)
}

/// Edit plan `plan_number` of the stored session.
#[instrument(skip_all, fields(plan = plan_number))]
async fn reschedule(
    ctx: &RequestContext,
    request: &Request,
    plan_number: usize,
    progress: &Progress,
) -> Result<Response, CoreError> {
    let mut state = ctx
        .store
        .as_ref()
        .ok_or_else(|| CoreError::SessionNotFound(request.session_id.clone()))?
        .load(&request.session_id)?;

    progress.stage(Stage::ExtractPlanIndex).await?;
    state.apply(select_plan(&state, plan_number)?);

    progress.stage(Stage::ExtractReplacements).await?;
    state.apply(extract_replacements(&ctx.pipeline, &state, &request.query).await?);

    progress.stage(Stage::ReplaceCourses).await?;
    let (patch, replaced) = apply_replacements(&ctx.pipeline, &state)?;
    state.apply(patch);

    progress.stage(Stage::SummarizeReschedule).await?;
    let (patch, summary) = pipeline::summarize(&ctx.pipeline, &state, &replaced).await?;
    state.apply(patch);

    persist(ctx, &state)?;
    let plan = state
        .semester_plans
        .get(plan_number - 1)
        .cloned()
        .ok_or(CoreError::PlanNotFound {
            requested: plan_number,
            available: state.semester_plans.len(),
        })?;
    Ok(Response::Rescheduled {
        plan,
        replaced,
        summary,
    })
}

fn persist(ctx: &RequestContext, state: &SessionState) -> Result<(), CoreError> {
    if let Some(store) = &ctx.store {
        store.save(state)?;
    }
    Ok(())
}

/// Send an event on the channel, returning an error if the receiver is gone.
async fn send_event(tx: &mpsc::Sender<ResponseEvent>, event: ResponseEvent) -> Result<(), ()> {
    tx.send(event).await.map_err(|_| {
        debug!("response event channel closed");
    })
}
