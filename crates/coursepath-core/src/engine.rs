//! Core execution engine.
//!
//! The [`Engine`] is the entry point for all coursepath-core operations. It
//! owns the collaborators (catalog, embedder, text generator) and hands each
//! request to the workflow in a background task.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::agent::AgentRunner;
use crate::catalog::CatalogIndex;
use crate::claude::ClaudeGenerator;
use crate::config::{EngineConfig, ProjectConfig, load_project_config};
use crate::embed::{Embedder, HashingEmbedder};
use crate::error::CoreError;
use crate::events::ResponseStream;
use crate::generate::TextGenerator;
use crate::pipeline::PipelineContext;
use crate::session::Request;
use crate::store::SessionStore;

/// Engine answering student requests.
///
/// # Examples
///
/// ```no_run
/// use std::path::{Path, PathBuf};
/// use std::sync::Arc;
/// use coursepath_core::{Engine, EngineConfig, HashingEmbedder, InMemoryCatalog, Request};
///
/// # async fn example() -> Result<(), coursepath_core::CoreError> {
/// let catalog = InMemoryCatalog::from_json_file(
///     Path::new("catalog.json"),
///     Arc::new(HashingEmbedder::default()),
/// )?;
/// let config = EngineConfig::builder()
///     .data_dir(PathBuf::from(".coursepath"))
///     .build();
/// let engine = Engine::new(config, Arc::new(catalog))?;
///
/// let request = Request::builder()
///     .session_id("thread-1")
///     .query("Help me become a data scientist")
///     .build();
/// let response = engine.respond(request).await?.into_response().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Engine {
    /// CLI-level configuration.
    config: EngineConfig,
    /// Project-level configuration from `config.yaml`.
    project_config: ProjectConfig,
    /// Shared with spawned request tasks.
    agent_runner: Arc<AgentRunner>,
    catalog: Arc<dyn CatalogIndex>,
    embedder: Arc<dyn Embedder>,
    store: SessionStore,
}

impl Engine {
    /// Create an engine generating text with Claude.
    ///
    /// The model is the CLI override, else `agent.model` from `config.yaml`,
    /// else the SDK default.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Yaml` if `config.yaml` exists but is invalid and
    /// `CoreError::Prompt` if prompt templates cannot be loaded.
    #[instrument(skip_all)]
    pub fn new(config: EngineConfig, catalog: Arc<dyn CatalogIndex>) -> Result<Self, CoreError> {
        let project_config = load_project_config(&config.config_path())?;
        let model = config
            .model()
            .map(str::to_owned)
            .or_else(|| project_config.agent.model.clone());
        let generator = Arc::new(ClaudeGenerator::new(model));
        Self::build(
            config,
            project_config,
            catalog,
            generator,
            Arc::new(HashingEmbedder::default()),
        )
    }

    /// Create an engine over explicit collaborators.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    #[instrument(skip_all)]
    pub fn with_collaborators(
        config: EngineConfig,
        catalog: Arc<dyn CatalogIndex>,
        generator: Arc<dyn TextGenerator>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, CoreError> {
        let project_config = load_project_config(&config.config_path())?;
        Self::build(config, project_config, catalog, generator, embedder)
    }

    fn build(
        config: EngineConfig,
        project_config: ProjectConfig,
        catalog: Arc<dyn CatalogIndex>,
        generator: Arc<dyn TextGenerator>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, CoreError> {
        info!(data_dir = %config.data_dir().display(), "initializing engine");
        let agent_runner = AgentRunner::new(&config, &project_config, generator)?;
        let store = SessionStore::new(config.sessions_dir());
        Ok(Self {
            config,
            project_config,
            agent_runner: Arc::new(agent_runner),
            catalog,
            embedder,
            store,
        })
    }

    /// Answer a student request.
    ///
    /// Returns a [`ResponseStream`] of progress events ending with the
    /// response or the error that stopped the request.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidRequest` if the request fails validation.
    #[instrument(skip_all, fields(session = %request.session_id))]
    pub async fn respond(&self, request: Request) -> Result<ResponseStream, CoreError> {
        crate::workflow::run_request(self, request).await
    }

    /// Returns a reference to the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns a reference to the project configuration.
    pub fn project_config(&self) -> &ProjectConfig {
        &self.project_config
    }

    /// Returns the session store.
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Collaborators and settings for a request task.
    pub(crate) fn pipeline_context(&self) -> PipelineContext {
        PipelineContext {
            agent: Arc::clone(&self.agent_runner),
            catalog: Arc::clone(&self.catalog),
            embedder: Arc::clone(&self.embedder),
            retrieval: self.project_config.retrieval.clone(),
            planning: self.project_config.planning.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::events::{Response, ResponseEvent, Stage};
    use crate::test_support::{ScriptedGenerator, course_list_json, sample_catalog};

    fn engine(dir: &tempfile::TempDir, generator: Arc<ScriptedGenerator>) -> Engine {
        let config = EngineConfig::builder()
            .data_dir(dir.path().to_path_buf())
            .build();
        Engine::with_collaborators(
            config,
            Arc::new(sample_catalog()),
            generator,
            Arc::new(HashingEmbedder::default()),
        )
        .expect("should create engine")
    }

    /// Sample catalog whose similarity search goes dry after `searches` calls.
    #[derive(Debug)]
    struct DryingCatalog {
        inner: crate::catalog::InMemoryCatalog,
        searches: std::sync::atomic::AtomicUsize,
    }

    impl DryingCatalog {
        fn new(searches: usize) -> Self {
            Self {
                inner: sample_catalog(),
                searches: std::sync::atomic::AtomicUsize::new(searches),
            }
        }
    }

    impl CatalogIndex for DryingCatalog {
        fn by_numbers(&self, numbers: &[String]) -> Vec<crate::catalog::CatalogRecord> {
            self.inner.by_numbers(numbers)
        }

        fn nearest(
            &self,
            query: &str,
            k: usize,
            collection: crate::catalog::Collection,
        ) -> Vec<crate::catalog::CatalogRecord> {
            use std::sync::atomic::Ordering;
            let left = self
                .searches
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            if left.is_err() {
                return Vec::new();
            }
            self.inner.nearest(query, k, collection)
        }
    }

    fn engine_over(
        dir: &tempfile::TempDir,
        catalog: Arc<dyn CatalogIndex>,
        generator: Arc<ScriptedGenerator>,
    ) -> Engine {
        let config = EngineConfig::builder()
            .data_dir(dir.path().to_path_buf())
            .build();
        Engine::with_collaborators(config, catalog, generator, Arc::new(HashingEmbedder::default()))
            .expect("should create engine")
    }

    fn request(query: &str) -> Request {
        Request::builder()
            .session_id("thread-1")
            .query(query)
            .college(crate::test_support::COLLEGE)
            .department(crate::test_support::DEPARTMENT)
            .core_course_numbers(vec!["ds5110".to_owned()])
            .max_credits(16)
            .max_number_of_plans(2)
            .build()
    }

    fn schedule_reply(semesters: &[&[&str]]) -> String {
        let schedule: Vec<_> = semesters
            .iter()
            .enumerate()
            .map(|(i, courses)| {
                json!({
                    "semester": i + 1,
                    "courses": courses
                        .iter()
                        .map(|n| json!({"course_number": n, "reason": "fits the goal"}))
                        .collect::<Vec<_>>(),
                })
            })
            .collect();
        json!({"semester_schedule": schedule, "reason_behind_planning": "Foundations first."})
            .to_string()
    }

    fn script_planning(generator: &ScriptedGenerator) {
        generator.push("intent", r#"{"intent": "build_schedule"}"#);
        generator.set_default("rephrase", "Data scientist skilled in machine learning and data mining.");
        generator.push("select", course_list_json("courses", &["DS5220", "CS6220", "CS6140"]));
        generator.push("select", course_list_json("courses", &["DS5010", "DS5020", "CS5200"]));
        generator.push(
            "schedule",
            schedule_reply(&[&["DS5110", "DS5220"], &["CS6220", "CS6140"]]),
        );
        generator.push(
            "schedule",
            schedule_reply(&[&["DS5110", "DS5010"], &["DS5020", "CS5200"]]),
        );
    }

    async fn collect(
        engine: &Engine,
        request: Request,
    ) -> (Vec<String>, Result<Response, CoreError>) {
        let mut stream = engine.respond(request).await.expect("should start request");
        let mut labels = Vec::new();
        while let Some(event) = stream.next().await {
            match event {
                ResponseEvent::Completed(response) => return (labels, Ok(*response)),
                ResponseEvent::Error(e) => return (labels, Err(e)),
                other => labels.extend(other.label()),
            }
        }
        (labels, Err(CoreError::Other(anyhow::anyhow!("stream closed"))))
    }

    #[test]
    fn test_should_create_engine_with_project_config() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        std::fs::write(
            dir.path().join("config.yaml"),
            "planning:\n  maxAttemptsPerPlan: 5\nsessions:\n  persist: false\n",
        )
        .expect("should write config");

        let engine = engine(&dir, Arc::new(ScriptedGenerator::default()));
        assert_eq!(engine.project_config().planning.max_attempts_per_plan, 5);
        assert!(!engine.project_config().sessions.persist);
        assert_eq!(engine.store().dir(), dir.path().join("sessions"));
    }

    #[tokio::test]
    async fn test_should_reject_invalid_request_before_starting() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        let engine = engine(&dir, Arc::new(ScriptedGenerator::default()));
        let mut bad = request("plan my degree");
        bad.min_creds_per_sem = 0;
        let result = engine.respond(bad).await;
        assert!(matches!(result, Err(CoreError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_should_build_two_scheduled_plans_end_to_end() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        let generator = Arc::new(ScriptedGenerator::default());
        script_planning(&generator);
        let engine = engine(&dir, generator.clone());

        let (labels, response) = collect(&engine, request("Help me become a data scientist")).await;
        let Response::Schedule { plans } = response.expect("should complete") else {
            panic!("expected a schedule response");
        };

        assert_eq!(plans.len(), 2);
        for plan in &plans {
            assert_eq!(plan.total_credits, 16);
            assert!(plan.credits_met);
            assert_eq!(plan.semesters.len(), 2);
            assert!(plan.contains("DS5110"));
        }
        assert_eq!(plans[0].rationale, "Foundations first.");

        assert_eq!(labels.first().map(String::as_str), Some("Checking User Intent"));
        assert!(labels.contains(&"Working on plan 1/2".to_owned()));
        assert!(labels.contains(&"Working on plan 2/2".to_owned()));
        assert_eq!(labels.last().map(String::as_str), Some("Final Check in Progress"));
        // Both plans were on budget, so reconciliation never asked the generator.
        assert!(generator.calls_for("reconcile").is_empty());

        let stored = engine.store().load("thread-1").expect("session should be saved");
        assert_eq!(stored.semester_plans, plans);
        assert_eq!(stored.core_course_numbers(), vec!["DS5110"]);
    }

    #[tokio::test]
    async fn test_should_stop_selection_after_attempt_limit() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        let generator = Arc::new(ScriptedGenerator::default());
        generator.push("intent", r#"{"intent": "build_schedule"}"#);
        generator.set_default("rephrase", "machine learning");
        generator.set_default("select", course_list_json("courses", &["DS5220", "CS6220", "CS6140"]));
        generator.set_default(
            "schedule",
            schedule_reply(&[&["DS5110", "DS5220"], &["CS6220", "CS6140"]]),
        );
        let engine = engine(&dir, generator.clone());

        let (_, response) = collect(&engine, request("Help me become a data scientist")).await;
        let Response::Schedule { plans } = response.expect("should complete") else {
            panic!("expected a schedule response");
        };
        assert_eq!(plans.len(), 1);
        // Two plans requested, two attempts each.
        assert_eq!(generator.calls_for("select").len(), 4);
    }

    #[tokio::test]
    async fn test_should_skip_attempt_with_empty_retrieval() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        let generator = Arc::new(ScriptedGenerator::default());
        script_planning(&generator);
        // One attempt runs three searches; every later attempt retrieves nothing.
        let engine = engine_over(&dir, Arc::new(DryingCatalog::new(3)), generator.clone());

        let (_, response) = collect(&engine, request("Help me become a data scientist")).await;
        let Response::Schedule { plans } = response.expect("should keep the first plan") else {
            panic!("expected a schedule response");
        };
        assert_eq!(plans.len(), 1);
        assert!(plans[0].contains("DS5220"));
        assert_eq!(generator.calls_for("select").len(), 1);
        assert_eq!(generator.calls_for("rephrase").len(), 4);
    }

    #[tokio::test]
    async fn test_should_fail_when_no_attempt_finds_candidates() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        let generator = Arc::new(ScriptedGenerator::default());
        script_planning(&generator);
        let engine = engine_over(&dir, Arc::new(DryingCatalog::new(0)), generator.clone());

        let (_, response) = collect(&engine, request("Help me become a data scientist")).await;
        assert!(matches!(response, Err(CoreError::EmptyCandidatePool)));
        assert!(generator.calls_for("select").is_empty());
        assert!(engine.store().load("thread-1").is_err());
    }

    #[tokio::test]
    async fn test_should_reschedule_stored_plan() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        let generator = Arc::new(ScriptedGenerator::default());
        script_planning(&generator);
        let engine = engine(&dir, generator.clone());
        let (_, first) = collect(&engine, request("Help me become a data scientist")).await;
        first.expect("planning should complete");

        generator.push(
            "reschedule/extract",
            r#"{"replacements": [{"old": "CS6140", "new": "DS7200"}]}"#,
        );
        generator.push("reschedule/summary", "Deep learning now rounds out the plan.");
        let (labels, response) =
            collect(&engine, request("Reschedule plan 1 and swap CS6140 for DS7200")).await;
        let Response::Rescheduled {
            plan,
            replaced,
            summary,
        } = response.expect("should complete")
        else {
            panic!("expected a rescheduled response");
        };

        assert_eq!(plan.plan_number, 1);
        assert!(plan.contains("DS7200"));
        assert!(!plan.contains("CS6140"));
        assert_eq!(plan.total_credits, 15);
        assert!(!plan.credits_met);
        assert_eq!(replaced.len(), 1);
        assert!(summary.contains("CS6140 - Machine Learning ---> DS7200 - Deep Learning"));
        assert!(labels.contains(&Stage::ReplaceCourses.label().to_owned()));
        // The explicit request never reaches the intent classifier.
        assert_eq!(generator.calls_for("intent").len(), 1);

        let stored = engine.store().load("thread-1").expect("session should be saved");
        assert_eq!(stored.semester_plans[0], plan);
        assert!(stored.pending_replacements.is_empty());
    }

    #[tokio::test]
    async fn test_should_fail_reschedule_without_session() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        let engine = engine(&dir, Arc::new(ScriptedGenerator::default()));
        let (_, response) = collect(&engine, request("reschedule plan 2")).await;
        assert!(matches!(response, Err(CoreError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_should_report_unknown_core_courses() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        let generator = Arc::new(ScriptedGenerator::default());
        generator.push("intent", r#"{"intent": "build_schedule"}"#);
        let engine = engine(&dir, generator);

        let mut req = request("plan my degree");
        req.core_course_numbers = vec!["DS5110".to_owned(), "ZZ1000".to_owned()];
        let (_, response) = collect(&engine, req).await;
        match response {
            Err(CoreError::UnknownCoreCourses(missing)) => assert_eq!(missing, vec!["ZZ1000"]),
            other => panic!("expected unknown core courses, got {other:?}"),
        }
        assert!(engine.store().load("thread-1").is_err());
    }

    #[tokio::test]
    async fn test_should_answer_greeting() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        let generator = Arc::new(ScriptedGenerator::default());
        generator.push("intent", r#"{"intent": "greeting"}"#);
        generator.push("greeting", "Hello! Ask me about courses or plans.");
        let engine = engine(&dir, generator);

        let (_, response) = collect(&engine, request("Hi there")).await;
        match response.expect("should complete") {
            Response::Greeting { message } => {
                assert_eq!(message, "Hello! Ask me about courses or plans.");
            }
            other => panic!("expected a greeting, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_should_surface_generation_failure() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        let engine = engine(&dir, Arc::new(ScriptedGenerator::default()));
        let (labels, response) = collect(&engine, request("Help me plan")).await;
        assert!(matches!(response, Err(CoreError::Generation(_))));
        assert_eq!(labels, vec!["Checking User Intent"]);
    }
}
