//! Fixtures shared by unit tests: a small catalog and a scripted generator.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::agent::AgentRunner;
use crate::catalog::{CatalogRecord, Collection, InMemoryCatalog, into_courses};
use crate::config::{EngineConfig, ProjectConfig};
use crate::course::{Course, CourseRole, CreditHours, RawCredits, ScheduledCourse, dept_code_of};
use crate::embed::HashingEmbedder;
use crate::error::CoreError;
use crate::generate::{GenerationRequest, TextGenerator};
use crate::pipeline::PipelineContext;

pub(crate) const COLLEGE: &str = "Khoury College of Computer Sciences";
pub(crate) const DEPARTMENT: &str = "Data Science";

/// A course with default college and department.
pub(crate) fn course(number: &str, title: &str, credits: u32) -> Course {
    Course {
        course_number: number.to_owned(),
        title: title.to_owned(),
        description: String::new(),
        credit_hours: CreditHours::Exact(credits),
        college: COLLEGE.to_owned(),
        department: DEPARTMENT.to_owned(),
        dept_code: dept_code_of(number),
        prerequisites: String::new(),
    }
}

pub(crate) fn scheduled(number: &str, credits: u32, role: CourseRole) -> ScheduledCourse {
    ScheduledCourse::new(course(number, number, credits), role, "")
}

fn record(
    number: &str,
    title: &str,
    description: &str,
    credits: &str,
    prerequisites: &str,
    collection: Collection,
) -> CatalogRecord {
    CatalogRecord {
        course_number: Some(number.to_owned()),
        title: Some(title.to_owned()),
        description: Some(description.to_owned()),
        credit_hours: Some(RawCredits::Text(credits.to_owned())),
        college: Some(COLLEGE.to_owned()),
        department: Some(DEPARTMENT.to_owned()),
        dept_code: None,
        prerequisites: Some(prerequisites.to_owned()),
        collection,
    }
}

pub(crate) fn sample_records() -> Vec<CatalogRecord> {
    use Collection::{Regular, SpecialTopics};

    let mut records = vec![
        record(
            "DS5010",
            "Introduction to Programming for Data Science",
            "Python programming fundamentals for data analysis.",
            "4",
            "",
            Regular,
        ),
        record(
            "DS5020",
            "Introduction to Linear Algebra and Probability for Data Science",
            "Vectors, matrices, probability and statistics foundations.",
            "4",
            "",
            Regular,
        ),
        record(
            "DS5110",
            "Introduction to Data Management and Processing",
            "Relational databases, SQL, data wrangling and pipelines.",
            "4",
            "",
            Regular,
        ),
        record(
            "DS5220",
            "Supervised Machine Learning and Learning Theory",
            "Covers supervised learning methods such as regression and classification.",
            "4",
            "DS5020",
            Regular,
        ),
        record(
            "DS5230",
            "Unsupervised Machine Learning and Data Mining",
            "Clustering, dimensionality reduction and association rules.",
            "3",
            "DS5020",
            Regular,
        ),
        record(
            "DS5500",
            "Data Science Capstone",
            "Team project applying data science to a real problem.",
            "4",
            "DS5220",
            Regular,
        ),
        record(
            "DS7200",
            "Deep Learning",
            "Neural networks, convolutional and recurrent architectures.",
            "3",
            "DS5220",
            Regular,
        ),
        record(
            "CS6220",
            "Data Mining Techniques",
            "Frequent patterns, classification, clustering and outlier detection.",
            "4",
            "",
            Regular,
        ),
        record(
            "CS6140",
            "Machine Learning",
            "Broad introduction to machine learning.",
            "4",
            "",
            Regular,
        ),
        record(
            "CS5200",
            "Database Management Systems",
            "Database design, query processing and transactions.",
            "4",
            "",
            Regular,
        ),
        record(
            "DS5999",
            "Data Science Seminar",
            "Weekly research talks.",
            "0",
            "",
            Regular,
        ),
        record(
            "DS5983",
            "Special Topics in Data Science: Large Language Models",
            "Transformers, prompting and fine-tuning of language models.",
            "2 TO 4",
            "",
            SpecialTopics,
        ),
    ];
    // Missing college: skipped at conversion.
    records.push(CatalogRecord {
        course_number: Some("DS9000".to_owned()),
        title: Some("Orphan Course".to_owned()),
        credit_hours: Some(RawCredits::Number(4)),
        department: Some(DEPARTMENT.to_owned()),
        ..Default::default()
    });
    records
}

pub(crate) fn sample_catalog() -> InMemoryCatalog {
    InMemoryCatalog::new(sample_records(), Arc::new(HashingEmbedder::default()))
}

/// A course from the sample catalog by number.
pub(crate) fn catalog_course(number: &str) -> Course {
    into_courses(sample_records())
        .into_iter()
        .find(|c| c.course_number == number)
        .unwrap_or_else(|| panic!("{number} should be in the sample catalog"))
}

/// Generator returning canned responses per stage.
///
/// Queued responses are consumed first; once a stage's queue is empty its
/// default response (if any) is returned on every call.
#[derive(Debug, Default)]
pub(crate) struct ScriptedGenerator {
    queued: Mutex<HashMap<String, VecDeque<String>>>,
    defaults: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub(crate) fn push(&self, stage: &str, response: impl Into<String>) {
        self.queued
            .lock()
            .expect("lock should not be poisoned")
            .entry(stage.to_owned())
            .or_default()
            .push_back(response.into());
    }

    pub(crate) fn set_default(&self, stage: &str, response: impl Into<String>) {
        self.defaults
            .lock()
            .expect("lock should not be poisoned")
            .insert(stage.to_owned(), response.into());
    }

    pub(crate) fn calls(&self) -> Vec<GenerationRequest> {
        self.calls
            .lock()
            .expect("lock should not be poisoned")
            .clone()
    }

    pub(crate) fn calls_for(&self, stage: &str) -> Vec<GenerationRequest> {
        self.calls()
            .into_iter()
            .filter(|c| c.stage == stage)
            .collect()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, CoreError> {
        let stage = request.stage.clone();
        self.calls
            .lock()
            .expect("lock should not be poisoned")
            .push(request);

        let queued = self
            .queued
            .lock()
            .expect("lock should not be poisoned")
            .get_mut(&stage)
            .and_then(VecDeque::pop_front);
        if let Some(response) = queued {
            return Ok(response);
        }
        self.defaults
            .lock()
            .expect("lock should not be poisoned")
            .get(&stage)
            .cloned()
            .ok_or_else(|| CoreError::Generation(format!("no scripted response for {stage}")))
    }
}

/// Pipeline context over the sample catalog and `generator`.
pub(crate) fn pipeline_context(generator: Arc<ScriptedGenerator>) -> PipelineContext {
    let config = EngineConfig::builder()
        .data_dir(PathBuf::from("/tmp/coursepath-test"))
        .build();
    let project = ProjectConfig::default();
    let agent = AgentRunner::new(&config, &project, generator).expect("should create runner");
    PipelineContext {
        agent: Arc::new(agent),
        catalog: Arc::new(sample_catalog()),
        embedder: Arc::new(HashingEmbedder::default()),
        retrieval: project.retrieval.clone(),
        planning: project.planning.clone(),
    }
}

/// JSON object listing `numbers` as `{"<key>": [{"course_number": ..}]}`.
pub(crate) fn course_list_json(key: &str, numbers: &[&str]) -> String {
    let courses: Vec<_> = numbers
        .iter()
        .map(|n| serde_json::json!({ "course_number": n }))
        .collect();
    serde_json::json!({ key: courses }).to_string()
}
