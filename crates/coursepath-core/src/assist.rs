//! Conversational operations outside plan construction: greetings, course
//! details and short-term "what next" suggestions.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::catalog::{CatalogRecord, Collection, into_courses};
use crate::course::Course;
use crate::error::CoreError;
use crate::pipeline::{PipelineContext, courses_json};
use crate::session::Request;

/// A course recommended for the next term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub course: Course,
    /// Short summary in the advisor's words.
    pub description: String,
}

#[derive(Debug, Deserialize)]
struct TopicsReply {
    #[serde(default)]
    topics: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SuggestionRef {
    course_number: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ShortTermReply {
    #[serde(default)]
    suggestions: Vec<SuggestionRef>,
    #[serde(default)]
    explanation: String,
}

/// Reply to a greeting.
///
/// # Errors
///
/// Returns prompt and generation errors.
#[instrument(skip_all)]
pub(crate) async fn greet(ctx: &PipelineContext, request: &Request) -> Result<String, CoreError> {
    ctx.agent
        .text("greeting", &json!({ "query": request.query }), 0.7)
        .await
}

fn lookup_titles(ctx: &PipelineContext, titles: &[String]) -> Vec<CatalogRecord> {
    titles
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .flat_map(|t| ctx.catalog.nearest(t, ctx.retrieval.title_top_k, Collection::for_title(t)))
        .collect()
}

/// Course numbers and titles the student referred to.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct CourseReferences {
    #[serde(default)]
    course_numbers: Vec<String>,
    #[serde(default)]
    course_titles: Vec<String>,
}

/// Extract the courses a details question refers to.
///
/// # Errors
///
/// Returns `CoreError::MalformedResponse` for bad generator output, plus
/// prompt and generation errors.
#[instrument(skip_all)]
pub(crate) async fn extract_course_references(
    ctx: &PipelineContext,
    request: &Request,
) -> Result<CourseReferences, CoreError> {
    let context = json!({
        "query": request.query,
        "college": request.college,
        "dept_code": request.department,
    });
    let refs: CourseReferences = ctx.agent.json("details/extract", &context, 0.0).await?;
    debug!(
        numbers = refs.course_numbers.len(),
        titles = refs.course_titles.len(),
        "course references extracted"
    );
    Ok(refs)
}

/// Look up referenced courses by number, then by title.
pub(crate) fn lookup_course_references(ctx: &PipelineContext, refs: &CourseReferences) -> Vec<Course> {
    let numbers: Vec<String> = refs
        .course_numbers
        .iter()
        .map(|n| n.trim().to_ascii_uppercase())
        .filter(|n| !n.is_empty())
        .collect();
    let mut records = ctx.catalog.by_numbers(&numbers);
    records.extend(lookup_titles(ctx, &refs.course_titles));
    into_courses(records)
}

/// De-duplicate and order courses: the student's department first, then the
/// student's college, then everything else; within a group by department
/// and course number.
pub(crate) fn rank_courses(courses: Vec<Course>, college: &str, department: &str) -> Vec<Course> {
    let mut seen = HashSet::new();
    let mut courses: Vec<Course> = courses
        .into_iter()
        .filter(|c| {
            seen.insert((
                c.course_number.to_ascii_uppercase(),
                c.title.to_lowercase(),
            ))
        })
        .collect();

    let group = |c: &Course| {
        if !department.is_empty() && c.department.eq_ignore_ascii_case(department) {
            0
        } else if !college.is_empty() && c.college.eq_ignore_ascii_case(college) {
            1
        } else {
            2
        }
    };
    courses.sort_by(|a, b| {
        group(a)
            .cmp(&group(b))
            .then_with(|| a.department.cmp(&b.department))
            .then_with(|| a.course_number.cmp(&b.course_number))
    });
    courses
}

/// Propose advanced topics the student has not covered yet.
///
/// # Errors
///
/// Returns `CoreError::MalformedResponse` for bad generator output, plus
/// prompt and generation errors.
#[instrument(skip_all)]
pub(crate) async fn propose_topics(
    ctx: &PipelineContext,
    request: &Request,
) -> Result<Vec<String>, CoreError> {
    let context = json!({
        "query": request.query,
        "college": request.college,
        "department": request.department,
    });
    let reply: TopicsReply = ctx.agent.json("shortterm/topics", &context, 0.5).await?;
    debug!(topics = reply.topics.len(), "topics proposed");
    Ok(reply.topics)
}

/// Catalog courses matching the proposed topics, unique by course number.
pub(crate) fn lookup_topics(ctx: &PipelineContext, topics: &[String]) -> Vec<Course> {
    let mut seen = HashSet::new();
    into_courses(lookup_titles(ctx, topics))
        .into_iter()
        .filter(|c| seen.insert(c.course_number.clone()))
        .collect()
}

/// Pick and order the next courses from `pool`.
///
/// Suggestions naming a course outside `pool` are discarded and the list is
/// capped at `maxShortTermSuggestions`.
///
/// # Errors
///
/// Returns `CoreError::MalformedResponse` for bad generator output, plus
/// prompt and generation errors.
#[instrument(skip_all, fields(pool = pool.len()))]
pub(crate) async fn build_short_term_plan(
    ctx: &PipelineContext,
    request: &Request,
    pool: &[Course],
) -> Result<(Vec<Suggestion>, String), CoreError> {
    let max_suggestions = ctx.planning.max_short_term_suggestions;
    let context = json!({
        "query": request.query,
        "college": request.college,
        "department": request.department,
        "max_suggestions": max_suggestions,
        "courses_json": courses_json(&pool),
    });
    let reply: ShortTermReply = ctx.agent.json("shortterm/build", &context, 0.3).await?;

    let mut chosen = HashSet::new();
    let mut suggestions = Vec::new();
    for item in reply.suggestions {
        if suggestions.len() >= max_suggestions {
            break;
        }
        let number = item.course_number.trim().to_ascii_uppercase();
        let Some(course) = pool.iter().find(|c| c.course_number == number) else {
            warn!(course = %number, "dropping suggestion outside the looked-up courses");
            continue;
        };
        if chosen.insert(number) {
            suggestions.push(Suggestion {
                course: course.clone(),
                description: item.description.trim().to_owned(),
            });
        }
    }
    info!(count = suggestions.len(), "short-term plan built");
    Ok((suggestions, reply.explanation.trim().to_owned()))
}
