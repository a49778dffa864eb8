//! Intent routing.
//!
//! Explicit "reschedule plan N" requests are recognised with a regex and never
//! reach the generator; everything else is classified by the `intent` prompt.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::agent::AgentRunner;
use crate::error::CoreError;

static RESCHEDULE_REQUEST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(reschedule|restructure)\s+(plan|schedule)\s+(\d+)").expect("valid regex")
});

/// What the student is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Greeting,
    CourseDetails,
    BuildSchedule,
    ShortTermPlanning,
    /// Edit the given 1-based plan of the stored session.
    Reschedule(usize),
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Greeting => f.write_str("greeting"),
            Self::CourseDetails => f.write_str("course_details"),
            Self::BuildSchedule => f.write_str("build_schedule"),
            Self::ShortTermPlanning => f.write_str("short_term_planning"),
            Self::Reschedule(n) => write!(f, "reschedule_{n}"),
        }
    }
}

impl FromStr for Intent {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "greeting" => Ok(Self::Greeting),
            "course_details" => Ok(Self::CourseDetails),
            "build_schedule" => Ok(Self::BuildSchedule),
            "short_term_planning" => Ok(Self::ShortTermPlanning),
            other => other
                .strip_prefix("reschedule_")
                .and_then(|n| n.parse::<usize>().ok())
                .filter(|n| *n > 0)
                .map(Self::Reschedule)
                .ok_or_else(|| CoreError::UnknownIntent(s.to_owned())),
        }
    }
}

/// Detect an explicit reschedule request ("restructure schedule 2").
pub fn detect_reschedule(query: &str) -> Option<Intent> {
    let captures = RESCHEDULE_REQUEST.captures(query)?;
    captures[3]
        .parse::<usize>()
        .ok()
        .filter(|n| *n > 0)
        .map(Intent::Reschedule)
}

#[derive(Debug, Deserialize)]
struct IntentReply {
    intent: String,
}

/// Classify `query`, consulting the generator only when no explicit
/// reschedule request is present.
///
/// # Errors
///
/// Returns `CoreError::UnknownIntent` if the generator names an intent that
/// does not exist, plus generation errors.
#[instrument(skip(agent))]
pub(crate) async fn classify(agent: &AgentRunner, query: &str) -> Result<Intent, CoreError> {
    if let Some(intent) = detect_reschedule(query) {
        debug!(%intent, "explicit reschedule request");
        return Ok(intent);
    }
    let reply: IntentReply = agent.json("intent", &json!({ "query": query }), 0.0).await?;
    let intent = reply.intent.parse()?;
    debug!(%intent, "classified");
    Ok(intent)
}
