//! Course data model.
//!
//! A [`Course`] is an immutable catalog entry. Credit hours are parsed once,
//! at the catalog boundary, into [`CreditHours`]; everything downstream works
//! with the integer [`Course::credits`] value.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Course numbers embedded in free text ("DS 5110", "CS6220").
static COURSE_NUMBER_IN_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z]{2,5})\s?(\d{4})\b").expect("valid regex"));

// ── Credit hours ─────────────────────────────────────────────

/// Credit hours of a course: a single value or a variable range.
///
/// Parsed from catalog strings such as `"4"`, `"2 TO 4"` or `"3 or 4"`. A
/// range counts as its last written value everywhere credits are summed,
/// which is the upper bound for the usual ascending ranges.
///
/// ```
/// use coursepath_core::CreditHours;
///
/// let credits: CreditHours = "1 TO 4".parse().expect("valid credits");
/// assert_eq!(credits.value(), 4);
/// assert_eq!(credits.to_string(), "1 TO 4");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawCredits", into = "String")]
pub enum CreditHours {
    Exact(u32),
    Range { from: u32, to: u32 },
}

impl CreditHours {
    /// The credit value used for all totals (last value of a range).
    pub fn value(&self) -> u32 {
        match *self {
            Self::Exact(n) => n,
            Self::Range { to, .. } => to,
        }
    }
}

impl FromStr for CreditHours {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || CoreError::MalformedRecord(format!("invalid credit hours: {s:?}"));
        let tokens: Vec<String> = s
            .split_whitespace()
            .map(str::to_ascii_uppercase)
            .collect();

        match tokens.as_slice() {
            [single] => single.parse().map(Self::Exact).map_err(|_| malformed()),
            [first, .., last]
                if tokens.iter().any(|t| t == "TO" || t == "OR") =>
            {
                let from: u32 = first.parse().map_err(|_| malformed())?;
                let to: u32 = last.parse().map_err(|_| malformed())?;
                if from == to {
                    Ok(Self::Exact(to))
                } else {
                    Ok(Self::Range { from, to })
                }
            }
            _ => Err(malformed()),
        }
    }
}

impl fmt::Display for CreditHours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(n) => write!(f, "{n}"),
            Self::Range { from, to } => write!(f, "{from} TO {to}"),
        }
    }
}

impl From<CreditHours> for String {
    fn from(credits: CreditHours) -> Self {
        credits.to_string()
    }
}

/// Credit hours as they appear in catalog files and generated JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawCredits {
    Number(u32),
    Text(String),
}

impl TryFrom<RawCredits> for CreditHours {
    type Error = CoreError;

    fn try_from(raw: RawCredits) -> Result<Self, Self::Error> {
        match raw {
            RawCredits::Number(n) => Ok(Self::Exact(n)),
            RawCredits::Text(s) => s.parse(),
        }
    }
}

// ── Course ───────────────────────────────────────────────────

/// A catalog course. `course_number` is the unique key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub course_number: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub credit_hours: CreditHours,
    #[serde(default)]
    pub college: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub dept_code: String,
    #[serde(default)]
    pub prerequisites: String,
}

impl Course {
    /// Credit value of this course.
    pub fn credits(&self) -> u32 {
        self.credit_hours.value()
    }

    /// Text compared when ranking courses by similarity.
    pub fn similarity_text(&self) -> String {
        format!(
            "{} - {} - {}",
            self.course_number, self.title, self.description
        )
    }

    /// Course numbers mentioned in the prerequisites text.
    pub fn prerequisite_numbers(&self) -> Vec<String> {
        COURSE_NUMBER_IN_TEXT
            .captures_iter(&self.prerequisites)
            .map(|c| format!("{}{}", &c[1], &c[2]))
            .collect()
    }

    /// Whether this looks like a capstone, project or thesis course.
    pub fn is_capstone(&self) -> bool {
        let title = self.title.to_lowercase();
        ["capstone", "project", "thesis"]
            .iter()
            .any(|kw| title.contains(kw))
    }

    /// Level digit of the course number (5 for `DS5110`), if present.
    pub fn level(&self) -> Option<u32> {
        self.course_number
            .chars()
            .find(char::is_ascii_digit)
            .and_then(|c| c.to_digit(10))
    }
}

/// Sum of credits over a list of courses.
pub fn total_credits<'a>(courses: impl IntoIterator<Item = &'a Course>) -> u32 {
    courses.into_iter().map(Course::credits).sum()
}

/// Leading letters of a course number (`DS` for `DS5110`).
pub fn dept_code_of(course_number: &str) -> String {
    course_number
        .chars()
        .take_while(char::is_ascii_alphabetic)
        .collect()
}

// ── Scheduled course ─────────────────────────────────────────

/// Whether a scheduled course is a required core course or an elective.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CourseRole {
    Core,
    #[default]
    Elective,
}

/// A course placed in a semester, with its role and the reason it was chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledCourse {
    pub course: Course,
    pub role: CourseRole,
    #[serde(default)]
    pub reason: String,
}

impl ScheduledCourse {
    pub fn new(course: Course, role: CourseRole, reason: impl Into<String>) -> Self {
        Self {
            course,
            role,
            reason: reason.into(),
        }
    }

    pub fn course_number(&self) -> &str {
        &self.course.course_number
    }

    pub fn credits(&self) -> u32 {
        self.course.credits()
    }
}
