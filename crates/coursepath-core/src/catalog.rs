//! Course catalog index.
//!
//! The pipeline consumes the catalog through [`CatalogIndex`]: an exact lookup
//! by course numbers and a nearest-neighbour lookup by free text. Lookups
//! return raw [`CatalogRecord`]s; conversion into [`Course`] happens once, in
//! [`into_courses`], which skips malformed records instead of failing.
//!
//! [`InMemoryCatalog`] is the bundled implementation, loaded from a JSON array
//! of records and ranked with an [`Embedder`].

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::course::{Course, CreditHours, RawCredits, dept_code_of};
use crate::embed::{Embedder, cosine_similarity};
use crate::error::CoreError;

/// The catalog holds regular courses and special-topics offerings in
/// separate collections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Collection {
    #[default]
    Regular,
    SpecialTopics,
}

impl Collection {
    /// Collection a title lookup should search: titles starting with
    /// "special" or "topics" go to [`Collection::SpecialTopics`].
    pub fn for_title(title: &str) -> Self {
        let lowered = title.trim_start().to_lowercase();
        if lowered.starts_with("special") || lowered.starts_with("topics") {
            Self::SpecialTopics
        } else {
            Self::Regular
        }
    }
}

/// A catalog entry as stored in the index. Every field is optional; see
/// [`Course::try_from`] for which ones a usable course needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogRecord {
    #[serde(default)]
    pub course_number: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub credit_hours: Option<RawCredits>,
    #[serde(default)]
    pub college: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub dept_code: Option<String>,
    #[serde(default)]
    pub prerequisites: Option<String>,
    #[serde(default)]
    pub collection: Collection,
}

impl CatalogRecord {
    /// Text the index embeds for nearest-neighbour lookups.
    fn search_text(&self) -> String {
        format!(
            "{} - {} - {}",
            self.course_number.as_deref().unwrap_or_default(),
            self.title.as_deref().unwrap_or_default(),
            self.description.as_deref().unwrap_or_default()
        )
    }

    fn number_matches(&self, number: &str) -> bool {
        self.course_number
            .as_deref()
            .is_some_and(|n| n.trim().eq_ignore_ascii_case(number.trim()))
    }
}

impl TryFrom<CatalogRecord> for Course {
    type Error = CoreError;

    fn try_from(record: CatalogRecord) -> Result<Self, Self::Error> {
        fn required(value: Option<String>, field: &str) -> Result<String, CoreError> {
            value
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| CoreError::MalformedRecord(format!("missing {field}")))
        }

        let course_number = required(record.course_number, "course_number")?.to_ascii_uppercase();
        let title = required(record.title, "title")?;
        let credit_hours: CreditHours = record
            .credit_hours
            .ok_or_else(|| {
                CoreError::MalformedRecord(format!("{course_number}: missing credit_hours"))
            })?
            .try_into()?;
        let college = required(record.college, "college")?;
        let department = required(record.department, "department")?;
        let dept_code = record
            .dept_code
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| dept_code_of(&course_number));

        Ok(Self {
            course_number,
            title,
            description: record.description.unwrap_or_default(),
            credit_hours,
            college,
            department,
            dept_code,
            prerequisites: record.prerequisites.unwrap_or_default(),
        })
    }
}

/// Convert records to courses, skipping malformed ones.
pub fn into_courses(records: Vec<CatalogRecord>) -> Vec<Course> {
    records
        .into_iter()
        .filter_map(|record| match Course::try_from(record) {
            Ok(course) => Some(course),
            Err(e) => {
                debug!(error = %e, "skipping catalog record");
                None
            }
        })
        .collect()
}

/// Lookup operations the pipeline needs from a course catalog.
///
/// Both operations return an empty list rather than an error when nothing
/// matches.
pub trait CatalogIndex: Send + Sync + fmt::Debug {
    /// Records whose course number matches one of `numbers`, in request order.
    fn by_numbers(&self, numbers: &[String]) -> Vec<CatalogRecord>;

    /// The `k` records of `collection` most similar to `query`, best first.
    fn nearest(&self, query: &str, k: usize, collection: Collection) -> Vec<CatalogRecord>;
}

/// Catalog held in memory, searched by brute-force cosine similarity.
#[derive(Debug)]
pub struct InMemoryCatalog {
    records: Vec<CatalogRecord>,
    vectors: Vec<Vec<f32>>,
    embedder: Arc<dyn Embedder>,
}

impl InMemoryCatalog {
    /// Build an index over `records`, embedding each one up front.
    pub fn new(records: Vec<CatalogRecord>, embedder: Arc<dyn Embedder>) -> Self {
        let vectors = records
            .iter()
            .map(|r| embedder.embed(&r.search_text()))
            .collect();
        Self {
            records,
            vectors,
            embedder,
        }
    }

    /// Load a catalog from a JSON file holding an array of records.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Catalog` if the file cannot be read or is not a
    /// JSON array. Array entries that are not records are skipped.
    #[instrument(skip(embedder))]
    pub fn from_json_file(path: &Path, embedder: Arc<dyn Embedder>) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Catalog(format!("failed to read {}: {e}", path.display()))
        })?;
        let values: Vec<serde_json::Value> = serde_json::from_str(&content).map_err(|e| {
            CoreError::Catalog(format!("failed to parse {}: {e}", path.display()))
        })?;
        let total = values.len();
        let records: Vec<CatalogRecord> = values
            .into_iter()
            .filter_map(|v| match serde_json::from_value(v) {
                Ok(record) => Some(record),
                Err(e) => {
                    debug!(error = %e, "skipping unreadable catalog record");
                    None
                }
            })
            .collect();
        info!(records = records.len(), skipped = total - records.len(), "catalog loaded");
        Ok(Self::new(records, embedder))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl CatalogIndex for InMemoryCatalog {
    fn by_numbers(&self, numbers: &[String]) -> Vec<CatalogRecord> {
        numbers
            .iter()
            .filter_map(|n| self.records.iter().find(|r| r.number_matches(n)))
            .cloned()
            .collect()
    }

    fn nearest(&self, query: &str, k: usize, collection: Collection) -> Vec<CatalogRecord> {
        if k == 0 {
            return Vec::new();
        }
        let query_vec = self.embedder.embed(query);
        let mut scored: Vec<(usize, f32)> = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.collection == collection)
            .map(|(i, _)| (i, cosine_similarity(&query_vec, &self.vectors[i])))
            .collect();
        // Stable sort keeps catalog order among equal scores.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored
            .into_iter()
            .take(k)
            .map(|(i, _)| self.records[i].clone())
            .collect()
    }
}
