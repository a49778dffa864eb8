//! Prompt template sources.
//!
//! Built-in templates are compiled into the binary; [`PromptTemplate`] is the
//! common representation for both built-in and on-disk overrides.

use serde::{Deserialize, Serialize};

/// A prompt template and the name used to look it up (e.g. `reschedule/extract`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Template name used for lookup.
    pub name: String,

    /// Raw Jinja2 template source.
    pub source: String,
}

impl PromptTemplate {
    /// Create a template from a name and its source.
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }
}

macro_rules! builtin {
    ($name:literal) => {
        ($name, include_str!(concat!("../templates/", $name, ".j2")))
    };
}

/// Templates shipped with the crate, keyed by lookup name.
pub(crate) const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    builtin!("intent"),
    builtin!("greeting"),
    builtin!("rephrase"),
    builtin!("select"),
    builtin!("reconcile"),
    builtin!("schedule"),
    builtin!("reschedule/extract"),
    builtin!("reschedule/summary"),
    builtin!("details/extract"),
    builtin!("shortterm/topics"),
    builtin!("shortterm/build"),
];
