use std::collections::BTreeSet;
use std::path::Path;

use minijinja::{Environment, UndefinedBehavior};
use tracing::{debug, instrument};

use crate::error::PmError;
use crate::template::{BUILTIN_TEMPLATES, PromptTemplate};

/// Extensions recognised when loading a template directory.
const TEMPLATE_EXTENSIONS: &[&str] = &["j2", "jinja"];

/// Manages prompt templates and renders them with context variables.
///
/// A new manager starts with the built-in templates. Templates loaded later
/// with the same name replace the built-in version, which is how
/// `prompts.include` directories override prompts.
#[derive(Debug)]
pub struct PromptManager {
    env: Environment<'static>,
    names: BTreeSet<String>,
}

impl PromptManager {
    /// Create a manager pre-loaded with the built-in templates.
    ///
    /// # Errors
    ///
    /// Returns `PmError::InvalidTemplate` if a built-in template fails to parse.
    pub fn new() -> Result<Self, PmError> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_trim_blocks(true);

        let mut manager = Self {
            env,
            names: BTreeSet::new(),
        };
        for (name, source) in BUILTIN_TEMPLATES {
            manager.add_template(PromptTemplate::new(*name, *source))?;
        }
        Ok(manager)
    }

    /// Load all `.j2` / `.jinja` templates from a directory, recursively.
    ///
    /// The template name is the path relative to `dir` without its extension,
    /// using `/` as separator (`dir/reschedule/extract.j2` → `reschedule/extract`).
    ///
    /// # Errors
    ///
    /// Returns `PmError::Io` if the directory cannot be read and
    /// `PmError::InvalidTemplate` if a template fails to parse.
    #[instrument(skip(self))]
    pub fn load_dir(&mut self, dir: &Path) -> Result<(), PmError> {
        self.load_dir_with_prefix(dir, "")
    }

    fn load_dir_with_prefix(&mut self, dir: &Path, prefix: &str) -> Result<(), PmError> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            if path.is_dir() {
                let nested = format!("{prefix}{stem}/");
                self.load_dir_with_prefix(&path, &nested)?;
                continue;
            }

            let is_template = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| TEMPLATE_EXTENSIONS.contains(&e));
            if !is_template {
                continue;
            }

            let source = std::fs::read_to_string(&path)?;
            let name = format!("{prefix}{stem}");
            debug!(name = %name, path = %path.display(), "loaded template override");
            self.add_template(PromptTemplate::new(name, source))?;
        }
        Ok(())
    }

    /// Register a single template, replacing any template with the same name.
    ///
    /// # Errors
    ///
    /// Returns `PmError::InvalidTemplate` if the source fails to parse.
    pub fn add_template(&mut self, template: PromptTemplate) -> Result<(), PmError> {
        let PromptTemplate { name, source } = template;
        self.env
            .add_template_owned(name.clone(), source)
            .map_err(|e| PmError::InvalidTemplate {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        self.names.insert(name);
        Ok(())
    }

    /// Render a template by name with the given context.
    ///
    /// # Errors
    ///
    /// Returns `PmError::TemplateNotFound` for an unknown name and
    /// `PmError::RenderError` when rendering fails (including a variable
    /// missing from the context).
    pub fn render(&self, name: &str, ctx: &serde_json::Value) -> Result<String, PmError> {
        if !self.names.contains(name) {
            return Err(PmError::TemplateNotFound(name.to_owned()));
        }
        let template = self
            .env
            .get_template(name)
            .map_err(|_| PmError::TemplateNotFound(name.to_owned()))?;
        template.render(ctx).map_err(|e| PmError::RenderError {
            name: name.to_owned(),
            reason: e.to_string(),
        })
    }

    /// Names of all registered templates, sorted.
    pub fn list_templates(&self) -> Vec<&str> {
        self.names.iter().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_should_load_all_builtin_templates() {
        let pm = PromptManager::new().expect("builtins should parse");
        let names = pm.list_templates();
        assert_eq!(names.len(), BUILTIN_TEMPLATES.len());
        assert!(names.contains(&"schedule"));
        assert!(names.contains(&"reschedule/extract"));
    }

    #[test]
    fn test_should_render_rephrase_template() {
        let pm = PromptManager::new().expect("should create manager");
        let out = pm
            .render(
                "rephrase",
                &json!({
                    "query": "become a data scientist",
                    "college": "Khoury College",
                    "department": "Data Science",
                }),
            )
            .expect("should render");
        assert!(out.contains("become a data scientist"));
        assert!(out.contains("Data Science"));
    }

    #[test]
    fn test_should_fail_on_missing_variable() {
        let pm = PromptManager::new().expect("should create manager");
        let result = pm.render("rephrase", &json!({"query": "x"}));
        assert!(matches!(result, Err(PmError::RenderError { .. })));
    }

    #[test]
    fn test_should_return_not_found_for_unknown_template() {
        let pm = PromptManager::new().expect("should create manager");
        let result = pm.render("does/not/exist", &json!({}));
        assert!(matches!(result, Err(PmError::TemplateNotFound(_))));
    }

    #[test]
    fn test_should_override_builtin_from_directory() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        std::fs::create_dir_all(dir.path().join("reschedule")).expect("should create dir");
        std::fs::write(dir.path().join("greeting.j2"), "Hello {{ query }}!")
            .expect("should write");
        std::fs::write(
            dir.path().join("reschedule").join("summary.jinja"),
            "custom summary",
        )
        .expect("should write");
        std::fs::write(dir.path().join("notes.txt"), "ignored").expect("should write");

        let mut pm = PromptManager::new().expect("should create manager");
        pm.load_dir(dir.path()).expect("should load dir");

        let out = pm
            .render("greeting", &json!({"query": "there"}))
            .expect("should render");
        assert_eq!(out, "Hello there!");
        let out = pm
            .render("reschedule/summary", &json!({}))
            .expect("should render");
        assert_eq!(out, "custom summary");
        assert!(!pm.list_templates().contains(&"notes"));
    }

    #[test]
    fn test_should_reject_invalid_template() {
        let mut pm = PromptManager::new().expect("should create manager");
        let result = pm.add_template(PromptTemplate::new("broken", "{% if %}"));
        assert!(matches!(result, Err(PmError::InvalidTemplate { .. })));
    }
}
