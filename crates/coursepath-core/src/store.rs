//! Session persistence.
//!
//! Completed sessions are written to `<data_dir>/sessions/<session_id>.yaml`
//! so that a later reschedule request on the same conversation can find the
//! plans it refers to.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::CoreError;
use crate::session::{SessionState, is_valid_session_id};

/// YAML-file store for [`SessionState`] snapshots.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load the stored state of `session_id`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::SessionNotFound` if nothing is stored under the id
    /// (or the id is not a valid session id) and `CoreError::Yaml` if the
    /// snapshot cannot be parsed.
    pub fn load(&self, session_id: &str) -> Result<SessionState, CoreError> {
        let path = self.path_for(session_id)?;
        if !path.exists() {
            return Err(CoreError::SessionNotFound(session_id.to_owned()));
        }
        let content = fs::read_to_string(&path)?;
        let state: SessionState = serde_yaml::from_str(&content)?;
        Ok(state)
    }

    /// Write `state`, replacing any previous snapshot of the same session.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidRequest` for an invalid session id, plus
    /// I/O and serialization errors.
    pub fn save(&self, state: &SessionState) -> Result<(), CoreError> {
        let path = self.path_for(&state.session_id).map_err(|_| {
            CoreError::InvalidRequest(format!("invalid session id: {:?}", state.session_id))
        })?;
        fs::create_dir_all(&self.dir)?;
        let yaml = serde_yaml::to_string(state)?;
        fs::write(&path, yaml)?;
        debug!(path = %path.display(), "saved session");
        Ok(())
    }

    fn path_for(&self, session_id: &str) -> Result<PathBuf, CoreError> {
        if !is_valid_session_id(session_id) {
            return Err(CoreError::SessionNotFound(session_id.to_owned()));
        }
        Ok(self.dir.join(format!("{session_id}.yaml")))
    }
}
