//! Snapshot store.

use crate::errors::{PhaseflowError, Result};
use crate::recovery::CircuitBreaker;
use crate::state::{meta, PipelineState};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Sub-directory holding content-addressed snapshot copies.
pub const HISTORY_DIR: &str = "history";

/// Hex characters of the SHA-256 digest used in history file names.
pub const SNAPSHOT_HASH_PREFIX_LEN: usize = 12;

/// Reads and writes run snapshots under one directory.
#[derive(Debug, Clone)]
pub struct StateStore {
    output_dir: PathBuf,
    keep_history: bool,
}

impl StateStore {
    /// Creates a store rooted at `output_dir`. The directory is created on
    /// first write.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            keep_history: false,
        }
    }

    /// Also keep a content-addressed copy of every snapshot.
    #[must_use]
    pub fn with_history(mut self, keep_history: bool) -> Self {
        self.keep_history = keep_history;
        self
    }

    /// The root directory.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Location of the snapshot for `run_id`.
    #[must_use]
    pub fn path_for(&self, run_id: &str) -> PathBuf {
        self.output_dir.join(format!("{run_id}.json"))
    }

    /// Writes the full state, merging `error_context` into
    /// `metadata.last_error` first. Returns the snapshot location.
    pub fn persist(
        &self,
        state: &mut PipelineState,
        error_context: Option<serde_json::Value>,
    ) -> Result<PathBuf> {
        if let Some(context) = error_context {
            merge_last_error(state, context);
        }

        let json = serde_json::to_string_pretty(state)?;
        let path = self.path_for(&state.run_id);
        write_atomic(&path, json.as_bytes())?;

        if self.keep_history {
            let digest = hex::encode(Sha256::digest(json.as_bytes()));
            let name = format!(
                "{}-{}.json",
                state.run_id,
                &digest[..SNAPSHOT_HASH_PREFIX_LEN]
            );
            let history_path = self.output_dir.join(HISTORY_DIR).join(name);
            write_atomic(&history_path, json.as_bytes())?;
            debug!(path = %history_path.display(), "Wrote snapshot history copy");
        }

        info!(
            run_id = %state.run_id,
            phase = %state.current_phase,
            path = %path.display(),
            "Persisted pipeline state"
        );
        Ok(path)
    }

    /// Loads and validates a snapshot.
    ///
    /// The transition history must satisfy the transition rule and end at
    /// the stored current phase. Every consecutive-failure counter is reset
    /// to zero, so a resumed run starts with a closed breaker.
    pub fn load(path: impl AsRef<Path>) -> Result<PipelineState> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let mut state: PipelineState = serde_json::from_str(&raw)?;

        state.validate_history()?;
        if let Some((phase, count)) = state
            .retry_counts
            .iter()
            .find(|(_, count)| **count > state.max_retries)
        {
            return Err(PhaseflowError::InvalidState(format!(
                "retry count {count} for '{phase}' exceeds max_retries {}",
                state.max_retries
            )));
        }
        CircuitBreaker::reset_all(&mut state);

        info!(
            run_id = %state.run_id,
            phase = %state.current_phase,
            path = %path.display(),
            "Loaded pipeline state"
        );
        Ok(state)
    }

    /// Loads the snapshot of `run_id` from this store.
    pub fn load_run(&self, run_id: &str) -> Result<PipelineState> {
        Self::load(self.path_for(run_id))
    }

    /// Content-addressed copies of `run_id`, oldest name first.
    pub fn history_for(&self, run_id: &str) -> Result<Vec<PathBuf>> {
        let dir = self.output_dir.join(HISTORY_DIR);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let prefix = format!("{run_id}-");
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(&prefix))
            })
            .collect();
        paths.sort();
        Ok(paths)
    }
}

fn merge_last_error(state: &mut PipelineState, context: serde_json::Value) {
    let merged = match (state.metadata.remove(meta::LAST_ERROR), context) {
        (Some(serde_json::Value::Object(mut existing)), serde_json::Value::Object(update)) => {
            existing.extend(update);
            serde_json::Value::Object(existing)
        }
        (_, context) => context,
    };
    state.set_meta(meta::LAST_ERROR, merged);
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| PhaseflowError::Io(e.error))?;
    Ok(())
}
