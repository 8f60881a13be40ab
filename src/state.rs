//! Persistence of the file-to-name mapping.
//!
//! The naming state is the reconciler's only durable memory: a JSON document
//! mapping the absolute path of every artifact file ever seen to the logical
//! name it was assigned. Assignments are monotonic. Once a path has a name,
//! no later scan changes it, even if the runtime's registry is wiped and the
//! models are registered again.
//!
//! Loading fails open: a missing, unreadable, or corrupt state file is
//! treated as empty. Names are then re-derived on the next scan, which is
//! safe because derivation is deterministic and collision resolution
//! consults the runtime's live listing. Saving goes through a uniquely-named
//! temporary file in the same directory followed by a rename, so a reader
//! never observes a partially-written document. Concurrent scans against the
//! same state file are not supported; callers must serialize invocations.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::utils::tempfile::create_temp_file;

#[derive(Debug, Error)]
pub(crate) enum Error {
    #[error("state file path has no parent directory")]
    NoParentDirectory,

    #[error("failed to write the naming state: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize the naming state: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Deserialize, Serialize, Default, Debug, Clone, PartialEq, Eq)]
pub(crate) struct NamingState {
    #[serde(default)]
    pub file_to_model: BTreeMap<String, String>,
}

impl NamingState {
    /// Reads the persisted state, treating any failure as an empty state.
    pub(crate) fn load(path: &Path) -> NamingState {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(
                        "failed to read naming state at {}: {}",
                        path.display(),
                        err
                    );
                }

                return NamingState::default();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(state) => state,
            Err(err) => {
                warn!(
                    "discarding corrupt naming state at {}: {}",
                    path.display(),
                    err
                );

                NamingState::default()
            }
        }
    }

    /// Persists the state durably.
    ///
    /// The document is written to a fresh temporary file next to `path` and
    /// renamed over it, so a concurrent reader sees either the previous
    /// state or the new one, never a torn write.
    pub(crate) fn save(&self, path: &Path) -> Result<(), Error> {
        let dir = path.parent().ok_or(Error::NoParentDirectory)?;

        fs::create_dir_all(dir)?;

        let serialized = serde_json::to_string_pretty(self)?;

        let (tmp_path, mut tmp) = create_temp_file(dir, ".state_", ".tmp")?;

        let written = tmp
            .write_all(serialized.as_bytes())
            .and_then(|_| tmp.sync_all())
            .and_then(|_| fs::rename(&tmp_path, path));

        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path);

            return Err(err.into());
        }

        Ok(())
    }
}
