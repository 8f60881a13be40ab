//! The scan, diff, and register pass.
//!
//! One call to [`reconcile`] performs a full pass: enumerate the artifact
//! files in the watched directory, assign a logical name to every file that
//! does not have one yet, persist the mapping, and register every name the
//! runtime does not already serve. The pass runs to completion; a failure
//! against one file is recorded in the summary and never aborts the rest of
//! the batch.
//!
//! Naming decisions are persisted before any registration is attempted. If
//! registration fails partway through, a later pass reuses the persisted
//! names and only retries the missing registrations.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::naming::{logical_name, MODEL_EXTENSION};
use crate::registry::ModelRegistry;
use crate::state::NamingState;

/// Upper bound on the `-2`, `-3`, ... suffix search for a colliding name.
const MAX_NAME_ATTEMPTS: usize = 256;

/// Longest diagnostic tail kept in a failure entry.
const MAX_DIAGNOSTIC_CHARS: usize = 2000;

/// One registration that could not be completed.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub(crate) struct Failure {
    /// The logical name involved, when one had been assigned.
    pub model: Option<String>,
    /// The path the failure concerns.
    pub file: String,
    /// A bounded tail of the diagnostic output.
    pub error: String,
}

/// The outcome of one reconciliation pass.
#[derive(Serialize, Debug)]
pub(crate) struct Summary {
    pub model_dir: String,
    pub found: usize,
    pub already_present: Vec<String>,
    pub created: Vec<String>,
    pub failed: Vec<Failure>,
}

impl Summary {
    fn new(model_dir: &Path) -> Summary {
        Summary {
            model_dir: model_dir.display().to_string(),
            found: 0,
            already_present: Vec::new(),
            created: Vec::new(),
            failed: Vec::new(),
        }
    }
}

/// Scans the model directory and ensures every artifact file is registered
/// with the runtime under its assigned logical name.
pub(crate) fn reconcile(config: &Config, registry: &dyn ModelRegistry) -> Summary {
    let mut summary = Summary::new(&config.model_dir);

    if !config.model_dir.is_dir() {
        summary.failed.push(Failure {
            model: None,
            file: config.model_dir.display().to_string(),
            error: "model directory not found".to_string(),
        });

        return summary;
    }

    let artifacts = match artifact_files(&config.model_dir) {
        Ok(artifacts) => artifacts,
        Err(err) => {
            summary.failed.push(Failure {
                model: None,
                file: config.model_dir.display().to_string(),
                error: format!("failed to enumerate model files: {}", err),
            });

            return summary;
        }
    };

    summary.found = artifacts.len();

    // The listing is best-effort. An unreachable runtime degrades to
    // re-attempting every registration rather than aborting the pass.
    let mut existing = match registry.list() {
        Ok(names) => names,
        Err(err) => {
            warn!("could not list registered models, assuming none: {}", err);

            BTreeSet::new()
        }
    };

    let mut state = NamingState::load(&config.state_file);

    assign_names(&mut state, &artifacts, &existing, &mut summary.failed);

    // Persist naming decisions before registering anything, so a failed or
    // interrupted pass never re-derives names on retry.
    if let Err(err) = state.save(&config.state_file) {
        warn!(
            "failed to persist naming state at {}: {}",
            config.state_file.display(),
            err
        );

        summary.failed.push(Failure {
            model: None,
            file: config.state_file.display().to_string(),
            error: format!("failed to persist naming state: {}", err),
        });
    }

    for path in &artifacts {
        let key = path.display().to_string();

        // Files that could not be named had a failure recorded above.
        let name = match state.file_to_model.get(&key) {
            Some(name) => name,
            None => continue,
        };

        if existing.contains(name) {
            debug!("{} is already registered", name);

            summary.already_present.push(name.clone());

            continue;
        }

        match registry.create(name, path) {
            Ok(()) => {
                info!("registered {} from {}", name, path.display());

                existing.insert(name.clone());
                summary.created.push(name.clone());
            }
            Err(err) => {
                summary.failed.push(Failure {
                    model: Some(name.clone()),
                    file: key,
                    error: tail(&err.to_string(), MAX_DIAGNOSTIC_CHARS),
                });
            }
        }
    }

    summary
}

/// Enumerates artifact files in `dir`, sorted by path.
fn artifact_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut artifacts = Vec::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();

        let is_artifact = path.is_file()
            && path
                .extension()
                .map_or(false, |ext| ext.eq_ignore_ascii_case(MODEL_EXTENSION));

        if is_artifact {
            artifacts.push(path);
        }
    }

    artifacts.sort();

    Ok(artifacts)
}

/// Assigns a logical name to every artifact file the mapping does not cover
/// yet. Existing assignments are never revisited; new candidates are made
/// unique against the persisted names, the runtime's listing, and the names
/// chosen earlier in the same pass.
fn assign_names(
    state: &mut NamingState,
    artifacts: &[PathBuf],
    existing: &BTreeSet<String>,
    failures: &mut Vec<Failure>,
) {
    let mut taken: BTreeSet<String> = existing.clone();

    taken.extend(state.file_to_model.values().cloned());

    for path in artifacts {
        let key = path.display().to_string();

        if state.file_to_model.contains_key(&key) {
            continue;
        }

        let file_name = path.file_name().unwrap_or_default().to_string_lossy();
        let base = logical_name(&file_name);

        match unique_name(&base, &taken) {
            Some(name) => {
                debug!("assigned {} to {}", name, key);

                taken.insert(name.clone());
                state.file_to_model.insert(key, name);
            }
            None => {
                failures.push(Failure {
                    model: Some(base.clone()),
                    file: key,
                    error: format!(
                        "could not find a free variant of \"{}\" within {} attempts",
                        base, MAX_NAME_ATTEMPTS
                    ),
                });
            }
        }
    }
}

/// Finds the first of `base`, `base-2`, `base-3`, ... not in `taken`. The
/// search is bounded so an adversarial name set cannot loop forever.
fn unique_name(base: &str, taken: &BTreeSet<String>) -> Option<String> {
    if !taken.contains(base) {
        return Some(base.to_string());
    }

    (2..=MAX_NAME_ATTEMPTS)
        .map(|n| format!("{}-{}", base, n))
        .find(|candidate| !taken.contains(candidate))
}

/// The last `max_chars` characters of `text`.
fn tail(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();

    if total <= max_chars {
        return text.to_string();
    }

    text.chars().skip(total - max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::fake::FakeRegistry;
    use tempfile::{tempdir, TempDir};

    fn test_config(dir: &TempDir) -> Config {
        Config {
            model_dir: dir.path().join("models"),
            state_file: dir.path().join("state.json"),
            ollama_bin: "ollama".to_string(),
        }
    }

    fn place_artifacts(config: &Config, names: &[&str]) {
        fs::create_dir_all(&config.model_dir).unwrap();

        for name in names {
            fs::write(config.model_dir.join(name), b"gguf").unwrap();
        }
    }

    #[test]
    fn registers_every_new_artifact() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir);

        place_artifacts(&config, &["gemma-2b-F16.gguf", "phi-2-int8.gguf"]);

        let registry = FakeRegistry::default();
        let summary = reconcile(&config, &registry);

        assert_eq!(summary.found, 2);
        assert_eq!(summary.created, vec!["gemma-2b", "phi-2"]);
        assert!(summary.already_present.is_empty());
        assert!(summary.failed.is_empty());

        // Every created model was built from its own artifact file.
        let created = registry.created.borrow();
        assert_eq!(created[0].1, config.model_dir.join("gemma-2b-F16.gguf"));
        assert_eq!(created[1].1, config.model_dir.join("phi-2-int8.gguf"));
    }

    #[test]
    fn second_pass_is_idempotent() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir);

        place_artifacts(&config, &["gemma-2b.gguf", "phi-2.gguf"]);

        let registry = FakeRegistry::default();

        let first = reconcile(&config, &registry);
        assert_eq!(first.created.len(), 2);

        let second = reconcile(&config, &registry);
        assert!(second.created.is_empty());
        assert_eq!(second.already_present, vec!["gemma-2b", "phi-2"]);
        assert!(second.failed.is_empty());
    }

    #[test]
    fn colliding_bases_get_numeric_suffixes() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir);

        place_artifacts(&config, &["modela-q4.gguf", "modela-q8.gguf"]);

        let registry = FakeRegistry::default();
        let summary = reconcile(&config, &registry);

        // Lexicographic path order decides who keeps the bare name.
        assert_eq!(summary.created, vec!["modela", "modela-2"]);

        let state = NamingState::load(&config.state_file);
        assert_eq!(
            state.file_to_model
                [&config.model_dir.join("modela-q4.gguf").display().to_string()],
            "modela"
        );
        assert_eq!(
            state.file_to_model
                [&config.model_dir.join("modela-q8.gguf").display().to_string()],
            "modela-2"
        );
    }

    #[test]
    fn names_collide_against_the_live_listing() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir);

        place_artifacts(&config, &["modela-q4.gguf"]);

        let registry = FakeRegistry::serving(["modela"]);
        let summary = reconcile(&config, &registry);

        assert_eq!(summary.created, vec!["modela-2"]);
    }

    #[test]
    fn assignments_survive_a_registry_reset() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir);

        place_artifacts(&config, &["modela-q4.gguf", "modela-q8.gguf"]);

        let registry = FakeRegistry::default();

        let first = reconcile(&config, &registry);
        assert_eq!(first.created, vec!["modela", "modela-2"]);

        // The runtime loses its registry; the persisted names must be
        // registered again unchanged, not re-derived.
        registry.registered.borrow_mut().clear();

        let second = reconcile(&config, &registry);
        assert_eq!(second.created, vec!["modela", "modela-2"]);
    }

    #[test]
    fn one_failed_registration_does_not_stop_the_rest() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir);

        place_artifacts(&config, &["a.gguf", "b.gguf", "c.gguf"]);

        let mut registry = FakeRegistry::default();
        registry.fail_creates.insert("b".to_string());

        let summary = reconcile(&config, &registry);

        assert_eq!(summary.created, vec!["a", "c"]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].model.as_deref(), Some("b"));
        assert!(summary.failed[0]
            .file
            .ends_with("b.gguf"));

        // The name was assigned and persisted even though registration
        // failed, so a retry reuses it.
        let state = NamingState::load(&config.state_file);
        assert_eq!(state.file_to_model.len(), 3);

        registry.fail_creates.clear();

        let retry = reconcile(&config, &registry);
        assert_eq!(retry.created, vec!["b"]);
        assert_eq!(retry.already_present, vec!["a", "c"]);
    }

    #[test]
    fn corrupt_state_is_rebuilt() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir);

        place_artifacts(&config, &["gemma-2b.gguf"]);
        fs::write(&config.state_file, "not json at all").unwrap();

        let registry = FakeRegistry::default();
        let summary = reconcile(&config, &registry);

        assert_eq!(summary.created, vec!["gemma-2b"]);
        assert!(summary.failed.is_empty());

        let state = NamingState::load(&config.state_file);
        assert_eq!(state.file_to_model.len(), 1);
    }

    #[test]
    fn missing_directory_reports_one_failure() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir);

        let registry = FakeRegistry::default();
        let summary = reconcile(&config, &registry);

        assert_eq!(summary.found, 0);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].model, None);
        assert!(registry.created.borrow().is_empty());
    }

    #[test]
    fn listing_failure_degrades_to_registering_everything() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir);

        place_artifacts(&config, &["gemma-2b.gguf"]);

        let mut registry = FakeRegistry::serving(["gemma-2b"]);
        registry.fail_listing = true;

        let summary = reconcile(&config, &registry);

        // The listing could not be read, so the pass re-attempts the
        // create rather than trusting a stale view.
        assert_eq!(summary.created, vec!["gemma-2b"]);
        assert!(summary.already_present.is_empty());
        assert!(summary.failed.is_empty());
    }

    #[test]
    fn removed_files_keep_their_assignments() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir);

        place_artifacts(&config, &["gemma-2b.gguf", "phi-2.gguf"]);

        let registry = FakeRegistry::default();
        reconcile(&config, &registry);

        fs::remove_file(config.model_dir.join("phi-2.gguf")).unwrap();

        let summary = reconcile(&config, &registry);

        assert_eq!(summary.found, 1);
        assert_eq!(summary.already_present, vec!["gemma-2b"]);

        // The mapping is append-only; the removed file's assignment stays.
        let state = NamingState::load(&config.state_file);
        assert_eq!(state.file_to_model.len(), 2);
    }

    #[test]
    fn non_artifact_files_are_ignored() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir);

        place_artifacts(&config, &["gemma-2b.gguf", "notes.txt"]);
        fs::create_dir(config.model_dir.join("archive.gguf")).unwrap();

        let registry = FakeRegistry::default();
        let summary = reconcile(&config, &registry);

        assert_eq!(summary.found, 1);
        assert_eq!(summary.created, vec!["gemma-2b"]);
    }

    #[test]
    fn extension_matches_case_insensitively() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir);

        place_artifacts(&config, &["GEMMA-2B.GGUF"]);

        let registry = FakeRegistry::default();
        let summary = reconcile(&config, &registry);

        assert_eq!(summary.found, 1);
        assert_eq!(summary.created, vec!["gemma-2b"]);
    }

    #[test]
    fn suffix_search_is_bounded() {
        let mut taken = BTreeSet::new();

        taken.insert("modela".to_string());
        for n in 2..=MAX_NAME_ATTEMPTS {
            taken.insert(format!("modela-{}", n));
        }

        assert_eq!(unique_name("modela", &taken), None);

        taken.remove("modela-7");
        assert_eq!(unique_name("modela", &taken).as_deref(), Some("modela-7"));
    }

    #[test]
    fn diagnostic_tails_are_bounded() {
        let long = "x".repeat(MAX_DIAGNOSTIC_CHARS * 2);

        assert_eq!(tail(&long, MAX_DIAGNOSTIC_CHARS).chars().count(), MAX_DIAGNOSTIC_CHARS);
        assert_eq!(tail("short", MAX_DIAGNOSTIC_CHARS), "short");

        // Truncation keeps the end of the output, where the cause usually is.
        assert_eq!(tail("abcdef", 3), "def");
    }

    #[test]
    fn failure_diagnostics_are_truncated_in_summaries() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir);

        place_artifacts(&config, &["gemma-2b.gguf"]);

        let mut registry = FakeRegistry::default();
        registry.fail_creates.insert("gemma-2b".to_string());
        registry.create_diagnostic = Some("y".repeat(MAX_DIAGNOSTIC_CHARS * 3));

        let summary = reconcile(&config, &registry);

        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].error.chars().count(), MAX_DIAGNOSTIC_CHARS);
    }
}
