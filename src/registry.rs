//! The capability contract for the external model runtime's registry.
//!
//! The reconciler never talks to the runtime directly. Everything it needs
//! from the runtime is expressed by the [`ModelRegistry`] trait: one
//! operation to list the names the runtime currently serves, and one to
//! register a new name from an artifact file on disk. [`ollama::OllamaCli`]
//! implements the trait by invoking the `ollama` command-line tool; tests
//! substitute an in-memory fake.
//!
//! The listing is best-effort. The runtime is externally owned and its
//! registry can change between a listing and a later create, so callers must
//! treat the returned set as a possibly-stale snapshot. A name's absence
//! from the listing is meaningful; a failure of the listing call itself is
//! a condition callers are expected to tolerate.

pub(crate) mod ollama;

use std::collections::BTreeSet;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum Error {
    /// The registry tool could not be started at all.
    #[error("failed to run \"{command}\": {source}")]
    Invocation {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The registry tool ran and reported a failure.
    #[error("\"{command}\" exited with {status}: {output}")]
    Failed {
        command: String,
        status: std::process::ExitStatus,
        output: String,
    },

    /// A modelfile pointing at the artifact could not be staged.
    #[error("failed to stage a temporary modelfile: {0}")]
    Modelfile(#[source] std::io::Error),
}

/// A handle on the runtime's registry of served model names.
pub(crate) trait ModelRegistry {
    /// Returns the set of names the runtime currently serves.
    fn list(&self) -> Result<BTreeSet<String>, Error>;

    /// Registers `name`, built from the artifact file at `artifact`.
    ///
    /// Registration is binary: a name is either known to the runtime or it
    /// is not. Implementations are not expected to re-create or version an
    /// existing name.
    fn create(&self, name: &str, artifact: &Path) -> Result<(), Error>;
}
