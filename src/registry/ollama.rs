//! A [`ModelRegistry`] backed by the `ollama` command-line tool.
//!
//! The CLI is preferred over the HTTP API because it reflects Ollama's real
//! registry without requiring the server address to be configured. Both
//! operations are blocking process invocations; timeouts are left to the
//! tool's own transport.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output};

use tracing::debug;

use super::{Error, ModelRegistry};
use crate::utils::tempfile::Tempfile;

pub(crate) struct OllamaCli {
    binary: String,
}

impl OllamaCli {
    pub(crate) fn new(binary: String) -> OllamaCli {
        OllamaCli { binary }
    }

    fn run(&self, args: &[&str]) -> Result<Output, Error> {
        let command = format!("{} {}", self.binary, args.join(" "));

        debug!("running {}", command);

        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .map_err(|source| Error::Invocation {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(Error::Failed {
                command,
                status: output.status,
                output: combined_output(&output),
            });
        }

        Ok(output)
    }
}

impl ModelRegistry for OllamaCli {
    fn list(&self) -> Result<BTreeSet<String>, Error> {
        let output = self.run(&["list"])?;

        Ok(parse_listing(&String::from_utf8_lossy(&output.stdout)))
    }

    fn create(&self, name: &str, artifact: &Path) -> Result<(), Error> {
        let mut modelfile =
            Tempfile::with_base_and_ext("Modelfile_", ".txt").map_err(Error::Modelfile)?;

        writeln!(modelfile.file_mut(), "FROM {}", artifact.display())
            .and_then(|_| modelfile.file_mut().flush())
            .map_err(Error::Modelfile)?;

        let modelfile_path = modelfile.path().display().to_string();

        self.run(&["create", name, "-f", &modelfile_path])?;

        Ok(())
    }
}

/// Extracts model names from `ollama list` output: the first
/// whitespace-delimited column of every row after the header.
fn parse_listing(stdout: &str) -> BTreeSet<String> {
    stdout
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().next())
        .map(|name| name.to_string())
        .collect()
}

/// Stdout followed by stderr, as one diagnostic blob.
fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);

    if !stderr.is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }

        text.push_str(&stderr);
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &'static str = "\
NAME                    ID              SIZE      MODIFIED
llama-3-8b:latest       365c0bd3c000    4.7 GB    2 days ago
phi-2:latest            e2fd6321a5fe    1.6 GB    3 weeks ago
";

    #[test]
    fn listing_parses_first_column() {
        let names = parse_listing(LISTING);

        assert_eq!(names.len(), 2);
        assert!(names.contains("llama-3-8b:latest"));
        assert!(names.contains("phi-2:latest"));
    }

    #[test]
    fn empty_listing_parses_to_no_names() {
        assert!(parse_listing("NAME  ID  SIZE  MODIFIED\n").is_empty());
        assert!(parse_listing("").is_empty());
    }

    #[test]
    fn blank_lines_are_skipped() {
        let names = parse_listing("NAME  ID\n\nllama:latest  abc\n\n");

        assert_eq!(names.len(), 1);
        assert!(names.contains("llama:latest"));
    }
}
