use std::thread;
use std::time::Duration;

use super::format_output;
use super::table::Table;
use crate::config::{Config, FileConfig};
use crate::reconcile::{reconcile, Summary};
use crate::registry::ollama::OllamaCli;
use crate::utils::errors::DEFAULT_EXIT_CODE;
use crate::ScanArgs;

impl From<&Summary> for Table {
    fn from(value: &Summary) -> Self {
        let mut tab = Table::new();

        tab.set_header(vec!["MODEL", "STATUS", "DETAIL"]);

        for name in &value.already_present {
            tab.add_row(vec![name.as_str(), "present", ""]);
        }

        for name in &value.created {
            tab.add_row(vec![name.as_str(), "created", ""]);
        }

        for failure in &value.failed {
            let model = failure.model.as_deref().unwrap_or("-");

            // Diagnostics can run to many lines; the table carries the
            // first one and the JSON format carries the rest.
            let detail = failure.error.lines().next().unwrap_or("");

            tab.add_row(vec![model, "failed", detail]);
        }

        tab
    }
}

pub(crate) fn scan_cmd(file_config: &FileConfig, args: &ScanArgs) {
    let config = Config::resolve(file_config, args.model_dir.clone(), args.state_file.clone());

    let registry = OllamaCli::new(config.ollama_bin.clone());

    match args.every {
        Some(secs) => loop {
            let summary = reconcile(&config, &registry);

            format_output(&summary, args.format);

            thread::sleep(Duration::from_secs(secs));
        },
        None => {
            let summary = reconcile(&config, &registry);
            let failures = summary.failed.len();

            format_output(&summary, args.format);

            if failures > 0 {
                crate::error!("scan completed with {} failure(s)", failures);

                std::process::exit(DEFAULT_EXIT_CODE);
            }
        }
    }
}
