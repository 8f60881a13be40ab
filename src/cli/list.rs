use super::format_output;
use super::table::Table;
use crate::config::{Config, FileConfig};
use crate::registry::{ollama::OllamaCli, ModelRegistry};
use crate::ListArgs;

#[derive(serde::Serialize)]
struct RegisteredModel {
    model: String,
}

impl From<Vec<RegisteredModel>> for Table {
    fn from(value: Vec<RegisteredModel>) -> Self {
        let mut tab = Table::new();

        tab.set_header(vec!["MODEL"]);

        for model in value {
            tab.add_row(vec![model.model]);
        }

        tab
    }
}

pub(crate) fn list_cmd(file_config: &FileConfig, args: &ListArgs) {
    let config = Config::resolve(file_config, None, None);

    let registry = OllamaCli::new(config.ollama_bin.clone());

    let names = match registry.list() {
        Ok(names) => names,
        Err(err) => crate::die!("failed to list registered models: {}", err),
    };

    let models: Vec<RegisteredModel> = names
        .into_iter()
        .map(|model| RegisteredModel { model })
        .collect();

    format_output(models, args.format);
}
