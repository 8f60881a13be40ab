use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use toml;

const MODEL_DIR_VAR: &'static str = "AUTOSHELF_MODEL_DIR";
const STATE_FILE_VAR: &'static str = "AUTOSHELF_STATE_FILE";
const OLLAMA_BIN_VAR: &'static str = "AUTOSHELF_OLLAMA_BIN";

const DEFAULT_MODEL_DIR: &'static str = "/var/lib/autoshelf/models";
const DEFAULT_OLLAMA_BIN: &'static str = "ollama";

/// The configuration file's schema. Every value is optional; anything unset
/// falls through to an environment variable and then a built-in default.
#[derive(Deserialize, Serialize, Default, Debug)]
pub(crate) struct FileConfig {
    pub model_dir: Option<PathBuf>,
    pub state_file: Option<PathBuf>,
    pub ollama_bin: Option<String>,
}

/// The resolved configuration, constructed once at startup and passed down
/// explicitly. Paths are absolute.
#[derive(Debug, Clone)]
pub(crate) struct Config {
    pub model_dir: PathBuf,
    pub state_file: PathBuf,
    pub ollama_bin: String,
}

impl Config {
    /// Resolves the effective configuration. Precedence, most binding
    /// first: command-line flags, environment variables, the configuration
    /// file, built-in defaults.
    pub(crate) fn resolve(
        file: &FileConfig,
        model_dir: Option<PathBuf>,
        state_file: Option<PathBuf>,
    ) -> Config {
        let model_dir = model_dir
            .or_else(|| env_path(MODEL_DIR_VAR))
            .or_else(|| file.model_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_DIR));

        let state_file = state_file
            .or_else(|| env_path(STATE_FILE_VAR))
            .or_else(|| file.state_file.clone())
            .unwrap_or_else(default_state_file);

        let ollama_bin = std::env::var(OLLAMA_BIN_VAR)
            .ok()
            .or_else(|| file.ollama_bin.clone())
            .unwrap_or_else(|| DEFAULT_OLLAMA_BIN.to_string());

        Config {
            model_dir: absolute(&model_dir),
            state_file: absolute(&state_file),
            ollama_bin,
        }
    }
}

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var_os(var).map(PathBuf::from)
}

fn default_state_file() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".local/state/autoshelf/state.json"),
        None => PathBuf::from("/var/lib/autoshelf/state.json"),
    }
}

/// Anchors a relative path to the current working directory. Unlike
/// canonicalization this does not require the path to exist yet.
fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }

    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

fn get_config_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME");

    if let Some(home) = home {
        let home = PathBuf::from(home);

        const USER_PATHS: [&str; 2] = [".config/autoshelf/config.toml", ".autoshelf.toml"];

        for &path in USER_PATHS.iter() {
            let fullpath = home.join(path);

            if fullpath.exists() {
                return Some(fullpath);
            }
        }
    }

    let system_config = PathBuf::from("/etc/autoshelf.toml");

    if system_config.exists() {
        Some(system_config)
    } else {
        None
    }
}

fn parse_config_or_die<S: serde::de::DeserializeOwned>(config: &str) -> S {
    let r: Result<S, toml::de::Error> = toml::de::from_str(config);

    match r {
        Ok(s) => s,
        Err(err) => die::die!("failed to parse config: {}", err),
    }
}

fn warn_on_extra_fields_helper<'a>(
    path: &mut Vec<&'a String>,
    user_config: &'a toml::Table,
    config: &'a toml::Table,
) {
    for (user_key, user_value) in user_config {
        path.push(user_key);

        if let Some(config_value) = config.get(user_key) {
            match (user_value, config_value) {
                (toml::Value::Table(user_value), toml::Value::Table(config_value)) => {
                    warn_on_extra_fields_helper(path, user_value, config_value)
                }
                _ => {}
            }
        } else {
            let path: Vec<&str> = path.iter().map(|&s| s.as_str()).collect();

            crate::warn!("config contains extraneous key \"{}\", ignoring", path.join("."));
        }

        path.pop();
    }
}

fn warn_on_extra_fields(config: &FileConfig, raw_config: &str) {
    let user_config: toml::Table = parse_config_or_die(raw_config);

    let config: toml::Table = {
        let serialized_config =
            toml::ser::to_string(&config).expect("failed to reserialize config");

        parse_config_or_die(&serialized_config)
    };

    let mut path = Vec::new();

    warn_on_extra_fields_helper(&mut path, &user_config, &config);
}

/// Reads the configuration file, if one exists.
pub(crate) fn read_config(config: Option<&Path>) -> FileConfig {
    let config_path = config.map(Path::to_path_buf).or_else(get_config_path);

    if let Some(path) = config_path {
        let raw_config = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) => die::die!("failed to read config at {}: {}", path.display(), err),
        };

        let config: FileConfig = parse_config_or_die(&raw_config);

        warn_on_extra_fields(&config, &raw_config);

        config
    } else {
        FileConfig::default()
    }
}
