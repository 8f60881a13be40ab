mod cli;
mod color;
mod config;
mod naming;
mod reconcile;
mod registry;
mod state;
mod utils;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use cli::{list::list_cmd, name::name_cmd, scan::scan_cmd, ColorMode};

#[derive(
    Parser, Default, Clone, Copy, ValueEnum, strum_macros::Display, strum_macros::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum RequestedColorMode {
    #[default]
    Auto,
    On,
    Off,
}

#[derive(Parser)]
#[command(name = "autoshelf")]
#[command(
    about = "Keeps a directory of GGUF model files registered with Ollama",
    author = "Alex <alex@al.exander.io>",
    version = "0.0.1"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    /// Read the configuration from the specified file
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value_t = RequestedColorMode::default())]
    color: RequestedColorMode,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the model directory and register missing models
    Scan(ScanArgs),
    /// List the models currently registered with the runtime
    List(ListArgs),
    /// Derive the logical names for the given file names
    Name(NameArgs),
}

#[derive(Parser, Default)]
pub(crate) struct ScanArgs {
    /// Directory scanned for model files
    #[arg(short, long)]
    model_dir: Option<PathBuf>,
    /// Location of the naming-state file
    #[arg(short, long)]
    state_file: Option<PathBuf>,
    /// Keep running, rescanning every SECS seconds
    #[arg(long, value_name = "SECS")]
    every: Option<u64>,
    /// Output the summary with the specified format
    #[arg(short, long, default_value_t = ListingFormat::default())]
    format: ListingFormat,
}

#[derive(Parser)]
pub(crate) struct ListArgs {
    /// Output the listing with the specified format
    #[arg(short, long, default_value_t = ListingFormat::default())]
    format: ListingFormat,
}

#[derive(Parser)]
pub(crate) struct NameArgs {
    /// File names to derive logical names from
    #[arg(required = true)]
    files: Vec<String>,
}

/// Output formats
#[derive(
    Parser, ValueEnum, Default, Clone, Copy, strum_macros::Display, strum_macros::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum ListingFormat {
    /// Format the output as a table
    #[default]
    Table,
    /// Format the output as JSON
    Json,
    /// Format the output as a table without a header
    HeaderlessTable,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    color::configure_color(ColorMode::resolve_auto(cli.color));

    let config = config::read_config(cli.config.as_deref());

    match &cli.command {
        Some(Commands::Scan(args)) => scan_cmd(&config, args),
        Some(Commands::List(args)) => list_cmd(&config, args),
        Some(Commands::Name(args)) => name_cmd(args),
        None => scan_cmd(&config, &ScanArgs::default()),
    }
}
