use std::env;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{ConfigLoader, FilePreferences};

pub mod commands;

use self::commands::{CompleteArgs, DiscoverArgs, ListArgs, SetArgs, StatsArgs, TuiArgs};

#[derive(Parser, Debug)]
#[command(
    name = "matlist",
    version,
    about = "Track collected building materials against a materials list"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over MATLIST_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the state directory holding preferences (takes precedence over MATLIST_STATE)
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open a sheet in the interactive TUI (default)
    Tui(TuiArgs),
    /// Print a sheet as a table or JSON
    List(ListArgs),
    /// Set the available amount of one material
    Set(SetArgs),
    /// Mark one material as fully collected, or undo that
    Complete(CompleteArgs),
    /// Print completion statistics for a sheet
    Stats(StatsArgs),
    /// List sheets found in a directory
    Discover(DiscoverArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var("MATLIST_CONFIG", path);
    }
    if let Some(path) = &cli.state_dir {
        env::set_var("MATLIST_STATE", path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    let paths = loader.paths().clone();
    let command = cli.command.unwrap_or(Commands::Tui(TuiArgs::default()));
    // The TUI owns the terminal, so its log goes to a file instead.
    let log_file = matches!(command, Commands::Tui(_)).then(|| paths.log_file.clone());
    init_tracing(&cli.log_level, log_file.as_deref())
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let config = loader.load_or_init()?;
    tracing::debug!(config = %paths.config_file.display(), "configuration loaded");

    match command {
        Commands::Tui(args) => {
            let store = FilePreferences::new(&paths.preferences_file);
            commands::run_tui(config, store, args)
        }
        Commands::List(args) => commands::list_sheet(config, args),
        Commands::Set(args) => commands::set_available(config, args),
        Commands::Complete(args) => commands::complete(config, args),
        Commands::Stats(args) => commands::stats(config, args),
        Commands::Discover(args) => commands::discover(args),
    }
}

fn init_tracing(level: &str, log_file: Option<&Path>) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        let builder = fmt().with_env_filter(env_filter);
        let installed = match log_file {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("opening log file {}", path.display()))?;
                builder
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .try_init()
            }
            None => builder.with_writer(std::io::stderr).try_init(),
        };
        installed.map_err(|err| anyhow::anyhow!("{err}"))
    })
    .map(|_| ())
}
