//! NoteWorthy CLI - notes with tags.

mod commands;
mod config;
mod prompt;

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use noteworthy_core::{AlwaysConfirm, Confirm, NoteworthyService};
use noteworthy_files::FilesConnections;
use noteworthy_sqlite::SqliteConnections;

use commands::Commands;
use config::{Backend, Config};
use prompt::StdinConfirm;

#[derive(Parser)]
#[command(name = "noteworthy", about = "Notes with tags", version)]
struct Cli {
    /// Data directory (default: nearest .noteworthy up from the current directory)
    #[arg(long, global = true, env = "NOTEWORTHY_DIR")]
    dir: Option<std::path::PathBuf>,

    /// Storage backend
    #[arg(long, global = true, value_enum, env = "NOTEWORTHY_BACKEND", default_value = "sqlite")]
    backend: Backend,

    /// Give up on any single storage call after this many milliseconds
    #[arg(long, global = true, env = "NOTEWORTHY_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    /// Do not ask for confirmation before deleting
    #[arg(short = 'y', long, global = true)]
    yes: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn config(&self) -> Config {
        Config {
            dir: self.dir.clone(),
            backend: self.backend,
            timeout: self.timeout_ms.map(Duration::from_millis),
            assume_yes: self.yes,
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env("NOTEWORTHY_LOG").unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Create both databases, seeding the default tags.
fn initialize(config: &Config, reinitialize: bool) -> Result<()> {
    let dir = config.init_dir();

    if dir.exists() {
        if reinitialize {
            std::fs::remove_dir_all(&dir)
                .context(format!("Failed to remove existing {}", dir.display()))?;
        } else if config.backend.is_initialized(&dir) {
            bail!(
                "NoteWorthy is already initialized in {}. Use --reinitialize to delete and recreate.",
                dir.display()
            );
        }
    }

    open_both(config.backend, &dir).context("Failed to create databases")?;

    let verb = if reinitialize { "Reinitialized" } else { "Initialized" };
    println!("{} noteworthy store in {}", verb, dir.display());
    Ok(())
}

fn open_both(backend: Backend, dir: &Path) -> Result<(), noteworthy_core::Error> {
    match backend {
        Backend::Sqlite => {
            let conns = SqliteConnections::new(dir);
            conns.open_note_database()?;
            conns.open_tag_database()?;
        }
        Backend::Files => {
            let conns = FilesConnections::new(dir);
            conns.open_note_database()?;
            conns.open_tag_database()?;
        }
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = cli.config();

    if let Commands::Init { reinitialize } = cli.command {
        return initialize(&config, reinitialize);
    }

    let dir = config.data_dir()?;
    info!(dir = %dir.display(), backend = ?config.backend, "opening store");

    let confirm: Box<dyn Confirm> = if config.assume_yes {
        Box::new(AlwaysConfirm)
    } else {
        Box::new(StdinConfirm)
    };
    let options = config.service_options();

    match config.backend {
        Backend::Sqlite => {
            let conns = SqliteConnections::new(&dir);
            let service = NoteworthyService::with_options(
                conns
                    .open_note_database()
                    .context("Failed to open notes database")?,
                conns
                    .open_tag_database()
                    .context("Failed to open tags database")?,
                options,
            );
            commands::run(&service, cli.command, confirm.as_ref()).await
        }
        Backend::Files => {
            let conns = FilesConnections::new(&dir);
            let service = NoteworthyService::with_options(
                conns
                    .open_note_database()
                    .context("Failed to open notes database")?,
                conns
                    .open_tag_database()
                    .context("Failed to open tags database")?,
                options,
            );
            commands::run(&service, cli.command, confirm.as_ref()).await
        }
    }
}
