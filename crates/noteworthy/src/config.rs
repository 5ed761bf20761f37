use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Result};
use clap::ValueEnum;

use noteworthy_core::ServiceOptions;

pub const DATA_DIR: &str = ".noteworthy";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Backend {
    #[default]
    Sqlite,
    Files,
}

impl Backend {
    /// Whether `dir` already holds this backend's databases.
    pub fn is_initialized(self, dir: &Path) -> bool {
        match self {
            Backend::Sqlite => {
                dir.join(noteworthy_sqlite::NOTES_DB_FILE).exists()
                    || dir.join(noteworthy_sqlite::TAGS_DB_FILE).exists()
            }
            Backend::Files => {
                dir.join(noteworthy_files::NOTES_DB_DIR).exists()
                    || dir.join(noteworthy_files::TAGS_DB_DIR).exists()
            }
        }
    }
}

/// Settings gathered from flags and environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub dir: Option<PathBuf>,
    pub backend: Backend,
    pub timeout: Option<Duration>,
    pub assume_yes: bool,
}

impl Config {
    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            timeout: self.timeout,
        }
    }

    /// Directory that `init` creates: the explicit one, or `.noteworthy` here.
    pub fn init_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| PathBuf::from(DATA_DIR))
    }

    /// Directory of an existing store, searching up from the cwd when not given.
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.dir {
            if !dir.is_dir() {
                bail!(
                    "No data directory at {}. Run 'noteworthy init' first.",
                    dir.display()
                );
            }
            return Ok(dir.clone());
        }
        let cwd = std::env::current_dir()?;
        match find_data_dir(&cwd) {
            Some(dir) => Ok(dir),
            None => bail!(
                "No {} directory found. Run 'noteworthy init' to initialize a new store.",
                DATA_DIR
            ),
        }
    }
}

/// Find the `.noteworthy` directory by searching up from `start`.
pub fn find_data_dir(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        let candidate = current.join(DATA_DIR);
        if candidate.is_dir() {
            return Some(candidate);
        }
        if !current.pop() {
            return None;
        }
    }
}
