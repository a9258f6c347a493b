use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::debug;

use crate::cli::Cli;
use crate::paths::{config_file_path, database_file_path};

/// Optional `config.toml` contents. Every key may be omitted.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileSettings {
    pub database: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
    pub probe_workers: Option<usize>,
}

impl FileSettings {
    pub fn parse(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("invalid settings file")
    }

    fn read(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("in {}", path.display()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database: PathBuf,
    pub ffprobe: PathBuf,
    pub probe_workers: usize,
}

impl Settings {
    /// Flags (and their environment fallbacks) win over the settings file,
    /// which wins over built-in defaults.
    pub fn load(cli: &Cli) -> Result<Self> {
        let file = match cli.config.clone().or_else(config_file_path) {
            Some(path) if path.exists() => {
                debug!(path = %path.display(), "loading settings file");
                FileSettings::read(&path)?
            }
            Some(path) if cli.config.is_some() => {
                bail!("settings file {} does not exist", path.display())
            }
            _ => FileSettings::default(),
        };

        let database = match cli.db.clone().or(file.database) {
            Some(path) => path,
            None => database_file_path()?,
        };
        Self::resolve(
            database,
            cli.ffprobe.clone().or(file.ffprobe),
            cli.workers.or(file.probe_workers),
        )
    }

    fn resolve(
        database: PathBuf,
        ffprobe: Option<PathBuf>,
        probe_workers: Option<usize>,
    ) -> Result<Self> {
        let probe_workers = match probe_workers {
            Some(0) => bail!("probe_workers must be at least 1"),
            Some(workers) => workers,
            None => std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
        };

        Ok(Self {
            database,
            ffprobe: ffprobe.unwrap_or_else(|| PathBuf::from("ffprobe")),
            probe_workers,
        })
    }
}
