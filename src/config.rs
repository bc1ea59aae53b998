use clap::Parser;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::backend::library::DATABASE_FILE;

const DEFAULT_DATA_DIR: &str = ".var/app/info.febvre.Komikku/data";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not find home directory")]
    NoHome,
    #[error("could not open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Read manga downloaded by Komikku without leaving the terminal.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the Komikku data folder
    #[arg(short, long = "datapath", value_name = "DIR")]
    pub data_path: Option<PathBuf>,

    /// Where to write the log
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_path: PathBuf,
    pub database_path: PathBuf,
    pub log_file: PathBuf,
}

impl Config {
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let data_path = match args.data_path {
            Some(path) => path,
            None => dirs::home_dir().ok_or(ConfigError::NoHome)?.join(DEFAULT_DATA_DIR),
        };

        let log_file = args.log_file.unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("komikku-tui")
                .join("komikku-tui.log")
        });

        Ok(Self {
            database_path: data_path.join(DATABASE_FILE),
            data_path,
            log_file,
        })
    }
}

fn open_log_file(path: &Path) -> Result<File, ConfigError> {
    let log_err = |source| ConfigError::LogFile {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(log_err)?;
    }
    File::create(path).map_err(log_err)
}

/// Routes `log` output into the log file; the terminal belongs to the UI.
/// When the file cannot be opened the reader runs without a log.
pub fn init_logging(config: &Config) -> Option<ConfigError> {
    let file = match open_log_file(&config.log_file) {
        Ok(file) => file,
        Err(e) => return Some(e),
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("komikku_tui=info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
    None
}
