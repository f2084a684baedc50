//! Diagnostics for the binary. Progress lines go to stdout through the
//! [`Reporter`](crate::progress::Reporter) channel; everything here goes to
//! stderr or a log file.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::OnceLock;

use clap::ValueEnum;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

use crate::progress::PROGRESS_TARGET;

/// Replaces the generated filter entirely, e.g. `tilecast=debug,tungstenite=trace`.
pub const FILTER_ENV: &str = "TILECAST_LOG_FILTER";

/// Targets that follow the chosen level. `tilecast` also covers
/// `tilecast_core` and the progress target.
const WORKSPACE_TARGETS: &[&str] = &["tilecast", "tile_proto"];

#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct LogConfig {
    pub level: LogLevel,
    pub file: Option<PathBuf>,
}

impl LogConfig {
    /// Filter used when [`FILTER_ENV`] is unset. Dependencies never log
    /// below `warn`. A log file always records progress at `info`, so a run
    /// can be reviewed without the terminal it printed to.
    pub fn directives(&self) -> Vec<String> {
        let level = self.level.directive();
        let mut directives = vec![self.level.min(LogLevel::Warn).directive().to_string()];
        directives.extend(WORKSPACE_TARGETS.iter().map(|target| format!("{target}={level}")));
        if self.file.is_some() && self.level < LogLevel::Info {
            directives.push(format!("{PROGRESS_TARGET}=info"));
        }
        directives
    }

    fn filter(&self, custom: Option<String>) -> Result<EnvFilter, InitError> {
        let filter = match custom {
            Some(custom) => EnvFilter::try_new(&custom).map_err(|source| InitError::Filter {
                filter: custom,
                source,
            })?,
            None => {
                let generated = self.directives().join(",");
                EnvFilter::try_new(&generated).map_err(|source| InitError::Filter {
                    filter: generated,
                    source,
                })?
            }
        };
        Ok(filter)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("failed to open log file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid log filter '{filter}': {source}")]
    Filter { filter: String, source: ParseError },
    #[error(transparent)]
    Install(#[from] SetGlobalDefaultError),
}

static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Installs the global subscriber once; later calls return `Ok` untouched.
pub fn init(config: &LogConfig) -> Result<(), InitError> {
    if GUARD.get().is_some() {
        return Ok(());
    }
    let filter = config.filter(std::env::var(FILTER_ENV).ok())?;

    let (writer, guard) = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| InitError::Io {
                    path: path.clone(),
                    source,
                })?;
            tracing_appender::non_blocking(file)
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    // targets tell progress lines apart from diagnostics in a shared file
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.file.is_some() || config.level >= LogLevel::Debug)
        .with_thread_ids(config.level == LogLevel::Trace)
        .with_ansi(config.file.is_none())
        .with_writer(writer)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let _ = GUARD.set(guard);
    Ok(())
}
