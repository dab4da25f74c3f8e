//! Engine logging: one rolling file logger per process, plus the field
//! sanitiser every `key=value` event line goes through.
//!
//! # Invariants
//! - At most one logger is started; repeating the active settings is a no-op
//!   and any other settings are rejected.
//! - Event values carry no spaces or line breaks once passed through
//!   [`log_text`].
//! - Initialization never panics.

use flexi_logger::{
    Cleanup, Criterion, FileSpec, FlexiLoggerError, Logger, LoggerHandle, Naming, WriteMode,
};
use log::{error, info};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

const LOG_FILE_BASENAME: &str = "sitework";
const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_KEEP_FILES: usize = 5;
const MAX_PANIC_PAYLOAD_CHARS: usize = 160;
const MAX_LOG_FIELD_CHARS: usize = 64;

static ACTIVE_LOGGER: OnceCell<ActiveLogger> = OnceCell::new();

struct ActiveLogger {
    settings: LogSettings,
    _handle: LoggerHandle,
}

/// File logging settings; the `logging` block of the engine config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `trace`, `debug`, `info`, `warn` (or `warning`) or `error`.
    pub level: String,
    /// Absolute directory for the rotated `sitework` log files.
    pub dir: PathBuf,
    pub max_file_bytes: u64,
    pub keep_files: usize,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level().to_string(),
            dir: std::env::temp_dir().join("sitework-logs"),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            keep_files: DEFAULT_KEEP_FILES,
        }
    }
}

impl LogSettings {
    /// Canonical form used for comparison against the active logger.
    fn normalized(&self) -> Result<Self, LoggingError> {
        let level = match self.level.trim().to_ascii_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" | "warning" => "warn",
            "error" => "error",
            other => return Err(LoggingError::InvalidLevel(other.to_string())),
        };
        if !self.dir.is_absolute() {
            return Err(LoggingError::RelativeDir(self.dir.clone()));
        }
        if self.max_file_bytes == 0 || self.keep_files == 0 {
            return Err(LoggingError::InvalidRotation {
                max_file_bytes: self.max_file_bytes,
                keep_files: self.keep_files,
            });
        }
        Ok(Self {
            level: level.to_string(),
            dir: self.dir.clone(),
            max_file_bytes: self.max_file_bytes,
            keep_files: self.keep_files,
        })
    }
}

/// Logging bootstrap failure.
#[derive(Debug)]
pub enum LoggingError {
    InvalidLevel(String),
    RelativeDir(PathBuf),
    InvalidRotation {
        max_file_bytes: u64,
        keep_files: usize,
    },
    /// A logger is already running with different settings.
    AlreadyActive(Box<LogSettings>),
    Io(std::io::Error),
    Backend(FlexiLoggerError),
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidLevel(level) => write!(
                f,
                "unsupported log level `{level}`; expected trace|debug|info|warn|error"
            ),
            Self::RelativeDir(dir) => {
                write!(f, "log dir must be an absolute path, got `{}`", dir.display())
            }
            Self::InvalidRotation {
                max_file_bytes,
                keep_files,
            } => write!(
                f,
                "log rotation needs positive limits, got max_file_bytes={max_file_bytes} keep_files={keep_files}"
            ),
            Self::AlreadyActive(active) => write!(
                f,
                "logging already active at `{}` with level `{}`; refusing to switch",
                active.dir.display(),
                active.level
            ),
            Self::Io(err) => write!(f, "failed to create log dir: {err}"),
            Self::Backend(err) => write!(f, "failed to start logger: {err}"),
        }
    }
}

impl Error for LoggingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Backend(err) => Some(err),
            _ => None,
        }
    }
}

impl From<FlexiLoggerError> for LoggingError {
    fn from(value: FlexiLoggerError) -> Self {
        Self::Backend(value)
    }
}

/// Starts the process-wide file logger.
///
/// # Errors
/// - `InvalidLevel`, `RelativeDir` or `InvalidRotation` for bad settings.
/// - `AlreadyActive` when a logger runs with different settings.
/// - `Io` or `Backend` when the directory or backend cannot be set up.
pub fn init_logging(settings: &LogSettings) -> Result<(), LoggingError> {
    let requested = settings.normalized()?;
    let active = ACTIVE_LOGGER.get_or_try_init(|| start_logger(&requested))?;
    if active.settings != requested {
        return Err(LoggingError::AlreadyActive(Box::new(active.settings.clone())));
    }
    Ok(())
}

/// Settings of the running logger, `None` before [`init_logging`] succeeds.
pub fn logging_status() -> Option<LogSettings> {
    ACTIVE_LOGGER.get().map(|active| active.settings.clone())
}

/// `debug` for debug builds, `info` otherwise.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn start_logger(settings: &LogSettings) -> Result<ActiveLogger, LoggingError> {
    std::fs::create_dir_all(&settings.dir).map_err(LoggingError::Io)?;

    let handle = Logger::try_with_str(&settings.level)?
        .log_to_file(
            FileSpec::default()
                .directory(settings.dir.clone())
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(settings.max_file_bytes),
            Naming::Numbers,
            Cleanup::KeepLogFiles(settings.keep_files),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()?;

    // Runs once: the cell only stores the first successful start.
    install_panic_hook();

    info!(
        "event=logging_init module=engine status=ok level={} log_dir={} version={}",
        settings.level,
        settings.dir.display(),
        env!("CARGO_PKG_VERSION")
    );
    Ok(ActiveLogger {
        settings: settings.clone(),
        _handle: handle,
    })
}

fn install_panic_hook() {
    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = panic_info
            .payload()
            .downcast_ref::<&str>()
            .map(|message| (*message).to_string())
            .or_else(|| panic_info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!(
            "event=panic_captured module=engine status=error location={} payload={}",
            location,
            flatten(&payload, MAX_PANIC_PAYLOAD_CHARS)
        );
        previous_hook(panic_info);
    }));
}

/// Flattens and caps user-entered text (item names, grant reasons) for a
/// single `key=value` log field.
pub(crate) fn log_text(value: &str) -> String {
    flatten(value.trim(), MAX_LOG_FIELD_CHARS)
}

fn flatten(value: &str, max_chars: usize) -> String {
    let mut flat: String = value
        .chars()
        .take(max_chars)
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    if value.chars().count() > max_chars {
        flat.push_str("...");
    }
    flat
}
