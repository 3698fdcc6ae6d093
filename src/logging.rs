//! Logging setup
//!
//! Two sinks: the console (stderr, WARN and above unless verbose) and an
//! optional log file that receives everything allowed by `LOG_LEVEL`.
//! The file is rotated by size once, when logging starts.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_LOG_FILE: &str = "logs/instagram_downloader.log";
pub const DEFAULT_LOG_MAX_SIZE: u64 = 10 * 1024 * 1024;
pub const DEFAULT_LOG_BACKUP_COUNT: u32 = 5;

/// Noisy dependencies are held at WARN regardless of `LOG_LEVEL`.
const QUIET_CRATES: &str = "hyper=warn,hyper_util=warn,reqwest=warn,httpmock=warn";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
    /// `None` disables the file sink.
    pub file: Option<PathBuf>,
    pub max_size: u64,
    pub backup_count: u32,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: Some(PathBuf::from(DEFAULT_LOG_FILE)),
            max_size: DEFAULT_LOG_MAX_SIZE,
            backup_count: DEFAULT_LOG_BACKUP_COUNT,
        }
    }
}

impl LogSettings {
    /// Read `LOG_LEVEL`, `LOG_FILE`, `LOG_MAX_SIZE` and `LOG_BACKUP_COUNT`.
    /// An empty `LOG_FILE` turns file logging off.
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            if !level.trim().is_empty() {
                settings.level = level.trim().to_lowercase();
            }
        }
        if let Ok(file) = std::env::var("LOG_FILE") {
            settings.file = if file.trim().is_empty() {
                None
            } else {
                Some(PathBuf::from(file.trim()))
            };
        }
        if let Some(size) = std::env::var("LOG_MAX_SIZE")
            .ok()
            .and_then(|v| v.trim().parse().ok())
        {
            settings.max_size = size;
        }
        if let Some(count) = std::env::var("LOG_BACKUP_COUNT")
            .ok()
            .and_then(|v| v.trim().parse().ok())
        {
            settings.backup_count = count;
        }

        settings
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(format!("{},{}", self.level, QUIET_CRATES)))
            .unwrap_or_else(|_| EnvFilter::new(format!("{},{}", DEFAULT_LOG_LEVEL, QUIET_CRATES)))
    }
}

/// Install the global subscriber. Returns the log file in use, if any.
///
/// Calling this twice is harmless: the second call leaves the first
/// subscriber in place.
pub fn init(settings: &LogSettings, verbose: bool) -> Option<PathBuf> {
    let console_level = if verbose {
        LevelFilter::INFO
    } else {
        LevelFilter::WARN
    };
    let console = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .without_time()
        .with_filter(console_level);

    let (file_layer, file_path) = match settings.file.as_deref().map(|p| open_log_file(p, settings)) {
        Some(Ok((file, path))) => {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_filter(settings.filter());
            (Some(layer), Some(path))
        }
        Some(Err(e)) => {
            eprintln!("⚠️  File logging disabled: {}", e);
            (None, None)
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init();

    file_path
}

fn open_log_file(path: &Path, settings: &LogSettings) -> io::Result<(File, PathBuf)> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    rotate_if_needed(path, settings.max_size, settings.backup_count)?;
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok((file, path.to_path_buf()))
}

fn backup_path(path: &Path, index: u32) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{}", index));
    PathBuf::from(name)
}

/// Rotate `path` when it is larger than `max_size` bytes.
///
/// `file.N` moves to `file.N+1` (the oldest beyond `backup_count` is
/// dropped) and the live file becomes `file.1`. With `backup_count == 0` the
/// live file is truncated instead. Returns whether a rotation happened.
pub fn rotate_if_needed(path: &Path, max_size: u64, backup_count: u32) -> io::Result<bool> {
    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if max_size == 0 || size <= max_size {
        return Ok(false);
    }

    if backup_count == 0 {
        File::create(path)?;
        return Ok(true);
    }

    let oldest = backup_path(path, backup_count);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for index in (1..backup_count).rev() {
        let from = backup_path(path, index);
        if from.exists() {
            fs::rename(&from, backup_path(path, index + 1))?;
        }
    }
    fs::rename(path, backup_path(path, 1))?;
    Ok(true)
}
