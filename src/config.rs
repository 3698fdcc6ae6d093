//! Application configuration
//!
//! Loads settings from (lowest to highest priority):
//! 1. built-in defaults
//! 2. `config.yml`
//! 3. environment variables (a `.env` file is loaded first)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const CONFIG_FILE: &str = "config.yml";
pub const DEFAULT_DOWNLOAD_DIR: &str = "data/downloads";
pub const DEFAULT_SESSION_DIR: &str = "data/sessions";
pub const DEFAULT_SLEEP_TIME: f64 = 5.0;
pub const DEFAULT_MIN_SLEEP_TIME: f64 = 2.0;
pub const DEFAULT_MAX_SLEEP_TIME: f64 = 10.0;
pub const DEFAULT_BATCH_DELAY: u64 = 60;

/// Main configuration struct
///
/// Field names double as YAML keys; the matching environment variable is the
/// upper-cased key (`sleep_time` -> `SLEEP_TIME`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Media options
    pub download_videos: bool,
    pub download_thumbnails: bool,
    pub download_geotags: bool,
    pub download_comments: bool,
    pub save_metadata: bool,

    // Connection and limits
    pub max_attempts: u32,
    pub request_timeout: f64,
    pub sleep_time: f64,

    // Content types
    pub download_posts: bool,
    pub download_stories: bool,
    pub download_highlights: bool,
    pub download_tagged: bool,
    pub download_igtv: bool,

    // Directories
    pub download_dir: PathBuf,
    pub session_dir: PathBuf,

    // Rate limiting
    pub min_sleep_time: f64,
    pub max_sleep_time: f64,
    pub rate_limit_backoff_multiplier: f64,
    pub batch_delay: u64,

    #[serde(skip)]
    pub config_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_videos: true,
            download_thumbnails: true,
            download_geotags: false,
            download_comments: false,
            save_metadata: true,
            max_attempts: 3,
            request_timeout: 300.0,
            sleep_time: DEFAULT_SLEEP_TIME,
            download_posts: true,
            download_stories: false,
            download_highlights: false,
            download_tagged: false,
            download_igtv: false,
            download_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            session_dir: PathBuf::from(DEFAULT_SESSION_DIR),
            min_sleep_time: DEFAULT_MIN_SLEEP_TIME,
            max_sleep_time: DEFAULT_MAX_SLEEP_TIME,
            rate_limit_backoff_multiplier: 1.5,
            batch_delay: DEFAULT_BATCH_DELAY,
            config_path: PathBuf::from(CONFIG_FILE),
        }
    }
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|v| {
        matches!(
            v.trim().to_lowercase().as_str(),
            "true" | "1" | "yes" | "tak"
        )
    })
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

impl Config {
    /// Load configuration from `config.yml` (or `IG_CONFIG`) plus environment.
    pub fn new() -> Self {
        let path = std::env::var("IG_CONFIG").unwrap_or_else(|_| CONFIG_FILE.to_string());
        Self::load(path)
    }

    /// Load configuration from the given file; a missing or broken file falls
    /// back to defaults with a warning.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        Self::load_dotenv();

        let path = path.as_ref();
        let mut config = if path.exists() {
            match Self::load_from_file(path) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Ignoring {}: {}", path.display(), e);
                    Self::default()
                }
            }
        } else {
            Self::default()
        };

        config.config_path = path.to_path_buf();
        config.apply_env();
        config
    }

    /// Load .env file into environment variables using dotenvy
    fn load_dotenv() {
        if dotenvy::dotenv().is_err() {
            let _ = dotenvy::from_filename("../.env");
        }
    }

    /// Parse a YAML file. Keys that are absent keep their defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::ConfigError(format!("failed to read {}: {}", path.as_ref().display(), e))
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let mut config: Config = serde_yaml::from_str(&content)?;
        config.config_path = path.as_ref().to_path_buf();
        Ok(config)
    }

    /// Override fields from environment variables.
    pub fn apply_env(&mut self) {
        macro_rules! bool_var {
            ($cfg:expr, $field:ident, $key:literal) => {
                if let Some(v) = env_bool($key) {
                    $cfg.$field = v;
                }
            };
        }
        macro_rules! parsed_var {
            ($cfg:expr, $field:ident, $key:literal) => {
                if let Some(v) = env_parse($key) {
                    $cfg.$field = v;
                }
            };
        }

        bool_var!(self, download_videos, "DOWNLOAD_VIDEOS");
        bool_var!(self, download_thumbnails, "DOWNLOAD_THUMBNAILS");
        bool_var!(self, download_geotags, "DOWNLOAD_GEOTAGS");
        bool_var!(self, download_comments, "DOWNLOAD_COMMENTS");
        bool_var!(self, save_metadata, "SAVE_METADATA");

        parsed_var!(self, max_attempts, "MAX_ATTEMPTS");
        parsed_var!(self, request_timeout, "REQUEST_TIMEOUT");
        parsed_var!(self, sleep_time, "SLEEP_TIME");

        bool_var!(self, download_posts, "DOWNLOAD_POSTS");
        bool_var!(self, download_stories, "DOWNLOAD_STORIES");
        bool_var!(self, download_highlights, "DOWNLOAD_HIGHLIGHTS");
        bool_var!(self, download_tagged, "DOWNLOAD_TAGGED");
        bool_var!(self, download_igtv, "DOWNLOAD_IGTV");

        if let Some(dir) = env_path("DOWNLOAD_DIR") {
            self.download_dir = dir;
        }
        if let Some(dir) = env_path("SESSION_DIR") {
            self.session_dir = dir;
        }

        parsed_var!(self, min_sleep_time, "MIN_SLEEP_TIME");
        parsed_var!(self, max_sleep_time, "MAX_SLEEP_TIME");
        parsed_var!(self, rate_limit_backoff_multiplier, "RATE_LIMIT_BACKOFF_MULTIPLIER");
        parsed_var!(self, batch_delay, "BATCH_DELAY");
    }

    /// Write the effective configuration to `path` (default: the file it was
    /// loaded from).
    pub fn save_to_file(&self, path: Option<&Path>) -> Result<PathBuf> {
        let target = path.unwrap_or(&self.config_path).to_path_buf();

        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let yaml = serde_yaml::to_string(self)?;
        fs::write(&target, yaml)?;
        tracing::info!("Configuration saved to {}", target.display());
        Ok(target)
    }

    /// Instagram credentials from `INSTAGRAM_USERNAME` / `INSTAGRAM_PASSWORD`.
    pub fn credentials() -> (Option<String>, Option<String>) {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        (non_empty("INSTAGRAM_USERNAME"), non_empty("INSTAGRAM_PASSWORD"))
    }

    fn display_entries(&self) -> Vec<(String, String)> {
        let value = serde_yaml::to_value(self).unwrap_or(serde_yaml::Value::Null);
        let mut entries: Vec<(String, String)> = match value {
            serde_yaml::Value::Mapping(map) => map
                .into_iter()
                .filter_map(|(k, v)| {
                    let key = k.as_str()?.to_string();
                    let rendered = match v {
                        serde_yaml::Value::String(s) => s,
                        serde_yaml::Value::Bool(b) => b.to_string(),
                        serde_yaml::Value::Number(n) => n.to_string(),
                        other => format!("{:?}", other),
                    };
                    Some((key, rendered))
                })
                .collect(),
            _ => Vec::new(),
        };
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Current configuration ({}):", self.config_path.display())?;
        for (key, value) in self.display_entries() {
            let lower = key.to_lowercase();
            let shown = if lower.contains("password") || lower.contains("secret") {
                "***".to_string()
            } else {
                value
            };
            writeln!(f, "  {}: {}", key, shown)?;
        }
        Ok(())
    }
}

/// Which content categories to fetch for a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DownloadOptions {
    pub posts: bool,
    pub stories: bool,
    pub highlights: bool,
    pub tagged: bool,
    pub igtv: bool,
}

impl DownloadOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            posts: config.download_posts,
            stories: config.download_stories,
            highlights: config.download_highlights,
            tagged: config.download_tagged,
            igtv: config.download_igtv,
        }
    }

    pub fn all() -> Self {
        Self {
            posts: true,
            stories: true,
            highlights: true,
            tagged: true,
            igtv: true,
        }
    }

    pub fn posts_only() -> Self {
        Self {
            posts: true,
            ..Default::default()
        }
    }

    pub fn any(&self) -> bool {
        self.posts || self.stories || self.highlights || self.tagged || self.igtv
    }
}
