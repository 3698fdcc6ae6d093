//! Validation, formatting and small console helpers.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::error::{Error, Result};

static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._]+$").expect("valid username regex"));

static INVALID_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("valid filename regex"));

const MAX_USERNAME_LEN: usize = 30;
const PROFILE_HOST: &str = "instagram.com";

/// Validate an Instagram username and return it lower-cased.
///
/// Usernames are 1-30 characters of `[A-Za-z0-9._]` and may not start or end
/// with a dot.
pub fn validate_username(username: &str) -> Result<String> {
    let username = username.trim();

    if username.is_empty() {
        return Err(Error::InvalidUsername("username cannot be empty".into()));
    }

    let len = username.chars().count();
    if len > MAX_USERNAME_LEN {
        return Err(Error::InvalidUsername(format!(
            "username must be 1-{} characters (got {})",
            MAX_USERNAME_LEN, len
        )));
    }

    if !USERNAME_RE.is_match(username) {
        return Err(Error::InvalidUsername(format!(
            "'{}' contains forbidden characters (allowed: a-z, A-Z, 0-9, _, .)",
            username
        )));
    }

    if username.starts_with('.') {
        return Err(Error::InvalidUsername(
            "username cannot start with a dot".into(),
        ));
    }
    if username.ends_with('.') {
        return Err(Error::InvalidUsername("username cannot end with a dot".into()));
    }

    Ok(username.to_lowercase())
}

/// Extract a username from a profile link, `@mention` or bare name.
///
/// Supported forms:
/// - `https://www.instagram.com/username/`
/// - `instagram.com/username/tagged/`
/// - `@username`
/// - `username`
pub fn extract_username_from_url(input: &str) -> Result<String> {
    let input = input.trim();

    if let Some(name) = input.strip_prefix('@') {
        return validate_username(name);
    }

    let has_scheme = input.starts_with("http://") || input.starts_with("https://");
    if !has_scheme && !input.contains('/') {
        return validate_username(input);
    }

    let with_scheme = if has_scheme {
        input.to_string()
    } else {
        format!("https://{}", input)
    };

    let parsed = Url::parse(&with_scheme)
        .map_err(|e| Error::InvalidUsername(format!("cannot parse '{}': {}", input, e)))?;

    let host = parsed.host_str().unwrap_or_default();
    if host != PROFILE_HOST && !host.ends_with(".instagram.com") {
        return Err(Error::InvalidUsername(format!(
            "'{}' is not an Instagram profile link",
            input
        )));
    }

    match parsed
        .path_segments()
        .and_then(|mut segments| segments.find(|s| !s.is_empty()))
    {
        Some(first) => validate_username(first),
        None => Err(Error::InvalidUsername(format!(
            "cannot extract a username from '{}'",
            input
        ))),
    }
}

/// Human readable size, e.g. `1.5 MB`.
pub fn format_file_size(size_bytes: u64) -> String {
    let mut size = size_bytes as f64;
    for unit in ["B", "KB", "MB", "GB", "TB"] {
        if size < 1024.0 {
            return format!("{:.1} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.1} PB", size)
}

/// Create the directory (and parents) if missing.
pub fn ensure_directory<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let path = path.as_ref();
    fs::create_dir_all(path).inspect_err(|e| {
        tracing::error!("Cannot create directory {}: {}", path.display(), e);
    })?;
    Ok(path.to_path_buf())
}

/// Replace characters that are invalid on common filesystems and cap the length,
/// keeping the extension intact.
pub fn safe_filename(filename: &str, max_length: usize) -> String {
    let cleaned = INVALID_FILENAME_CHARS.replace_all(filename, "_");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_length {
        return cleaned.to_string();
    }

    let (stem, ext) = match cleaned.rfind('.') {
        Some(idx) if idx > 0 => (&cleaned[..idx], &cleaned[idx..]),
        _ => (cleaned, ""),
    };
    let keep = max_length.saturating_sub(ext.chars().count());
    let stem: String = stem.chars().take(keep).collect();
    format!("{}{}", stem, ext)
}

/// Cut `text` to `max_length` characters, ending with `suffix` when truncated.
pub fn truncate_string(text: &str, max_length: usize, suffix: &str) -> String {
    if text.chars().count() <= max_length {
        return text.to_string();
    }
    let keep = max_length.saturating_sub(suffix.chars().count());
    let head: String = text.chars().take(keep).collect();
    format!("{}{}", head, suffix)
}

/// Format a unix timestamp in local time as `YYYY-MM-DD HH:MM:SS`.
pub fn format_timestamp(timestamp: i64) -> String {
    match Local.timestamp_opt(timestamp, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => timestamp.to_string(),
    }
}

/// UTC stamp used in media file names: `2024-01-31_18-05-09_UTC`.
pub fn filename_timestamp(dt: &DateTime<chrono::Utc>) -> String {
    dt.format("%Y-%m-%d_%H-%M-%S_UTC").to_string()
}

/// Parse a profile list file: one profile per line, `#` comments and blank lines
/// skipped. Invalid entries are logged and skipped.
pub fn parse_profile_list_file<P: AsRef<Path>>(file_path: P) -> Result<Vec<String>> {
    let file_path = file_path.as_ref();

    if !file_path.exists() {
        return Err(Error::InvalidArgument(format!(
            "file does not exist: {}",
            file_path.display()
        )));
    }

    let content = fs::read_to_string(file_path)?;
    let mut profiles = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match extract_username_from_url(line) {
            Ok(username) => profiles.push(username),
            Err(e) => {
                tracing::warn!("Line {}: skipped invalid profile '{}' ({})", idx + 1, line, e);
            }
        }
    }

    if profiles.is_empty() {
        return Err(Error::InvalidArgument(format!(
            "{} does not contain any valid profiles",
            file_path.display()
        )));
    }

    Ok(profiles)
}

/// Terminal width from `COLUMNS`, default 80.
pub fn terminal_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|w| *w > 0)
        .unwrap_or(80)
}

pub fn print_separator(ch: char, width: Option<usize>) {
    let width = width.unwrap_or_else(terminal_width);
    println!("{}", ch.to_string().repeat(width));
}

pub fn print_header(text: &str, ch: char) {
    let width = terminal_width();
    print_separator(ch, Some(width));
    println!("{:^width$}", text, width = width);
    print_separator(ch, Some(width));
}
