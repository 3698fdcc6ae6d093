//! Sequential download of many profiles.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::DownloadOptions;
use crate::downloader::Downloader;
use crate::error::Result;
use crate::utils::{ensure_directory, parse_profile_list_file, print_header, print_separator};

pub const DEFAULT_FAILED_FILE: &str = "failed_profiles.txt";
pub const EXAMPLE_PROFILES_FILE: &str = "config/profiles.example.txt";

const ERROR_PREVIEW_CHARS: usize = 60;

const EXAMPLE_PROFILES: &str = "\
# Profiles to download, one per line
#
# - a username, @username or a full profile url
# - lines starting with # are comments
# - blank lines are ignored

natgeo
@nasa
https://www.instagram.com/spacex/
instagram.com/instagram/

# Remove the # to enable:
# your_favourite_profile
";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    /// Profiles never attempted because the batch was interrupted.
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub stats: BatchStats,
    /// `(username, error)` for every failed profile.
    pub failed: Vec<(String, String)>,
    pub interrupted: bool,
}

pub struct BatchDownloader {
    downloader: Downloader,
    delay_between: Duration,
    failed_file: PathBuf,
}

impl BatchDownloader {
    pub fn new(downloader: Downloader, delay_between_secs: u64) -> Self {
        Self {
            downloader,
            delay_between: Duration::from_secs(delay_between_secs),
            failed_file: PathBuf::from(DEFAULT_FAILED_FILE),
        }
    }

    /// Where `download_from_file(.., save_failed = true)` writes failures.
    pub fn with_failed_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.failed_file = path.into();
        self
    }

    pub fn downloader(&self) -> &Downloader {
        &self.downloader
    }

    pub fn delay_between(&self) -> Duration {
        self.delay_between
    }

    pub async fn download_from_file<P: AsRef<Path>>(
        &mut self,
        path: P,
        options: &DownloadOptions,
        save_failed: bool,
    ) -> Result<BatchReport> {
        let path = path.as_ref();
        let profiles = parse_profile_list_file(path).map_err(|e| {
            println!("❌ Cannot read profile list: {}", e);
            error!(path = %path.display(), "Cannot read profile list: {}", e);
            e
        })?;

        let report = self.download_from_list(&profiles, options).await;

        if save_failed && !report.failed.is_empty() {
            match save_failed_profiles(&self.failed_file, &report.failed) {
                Ok(()) => {
                    println!("\n💾 Failed profiles saved to {}", self.failed_file.display());
                    info!(path = %self.failed_file.display(), "Saved failed profiles");
                }
                Err(e) => {
                    println!("⚠️  Cannot save failed profiles: {}", e);
                    warn!("Cannot save failed profiles: {}", e);
                }
            }
        }
        Ok(report)
    }

    pub async fn download_from_list(
        &mut self,
        usernames: &[String],
        options: &DownloadOptions,
    ) -> BatchReport {
        let total = usernames.len();
        let mut report = BatchReport {
            stats: BatchStats {
                total,
                ..BatchStats::default()
            },
            ..BatchReport::default()
        };

        print_header(&format!("📦 BATCH DOWNLOAD: {} PROFILES", total), '=');
        info!("Starting batch download of {} profiles", total);

        for (idx, username) in usernames.iter().enumerate() {
            let position = idx + 1;
            println!();
            print_separator('=', Some(60));
            println!("Profile {}/{}: {}", position, total, username);
            print_separator('=', Some(60));

            let stats = self.downloader.download_profile(username, options).await;
            if stats.interrupted {
                println!("📊 Progress: {}/{} profiles", idx, total);
                warn!("Batch download interrupted by user");
                report.stats.skipped = total - idx;
                report.interrupted = true;
                break;
            }

            if stats.success {
                report.stats.completed += 1;
                info!(username = %username, items = stats.total(), "Profile completed");
            } else {
                let reason = stats.first_error().unwrap_or("unknown error").to_string();
                error!(username = %username, "Profile failed: {}", reason);
                report.stats.failed += 1;
                report.failed.push((username.clone(), reason));
            }

            if position < total && !self.delay_between.is_zero() {
                println!(
                    "\n⏳ Waiting {}s before the next profile...",
                    self.delay_between.as_secs()
                );
                let cancelled = tokio::select! {
                    _ = tokio::time::sleep(self.delay_between) => false,
                    _ = self.downloader.interrupt().wait() => true,
                };
                if cancelled {
                    println!("\n⚠️  Interrupted by user");
                    report.stats.skipped = total - position;
                    report.interrupted = true;
                    break;
                }
            }
        }

        print_summary(&report);
        info!(
            completed = report.stats.completed,
            failed = report.stats.failed,
            skipped = report.stats.skipped,
            "Batch download finished"
        );
        report
    }
}

fn error_preview(error: &str) -> String {
    if error.chars().count() > ERROR_PREVIEW_CHARS {
        let head: String = error.chars().take(ERROR_PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        error.to_string()
    }
}

fn print_summary(report: &BatchReport) {
    print_separator('=', None);
    println!("📊 BATCH SUMMARY");
    print_separator('=', None);
    println!("✅ Completed: {}/{}", report.stats.completed, report.stats.total);
    println!("❌ Failed: {}", report.stats.failed);
    if report.stats.skipped > 0 {
        println!("⏭️  Skipped: {}", report.stats.skipped);
    }

    if !report.failed.is_empty() {
        println!("\n⚠️  Failed profiles:");
        for (username, error) in &report.failed {
            println!("  - {}: {}", username, error_preview(error));
        }
    }
    print_separator('=', None);
}

/// Failed profiles in the profile-list format, each preceded by its error as a
/// comment, so the file can be fed back to a batch run.
pub fn save_failed_profiles(path: &Path, failed: &[(String, String)]) -> Result<()> {
    let mut content = String::new();
    let _ = writeln!(content, "# Failed profiles - Instagram downloader");
    let _ = writeln!(
        content,
        "# Generated: {}\n",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    for (username, error) in failed {
        let _ = writeln!(content, "# Error: {}", error.replace('\n', " "));
        let _ = writeln!(content, "{}\n", username);
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_directory(parent)?;
    }
    fs::write(path, content)?;
    Ok(())
}

/// Write a commented example profile list, `config/profiles.example.txt` by
/// default.
pub fn create_example_profiles_file(path: Option<&Path>) -> Result<PathBuf> {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(EXAMPLE_PROFILES_FILE));
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_directory(parent)?;
    }
    fs::write(&path, EXAMPLE_PROFILES)?;
    println!("✓ Example profile list written to {}", path.display());
    info!(path = %path.display(), "Created example profiles file");
    Ok(path)
}
